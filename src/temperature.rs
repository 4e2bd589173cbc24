//! NTC temperature page.
//!
//! The response text is scanned for 16-bit groups of four hex characters:
//! two header groups, eight payload groups and one trailing check group.
//! Six of the eight payload groups carry thermistor resistances in ohms.

use crate::config::{DecoderConfig, ThermistorParams};
use crate::protocol::round2;
use std::collections::BTreeMap;

const KELVIN_OFFSET: f64 = 273.15;

const GROUP_HEX_LEN: usize = 4;
const HEADER_GROUPS: usize = 2;
const PAYLOAD_GROUPS: usize = 8;
const TRAILER_GROUPS: usize = 1;

/// Payload groups holding a resistance reading. Groups 1 and 4 are unused.
const RESISTANCE_GROUPS: [usize; 6] = [0, 2, 3, 5, 6, 7];

/// Named sensor channels, aligned with the resistance readings.
pub const SENSOR_CHANNELS: [&str; 6] = [
    "cell_temp_1",
    "cell_temp_2",
    "cell_temp_3",
    "cell_temp_4",
    "env_temp",
    "mos_temp",
];

/// Collect every run of four hex characters in a raw frame as a 16-bit group.
///
/// Bytes that cannot start a group (framing, line noise, a trailing partial
/// group) are skipped one at a time, so the scan resynchronizes on the next
/// four hex characters.
pub fn hex_groups(frame: &[u8]) -> Vec<u16> {
    let mut groups = Vec::new();
    let mut pos = 0;
    while let Some(chunk) = frame.get(pos..pos + GROUP_HEX_LEN) {
        let mut bytes = [0u8; 2];
        if hex::decode_to_slice(chunk, &mut bytes).is_ok() {
            groups.push(u16::from_be_bytes(bytes));
            pos += GROUP_HEX_LEN;
        } else {
            pos += 1;
        }
    }
    groups
}

/// Extract the six resistance readings from a temperature frame.
///
/// Returns an empty sequence when the frame has too few groups.
pub fn decode_temperatures(frame: &[u8]) -> Vec<u16> {
    let groups = hex_groups(frame);
    if groups.len() < HEADER_GROUPS + PAYLOAD_GROUPS + TRAILER_GROUPS {
        log::warn!(
            "Temperature page too short - required={} groups received={}",
            HEADER_GROUPS + PAYLOAD_GROUPS + TRAILER_GROUPS,
            groups.len()
        );
        return Vec::new();
    }
    let payload = &groups[HEADER_GROUPS..HEADER_GROUPS + PAYLOAD_GROUPS];
    RESISTANCE_GROUPS.iter().map(|&i| payload[i]).collect()
}

/// Convert a thermistor resistance to °C with the B-parameter equation.
///
/// `None` for non-positive or non-finite resistances.
pub fn resistance_to_celsius(resistance_ohm: f64, params: &ThermistorParams) -> Option<f64> {
    if !resistance_ohm.is_finite() || resistance_ohm <= 0.0 {
        return None;
    }
    let t0_kelvin = params.t0_celsius + KELVIN_OFFSET;
    let inverse_t =
        1.0 / t0_kelvin + (resistance_ohm / params.r0_ohm).ln() / params.b_coefficient;
    let celsius = 1.0 / inverse_t - KELVIN_OFFSET;
    celsius.is_finite().then_some(celsius)
}

/// Calibrated temperatures keyed by channel name, rounded to two decimals.
///
/// Anything other than exactly one reading per channel yields no temperatures.
/// A reading without a valid resistance leaves its channel out.
pub fn calibrated_temperatures(
    resistances: &[u16],
    config: &DecoderConfig,
) -> BTreeMap<&'static str, f64> {
    let mut temperatures = BTreeMap::new();
    if resistances.len() != SENSOR_CHANNELS.len() {
        if !resistances.is_empty() {
            log::warn!(
                "Temperature channel mismatch - expected={} received={}",
                SENSOR_CHANNELS.len(),
                resistances.len()
            );
        }
        return temperatures;
    }
    for (&channel, &resistance) in SENSOR_CHANNELS.iter().zip(resistances) {
        match resistance_to_celsius(f64::from(resistance), &config.thermistor) {
            Some(celsius) => {
                let calibrated = round2(celsius + config.calibration.offset(channel));
                log::trace!("{} R={}Ω °C={}", channel, resistance, calibrated);
                temperatures.insert(channel, calibrated);
            }
            None => log::debug!("{} has no reading (R={}Ω)", channel, resistance),
        }
    }
    temperatures
}
