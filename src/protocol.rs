use crate::codec;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pre-built summary request (voltage, current, SOC, capacities).
pub const SUMMARY_FRAME: &[u8] = b"~610146B7E00201FD1D\r";

const PROTOCOL_VERSION: u8 = 0x61;
const DEVICE_ADDRESS: u8 = 0x01;
const CID1_BATTERY: u8 = 0x46;

/// Highest physical cell number reported by the device.
pub const MAX_CELLS: usize = 16;
/// Bytes preceding the first cell value in a cell page.
pub const CELL_HEADER_LEN: usize = 8;

const STATUS_FLAGS_OFFSET: usize = 4;

macro_rules! read_bit {
    ($byte:expr,$position:expr) => {
        ($byte >> $position) & 1 != 0
    };
}

/// One command/response pair of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Page {
    #[serde(rename = "summary")]
    Summary,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "cells-1-8")]
    Cells1To8,
    #[serde(rename = "cells-9-16")]
    Cells9To16,
    #[serde(rename = "temperature")]
    Temperature,
}

impl Page {
    pub const POLL_ORDER: [Page; 5] = [
        Page::Summary,
        Page::Status,
        Page::Cells1To8,
        Page::Cells9To16,
        Page::Temperature,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Page::Summary => "summary",
            Page::Status => "status",
            Page::Cells1To8 => "cells-1-8",
            Page::Cells9To16 => "cells-9-16",
            Page::Temperature => "temperature",
        }
    }

    /// Built-in request for this page.
    pub fn default_command(&self) -> Command {
        let (cid2, info) = match self {
            Page::Summary => return Command::Raw(SUMMARY_FRAME.to_vec()),
            Page::Cells1To8 => (0xB1, 0x01),
            Page::Cells9To16 => (0xB1, 0x02),
            Page::Temperature => (0xB2, 0x01),
            Page::Status => (0xB3, 0x01),
        };
        Command::Text(RequestFrame::new(cid2, vec![info]).hex_text())
    }
}

/// Request in the `VER ADR CID1 CID2 LENGTH INFO CHKSUM` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub version: u8,
    pub address: u8,
    pub cid1: u8,
    pub cid2: u8,
    pub info: Vec<u8>,
}

impl RequestFrame {
    pub fn new(cid2: u8, info: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            address: DEVICE_ADDRESS,
            cid1: CID1_BATTERY,
            cid2,
            info,
        }
    }

    /// Upper-case hex text including the trailing checksum, without framing.
    pub fn hex_text(&self) -> String {
        let info = hex::encode_upper(&self.info);
        let mut text = format!(
            "{:02X}{:02X}{:02X}{:02X}{:04X}{}",
            self.version,
            self.address,
            self.cid1,
            self.cid2,
            codec::length_field(info.len()),
            info
        );
        let checksum = codec::frame_checksum(text.as_bytes());
        text.push_str(&format!("{checksum:04X}"));
        text
    }

    pub fn encode(&self) -> Vec<u8> {
        codec::encode(&self.hex_text())
    }
}

/// A request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Hex text, wrapped in delimiter and terminator when sent.
    Text(String),
    /// Complete frame including delimiter and terminator.
    Raw(Vec<u8>),
}

impl Command {
    /// Parse hex command text, with or without framing.
    pub fn from_hex(text: &str) -> Result<Self, Error> {
        let stripped = codec::strip_frame(text.as_bytes());
        if stripped.is_empty() || hex::decode(stripped).is_err() {
            return Err(Error::InvalidCommand(text.to_string()));
        }
        let stripped = String::from_utf8_lossy(stripped).to_ascii_uppercase();
        Ok(Command::Text(stripped))
    }

    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            Command::Text(text) => codec::encode(text),
            Command::Raw(frame) => frame.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPage {
    pub page: Page,
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    I16,
}

impl Width {
    pub const fn size(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 | Width::I16 => 2,
        }
    }
}

/// Location and scaling of one big-endian field inside a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub width: Width,
    /// Divisor applied to the raw value.
    pub scale: f64,
}

impl FieldSpec {
    const fn new(name: &'static str, offset: usize, width: Width, scale: f64) -> Self {
        Self {
            name,
            offset,
            width,
            scale,
        }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.width.size()
    }

    /// Raw integer value, `None` if the payload is too short.
    pub fn read_raw(&self, payload: &[u8]) -> Option<i32> {
        let bytes = payload.get(self.offset..self.end())?;
        Some(match self.width {
            Width::U8 => i32::from(bytes[0]),
            Width::U16 => i32::from(u16::from_be_bytes([bytes[0], bytes[1]])),
            Width::I16 => i32::from(i16::from_be_bytes([bytes[0], bytes[1]])),
        })
    }

    /// Scaled value rounded to two decimals.
    pub fn read(&self, payload: &[u8]) -> Option<f64> {
        self.read_raw(payload)
            .map(|raw| round2(f64::from(raw) / self.scale))
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Layout of the summary page, in [`Summary`] field order.
pub const SUMMARY_LAYOUT: [FieldSpec; 5] = [
    FieldSpec::new("voltage", 7, Width::U16, 100.0),
    FieldSpec::new("current", 11, Width::I16, 100.0),
    FieldSpec::new("state_of_charge", 15, Width::U8, 1.0),
    FieldSpec::new("stored_capacity_ah", 18, Width::U16, 100.0),
    FieldSpec::new("full_capacity_ah", 22, Width::U16, 100.0),
];

/// Minimum summary payload length, covering every field of [`SUMMARY_LAYOUT`].
pub const SUMMARY_MIN_LEN: usize = layout_len(&SUMMARY_LAYOUT);

const fn layout_len(layout: &[FieldSpec]) -> usize {
    let mut len = 0;
    let mut i = 0;
    while i < layout.len() {
        if layout[i].end() > len {
            len = layout[i].end();
        }
        i += 1;
    }
    len
}

/// The device does not report state of health.
pub const STATE_OF_HEALTH_PERCENT: u8 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub voltage: f64,
    pub current: f64, // signed, amps
    pub state_of_charge: u8,
    pub state_of_health: u8,
    pub stored_capacity_ah: f64,
    pub full_capacity_ah: f64,
}

/// Decode the summary page, `None` for payloads shorter than [`SUMMARY_MIN_LEN`].
pub fn decode_summary(payload: &[u8]) -> Option<Summary> {
    if payload.len() < SUMMARY_MIN_LEN {
        log::warn!(
            "Summary payload too short - required={} received={}",
            SUMMARY_MIN_LEN,
            payload.len()
        );
        return None;
    }
    let [voltage, current, state_of_charge, stored_capacity_ah, full_capacity_ah] =
        SUMMARY_LAYOUT.map(|field| {
            let value = field.read(payload);
            log::trace!("summary {}={:?}", field.name, value);
            value
        });
    Some(Summary {
        voltage: voltage?,
        current: current?,
        state_of_charge: state_of_charge? as u8,
        state_of_health: STATE_OF_HEALTH_PERCENT,
        stored_capacity_ah: stored_capacity_ah?,
        full_capacity_ah: full_capacity_ah?,
    })
}

/// Decode one cell page into raw per-cell values keyed by physical cell number.
///
/// `start_index` is the cell number of the first value (1 or 9). Values that
/// would map outside `1..=16` are dropped.
pub fn decode_cells(payload: &[u8], start_index: usize) -> BTreeMap<u8, u16> {
    let mut cells = BTreeMap::new();
    let Some(values) = payload.get(CELL_HEADER_LEN..) else {
        log::warn!("Cell page too short - received={}", payload.len());
        return cells;
    };
    for (i, chunk) in values.chunks_exact(2).enumerate() {
        let idx = start_index.saturating_add(i);
        if !(1..=MAX_CELLS).contains(&idx) {
            continue;
        }
        let value = u16::from_be_bytes([chunk[0], chunk[1]]);
        log::trace!("cell #{} raw={}", idx, value);
        cells.insert(idx as u8, value);
    }
    cells
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusFlags {
    pub warning: bool,
    pub protect: bool,
    pub balance: bool,
    pub hardware_error: bool,
}

/// Decode the status page, `None` when the flag byte is missing.
pub fn decode_status(payload: &[u8]) -> Option<StatusFlags> {
    let Some(&flags) = payload.get(STATUS_FLAGS_OFFSET) else {
        log::warn!("Status payload too short - received={}", payload.len());
        return None;
    };
    Some(StatusFlags {
        warning: read_bit!(flags, 0),
        protect: read_bit!(flags, 1),
        balance: read_bit!(flags, 2),
        hardware_error: read_bit!(flags, 3),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_payload() -> Vec<u8> {
        let mut payload = vec![0u8; 24];
        payload[7..9].copy_from_slice(&0x1770u16.to_be_bytes()); // 60.00 V
        payload[11..13].copy_from_slice(&(-1234i16).to_be_bytes());
        payload[15] = 87;
        payload[18..20].copy_from_slice(&10_050u16.to_be_bytes());
        payload[22..24].copy_from_slice(&20_000u16.to_be_bytes());
        payload
    }

    #[test]
    fn test_summary_frame_matches_request_builder() {
        assert_eq!(RequestFrame::new(0xB7, vec![0x01]).encode(), SUMMARY_FRAME);
        assert_eq!(
            hex::decode("7E3631303134364237453030323031464431440D").unwrap(),
            SUMMARY_FRAME
        );
    }

    #[test]
    fn test_default_commands() {
        assert_eq!(
            Page::Status.default_command().to_wire(),
            b"~610146B3E00201FD21\r"
        );
        assert_eq!(
            Page::Cells9To16.default_command().to_wire(),
            b"~610146B1E00202FD22\r"
        );
        assert_eq!(Page::Summary.default_command().to_wire(), SUMMARY_FRAME);
    }

    #[test]
    fn test_command_from_hex() {
        let command = Command::from_hex("~610146b7e00201fd1d\r").unwrap();
        assert_eq!(command.to_wire(), SUMMARY_FRAME);
        assert!(Command::from_hex("").is_err());
        assert!(Command::from_hex("61014").is_err());
    }

    #[test]
    fn test_decode_summary() {
        let summary = decode_summary(&summary_payload()).unwrap();
        assert_eq!(summary.voltage, 60.0);
        assert_eq!(summary.current, -12.34);
        assert_eq!(summary.state_of_charge, 87);
        assert_eq!(summary.state_of_health, 100);
        assert_eq!(summary.stored_capacity_ah, 100.5);
        assert_eq!(summary.full_capacity_ah, 200.0);
    }

    #[test]
    fn test_decode_summary_too_short() {
        let payload = summary_payload();
        assert_eq!(decode_summary(&payload[..23]), None);
        assert_eq!(decode_summary(&[]), None);
    }

    #[test]
    fn test_summary_layout_fits_min_len() {
        let end = SUMMARY_LAYOUT.iter().map(FieldSpec::end).max().unwrap();
        assert_eq!(end, SUMMARY_MIN_LEN);
        assert_eq!(SUMMARY_MIN_LEN, 24);
    }

    #[test]
    fn test_summary_layout_names_match_record_fields() {
        let summary = decode_summary(&summary_payload()).unwrap();
        let value = serde_json::to_value(&summary).unwrap();
        for field in SUMMARY_LAYOUT {
            let decoded = value[field.name].as_f64().unwrap();
            assert_eq!(Some(decoded), field.read(&summary_payload()), "{}", field.name);
        }
    }

    #[test]
    fn test_field_spec_out_of_bounds() {
        let [voltage, _, state_of_charge, ..] = SUMMARY_LAYOUT;
        assert_eq!(voltage.read(&[0u8; 8]), None);
        assert_eq!(state_of_charge.read_raw(&[0u8; 16]), Some(0));
    }

    #[test]
    fn test_decode_cells_first_page() {
        let mut payload = vec![0u8; CELL_HEADER_LEN];
        for v in [3301u16, 3302, 3303] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        let cells = decode_cells(&payload, 1);
        assert_eq!(
            cells.into_iter().collect::<Vec<_>>(),
            vec![(1, 3301), (2, 3302), (3, 3303)]
        );
    }

    #[test]
    fn test_decode_cells_discards_excess_slots() {
        let mut payload = vec![0u8; CELL_HEADER_LEN];
        for v in 0..12u16 {
            payload.extend_from_slice(&(3300 + v).to_be_bytes());
        }
        // trailing odd byte is ignored
        payload.push(0xff);
        let cells = decode_cells(&payload, 9);
        assert_eq!(cells.len(), 8);
        assert_eq!(cells.keys().min(), Some(&9));
        assert_eq!(cells.keys().max(), Some(&16));
        assert_eq!(cells[&9], 3300);
    }

    #[test]
    fn test_decode_cells_never_outside_range() {
        let mut payload = vec![0u8; CELL_HEADER_LEN];
        payload.extend(std::iter::repeat(0x0c).take(80));
        for start in [0usize, 1, 9, 15, 16, 17, usize::MAX] {
            let cells = decode_cells(&payload, start);
            assert!(cells.keys().all(|k| (1..=16).contains(k)), "start={start}");
        }
    }

    #[test]
    fn test_decode_cells_header_only() {
        assert!(decode_cells(&[0u8; 4], 1).is_empty());
        assert!(decode_cells(&[0u8; CELL_HEADER_LEN], 1).is_empty());
    }

    #[test]
    fn test_decode_status() {
        let flags = decode_status(&[0, 0, 0, 0, 0b0000_1010]).unwrap();
        assert_eq!(
            flags,
            StatusFlags {
                warning: false,
                protect: true,
                balance: false,
                hardware_error: true,
            }
        );
        let flags = decode_status(&[0, 0, 0, 0, 0b1111_0101, 0xff]).unwrap();
        assert!(flags.warning && flags.balance);
        assert!(!flags.protect && !flags.hardware_error);
    }

    #[test]
    fn test_decode_status_too_short_is_unknown() {
        assert_eq!(decode_status(&[0xff; 4]), None);
        assert_eq!(decode_status(&[]), None);
    }
}
