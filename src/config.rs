//! Immutable decoder configuration.
//!
//! Everything a decoder needs beyond the payload itself (thermistor constants,
//! calibration offsets, which pages the connected model answers) lives in a
//! [`DecoderConfig`] that is passed in explicitly.

use crate::protocol::{Command, CommandPage, Page};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capabilities of the connected device model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceModel {
    /// Answers all five pages: summary, status, both cell pages and temperatures.
    #[default]
    Full,
    /// Only answers the summary page (voltage, current, SOC, capacities).
    SummaryOnly,
}

impl DeviceModel {
    /// Pages to request each cycle, in poll order.
    pub fn pages(&self) -> &'static [Page] {
        match self {
            DeviceModel::Full => &Page::POLL_ORDER,
            DeviceModel::SummaryOnly => &[Page::Summary],
        }
    }
}

/// B-parameter model of the NTC thermistors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermistorParams {
    /// Resistance in ohms at the reference temperature.
    pub r0_ohm: f64,
    /// Reference temperature in °C.
    pub t0_celsius: f64,
    pub b_coefficient: f64,
}

impl Default for ThermistorParams {
    fn default() -> Self {
        Self {
            r0_ohm: 10_000.0,
            t0_celsius: 25.0,
            b_coefficient: 3950.0,
        }
    }
}

/// Additive per-channel offsets in °C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable(BTreeMap<String, f64>);

impl CalibrationTable {
    pub fn new(offsets: BTreeMap<String, f64>) -> Self {
        Self(offsets)
    }

    /// Offset for `channel`, zero for channels without an entry.
    pub fn offset(&self, channel: &str) -> f64 {
        self.0.get(channel).copied().unwrap_or(0.0)
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self(
            [
                ("cell_temp_1", -0.5),
                ("cell_temp_2", -0.3),
                ("cell_temp_3", -0.4),
                ("cell_temp_4", -0.2),
                ("env_temp", 0.0),
                ("mos_temp", -1.0),
            ]
            .into_iter()
            .map(|(channel, offset)| (channel.to_string(), offset))
            .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub model: DeviceModel,
    pub thermistor: ThermistorParams,
    pub calibration: CalibrationTable,
    /// Hex command text replacing the built-in command of a page.
    pub commands: BTreeMap<Page, String>,
}

impl DecoderConfig {
    /// Build the command pages for the configured model, in poll order.
    pub fn command_pages(&self) -> Result<Vec<CommandPage>, Error> {
        self.model
            .pages()
            .iter()
            .map(|page| {
                let command = match self.commands.get(page) {
                    Some(text) => Command::from_hex(text)?,
                    None => page.default_command(),
                };
                Ok(CommandPage {
                    page: *page,
                    command,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_model_polls_every_page_in_order() {
        let pages: Vec<Page> = DecoderConfig::default()
            .command_pages()
            .unwrap()
            .into_iter()
            .map(|p| p.page)
            .collect();
        assert_eq!(
            pages,
            vec![
                Page::Summary,
                Page::Status,
                Page::Cells1To8,
                Page::Cells9To16,
                Page::Temperature
            ]
        );
    }

    #[test]
    fn test_summary_only_model() {
        let config = DecoderConfig {
            model: DeviceModel::SummaryOnly,
            ..Default::default()
        };
        let pages = config.command_pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, Page::Summary);
    }

    #[test]
    fn test_command_override() {
        let mut config = DecoderConfig::default();
        config
            .commands
            .insert(Page::Status, "610146B3E00201FD21".to_string());
        let pages = config.command_pages().unwrap();
        assert_eq!(pages[1].command.to_wire(), b"~610146B3E00201FD21\r");
    }

    #[test]
    fn test_invalid_command_override() {
        let mut config = DecoderConfig::default();
        config.commands.insert(Page::Status, "not hex".to_string());
        assert!(matches!(
            config.command_pages(),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_calibration_offset_missing_channel() {
        let table = CalibrationTable::default();
        assert_eq!(table.offset("mos_temp"), -1.0);
        assert_eq!(table.offset("unknown"), 0.0);
    }
}
