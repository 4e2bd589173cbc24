use anyhow::{Context, Result};
use qdbms_lib::config::DecoderConfig;
use std::path::Path;

/// Load the decoder configuration, falling back to the built-in defaults.
pub fn load_decoder_config(path: Option<&Path>) -> Result<DecoderConfig> {
    let Some(path) = path else {
        return Ok(DecoderConfig::default());
    };
    log::debug!("Loading decoder config from {path:?}");
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open decoder config file {path:?}"))?;
    let config: DecoderConfig = serde_yaml::from_reader(&file)
        .with_context(|| format!("Cannot read decoder config from file: {path:?}"))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdbms_lib::config::DeviceModel;
    use qdbms_lib::protocol::Page;
    use std::io::Write;

    #[test]
    fn test_no_file_gives_defaults() {
        assert_eq!(load_decoder_config(None).unwrap(), DecoderConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "model: summary-only\nthermistor:\n  b_coefficient: 3435\ncalibration:\n  env_temp: 0.7\ncommands:\n  summary: \"~610146B7E00201FD1D\\r\"\n"
        )
        .unwrap();
        let config = load_decoder_config(Some(file.path())).unwrap();
        assert_eq!(config.model, DeviceModel::SummaryOnly);
        assert_eq!(config.thermistor.b_coefficient, 3435.0);
        assert_eq!(config.thermistor.r0_ohm, 10_000.0);
        assert_eq!(config.calibration.offset("env_temp"), 0.7);
        assert_eq!(config.calibration.offset("mos_temp"), 0.0);
        assert!(config.commands.contains_key(&Page::Summary));
        assert_eq!(config.command_pages().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_model() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "model: bluetooth\n").unwrap();
        assert!(load_decoder_config(Some(file.path())).is_err());
    }
}
