//! Render configuration files.
//!
//! A JSON object with any subset of the [`RenderParameters`] fields; missing
//! fields keep their defaults.
//!
//! ```json
//! { "sound_freq": 48000, "chip_type": "ym", "looped": true }
//! ```

use std::path::Path;

use log::debug;

use crate::{RenderParameters, Result, ZxtuneError};

/// Parse render parameters from JSON text.
pub fn parse_parameters(text: &str) -> Result<RenderParameters> {
    let params: RenderParameters =
        serde_json::from_str(text).map_err(|e| ZxtuneError::ConfigError(e.to_string()))?;
    validate(&params)?;
    Ok(params)
}

/// Read render parameters from a JSON file.
pub fn load_parameters(path: impl AsRef<Path>) -> Result<RenderParameters> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let params = parse_parameters(&text)?;
    debug!("render parameters from {}: {params:?}", path.display());
    Ok(params)
}

/// Reject parameters no device can render with.
pub fn validate(params: &RenderParameters) -> Result<()> {
    if params.sound_freq == 0 {
        return Err(ZxtuneError::ConfigError("sound_freq must be positive".into()));
    }
    if params.frame_duration_us == 0 {
        return Err(ZxtuneError::ConfigError("frame_duration_us must be positive".into()));
    }
    if params.clock_freq < u64::from(params.sound_freq) {
        return Err(ZxtuneError::ConfigError(format!(
            "clock_freq {} is below sound_freq {}",
            params.clock_freq, params.sound_freq
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChipType;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let params = parse_parameters(r#"{ "sound_freq": 48000, "chip_type": "ym" }"#).unwrap();
        assert_eq!(params.sound_freq, 48_000);
        assert_eq!(params.chip_type, ChipType::Ym);
        assert_eq!(params.clock_freq, RenderParameters::default().clock_freq);
        assert!(!params.looped);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            parse_parameters(r#"{ "sound_freq": 0 }"#),
            Err(ZxtuneError::ConfigError(_))
        ));
        assert!(matches!(
            parse_parameters("not json"),
            Err(ZxtuneError::ConfigError(_))
        ));
        assert!(matches!(
            parse_parameters(r#"{ "clock_freq": 1000 }"#),
            Err(ZxtuneError::ConfigError(_))
        ));
    }
}
