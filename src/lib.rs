pub mod bank;
pub mod config;
pub mod dsp;
pub mod error;
pub mod scale;

use serde::Serialize;
use wasm_bindgen::prelude::*;

pub use crate::bank::{Preset, PresetKey, Sample, SampleType, SoundBank, Zone};
pub use crate::config::{EnvelopeOverrides, ParamKey, PlayerState, SamplingMode};
pub use crate::dsp::channel::{ChannelParams, StereoFrame};
pub use crate::dsp::engine::Engine;
pub use crate::dsp::voice::{VoiceHandle, VoiceTag};
pub use crate::error::{BankError, Error, Result, ScaleError};
pub use crate::scale::Scale;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the sfwave-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Summary of a scale for host display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleInfo {
    pub description: String,
    pub is_default: bool,
    pub table: Vec<f64>,
}

impl From<&Scale> for ScaleInfo {
    fn from(scale: &Scale) -> Self {
        ScaleInfo {
            description: scale.description().to_string(),
            is_default: scale.is_default(),
            table: scale.table().to_vec(),
        }
    }
}

/// Build a scale from Scala text; blank text means equal temperament.
pub fn scale_from_text(text: &str) -> std::result::Result<Scale, ScaleError> {
    if text.trim().is_empty() {
        Ok(Scale::equal_temperament())
    } else {
        Scale::parse(text)
    }
}

/// WASM-exposed: the 128-entry multiplier table for Scala text.
#[wasm_bindgen]
pub fn scale_table(source: &str) -> std::result::Result<Vec<f64>, JsValue> {
    let scale = scale_from_text(source).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(scale.table().to_vec())
}

/// WASM-exposed: description, default flag and table for Scala text.
#[wasm_bindgen]
pub fn scale_info(source: &str) -> std::result::Result<JsValue, JsValue> {
    let scale = scale_from_text(source).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    serde_wasm_bindgen::to_value(&ScaleInfo::from(&scale))
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_equal_temperament() {
        let scale = scale_from_text("  \n").unwrap();
        assert!(scale.is_default());
        assert_eq!(scale.multiplier(72), 2.0);
    }

    #[test]
    fn scale_info_reports_table() {
        let scale = scale_from_text("just major\n7\n9/8\n5/4\n4/3\n3/2\n5/3\n15/8\n2/1\n").unwrap();
        let info = ScaleInfo::from(&scale);
        assert_eq!(info.description, "just major");
        assert!(!info.is_default);
        assert_eq!(info.table.len(), 128);
        assert_eq!(info.table[60], 1.0);
        assert_eq!(info.table[64], 1.5);
    }

    #[test]
    fn bad_text_is_an_error() {
        assert!(matches!(
            scale_from_text("broken\nseven\n"),
            Err(ScaleError::InvalidCount { .. })
        ));
    }
}
