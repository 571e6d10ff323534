//! Error taxonomy for the decision engine.
//!
//! Every recoverable condition is returned as a value. Per-frame errors
//! (`UnknownClass`) never abort a run; start-up errors (`SourceUnavailable`,
//! `ActuatorUnavailable`) are decided once and fixed for the run.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    /// The detector reported a label the class registry does not know.
    #[error("unknown class '{class}' (not in the class registry)")]
    UnknownClass { class: String },

    #[error("invalid command '{input}'")]
    InvalidCommand { input: String },

    #[error("selection {index} is out of range (1-{max})")]
    OutOfRangeSelection { index: usize, max: usize },

    #[error("frame source '{location}' unavailable: {reason}")]
    SourceUnavailable { location: String, reason: String },

    #[error("actuator hardware unavailable: {0}")]
    ActuatorUnavailable(String),

    /// A single actuator call failed after successful initialization.
    #[error("actuator command '{command}' failed: {reason}")]
    ActuatorCommand { command: String, reason: String },

    #[error("video sink write failed: {0}")]
    SinkWrite(String),

    #[error("invalid class catalog: {0}")]
    InvalidClassCatalog(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_value() {
        let err = AccessError::UnknownClass {
            class: "Helmet".to_string(),
        };
        assert!(err.to_string().contains("Helmet"));

        let err = AccessError::OutOfRangeSelection { index: 15, max: 14 };
        assert_eq!(err.to_string(), "selection 15 is out of range (1-14)");
    }
}
