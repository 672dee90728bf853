//! Tests for training configuration parsing
//!
//! This file tests the config module including:
//! - Loading valid JSON config files
//! - Handling missing optional fields with defaults
//! - Rejecting out-of-range values, invalid JSON and missing files

use rust_cnn_engine::config::{load_config, TrainConfig};
use rust_cnn_engine::EngineError;
use std::fs;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), contents).unwrap();
    file
}

// ============================================================================
// Valid Config Loading Tests
// ============================================================================

mod valid_config_tests {
    use super::*;

    #[test]
    fn test_load_shipped_default() {
        let config = load_config("config/train_default.json").expect("Failed to load default config");
        assert_eq!(config.epochs, 10);
        assert_eq!(config.mini_batch_size, 10);
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.lambda, 5.0);
        assert!(config.shuffle);
    }

    #[test]
    fn test_optional_fields_default() {
        let file = write_config(r#"{ "epochs": 3, "mini_batch_size": 1, "learning_rate": 0.5 }"#);
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config,
            TrainConfig { epochs: 3, mini_batch_size: 1, learning_rate: 0.5, lambda: 0.0, shuffle: true }
        );
    }

    #[test]
    fn test_shuffle_can_be_disabled() {
        let file = write_config(r#"{ "epochs": 1, "mini_batch_size": 2, "learning_rate": 0.1, "shuffle": false }"#);
        assert!(!load_config(file.path()).unwrap().shuffle);
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = TrainConfig { epochs: 7, mini_batch_size: 16, learning_rate: 0.01, lambda: 2.5, shuffle: false };
        let file = write_config(&serde_json::to_string(&config).unwrap());
        assert_eq!(load_config(file.path()).unwrap(), config);
    }
}

// ============================================================================
// Invalid Config Tests
// ============================================================================

mod invalid_config_tests {
    use super::*;

    #[test]
    fn test_zero_epochs_rejected() {
        let file = write_config(r#"{ "epochs": 0, "mini_batch_size": 1, "learning_rate": 0.5 }"#);
        assert!(matches!(load_config(file.path()), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_non_positive_learning_rate_rejected() {
        let file = write_config(r#"{ "epochs": 1, "mini_batch_size": 1, "learning_rate": 0.0 }"#);
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("learning_rate"));
    }

    #[test]
    fn test_negative_lambda_rejected() {
        let file = write_config(r#"{ "epochs": 1, "mini_batch_size": 1, "learning_rate": 0.1, "lambda": -0.5 }"#);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_missing_required_field() {
        let file = write_config(r#"{ "epochs": 1 }"#);
        assert!(matches!(load_config(file.path()), Err(EngineError::Json(_))));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ not json");
        assert!(matches!(load_config(file.path()), Err(EngineError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(load_config("config/does_not_exist.json"), Err(EngineError::Io(_))));
    }
}
