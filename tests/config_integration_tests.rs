// Configuration system integration tests

use landmark_streamer::config::{load_config, ConfigLoader, StreamerConfig};
use landmark_streamer::ReconnectPolicy;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp config");
    file.write_all(content.as_bytes())
        .expect("Failed to write temp config");
    file
}

#[test]
fn test_load_default_config() {
    let config_path = PathBuf::from("config/default.yaml");

    if config_path.exists() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

        let config = result.unwrap();

        // Verify defaults
        assert_eq!(config.endpoints.addresses.len(), 1);
        assert!(!config.endpoints.secure_origin);
        assert_eq!(config.reconnect.max_retries, 5);
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert_eq!(config.reconnect.max_delay_ms, 30000);
        assert_eq!(config.capture.buffer_duration_ms, 1000);
        assert_eq!(config.capture.admission.required_consecutive_detections, 2);
        assert_eq!(config.logging.format, "text");
    }
}

#[test]
fn test_config_with_env_vars() {
    let temp_config = r#"
endpoints:
  addresses:
    - ${LS_IT_PRIMARY:-ws://primary:8000/ws}
    - ${LS_IT_BACKUP:-ws://backup:8000/ws}
  secure_origin: false

reconnect:
  max_retries: ${LS_IT_RETRIES:-3}
  base_delay_ms: 500
  max_delay_ms: 8000
  check_interval_ms: 250

logging:
  level: debug
  format: compact
"#;

    std::env::set_var("LS_IT_PRIMARY", "ws://gpu-box:9000/ws");
    std::env::remove_var("LS_IT_BACKUP");
    std::env::remove_var("LS_IT_RETRIES");

    let file = write_config(temp_config);
    let result = load_config(file.path());
    assert!(result.is_ok(), "Failed to load config with env vars: {:?}", result.err());

    let config = result.unwrap();

    // Verify env var substitution
    assert_eq!(
        config.endpoints.addresses,
        vec!["ws://gpu-box:9000/ws".to_string(), "ws://backup:8000/ws".to_string()]
    );
    assert_eq!(config.reconnect.max_retries, 3);
    assert_eq!(config.logging.format, "compact");

    // Omitted sections fall back to defaults
    assert_eq!(config.capture.buffer_duration_ms, 1000);
    assert!((config.capture.admission.acceleration_threshold - 0.08).abs() < 1e-6);

    std::env::remove_var("LS_IT_PRIMARY");
}

#[test]
fn test_config_validation() {
    let invalid_config = r#"
reconnect:
  max_retries: 5
  base_delay_ms: 5000
  max_delay_ms: 1000  # INVALID: below base_delay_ms
  check_interval_ms: 1000
"#;

    let file = write_config(invalid_config);
    let result = load_config(file.path());
    assert!(result.is_err(), "Expected validation error for invalid config");
    assert!(format!("{:#}", result.unwrap_err()).contains("max_delay_ms"));
}

#[test]
fn test_admission_validation() {
    let config = ConfigLoader::parse(
        r#"
capture:
  admission:
    required_consecutive_detections: 0
"#,
    );
    assert!(format!("{:#}", config.unwrap_err()).contains("required_consecutive_detections"));

    let config = ConfigLoader::parse(
        r#"
capture:
  buffer_duration_ms: 0
"#,
    );
    assert!(format!("{:#}", config.unwrap_err()).contains("buffer_duration_ms"));
}

#[test]
fn test_unknown_log_level_rejected() {
    let result = ConfigLoader::parse("logging:\n  level: chatty\n");
    assert!(format!("{:#}", result.unwrap_err()).contains("chatty"));
}

#[test]
fn test_missing_file_is_an_error() {
    let result = load_config("/nonexistent/landmark-streamer.yaml");
    assert!(result.is_err());
}

#[test]
fn test_config_defaults() {
    let config = StreamerConfig::default();

    assert_eq!(config.endpoints.addresses, vec!["ws://localhost:8000/ws".to_string()]);
    assert!(config.endpoints.auto_reconnect);
    assert_eq!(config.endpoints.connect_timeout(), Duration::from_secs(10));
    assert_eq!(config.capture.buffer_duration(), Duration::from_millis(1000));
    assert!(config.capture.send_first_frame);
    assert_eq!(config.logging.level, "info");
    assert!(ConfigLoader::validate(&config).is_ok());

    let policy = ReconnectPolicy::from(&config.reconnect);
    assert_eq!(policy, ReconnectPolicy::default());
}
