use super::AppConfig;
use clap::Parser;

fn parse(args: &[&str]) -> AppConfig {
    let mut argv = vec!["voicedesk"];
    argv.extend_from_slice(args);
    AppConfig::try_parse_from(argv).expect("arguments parse")
}

#[test]
fn defaults_validate_cleanly() {
    let mut config = parse(&[]);
    config.validate().expect("defaults are valid");
    let capture = config.capture_config();
    assert_eq!(capture.sample_rate, 24_000);
    assert_eq!(capture.block_size, 1_024);
    assert_eq!(capture.silence_tail_ms, 1_000);
    assert_eq!(capture.calibration_blocks, 10);
    assert_eq!(capture.max_capture_ms, 30_000);
}

#[test]
fn sample_rate_out_of_range_is_rejected() {
    let mut config = parse(&["--sample-rate", "4000"]);
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("--sample-rate"), "{err}");
}

#[test]
fn silence_tail_cannot_exceed_the_capture_budget() {
    let mut config = parse(&["--silence-tail-ms", "40000"]);
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("--silence-tail-ms"), "{err}");
}

#[test]
fn speech_threshold_must_cover_the_silence_threshold() {
    let mut config = parse(&["--silence-threshold", "0.05", "--speech-threshold", "0.02"]);
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("--speech-threshold"), "{err}");
}

#[test]
fn calibration_cannot_consume_the_whole_budget() {
    let mut config = parse(&["--max-capture-ms", "300", "--silence-tail-ms", "200", "--calibration-blocks", "100"]);
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("--calibration-blocks"), "{err}");
}

#[test]
fn input_device_is_trimmed_and_checked() {
    let mut config = parse(&["--input-device", "  USB Mic  "]);
    config.validate().expect("padded name is fine");
    assert_eq!(config.input_device.as_deref(), Some("USB Mic"));

    let mut config = parse(&["--input-device", "   "]);
    assert!(config.validate().is_err());
}

#[test]
fn chunk_samples_scale_with_the_sample_rate() {
    let mut config = parse(&[]);
    config.validate().unwrap();
    let capture = config.capture_config();
    assert_eq!(capture.chunk_samples(200), 4_800);
    assert_eq!(capture.chunk_samples(1_000), 24_000);
}
