use clap::Parser;
use std::path::PathBuf;

use crate::audio::BackendKind;
use crate::cli::{CliApp, Commands, OutputArgs};
use crate::config::EngineConfig;
use crate::models::SampleFormat;

fn parse(args: &[&str]) -> CliApp {
    CliApp::try_parse_from(std::iter::once("astream").chain(args.iter().copied())).unwrap()
}

#[test]
fn test_parse_tone_defaults() {
    let cli = parse(&["tone"]);
    match cli.command {
        Commands::Tone { freq, seconds } => {
            assert_eq!(freq, 440.0);
            assert_eq!(seconds, 3.0);
        }
        other => panic!("Expected Tone command, got {:?}", other),
    }
    assert!(cli.output.backend.is_none());
}

#[test]
fn test_parse_tone_with_options() {
    let cli = parse(&["tone", "--freq", "1000", "--seconds", "0.5", "--backend", "null", "--format", "s16le"]);
    assert!(matches!(cli.command, Commands::Tone { freq, seconds } if freq == 1000.0 && seconds == 0.5));
    assert_eq!(cli.output.backend, Some(BackendKind::Null));
    assert_eq!(cli.output.format, Some(SampleFormat::S16LE));
}

#[test]
fn test_parse_play() {
    let cli = parse(&["--volume", "0.5", "play", "/music/song.flac"]);
    match cli.command {
        Commands::Play { path } => assert_eq!(path, PathBuf::from("/music/song.flac")),
        other => panic!("Expected Play command, got {:?}", other),
    }
    assert_eq!(cli.output.volume, Some(0.5));
}

#[test]
fn test_parse_devices() {
    let cli = parse(&["devices"]);
    assert!(matches!(cli.command, Commands::Devices));
}

#[test]
fn test_invalid_arguments_rejected() {
    assert!(CliApp::try_parse_from(["astream"]).is_err());
    assert!(CliApp::try_parse_from(["astream", "tone", "--backend", "alsa"]).is_err());
    assert!(CliApp::try_parse_from(["astream", "tone", "--format", "s24"]).is_err());
    assert!(CliApp::try_parse_from(["astream", "play"]).is_err());
}

#[test]
fn test_output_args_override_config() {
    let config = EngineConfig::default();
    let args = OutputArgs {
        backend: Some(BackendKind::Null),
        latency: Some(512),
        channels: Some(1),
        ..OutputArgs::default()
    };

    let merged = args.apply(&config);
    assert_eq!(merged.backend, BackendKind::Null);
    assert_eq!(merged.default_latency_frames, 512);
    assert_eq!(merged.channels, 1);
    assert_eq!(merged.sample_rate, config.sample_rate);
    assert_eq!(merged.default_volume, config.default_volume);
}

#[test]
fn test_no_flags_keeps_config() {
    let config = EngineConfig::default();
    assert_eq!(OutputArgs::default().apply(&config), config);
}

#[test]
fn test_expand_path() {
    let plain = PathBuf::from("/tmp/file.wav");
    assert_eq!(CliApp::expand_path(&plain), plain);

    if let Some(home) = dirs::home_dir() {
        assert_eq!(CliApp::expand_path(&PathBuf::from("~/file.wav")), home.join("file.wav"));
    }
}
