use super::*;
use std::path::Path;
use tempfile::TempDir;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }
}

use test_helpers::parse_args;

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let argv = ["allm", "models", "--server", "gpu-box", "-P", "8080"];
    let args = parse_args(&argv);

    assert!(matches!(args.command, Commands::Models));
    assert_eq!(args.server.as_deref(), Some("gpu-box"));
    assert_eq!(args.port, Some(8080));
    assert_eq!(args.log_level, "warn");
}

#[test]
fn say_collects_the_prompt_words() {
    let argv = ["allm", "say", "--fresh", "what", "is", "-1", "squared"];
    match parse_args(&argv).command {
        Commands::Say {
            model,
            fresh,
            preset,
            prompt,
        } => {
            assert_eq!(model, None);
            assert_eq!(preset, None);
            assert!(fresh);
            assert_eq!(prompt.join(" "), "what is -1 squared");
        }
        _ => panic!("expected say for argv={argv:?}"),
    }
}

#[test]
fn say_requires_a_prompt() {
    assert!(Args::try_parse_from(["allm", "say"]).is_err());
}

#[test]
fn brainstorm_parses_iteration_limits() {
    let argv = ["allm", "brainstorm", "--iterations", "infinite", "--panels", "3", "ideas"];
    match parse_args(&argv).command {
        Commands::Brainstorm {
            iterations, panels, ..
        } => {
            assert_eq!(iterations, Some(IterationLimit::Infinite));
            assert_eq!(panels, Some(3));
        }
        _ => panic!("expected brainstorm for argv={argv:?}"),
    }

    let argv = ["allm", "brainstorm", "-i", "4", "ideas"];
    match parse_args(&argv).command {
        Commands::Brainstorm { iterations, .. } => {
            assert_eq!(iterations, IterationLimit::finite(4));
        }
        _ => panic!("expected brainstorm for argv={argv:?}"),
    }

    assert!(Args::try_parse_from(["allm", "brainstorm", "-i", "0", "ideas"]).is_err());
}

#[test]
fn preset_flag_parses_names() {
    let argv = ["allm", "brainstorm", "--preset", "creative", "ideas"];
    match parse_args(&argv).command {
        Commands::Brainstorm { preset, .. } => {
            assert_eq!(preset, Some(GenerationPreset::Creative));
        }
        _ => panic!("expected brainstorm for argv={argv:?}"),
    }

    assert!(Args::try_parse_from(["allm", "say", "--preset", "wild", "hi"]).is_err());
}

#[test]
fn set_takes_a_key_and_multi_word_value() {
    let argv = ["allm", "set", "server-address", "gpu-box"];
    match parse_args(&argv).command {
        Commands::Set { key, value } => {
            assert_eq!(key.as_deref(), Some("server-address"));
            assert_eq!(value, vec!["gpu-box".to_string()]);
        }
        _ => panic!("expected set for argv={argv:?}"),
    }

    match parse_args(&["allm", "set"]).command {
        Commands::Set { key, value } => {
            assert_eq!(key, None);
            assert!(value.is_empty());
        }
        _ => panic!("expected set"),
    }
}

#[test]
fn export_defaults_to_the_first_panel() {
    match parse_args(&["allm", "export"]).command {
        Commands::Export { panel, all, output } => {
            assert_eq!(panel, 1);
            assert!(!all);
            assert_eq!(output, None);
        }
        _ => panic!("expected export"),
    }
}

#[test]
fn overrides_replace_configured_server() {
    let config = apply_overrides(Config::default(), Some(" http://10.0.0.5 "), Some(9000));
    assert_eq!(config.server.url(), "http://10.0.0.5:9000");

    let untouched = apply_overrides(Config::default(), None, None);
    assert_eq!(untouched.server.url(), "http://localhost:1234");
}

#[test]
fn explicit_config_path_is_loaded() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("custom.toml");
    std::fs::write(&config_path, "panels = 4\n").expect("write");

    let config = load_config(Some(Path::new(&config_path))).expect("load");
    assert_eq!(config.panels, 4);
}
