//! Config file parsing and layer-precedence tests.

use assert_fs::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use siterefresh_core::{
    config::{config_path_at, ENV_BASE_URL, ENV_MODE, ENV_STAGE_TIMEOUT},
    BuildMode, ConfigError, ConfigFile, ConfigOverrides, EnvSnapshot, PipelineConfig,
};
use std::time::Duration;

fn env(root: &std::path::Path, vars: &[(&str, &str)]) -> EnvSnapshot {
    EnvSnapshot::from_vars(vars.iter().map(|(k, v)| (*k, *v))).with_cwd(root)
}

// ---------------------------------------------------------------------------
// 1. File loading
// ---------------------------------------------------------------------------

#[test]
fn missing_file_loads_as_default() {
    let home = assert_fs::TempDir::new().unwrap();
    let path = config_path_at(home.path());
    let file = ConfigFile::load_or_default_at(&path).expect("load");
    assert_eq!(file, ConfigFile::default());
}

#[test]
fn file_with_commands_and_marker_parses() {
    let home = assert_fs::TempDir::new().unwrap();
    let cfg = home.child(".siterefresh/config.yaml");
    cfg.write_str(
        "base_url: https://listings.example/\n\
         mode: staging\n\
         sync_command: [./sync.sh, --fast]\n\
         build_command: [hugo, --minify]\n\
         trigger:\n  header: x-vercel-cron\n  value: \"true\"\n\
         schedule_interval_secs: 3600\n",
    )
    .unwrap();

    let file = ConfigFile::load_at(cfg.path()).expect("load");
    assert_eq!(file.mode, Some(BuildMode::Staging));
    assert_eq!(file.build_command.as_ref().map(|c| c.program.as_str()), Some("hugo"));
    assert_eq!(file.trigger.as_ref().map(|t| t.header.as_str()), Some("x-vercel-cron"));
    assert_eq!(file.schedule_interval(), Some(Duration::from_secs(3600)));
}

#[test]
fn corrupt_file_reports_path() {
    let home = assert_fs::TempDir::new().unwrap();
    let cfg = home.child("config.yaml");
    cfg.write_str("base_url: [unclosed").unwrap();

    let err = ConfigFile::load_at(cfg.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(predicate::str::contains("config.yaml").eval(&err.to_string()));
}

#[test]
fn unknown_keys_are_rejected() {
    let home = assert_fs::TempDir::new().unwrap();
    let cfg = home.child("config.yaml");
    cfg.write_str("bse_url: https://typo.example/\n").unwrap();
    assert!(matches!(
        ConfigFile::load_at(cfg.path()),
        Err(ConfigError::Parse { .. })
    ));
}

// ---------------------------------------------------------------------------
// 2. Precedence
// ---------------------------------------------------------------------------

#[rstest]
#[case::default_only(None, None, None, "https://estate-index.vercel.app/")]
#[case::file_wins_over_default(Some("https://file.example/"), None, None, "https://file.example/")]
#[case::env_wins_over_file(
    Some("https://file.example/"),
    Some("https://env.example/"),
    None,
    "https://env.example/"
)]
#[case::override_wins_over_env(
    Some("https://file.example/"),
    Some("https://env.example/"),
    Some("https://override.example/"),
    "https://override.example/"
)]
fn base_url_precedence(
    #[case] from_file: Option<&str>,
    #[case] from_env: Option<&str>,
    #[case] from_override: Option<&str>,
    #[case] expected: &str,
) {
    let root = assert_fs::TempDir::new().unwrap();
    let file = ConfigFile {
        base_url: from_file.map(str::to_owned),
        ..Default::default()
    };
    let vars: Vec<(&str, &str)> = from_env.map(|v| (ENV_BASE_URL, v)).into_iter().collect();
    let overrides = ConfigOverrides {
        base_url: from_override.map(str::to_owned),
        ..Default::default()
    };

    let cfg = PipelineConfig::resolve(&file, &env(root.path(), &vars), &overrides).expect("resolve");
    assert_eq!(cfg.base_url, expected);
}

#[test]
fn relative_directories_resolve_against_working_root() {
    let root = assert_fs::TempDir::new().unwrap();
    root.child("site").create_dir_all().unwrap();
    let overrides = ConfigOverrides {
        working_root: Some("site".into()),
        content_dir: Some("data/listings".into()),
        ..Default::default()
    };

    let cfg = PipelineConfig::resolve(&ConfigFile::default(), &env(root.path(), &[]), &overrides)
        .expect("resolve");
    assert_eq!(cfg.working_root, root.path().join("site"));
    assert_eq!(cfg.content_dir, root.path().join("site/data/listings"));
}

#[rstest]
#[case(ENV_MODE, "prod")]
#[case(ENV_STAGE_TIMEOUT, "ten")]
#[case(ENV_BASE_URL, "ftp://listings.example/")]
#[case(ENV_BASE_URL, "https://")]
fn invalid_env_values_are_rejected(#[case] key: &str, #[case] value: &str) {
    let root = assert_fs::TempDir::new().unwrap();
    let err = PipelineConfig::resolve(
        &ConfigFile::default(),
        &env(root.path(), &[(key, value)]),
        &ConfigOverrides::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }), "got: {err}");
}

#[test]
fn nonexistent_root_is_rejected() {
    let root = assert_fs::TempDir::new().unwrap();
    let overrides = ConfigOverrides {
        working_root: Some(root.path().join("missing")),
        ..Default::default()
    };
    let err = PipelineConfig::resolve(&ConfigFile::default(), &env(root.path(), &[]), &overrides)
        .unwrap_err();
    assert!(matches!(err, ConfigError::RootNotDirectory { .. }), "got: {err}");
}

#[test]
fn stage_timeout_from_env() {
    let root = assert_fs::TempDir::new().unwrap();
    let cfg = PipelineConfig::resolve(
        &ConfigFile::default(),
        &env(root.path(), &[(ENV_STAGE_TIMEOUT, "90")]),
        &ConfigOverrides::default(),
    )
    .expect("resolve");
    assert_eq!(cfg.stage_timeout, Some(Duration::from_secs(90)));
}
