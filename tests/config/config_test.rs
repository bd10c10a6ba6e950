//! Coverage for config parsing, env overrides and validation.

use std::collections::HashMap;
use std::path::Path;

use taskdesk::config::{config_path_with, parse_id_list, Config};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn parse_minimal_config() {
    let toml_str = r#"
[access]
super_admin_ids = [111, 222]

[database]
path = "data/tasks.db"
"#;
    let config = match Config::from_toml(toml_str) {
        Ok(config) => config,
        Err(err) => panic!("minimal config should parse: {err}"),
    };
    assert_eq!(config.access.super_admin_ids, vec![111, 222]);
    assert_eq!(config.database.path, Path::new("data/tasks.db"));
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.reminders.interval_secs, 3600);
    assert!(config.reminders.enabled);
    assert!(config.reminders.check_cron.is_none());
}

#[test]
fn parse_full_config() {
    let toml_str = r#"
[telegram]
bot_token_env = "OPS_BOT_TOKEN"

[reminders]
enabled = false
interval_secs = 600
check_cron = "0 5 * * * *"
utc_offset_hours = 3

[dashboard]
enabled = true
bind = "0.0.0.0:9000"

[paths]
logs_dir = "/var/log/taskdesk"

[tasks]
list_limit = 50
"#;
    let config = Config::from_toml(toml_str).expect("full config should parse");
    assert_eq!(config.telegram.bot_token_env, "OPS_BOT_TOKEN");
    assert!(!config.reminders.enabled);
    assert_eq!(config.reminders.interval_secs, 600);
    assert_eq!(config.reminders.check_cron.as_deref(), Some("0 5 * * * *"));
    assert_eq!(config.reminders.utc_offset_hours, 3);
    assert!(config.dashboard.enabled);
    assert_eq!(config.dashboard.bind, "0.0.0.0:9000");
    assert_eq!(config.paths.logs_dir, Path::new("/var/log/taskdesk"));
    assert_eq!(config.tasks.list_limit, 50);
    assert!(config.validate().is_ok());
}

#[test]
fn malformed_toml_is_an_error() {
    assert!(Config::from_toml("[access\nsuper_admin_ids = 1").is_err());
    assert!(Config::from_toml("[access]\nsuper_admin_ids = \"abc\"").is_err());
}

#[test]
fn env_overrides_win_over_file_values() {
    let mut config = Config::from_toml("[access]\nsuper_admin_ids = [1]").expect("parse");
    config.apply_overrides(env_from(&[
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("SUPER_ADMIN_ID", "7, 8"),
        ("TASKDESK_DATABASE", "/tmp/other.db"),
        ("TASKDESK_DASHBOARD_BIND", "127.0.0.1:9999"),
        ("TASKDESK_REMINDER_INTERVAL_SECS", "120"),
        ("TASKDESK_UTC_OFFSET_HOURS", "-5"),
    ]));

    assert_eq!(config.require_bot_token().ok(), Some("123:abc"));
    assert_eq!(config.access.super_admin_ids, vec![7, 8]);
    assert!(config.is_super_admin(8));
    assert!(!config.is_super_admin(1));
    assert_eq!(config.database.path, Path::new("/tmp/other.db"));
    assert!(config.dashboard.enabled);
    assert_eq!(config.dashboard.bind, "127.0.0.1:9999");
    assert_eq!(config.reminders.interval_secs, 120);
    assert_eq!(config.reminders.utc_offset_hours, -5);
}

#[test]
fn invalid_env_values_are_ignored() {
    let mut config = Config::from_toml("[access]\nsuper_admin_ids = [1]").expect("parse");
    config.apply_overrides(env_from(&[
        ("SUPER_ADMIN_ID", "one,two"),
        ("TASKDESK_REMINDER_INTERVAL_SECS", "soon"),
        ("TELEGRAM_BOT_TOKEN", ""),
    ]));
    assert_eq!(config.access.super_admin_ids, vec![1]);
    assert_eq!(config.reminders.interval_secs, 3600);
    assert!(config.require_bot_token().is_err());
}

#[test]
fn token_comes_from_the_configured_variable() {
    let mut config = Config::from_toml("[telegram]\nbot_token_env = \"OPS_BOT_TOKEN\"").expect("parse");
    config.apply_overrides(env_from(&[("TELEGRAM_BOT_TOKEN", "wrong"), ("OPS_BOT_TOKEN", "right")]));
    assert_eq!(config.require_bot_token().ok(), Some("right"));

    let missing = Config::default();
    let err = missing.require_bot_token().expect_err("token should be missing");
    assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
}

#[test]
fn validation_rejects_bad_values() {
    let mut zero_interval = Config::default();
    zero_interval.reminders.interval_secs = 0;
    assert!(zero_interval.validate().is_err());

    let mut bad_cron = Config::default();
    bad_cron.reminders.check_cron = Some("every morning".to_owned());
    assert!(bad_cron.validate().is_err());

    let mut far_offset = Config::default();
    far_offset.reminders.utc_offset_hours = 15;
    assert!(far_offset.validate().is_err());

    let mut no_rows = Config::default();
    no_rows.tasks.list_limit = 0;
    assert!(no_rows.validate().is_err());
}

#[test]
fn local_time_follows_the_offset() {
    let mut config = Config::default();
    config.reminders.utc_offset_hours = 3;
    let now = chrono::DateTime::parse_from_rfc3339("2026-03-01T22:30:00Z")
        .expect("time")
        .with_timezone(&chrono::Utc);
    let local = config.reminders.local_naive(now);
    assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2026-03-02 01:30");
}

#[test]
fn config_path_resolution() {
    assert_eq!(config_path_with(env_from(&[])), Path::new("config.toml"));
    assert_eq!(
        config_path_with(env_from(&[("TASKDESK_CONFIG", "/etc/taskdesk.toml")])),
        Path::new("/etc/taskdesk.toml")
    );
}

#[test]
fn missing_file_yields_defaults() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let config = Config::load_from_file(&tmp.path().join("absent.toml")).expect("defaults");
    assert!(config.access.super_admin_ids.is_empty());

    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[tasks]\nlist_limit = 5\n").expect("write config");
    let config = Config::load_from_file(&path).expect("load");
    assert_eq!(config.tasks.list_limit, 5);
}

#[test]
fn id_lists() {
    assert_eq!(parse_id_list(" 1, 2 ,,3 ").expect("ids"), vec![1, 2, 3]);
    assert!(parse_id_list("").expect("empty").is_empty());
    assert!(parse_id_list("1,x").is_err());
}

#[test]
fn debug_output_redacts_the_token() {
    let mut config = Config::default();
    config.apply_overrides(env_from(&[("TELEGRAM_BOT_TOKEN", "123:secret")]));
    let printed = format!("{config:?}");
    assert!(!printed.contains("123:secret"));
    assert!(printed.contains("__REDACTED__"));
}
