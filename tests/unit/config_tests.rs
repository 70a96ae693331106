use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use codex_subagent::config::{
    is_falsy, is_truthy, split_csv, ApprovalPolicy, GlobalConfig, DEFAULT_TIMEOUT_SECONDS,
};
use codex_subagent::models::model::ModelTier;
use codex_subagent::AppError;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_match_documented_values() {
    let config = GlobalConfig::default();
    assert_eq!(config.agent.executable, "codex");
    assert_eq!(config.agent.subcommand, "exec");
    assert_eq!(config.agent.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    assert_eq!(config.agent.approval, ApprovalPolicy::FullAuto);
    assert!(!config.agent.safe_mode);
    assert!(!config.env.load_dotenv);
    assert!(config.env.source_shell_env);
    assert_eq!(config.env.shell_env_timeout_ms, 5_000);
    assert_eq!(config.extract.tags, vec!["codex".to_owned()]);
    assert_eq!(config.extract.limit, Some(1));
    assert_eq!(config.default_timeout(), Duration::from_secs(8 * 60 * 60));
}

#[test]
fn parses_partial_toml() {
    let config = GlobalConfig::from_toml_str(
        r#"
[agent]
executable = "/opt/bin/codex"
model = "gpt-5 high"
approval = "bypass"
safe_mode = true

[env]
required_vars = ["OPENAI_API_KEY"]

[extract]
tags = ["codex", "exec"]
"#,
    )
    .expect("valid config");

    assert_eq!(config.agent.executable, "/opt/bin/codex");
    assert_eq!(config.agent.approval, ApprovalPolicy::Bypass);
    assert!(config.agent.safe_mode);
    assert_eq!(config.default_model(), Some(ModelTier::High));
    assert_eq!(config.env.required_vars, vec!["OPENAI_API_KEY".to_owned()]);
    assert_eq!(config.extract.tags.len(), 2);
    assert_eq!(config.agent.subcommand, "exec");
}

#[test]
fn rejects_zero_timeout() {
    let err = GlobalConfig::from_toml_str("[agent]\ntimeout_seconds = 0\n")
        .expect_err("zero timeout must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_malformed_toml() {
    let err = GlobalConfig::from_toml_str("[agent\nexecutable = 1").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn env_overrides_apply() {
    let mut config = GlobalConfig::default();
    config.apply_env_overrides(lookup(&[
        ("CODEX_SUBAGENT_LOAD_DOTENV", "yes"),
        ("CODEX_SUBAGENT_DOTENV_PATH", "config/.env.local"),
        ("CODEX_SUBAGENT_SOURCE_SHELL_ENV", "0"),
        ("CODEX_SUBAGENT_SHELL", "/bin/bash"),
        ("CODEX_SUBAGENT_SHELL_RC_FILES", " ~/.zshrc , ,.profile"),
        ("CODEX_SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS", "2.5"),
        ("CODEX_SUBAGENT_REQUIRED_ENV_VARS", "OPENAI_API_KEY, GITHUB_TOKEN"),
        ("CODEX_SUBAGENT_AGENT_TIMEOUT_SECONDS", "90"),
        ("CODEX_SUBAGENT_SAFE_MODE", "true"),
        ("CODEX_SUBAGENT_YOLO", "1"),
        ("CODEX_SUBAGENT_MODEL", "gpt-5 low"),
        ("CODEX_SUBAGENT_SESSIONS_PATH", "/tmp/sessions.json"),
    ]));

    assert!(config.env.load_dotenv);
    assert_eq!(config.env.dotenv_path, "config/.env.local");
    assert!(!config.env.source_shell_env);
    assert_eq!(config.env.shell.as_deref(), Some("/bin/bash"));
    assert_eq!(
        config.env.shell_rc_files,
        Some(vec!["~/.zshrc".to_owned(), ".profile".to_owned()])
    );
    assert_eq!(config.env.shell_env_timeout_ms, 2_500);
    assert_eq!(
        config.env.required_vars,
        vec!["OPENAI_API_KEY".to_owned(), "GITHUB_TOKEN".to_owned()]
    );
    assert_eq!(config.agent.timeout_seconds, 90);
    assert!(config.agent.safe_mode);
    assert_eq!(config.agent.approval, ApprovalPolicy::Bypass);
    assert_eq!(config.default_model(), Some(ModelTier::Low));
    assert_eq!(config.sessions.path, PathBuf::from("/tmp/sessions.json"));
}

#[test]
fn shell_sourcing_stays_on_unless_explicitly_falsy() {
    let mut config = GlobalConfig::default();
    config.apply_env_overrides(lookup(&[("CODEX_SUBAGENT_SOURCE_SHELL_ENV", "maybe")]));
    assert!(config.env.source_shell_env);
}

#[test]
fn malformed_and_tiny_numbers_are_handled() {
    let mut config = GlobalConfig::default();
    config.apply_env_overrides(lookup(&[
        ("CODEX_SUBAGENT_AGENT_TIMEOUT_SECONDS", "soon"),
        ("CODEX_SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS", "0"),
    ]));
    assert_eq!(config.agent.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    assert_eq!(config.env.shell_env_timeout_ms, 100);

    config.apply_env_overrides(lookup(&[("CODEX_SUBAGENT_AGENT_TIMEOUT_SECONDS", "0.2")]));
    assert_eq!(config.agent.timeout_seconds, 1);
}

#[test]
fn token_helpers() {
    for token in ["1", "true", "YES", " on "] {
        assert!(is_truthy(token), "{token} should be truthy");
    }
    for token in ["0", "False", "no", "off"] {
        assert!(is_falsy(token), "{token} should be falsy");
    }
    assert!(!is_truthy("maybe"));
    assert!(!is_falsy("maybe"));
    assert_eq!(split_csv("a, b,,c ,"), vec!["a", "b", "c"]);
    assert!(split_csv(" , ").is_empty());
}

#[test]
fn load_reads_file_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[agent]\ntimeout_seconds = 42\n").expect("write config");
    let config = GlobalConfig::load_from_path(&path).expect("load config");
    assert_eq!(config.agent.timeout_seconds, 42);

    let missing = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(AppError::Config(_))));
}
