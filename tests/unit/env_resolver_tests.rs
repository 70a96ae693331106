use codex_subagent::config::EnvConfig;
use codex_subagent::environment::{merge, preflight, EnvMap, EnvResolver};
use codex_subagent::AppError;

fn base(pairs: &[(&str, &str)]) -> EnvMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn no_shell() -> EnvConfig {
    EnvConfig {
        source_shell_env: false,
        ..EnvConfig::default()
    }
}

// ── merge / preflight ────────────────────────────────────────

#[test]
fn merge_fills_only_missing_keys_by_default() {
    let mut target = base(&[("A", "base"), ("PATH", "/usr/bin")]);
    merge(
        &mut target,
        base(&[("A", "new"), ("B", "new"), ("PATH", "/opt/bin")]),
        false,
        Some("PATH"),
    );
    assert_eq!(target["A"], "base");
    assert_eq!(target["B"], "new");
    assert_eq!(target["PATH"], "/opt/bin");
}

#[test]
fn merge_override_replaces_everything() {
    let mut target = base(&[("A", "base")]);
    merge(&mut target, base(&[("A", "new")]), true, None);
    assert_eq!(target["A"], "new");
}

#[test]
fn preflight_reports_sorted_missing_and_empty_names() {
    let vars = base(&[("PRESENT", "x"), ("EMPTY", "")]);
    let required = vec![
        "ZED".to_owned(),
        "PRESENT".to_owned(),
        "EMPTY".to_owned(),
        " ".to_owned(),
        "ZED".to_owned(),
    ];
    let err = preflight(&vars, &required, Some("shell broke".into())).expect_err("must fail");
    match err {
        AppError::MissingRequiredEnv {
            missing,
            shell_warning,
        } => {
            assert_eq!(missing, vec!["EMPTY".to_owned(), "ZED".to_owned()]);
            assert_eq!(shell_warning.as_deref(), Some("shell broke"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(preflight(&vars, &["PRESENT".to_owned()], None).is_ok());
}

// ── resolver layering ────────────────────────────────────────

#[tokio::test]
async fn dotenv_layer_fills_gaps_without_overriding() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(".env"), "API_KEY=from-file\nSHARED=file\n").expect("write");

    let resolver = EnvResolver::new(EnvConfig {
        load_dotenv: true,
        ..no_shell()
    });
    let env = resolver
        .resolve_from(base(&[("SHARED", "process")]), dir.path())
        .await
        .expect("resolve");
    assert_eq!(env.get("API_KEY"), Some("from-file"));
    assert_eq!(env.get("SHARED"), Some("process"));
}

#[tokio::test]
async fn dotenv_override_wins_when_enabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(".env"), "SHARED=file\n").expect("write");

    let resolver = EnvResolver::new(EnvConfig {
        load_dotenv: true,
        dotenv_override: true,
        ..no_shell()
    });
    let env = resolver
        .resolve_from(base(&[("SHARED", "process")]), dir.path())
        .await
        .expect("resolve");
    assert_eq!(env.get("SHARED"), Some("file"));
}

#[tokio::test]
async fn dotenv_is_ignored_when_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(".env"), "API_KEY=from-file\n").expect("write");

    let resolver = EnvResolver::new(no_shell());
    let env = resolver
        .resolve_from(EnvMap::new(), dir.path())
        .await
        .expect("resolve");
    assert_eq!(env.get("API_KEY"), None);
}

#[tokio::test]
async fn required_vars_fail_before_anything_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resolver = EnvResolver::new(EnvConfig {
        required_vars: vec!["OPENAI_API_KEY".into()],
        ..no_shell()
    });
    let err = resolver
        .resolve_from(EnvMap::new(), dir.path())
        .await
        .expect_err("missing var");
    assert!(err.is_preflight());
    let text = err.to_string();
    assert!(text.contains("OPENAI_API_KEY"));
    assert!(text.contains("CODEX_SUBAGENT_SOURCE_SHELL_ENV=1"));
    assert!(text.contains("CODEX_SUBAGENT_LOAD_DOTENV=1"));
}

#[cfg(unix)]
#[tokio::test]
async fn shell_layer_recovers_rc_variables_and_refreshes_path() {
    let home = tempfile::tempdir().expect("tempdir");
    let rc = home.path().join("agent.rc");
    std::fs::write(
        &rc,
        "FROM_RC=hello\nSHARED=rc\nPATH=/custom/bin:$PATH\n",
    )
    .expect("write rc");

    let home_dir = home.path().to_string_lossy().into_owned();
    let process_path = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".into());
    let resolver = EnvResolver::new(EnvConfig {
        source_shell_env: true,
        shell: Some("/bin/sh".into()),
        shell_rc_files: Some(vec![rc.to_string_lossy().into_owned()]),
        ..EnvConfig::default()
    });
    let env = resolver
        .resolve_from(
            base(&[
                ("HOME", home_dir.as_str()),
                ("PATH", process_path.as_str()),
                ("SHARED", "process"),
            ]),
            home.path(),
        )
        .await
        .expect("resolve");

    assert!(env.warnings.is_empty(), "warnings: {:?}", env.warnings);
    assert_eq!(env.get("FROM_RC"), Some("hello"));
    assert_eq!(env.get("SHARED"), Some("process"));
    assert!(env
        .get("PATH")
        .is_some_and(|path| path.starts_with("/custom/bin:")));
}

#[cfg(unix)]
#[tokio::test]
async fn shell_failure_is_a_warning_unless_vars_are_missing() {
    let home = tempfile::tempdir().expect("tempdir");
    let rc = home.path().join("broken.rc");
    std::fs::write(&rc, "exit 7\n").expect("write rc");

    let config = EnvConfig {
        source_shell_env: true,
        shell: Some("/bin/sh".into()),
        shell_rc_files: Some(vec![rc.to_string_lossy().into_owned()]),
        ..EnvConfig::default()
    };
    let home_dir = home.path().to_string_lossy().into_owned();
    let start = base(&[
        ("HOME", home_dir.as_str()),
        ("PATH", "/usr/bin:/bin"),
        ("KEEP", "me"),
    ]);

    let env = EnvResolver::new(config.clone())
        .resolve_from(start.clone(), home.path())
        .await
        .expect("warnings only");
    assert_eq!(env.get("KEEP"), Some("me"));
    assert_eq!(env.warnings.len(), 1);

    let err = EnvResolver::new(EnvConfig {
        required_vars: vec!["OPENAI_API_KEY".into()],
        ..config
    })
    .resolve_from(start, home.path())
    .await
    .expect_err("missing var");
    match err {
        AppError::MissingRequiredEnv { shell_warning, .. } => {
            assert!(shell_warning.is_some_and(|w| w.contains("non-zero")));
        }
        other => panic!("unexpected error: {other}"),
    }
}
