//! Best-effort recovery of variables from the user's shell startup files.
//!
//! Some launchers hand us a sanitized environment. To recover what the user
//! would see in a terminal, a login shell sources the configured rc files with
//! `set -a` and prints its environment NUL-delimited. The result is cached
//! until any rc file's modification time changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::cache::StampedCache;
use crate::{AppError, Result};

/// Startup files sourced when none are configured, relative to `$HOME`.
pub const DEFAULT_RC_FILES: &[&str] = &[
    ".zshrc",
    ".zprofile",
    ".bashrc",
    ".bash_profile",
    ".profile",
];

/// Shells tried in order when no explicit or `$SHELL` choice is usable.
const FALLBACK_SHELLS: &[&str] = &["zsh", "bash", "sh"];

/// Observed state of one rc file, part of the cache stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcStamp {
    /// File exists with this modification time.
    Modified(SystemTime),
    /// File does not exist.
    Missing,
    /// File exists but its metadata could not be read.
    Unreadable,
}

type ShellStamp = Vec<(PathBuf, RcStamp)>;

/// Inputs for one sourcing attempt.
#[derive(Debug, Clone)]
pub struct ShellSourceRequest<'a> {
    /// Environment the shell itself runs with.
    pub env: &'a HashMap<String, String>,
    /// Explicit shell override.
    pub shell: Option<&'a str>,
    /// Configured rc files; `None` selects [`DEFAULT_RC_FILES`].
    pub rc_files: Option<&'a [String]>,
    /// Bound on the shell run.
    pub timeout: Duration,
}

/// Shell environment loader with an rc-file-stamp cache.
#[derive(Debug, Default)]
pub struct ShellEnvLoader {
    cache: StampedCache<(), ShellStamp, HashMap<String, String>>,
}

impl ShellEnvLoader {
    /// Loader with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source the rc files and return every variable the shell exported.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ShellSourcing` with remediation guidance when no
    /// shell is found, the shell cannot start, exits non-zero, or exceeds
    /// the timeout.
    pub async fn load(&self, request: &ShellSourceRequest<'_>) -> Result<HashMap<String, String>> {
        let shell = resolve_shell(request.env, request.shell).ok_or_else(|| {
            AppError::ShellSourcing(
                "Unable to find a usable shell (tried the configured shell, $SHELL, zsh, bash, sh).\n\
                 Fix: set CODEX_SUBAGENT_SHELL to an absolute shell path, or set \
                 CODEX_SUBAGENT_SOURCE_SHELL_ENV=0 to disable shell sourcing."
                    .into(),
            )
        })?;

        let files = rc_files(request.env, request.rc_files);
        let stamp = stamp_files(&files);
        if let Some(vars) = self.cache.get(&(), &stamp) {
            debug!(count = vars.len(), "shell environment served from cache");
            return Ok(vars);
        }

        let script = sourcing_script(&files);
        let mut cmd = Command::new(&shell);
        cmd.arg("-lc")
            .arg(&script)
            .env_clear()
            .envs(request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|err| {
            AppError::ShellSourcing(format!(
                "Failed to start shell {} to source rc files: {err}",
                shell.display()
            ))
        })?;

        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(AppError::ShellSourcing(format!(
                    "Failed to read shell environment from {}: {err}",
                    shell.display()
                )));
            }
            Err(_elapsed) => {
                return Err(AppError::ShellSourcing(format!(
                    "Timed out after {:.1}s while sourcing shell rc files.\n\
                     Fix: set CODEX_SUBAGENT_SOURCE_SHELL_ENV=0 to disable, or increase \
                     CODEX_SUBAGENT_SHELL_ENV_TIMEOUT_SECONDS.",
                    request.timeout.as_secs_f64()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ShellSourcing(format!(
                "Shell exited with a non-zero status while sourcing rc files.\n\
                 Shell: {}\nExit Code: {}\nStderr: {}\n\
                 Fix: repair the failing rc file or set CODEX_SUBAGENT_SOURCE_SHELL_ENV=0.",
                shell.display(),
                output.status.code().unwrap_or(-1),
                crate::errors::preview(&stderr)
            )));
        }

        let vars = parse_nul_env(&output.stdout);
        info!(
            shell = %shell.display(),
            files = files.len(),
            count = vars.len(),
            "shell environment sourced"
        );
        self.cache.insert((), stamp, vars.clone());
        Ok(vars)
    }
}

/// Pick a shell: explicit override, then `$SHELL`, then common shells on `PATH`.
#[must_use]
pub fn resolve_shell(env: &HashMap<String, String>, explicit: Option<&str>) -> Option<PathBuf> {
    let path_var = env.get("PATH").map(String::as_str);
    let preferred = explicit
        .filter(|s| !s.trim().is_empty())
        .or_else(|| env.get("SHELL").map(String::as_str).filter(|s| !s.is_empty()));

    if let Some(candidate) = preferred {
        let as_path = Path::new(candidate);
        if as_path.is_absolute() {
            if as_path.exists() {
                return Some(as_path.to_path_buf());
            }
        } else if let Some(found) = find_on_path(candidate, path_var) {
            return Some(found);
        }
        debug!(shell = candidate, "preferred shell is not usable");
    }

    FALLBACK_SHELLS
        .iter()
        .find_map(|name| find_on_path(name, path_var))
}

fn find_on_path(name: &str, path_var: Option<&str>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(name, path_var, cwd).ok()
}

/// Rc files to source. Relative entries are anchored at `$HOME`, and a
/// leading `~/` expands to `$HOME`.
#[must_use]
pub fn rc_files(env: &HashMap<String, String>, configured: Option<&[String]>) -> Vec<PathBuf> {
    let home = env.get("HOME").filter(|h| !h.is_empty()).map(PathBuf::from);

    let Some(configured) = configured else {
        return home.map_or_else(Vec::new, |home| {
            DEFAULT_RC_FILES.iter().map(|name| home.join(name)).collect()
        });
    };

    configured
        .iter()
        .filter_map(|item| {
            let expanded = match (item.strip_prefix("~/"), &home) {
                (Some(rest), Some(home)) => home.join(rest),
                _ => PathBuf::from(item),
            };
            if expanded.is_absolute() {
                Some(expanded)
            } else if let Some(home) = &home {
                Some(home.join(expanded))
            } else {
                warn!(file = item, "skipping relative rc file without HOME");
                None
            }
        })
        .collect()
}

fn stamp_files(files: &[PathBuf]) -> ShellStamp {
    files
        .iter()
        .map(|path| {
            let stamp = match std::fs::metadata(path) {
                Ok(meta) => meta.modified().map_or(RcStamp::Unreadable, RcStamp::Modified),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => RcStamp::Missing,
                Err(_) => RcStamp::Unreadable,
            };
            (path.clone(), stamp)
        })
        .collect()
}

/// Script that exports everything the rc files set, then dumps the env.
#[must_use]
pub fn sourcing_script(files: &[PathBuf]) -> String {
    let quoted = files
        .iter()
        .map(|path| shell_words::quote(&path.to_string_lossy()).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    format!("set -a; for f in {quoted}; do [ -f \"$f\" ] && . \"$f\"; done; env -0")
}

/// Parse `env -0` output. Chunks without `=` or with an empty key are skipped.
#[must_use]
pub fn parse_nul_env(raw: &[u8]) -> HashMap<String, String> {
    raw.split(|byte| *byte == 0)
        .filter_map(|chunk| {
            let text = String::from_utf8_lossy(chunk);
            let (key, value) = text.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}
