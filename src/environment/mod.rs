//! Child environment assembly.
//!
//! The environment handed to an agent is layered:
//!
//! 1. a copy of the base (current process) environment,
//! 2. an optional dotenv file from the working directory,
//! 3. an optional shell-rc sourcing pass that recovers variables a
//!    sanitized launcher stripped.
//!
//! After layering, the pre-flight check fails fast when any required
//! variable is missing or empty, before any child process is launched.

pub mod cache;
pub mod dotenv;
pub mod shell;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};

use crate::config::EnvConfig;
use crate::{AppError, Result};

use self::dotenv::DotenvLoader;
use self::shell::{ShellEnvLoader, ShellSourceRequest};

/// Environment mapping handed to a child process.
pub type EnvMap = HashMap<String, String>;

/// Outcome of environment resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnv {
    /// Final variable mapping.
    pub vars: EnvMap,
    /// Non-fatal problems encountered while layering sources.
    pub warnings: Vec<String>,
}

impl ResolvedEnv {
    /// Look up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Layered environment resolver with process-lifetime caches.
#[derive(Debug)]
pub struct EnvResolver {
    config: EnvConfig,
    dotenv: DotenvLoader,
    shell: ShellEnvLoader,
}

impl EnvResolver {
    /// Resolver for the given settings.
    #[must_use]
    pub fn new(config: EnvConfig) -> Self {
        Self {
            config,
            dotenv: DotenvLoader::new(),
            shell: ShellEnvLoader::new(),
        }
    }

    /// Settings this resolver was built with.
    #[must_use]
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Resolve the child environment for `work_dir` from the current process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MissingRequiredEnv` when the pre-flight check fails.
    pub async fn resolve(&self, work_dir: &Path) -> Result<ResolvedEnv> {
        let base: EnvMap = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        self.resolve_from(base, work_dir).await
    }

    /// Resolve the child environment starting from an explicit `base`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MissingRequiredEnv` when the pre-flight check fails.
    pub async fn resolve_from(&self, base: EnvMap, work_dir: &Path) -> Result<ResolvedEnv> {
        let span = info_span!("resolve_env", work_dir = %work_dir.display());
        self.layer(base, work_dir).instrument(span).await
    }

    async fn layer(&self, base: EnvMap, work_dir: &Path) -> Result<ResolvedEnv> {
        let mut resolved = ResolvedEnv {
            vars: base,
            warnings: Vec::new(),
        };

        if self.config.load_dotenv {
            let path = work_dir.join(&self.config.dotenv_path);
            let dotenv = self.dotenv.load(&path);
            debug!(path = %path.display(), count = dotenv.len(), "applying dotenv layer");
            merge(&mut resolved.vars, dotenv, self.config.dotenv_override, None);
        }

        let mut shell_warning = None;
        if self.config.source_shell_env {
            let request = ShellSourceRequest {
                env: &resolved.vars,
                shell: self.config.shell.as_deref(),
                rc_files: self.config.shell_rc_files.as_deref(),
                timeout: Duration::from_millis(self.config.shell_env_timeout_ms),
            };
            let loaded = self.shell.load(&request).await;
            match loaded {
                Ok(shell_vars) => merge(
                    &mut resolved.vars,
                    shell_vars,
                    self.config.shell_env_override,
                    Some("PATH"),
                ),
                Err(err) => {
                    let message = err.to_string();
                    warn!(error = %message, "shell environment sourcing failed; continuing with base environment");
                    resolved.warnings.push(message.clone());
                    shell_warning = Some(message);
                }
            }
        }

        preflight(&resolved.vars, &self.config.required_vars, shell_warning)?;
        Ok(resolved)
    }
}

/// Layer `incoming` onto `target`.
///
/// Without `override_all`, only absent keys are filled; `always_refresh`
/// names a key that is replaced regardless.
pub fn merge(
    target: &mut EnvMap,
    incoming: EnvMap,
    override_all: bool,
    always_refresh: Option<&str>,
) {
    for (key, value) in incoming {
        if override_all || always_refresh == Some(key.as_str()) {
            target.insert(key, value);
        } else {
            target.entry(key).or_insert(value);
        }
    }
}

/// Fail when any `required` name is absent or empty in `vars`.
///
/// # Errors
///
/// Returns `AppError::MissingRequiredEnv` listing the sorted missing names.
pub fn preflight(vars: &EnvMap, required: &[String], shell_warning: Option<String>) -> Result<()> {
    let mut missing: Vec<String> = required
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| vars.get(*name).is_none_or(String::is_empty))
        .map(str::to_owned)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort();
    missing.dedup();
    Err(AppError::MissingRequiredEnv {
        missing,
        shell_warning,
    })
}
