//! Review-mode prompt construction.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::run::AgentRunRequest;
use crate::{AppError, Result};

/// Which changes a review covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewScope {
    /// Changes staged in the index.
    Staged,
    /// Working-tree changes not yet staged.
    Unstaged,
    /// Every uncommitted change.
    All,
    /// One commit, named by the target.
    Commit,
    /// Specific files, listed in the target.
    Files,
}

impl FromStr for ReviewScope {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "staged" => Ok(Self::Staged),
            "unstaged" => Ok(Self::Unstaged),
            "all" => Ok(Self::All),
            "commit" => Ok(Self::Commit),
            "files" => Ok(Self::Files),
            other => Err(AppError::InvalidRequest(format!(
                "unknown review scope '{other}' (expected staged, unstaged, all, commit, or files)"
            ))),
        }
    }
}

impl Display for ReviewScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Staged => "staged",
            Self::Unstaged => "unstaged",
            Self::All => "all",
            Self::Commit => "commit",
            Self::Files => "files",
        })
    }
}

/// Parameters for a review run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    /// Which changes to review.
    pub scope: ReviewScope,
    /// Commit or file list for scopes that need one.
    pub target: String,
    /// Extra reviewer instructions.
    pub prompt: String,
    /// Repository directory.
    pub work_dir: PathBuf,
    /// Optional model tier name.
    pub model: Option<String>,
    /// Optional timeout override.
    pub timeout: Option<Duration>,
    /// Existing session to continue.
    pub session_id: Option<String>,
}

impl ReviewRequest {
    /// Compose the reviewer instruction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRequest` when a scope needing a target has
    /// none.
    pub fn instruction(&self) -> Result<String> {
        let target = self.target.trim();
        if matches!(self.scope, ReviewScope::Commit | ReviewScope::Files) && target.is_empty() {
            return Err(AppError::InvalidRequest(format!(
                "review scope '{}' requires a target",
                self.scope
            )));
        }

        let subject = match self.scope {
            ReviewScope::Staged => "Review the staged changes (`git diff --cached`).".to_owned(),
            ReviewScope::Unstaged => {
                "Review the unstaged working-tree changes (`git diff`).".to_owned()
            }
            ReviewScope::All => "Review all uncommitted changes (`git diff HEAD`).".to_owned(),
            ReviewScope::Commit => {
                format!("Review the changes introduced by commit {target} (`git show {target}`).")
            }
            ReviewScope::Files => format!("Review the following files: {target}."),
        };

        let mut lines = vec![
            subject,
            "Report bugs, risky changes, and concrete improvements. Do not modify any files."
                .to_owned(),
        ];
        if !self.prompt.trim().is_empty() {
            lines.push(format!("Additional instructions: {}", self.prompt.trim()));
        }
        Ok(lines.join("\n"))
    }

    /// Convert into a block-mode run request.
    ///
    /// # Errors
    ///
    /// Propagates [`instruction`](Self::instruction) failures.
    pub fn into_run_request(self) -> Result<AgentRunRequest> {
        let prompt = self.instruction()?;
        Ok(AgentRunRequest {
            prompt,
            work_dir: self.work_dir,
            model: self.model,
            timeout: self.timeout,
            session_id: self.session_id,
        })
    }
}
