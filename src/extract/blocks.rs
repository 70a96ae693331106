//! `[timestamp] tag` block parsing.
//!
//! A block header is a full line of the form
//! `[YYYY-MM-DDTHH:MM:SS] free text tag`. The body runs from the end of the
//! header line up to the next header line or the end of the text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::errors::preview;
use crate::models::block::CapturedBlock;
use crate::{AppError, Result};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\[(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\][ \t]+([^\r\n]*)(?:\r?\n|\z)",
    )
    .unwrap_or_else(|err| unreachable!("block header pattern is valid: {err}"))
});

/// Case-insensitive set of accepted block tags. Empty accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    tags: HashSet<String>,
}

impl TagFilter {
    /// Filter accepting every tag.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter accepting only the given tags.
    #[must_use]
    pub fn of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Whether `tag` passes the filter.
    #[must_use]
    pub fn accepts(&self, tag: &str) -> bool {
        self.tags.is_empty() || self.tags.contains(&tag.trim().to_lowercase())
    }
}

/// Extract accepted blocks in source order.
///
/// With `limit = Some(n)`, only the last `n` accepted blocks are kept, still
/// in source order.
#[must_use]
pub fn extract_blocks(text: &str, filter: &TagFilter, limit: Option<usize>) -> Vec<CapturedBlock> {
    let headers: Vec<_> = HEADER.captures_iter(text).collect();
    let mut blocks = Vec::with_capacity(headers.len());

    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(timestamp), Some(tag)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let body_end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |next| next.start());
        let tag = tag.as_str().trim();
        if !filter.accepts(tag) {
            continue;
        }
        blocks.push(CapturedBlock::new(
            timestamp.as_str(),
            tag,
            &text[whole.end()..body_end],
        ));
    }

    if let Some(n) = limit {
        let skip = blocks.len().saturating_sub(n);
        blocks.drain(..skip);
    }
    blocks
}

/// Classify a finished run and extract its blocks.
///
/// # Errors
///
/// - `AppError::NonZeroExit` carrying the captured text when `exit_code != 0`.
/// - `AppError::NoMatch` with a bounded preview when no block is accepted.
pub fn parse_captured(
    command: &str,
    work_dir: &Path,
    exit_code: i32,
    captured: &str,
    filter: &TagFilter,
    limit: Option<usize>,
) -> Result<Vec<CapturedBlock>> {
    if exit_code != 0 {
        return Err(AppError::NonZeroExit {
            command: command.to_owned(),
            work_dir: work_dir.to_path_buf(),
            exit_code,
            stdout: captured.to_owned(),
            stderr: String::new(),
            hint: None,
        });
    }

    let blocks = extract_blocks(captured, filter, limit);
    if blocks.is_empty() {
        return Err(AppError::NoMatch {
            command: command.to_owned(),
            preview: preview(captured),
        });
    }
    debug!(count = blocks.len(), "extracted output blocks");
    Ok(blocks)
}
