//! Safe-mode rewrite of privileged agent flags.

/// Flag granting the agent unrestricted execution.
pub const BYPASS_FLAG: &str = "--dangerously-bypass-approvals-and-sandbox";

/// Replacement selecting a read-only sandbox and a never-ask approval policy.
pub const SAFE_REPLACEMENT: [&str; 4] = ["--sandbox", "read-only", "--ask-for-approval", "never"];

/// Return a copy of `args` with the bypass flag replaced in place when
/// `safe_mode` is on. The input is never modified.
#[must_use]
pub fn apply_safe_mode(args: &[String], safe_mode: bool) -> Vec<String> {
    if !safe_mode {
        return args.to_vec();
    }
    let mut rewritten = Vec::with_capacity(args.len() + SAFE_REPLACEMENT.len());
    for arg in args {
        if arg == BYPASS_FLAG {
            rewritten.extend(SAFE_REPLACEMENT.iter().map(|s| (*s).to_owned()));
        } else {
            rewritten.push(arg.clone());
        }
    }
    rewritten
}
