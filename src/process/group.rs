//! Platform capability for starting and signalling a whole process tree.
//!
//! Launch logic only talks to [`ProcessTree`]. On POSIX systems the child is
//! made the leader of a fresh process group so a signal reaches every
//! descendant that stayed in the group. Elsewhere the fallback can only
//! signal the direct child.

use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use tokio::process::{Child, Command};

/// Strength of a termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask the tree to exit (`SIGTERM`).
    Graceful,
    /// Kill the tree outright (`SIGKILL`).
    Forceful,
}

/// Start a child detached into its own group and signal that group.
pub trait ProcessTree: Send + Sync + Debug {
    /// Spawn `command` so that the whole tree can later be signalled.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the process cannot be started.
    fn spawn(&self, command: &mut Command) -> io::Result<Child>;

    /// Deliver `signal` to the tree rooted at `pid`.
    ///
    /// A tree that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns the OS error for any other delivery failure.
    fn signal_group(&self, child: &mut Child, pid: u32, signal: GroupSignal) -> io::Result<()>;

    /// Short implementation name for logs.
    fn name(&self) -> &'static str;
}

/// POSIX process-group implementation backed by `killpg(2)`.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixProcessGroup;

#[cfg(unix)]
impl ProcessTree for PosixProcessGroup {
    fn spawn(&self, command: &mut Command) -> io::Result<Child> {
        command.process_group(0);
        command.spawn()
    }

    fn signal_group(&self, _child: &mut Child, pid: u32, signal: GroupSignal) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        if raw <= 0 {
            return Ok(());
        }
        let sig = match signal {
            GroupSignal::Graceful => Signal::SIGTERM,
            GroupSignal::Forceful => Signal::SIGKILL,
        };
        match killpg(Pid::from_raw(raw), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    fn name(&self) -> &'static str {
        "posix-process-group"
    }
}

/// Fallback that can only reach the direct child.
///
/// Both signal strengths map to a kill, since there is no portable graceful
/// request outside POSIX.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectChild;

impl ProcessTree for DirectChild {
    fn spawn(&self, command: &mut Command) -> io::Result<Child> {
        command.spawn()
    }

    fn signal_group(&self, child: &mut Child, _pid: u32, _signal: GroupSignal) -> io::Result<()> {
        match child.start_kill() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn name(&self) -> &'static str {
        "direct-child"
    }
}

/// Best available implementation for the current platform.
#[must_use]
pub fn platform_tree() -> Arc<dyn ProcessTree> {
    #[cfg(unix)]
    {
        Arc::new(PosixProcessGroup)
    }
    #[cfg(not(unix))]
    {
        Arc::new(DirectChild)
    }
}
