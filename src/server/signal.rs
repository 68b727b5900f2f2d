use crate::error::{Error, Result};

/// Signals sent to the server's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask the group to exit (SIGTERM)
    Terminate,
    /// Force the group to exit (SIGKILL)
    Kill,
}

impl GroupSignal {
    pub fn name(self) -> &'static str {
        match self {
            GroupSignal::Terminate => "SIGTERM",
            GroupSignal::Kill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn as_raw(self) -> libc::c_int {
        match self {
            GroupSignal::Terminate => libc::SIGTERM,
            GroupSignal::Kill => libc::SIGKILL,
        }
    }
}

/// What happened when a group was signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    /// At least one process in the group received the signal
    Delivered,
    /// No process in the group exists any more
    AlreadyGone,
}

/// Sends `signal` to every process in group `pgid`.
///
/// A group with no remaining members is reported as
/// [`SignalDelivery::AlreadyGone`], not as an error.
///
/// # Errors
///
/// Returns [`Error::Signal`] for any other failure, such as `EPERM`.
#[cfg(unix)]
pub fn signal_group(pgid: u32, signal: GroupSignal) -> Result<SignalDelivery> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|_| Error::Signal(format!("process group id {} out of range", pgid)))?;
    if pgid <= 1 {
        return Err(Error::Signal(format!(
            "refusing to signal process group {}",
            pgid
        )));
    }

    let rc = unsafe { libc::kill(-pgid, signal.as_raw()) };
    if rc == 0 {
        return Ok(SignalDelivery::Delivered);
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(SignalDelivery::AlreadyGone)
    } else {
        Err(Error::Signal(format!(
            "{} to process group {} failed: {}",
            signal.name(),
            pgid,
            err
        )))
    }
}

#[cfg(not(unix))]
pub fn signal_group(pgid: u32, signal: GroupSignal) -> Result<SignalDelivery> {
    Err(Error::Signal(format!(
        "{} to process group {} is only supported on unix",
        signal.name(),
        pgid
    )))
}
