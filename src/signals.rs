//! Termination signal handling.
//!
//! Workers intercept SIGINT, SIGTERM and SIGABRT so the status store shows
//! which signal ended them. The installed handler does nothing but write the
//! signal number into a self-pipe; the store update happens on the worker's
//! runtime, after which the disposition that was active before installation
//! is restored and the signal re-raised.
//!
//! The supervisor side of this module classifies how reaped workers ended.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, raise, sigaction};
use nix::sys::wait::WaitStatus;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::lifecycle::WorkerMonitor;

/// Signals whose arrival is recorded in the status store.
pub const INTERCEPTED_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGABRT];

/// Write end of the self-pipe, read by the signal handler.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn forward_signal(signum: libc::c_int) {
    let fd = WAKE_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let byte = signum as u8;
    // Safety: write(2) is async-signal-safe and `byte` outlives the call.
    unsafe {
        libc::write(fd, (&byte as *const u8).cast(), 1);
    }
}

/// Dispositions that were active before the interceptor was installed.
#[derive(Debug, Default)]
pub struct PreviousHandlers {
    actions: Vec<(Signal, SigAction)>,
}

impl PreviousHandlers {
    /// The disposition `signal` had before installation.
    pub fn get(&self, signal: Signal) -> Option<&SigAction> {
        self.actions
            .iter()
            .find(|(s, _)| *s == signal)
            .map(|(_, action)| action)
    }

    fn record(&mut self, signal: Signal, action: SigAction) {
        self.actions.push((signal, action));
    }
}

struct WakePipe {
    read: OwnedFd,
    write: WakeWriter,
}

/// Write end of the self-pipe. Disarms the handler before the fd is closed,
/// so a late signal never lands in a descriptor that reused the number.
struct WakeWriter(OwnedFd);

impl Drop for WakeWriter {
    fn drop(&mut self) {
        let _ = WAKE_FD.compare_exchange(
            self.0.as_raw_fd(),
            -1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Stamps the worker's record when a termination signal arrives.
pub struct SignalInterceptor {
    monitor: Arc<WorkerMonitor>,
    previous: PreviousHandlers,
    wake: WakePipe,
}

impl SignalInterceptor {
    /// Install handlers for [`INTERCEPTED_SIGNALS`].
    pub fn install(monitor: Arc<WorkerMonitor>) -> Result<Self> {
        Self::install_for(monitor, &INTERCEPTED_SIGNALS)
    }

    /// Install handlers for an explicit set of signals.
    pub fn install_for(monitor: Arc<WorkerMonitor>, signals: &[Signal]) -> Result<Self> {
        let (read, write) = nix::unistd::pipe()?;
        set_nonblocking(read.as_raw_fd())?;
        set_nonblocking(write.as_raw_fd())?;
        WAKE_FD.store(write.as_raw_fd(), Ordering::SeqCst);

        let action = SigAction::new(
            SigHandler::Handler(forward_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        let mut previous = PreviousHandlers::default();
        for &signal in signals {
            // Safety: forward_signal only performs an async-signal-safe write(2).
            let old = unsafe { sigaction(signal, &action) }?;
            previous.record(signal, old);
        }

        Ok(Self {
            monitor,
            previous,
            wake: WakePipe {
                read,
                write: WakeWriter(write),
            },
        })
    }

    pub fn previous(&self) -> &PreviousHandlers {
        &self.previous
    }

    /// Wait for intercepted signals on the current runtime.
    ///
    /// Does not return once a signal has been handled: the process either
    /// dies from the re-raised signal or exits with status 1.
    pub async fn run(self) -> Result<()> {
        let SignalInterceptor {
            monitor,
            previous,
            wake,
        } = self;
        let _write = wake.write;
        let mut receiver = tokio::net::unix::pipe::Receiver::from_owned_fd(wake.read)?;

        let mut buf = [0u8; 1];
        loop {
            receiver.read_exact(&mut buf).await?;
            match Signal::try_from(i32::from(buf[0])) {
                Ok(signal) => intercept(&monitor, &previous, signal),
                Err(e) => warn!(signum = buf[0], error = %e, "Ignoring unknown signal number"),
            }
        }
    }
}

/// Record `signal` in the store, hand it to the previous disposition, and exit.
pub fn intercept(monitor: &WorkerMonitor, previous: &PreviousHandlers, signal: Signal) -> ! {
    match monitor.mark_terminated(signal) {
        Ok(()) => info!(pid = monitor.pid(), signal = %signal, "Worker terminated by signal"),
        Err(e) => error!(pid = monitor.pid(), signal = %signal, error = %e, "Failed to record termination"),
    }

    chain(previous, signal);
    std::process::exit(1)
}

fn chain(previous: &PreviousHandlers, signal: Signal) {
    let Some(action) = previous.get(signal) else {
        return;
    };
    // Safety: reinstates a disposition the process already had before us.
    if let Err(e) = unsafe { sigaction(signal, action) } {
        warn!(signal = %signal, error = %e, "Failed to restore previous signal handler");
        return;
    }
    if let Err(e) = raise(signal) {
        warn!(signal = %signal, error = %e, "Failed to re-raise signal");
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // Safety: fd is an open descriptor owned by the caller.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // Safety: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Human-readable name for a signal number, e.g. `SIGTERM (15)`.
pub fn describe_signal(signum: i32) -> String {
    match Signal::try_from(signum) {
        Ok(signal) => format!("{} ({})", signal, signum),
        Err(_) => format!("signal {}", signum),
    }
}

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled(Signal),
    /// Process is still running.
    StillAlive,
    /// Unknown termination reason.
    Unknown,
}

impl TerminationReason {
    /// Whether the worker left voluntarily with status 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {}", code),
            Self::Signaled(sig) => write!(f, "killed by {}", describe_signal(*sig as i32)),
            Self::StillAlive => write!(f, "still running"),
            Self::Unknown => write!(f, "unknown reason"),
        }
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, _) => TerminationReason::Signaled(signal),
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StatusStore;
    use nix::unistd::Pid;
    use serial_test::serial;
    use std::time::UNIX_EPOCH;
    use tempfile::tempdir;

    #[test]
    fn test_describe_signal() {
        assert_eq!(describe_signal(15), "SIGTERM (15)");
        assert_eq!(describe_signal(6), "SIGABRT (6)");
        assert_eq!(describe_signal(9999), "signal 9999");
    }

    #[test]
    fn test_analyze_wait_status() {
        let status = WaitStatus::Exited(Pid::from_raw(1), 0);
        assert_eq!(analyze_wait_status(status), TerminationReason::Exited(0));
        assert!(analyze_wait_status(status).is_success());

        let status = WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGTERM, false);
        assert_eq!(
            analyze_wait_status(status),
            TerminationReason::Signaled(Signal::SIGTERM)
        );

        assert_eq!(
            analyze_wait_status(WaitStatus::StillAlive),
            TerminationReason::StillAlive
        );
    }

    #[test]
    fn test_termination_reason_display() {
        assert_eq!(TerminationReason::Exited(1).to_string(), "exited with code 1");
        assert_eq!(
            TerminationReason::Signaled(Signal::SIGINT).to_string(),
            "killed by SIGINT (2)"
        );
    }

    #[test]
    fn test_previous_handlers_lookup() {
        let mut previous = PreviousHandlers::default();
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        previous.record(Signal::SIGTERM, ignore);

        assert_eq!(
            previous.get(Signal::SIGTERM).map(|a| a.handler()),
            Some(SigHandler::SigIgn)
        );
        assert!(previous.get(Signal::SIGINT).is_none());
    }

    #[test]
    #[serial(wake_fd)]
    fn test_install_forwards_signal_and_keeps_previous() {
        let tmp = tempdir().unwrap();
        let store = StatusStore::open_or_reset(tmp.path().join("s.json"), UNIX_EPOCH).unwrap();
        let monitor = Arc::new(WorkerMonitor::register(store, 4242).unwrap());

        // SIGUSR2 is untouched by the test harness, so its previous disposition is the default.
        let interceptor = SignalInterceptor::install_for(monitor, &[Signal::SIGUSR2]).unwrap();
        let previous = *interceptor.previous().get(Signal::SIGUSR2).unwrap();
        assert_eq!(previous.handler(), SigHandler::SigDfl);

        raise(Signal::SIGUSR2).unwrap();

        let mut byte = [0u8; 1];
        let mut pipe = std::fs::File::from(interceptor.wake.read.try_clone().unwrap());
        std::io::Read::read_exact(&mut pipe, &mut byte).unwrap();
        assert_eq!(i32::from(byte[0]), Signal::SIGUSR2 as i32);

        // Safety: restores the default disposition captured above.
        unsafe { sigaction(Signal::SIGUSR2, &previous) }.unwrap();
    }

    #[test]
    #[serial(wake_fd)]
    fn test_dropping_interceptor_disarms_handler() {
        let tmp = tempdir().unwrap();
        let store = StatusStore::open_or_reset(tmp.path().join("s.json"), UNIX_EPOCH).unwrap();
        let monitor = Arc::new(WorkerMonitor::register(store, 4243).unwrap());

        let interceptor = SignalInterceptor::install_for(monitor, &[Signal::SIGUSR2]).unwrap();
        let previous = *interceptor.previous().get(Signal::SIGUSR2).unwrap();
        assert!(WAKE_FD.load(Ordering::SeqCst) >= 0);

        drop(interceptor);
        assert_eq!(WAKE_FD.load(Ordering::SeqCst), -1);

        // The handler is still installed but now has nowhere to write.
        raise(Signal::SIGUSR2).unwrap();

        // Safety: restores the default disposition captured above.
        unsafe { sigaction(Signal::SIGUSR2, &previous) }.unwrap();
    }
}
