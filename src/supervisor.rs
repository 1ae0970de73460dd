//! Pre-fork supervisor.
//!
//! Binds nothing itself: it is handed a listening socket, forks the
//! configured number of workers onto it and keeps that many alive until it
//! is asked to stop. The supervisor never starts an async runtime or any
//! helper thread, so each forked child begins life single-threaded.

use std::collections::HashMap;
use std::net::TcpListener;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use tracing::{error, info, warn};

use crate::error::{Result, StatusError};
use crate::server::{self, WorkerConfig};
use crate::signals::{TerminationReason, analyze_wait_status};

/// Signals that make the supervisor shut down.
const SHUTDOWN_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

/// A worker dying sooner than this after spawning counts as a startup failure.
const STARTUP_GRACE: Duration = Duration::from_secs(1);

/// Consecutive startup failures before the supervisor gives up.
const MAX_STARTUP_FAILURES: usize = 5;

/// How long stopping workers may take before they are killed.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Number of worker processes to keep alive.
    pub workers: usize,
    /// Configuration handed to every worker.
    pub worker: WorkerConfig,
}

/// A forked worker process.
#[derive(Debug)]
struct WorkerProc {
    pid: Pid,
    slot: usize,
    spawned_at: Instant,
    reaped: bool,
}

impl WorkerProc {
    /// Non-blocking wait. `None` while the worker is still running.
    fn try_wait(&mut self) -> Result<Option<WaitStatus>> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => {
                self.reaped = true;
                Ok(Some(status))
            }
            Err(Errno::EINTR) => Ok(None),
            Err(e) => {
                self.reaped = true;
                Err(e.into())
            }
        }
    }

    fn terminate(&self) {
        if let Err(e) = signal::kill(self.pid, Signal::SIGTERM)
            && e != Errno::ESRCH
        {
            warn!(pid = %self.pid, error = %e, "Failed to send SIGTERM");
        }
    }

    /// Wait up to `timeout` for an already signalled worker, then SIGKILL it.
    fn stop(&mut self, timeout: Duration) -> TerminationReason {
        let start = Instant::now();
        while start.elapsed() < timeout {
            match self.try_wait() {
                Ok(Some(status)) => return analyze_wait_status(status),
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                Err(_) => return TerminationReason::Unknown,
            }
        }

        warn!(pid = %self.pid, "Worker did not stop in time, killing");
        let _ = signal::kill(self.pid, Signal::SIGKILL);
        self.reaped = true;
        waitpid(self.pid, None)
            .map(analyze_wait_status)
            .unwrap_or(TerminationReason::Unknown)
    }
}

impl Drop for WorkerProc {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
        }
    }
}

/// Counts back-to-back workers that die right after being spawned.
#[derive(Debug, Default)]
struct StartupFailures {
    consecutive: usize,
}

impl StartupFailures {
    /// Account for one reaped worker and return the current streak.
    fn record(&mut self, reason: &TerminationReason, uptime: Duration) -> usize {
        let failed_early = uptime < STARTUP_GRACE
            && matches!(reason, TerminationReason::Exited(code) if *code != 0);
        if failed_early {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        self.consecutive
    }
}

/// Run the supervisor until a shutdown signal arrives.
pub fn run(listener: TcpListener, config: &SupervisorConfig) -> Result<()> {
    SHUTDOWN.store(false, Ordering::SeqCst);
    install_shutdown_handlers()?;

    let mut workers: HashMap<usize, WorkerProc> = HashMap::new();
    for slot in 0..config.workers {
        let worker = spawn_worker(&listener, &config.worker, slot)?;
        workers.insert(slot, worker);
    }
    info!(workers = config.workers, "Supervisor started");

    let mut failures = StartupFailures::default();
    while !SHUTDOWN.load(Ordering::SeqCst) {
        let mut exited = Vec::new();
        for (slot, worker) in workers.iter_mut() {
            if let Some(status) = worker.try_wait()? {
                exited.push((*slot, analyze_wait_status(status), worker.spawned_at.elapsed()));
            }
        }

        for (slot, reason, uptime) in exited {
            let pid = workers.remove(&slot).map(|w| w.pid);
            if reason.is_success() {
                info!(slot, pid = ?pid, %reason, "Worker exited");
            } else {
                warn!(slot, pid = ?pid, %reason, "Worker exited");
            }

            let streak = failures.record(&reason, uptime);
            if streak >= MAX_STARTUP_FAILURES {
                error!(streak, "Workers keep failing at startup, giving up");
                stop_all(workers);
                return Err(StatusError::WorkerStartup(streak));
            }

            if !SHUTDOWN.load(Ordering::SeqCst) {
                workers.insert(slot, spawn_worker(&listener, &config.worker, slot)?);
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    info!("Shutting down workers");
    stop_all(workers);
    Ok(())
}

fn install_shutdown_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in SHUTDOWN_SIGNALS {
        // Safety: request_shutdown only stores to an atomic.
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}

fn reset_shutdown_handlers() -> Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in SHUTDOWN_SIGNALS {
        // Safety: restoring the default disposition.
        unsafe { sigaction(signal, &default) }?;
    }
    Ok(())
}

fn spawn_worker(listener: &TcpListener, config: &WorkerConfig, slot: usize) -> Result<WorkerProc> {
    // Safety: the supervisor is single-threaded, so the child gets a consistent copy.
    match unsafe { fork() }? {
        ForkResult::Parent { child } => {
            info!(slot, pid = %child, "Spawned worker");
            Ok(WorkerProc {
                pid: child,
                slot,
                spawned_at: Instant::now(),
                reaped: false,
            })
        }
        ForkResult::Child => {
            // Never unwind into the supervisor's frames: their destructors own the siblings.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_main(listener, config)));
            let code = match outcome {
                Ok(Ok(())) => 0,
                Ok(Err(e)) => {
                    error!(slot, error = %e, "Worker failed");
                    1
                }
                Err(_) => 101,
            };
            std::process::exit(code)
        }
    }
}

fn worker_main(listener: &TcpListener, config: &WorkerConfig) -> Result<()> {
    reset_shutdown_handlers()?;
    server::run_worker(listener.try_clone()?, config)
}

fn stop_all(workers: HashMap<usize, WorkerProc>) {
    for worker in workers.values() {
        worker.terminate();
    }
    for (_, mut worker) in workers {
        let reason = worker.stop(STOP_TIMEOUT);
        info!(slot = worker.slot, pid = %worker.pid, %reason, "Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_nonzero_exit_counts() {
        let mut failures = StartupFailures::default();
        let early = Duration::from_millis(200);
        assert_eq!(failures.record(&TerminationReason::Exited(1), early), 1);
        assert_eq!(failures.record(&TerminationReason::Exited(1), early), 2);
    }

    #[test]
    fn test_streak_resets_on_healthy_exit() {
        let mut failures = StartupFailures::default();
        let early = Duration::from_millis(200);
        failures.record(&TerminationReason::Exited(1), early);
        failures.record(&TerminationReason::Exited(1), early);

        assert_eq!(
            failures.record(&TerminationReason::Exited(1), Duration::from_secs(30)),
            0
        );
    }

    #[test]
    fn test_signals_are_not_startup_failures() {
        let mut failures = StartupFailures::default();
        let reason = TerminationReason::Signaled(Signal::SIGTERM);
        assert_eq!(failures.record(&reason, Duration::from_millis(10)), 0);
        assert_eq!(
            failures.record(&TerminationReason::Exited(0), Duration::from_millis(10)),
            0
        );
    }

    #[test]
    fn test_stop_reaps_forked_child() {
        // Safety: the child only sleeps and exits.
        let pid = match unsafe { fork() }.unwrap() {
            ForkResult::Parent { child } => child,
            ForkResult::Child => {
                std::thread::sleep(Duration::from_secs(30));
                unsafe { libc::_exit(0) }
            }
        };
        let mut worker = WorkerProc {
            pid,
            slot: 0,
            spawned_at: Instant::now(),
            reaped: false,
        };

        worker.terminate();
        let reason = worker.stop(Duration::from_secs(5));
        assert_eq!(reason, TerminationReason::Signaled(Signal::SIGTERM));
        assert!(worker.reaped);
    }
}
