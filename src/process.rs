//! OS process introspection.
//!
//! Memory comes from `sysinfo`. On Linux, start times and the live thread
//! count are read from `/proc`; elsewhere start times fall back to `sysinfo`,
//! which only resolves whole seconds.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use crate::error::{Result, StatusError};

/// Memory footprint of a process, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub virtual_bytes: u64,
    pub resident_bytes: u64,
}

/// Creation time of `pid`, to clock-tick precision where `/proc` is available.
pub fn start_time(pid: u32) -> Result<SystemTime> {
    #[cfg(target_os = "linux")]
    let precise = proc_start_time(pid);
    #[cfg(not(target_os = "linux"))]
    let precise = None;
    if let Some(started) = precise {
        return Ok(started);
    }

    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system
        .process(target)
        .map(|process| UNIX_EPOCH + Duration::from_secs(process.start_time()))
        .ok_or(StatusError::ProcessIntrospection(pid))
}

/// Start time from `/proc/<pid>/stat` (field 22, clock ticks since boot).
#[cfg(target_os = "linux")]
fn proc_start_time(pid: u32) -> Option<SystemTime> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm (field 2) may itself contain spaces and parentheses.
    let (_, rest) = stat.rsplit_once(')')?;
    let ticks: u64 = rest.split_whitespace().nth(19)?.parse().ok()?;

    // Safety: sysconf has no preconditions.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    let hz = u64::try_from(hz).ok().filter(|&hz| hz > 0)?;
    let since_boot = Duration::from_secs(ticks / hz)
        + Duration::from_nanos((ticks % hz) * 1_000_000_000 / hz);

    boot_time()?.checked_add(since_boot)
}

/// Wall-clock boot time with sub-second precision.
#[cfg(target_os = "linux")]
fn boot_time() -> Option<SystemTime> {
    use nix::time::{ClockId, clock_gettime};

    let as_duration = |ts: nix::sys::time::TimeSpec| {
        Some(Duration::new(
            u64::try_from(ts.tv_sec()).ok()?,
            u32::try_from(ts.tv_nsec()).ok()?,
        ))
    };
    let now = as_duration(clock_gettime(ClockId::CLOCK_REALTIME).ok()?)?;
    let uptime = as_duration(clock_gettime(ClockId::CLOCK_BOOTTIME).ok()?)?;
    UNIX_EPOCH.checked_add(now.checked_sub(uptime)?)
}

/// Creation time of this process's parent (the supervisor in a pre-fork setup).
pub fn parent_start_time() -> Result<SystemTime> {
    start_time(std::os::unix::process::parent_id())
}

/// Memory usage for a batch of pids, refreshed in one pass.
///
/// Pids that are gone (or zombies awaiting reaping) are absent from the map.
pub fn memory_usage(pids: &[u32]) -> HashMap<u32, MemoryUsage> {
    if pids.is_empty() {
        return HashMap::new();
    }

    let targets: Vec<Pid> = pids.iter().copied().map(Pid::from_u32).collect();
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&targets),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );

    pids.iter()
        .filter_map(|&pid| {
            let process = system.process(Pid::from_u32(pid))?;
            if process.status() == ProcessStatus::Zombie {
                return None;
            }
            Some((
                pid,
                MemoryUsage {
                    virtual_bytes: process.virtual_memory(),
                    resident_bytes: process.memory(),
                },
            ))
        })
        .collect()
}

/// Number of threads currently running in this process.
///
/// Returns `None` where the platform gives no cheap way to tell.
#[cfg(target_os = "linux")]
pub fn active_thread_count() -> Option<usize> {
    std::fs::read_dir("/proc/self/task")
        .ok()
        .map(|entries| entries.flatten().count())
}

#[cfg(not(target_os = "linux"))]
pub fn active_thread_count() -> Option<usize> {
    None
}
