//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall).
//!
//! Every step is best effort: a failure is logged and the loop runs anyway,
//! with deadline misses showing up in the run summary.

use crate::cli::RtLock;

#[derive(Debug, Clone, Copy)]
pub struct RtRequest {
    pub prio: Option<i32>,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

#[cfg(target_os = "linux")]
pub fn setup_rt_once(req: RtRequest) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        match lock_memory(req.lock) {
            Ok(()) => tracing::info!(lock = ?req.lock, "rt: memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "rt: mlockall failed"),
        }
        match fifo_priority(req.prio) {
            Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO applied"),
            Err(e) => tracing::warn!(error = %e, "rt: sched_setscheduler failed"),
        }
        let cpu = req.cpu.unwrap_or(0);
        match pin_to_cpu(cpu) {
            Ok(()) => tracing::info!(cpu, "rt: affinity applied"),
            Err(e) => tracing::warn!(error = %e, cpu, "rt: affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(req: RtRequest) {
    tracing::warn!(?req, "rt: real-time mode is only supported on Linux; ignoring --rt");
}

#[cfg(target_os = "linux")]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    fn call(flags: libc::c_int) -> std::io::Result<()> {
        // SAFETY: mlockall takes only flags and touches no caller memory.
        let rc = unsafe { mlockall(flags) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    let result = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => call(MCL_CURRENT),
        RtLock::All => call(MCL_CURRENT | MCL_FUTURE).or_else(|e| {
            // Locking future pages needs a larger memlock budget; fall back.
            if matches!(e.raw_os_error(), Some(libc::EPERM | libc::ENOMEM)) {
                call(MCL_CURRENT)
            } else {
                Err(e)
            }
        }),
    };
    result.map_err(|e| {
        eyre::eyre!(
            "mlockall({lock:?}) failed: {e}; hint: needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'"
        )
    })
}

#[cfg(target_os = "linux")]
fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    // SAFETY: plain queries without pointer arguments.
    let (min, max) = unsafe {
        (
            sched_get_priority_min(SCHED_FIFO),
            sched_get_priority_max(SCHED_FIFO),
        )
    };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let wanted = prio.unwrap_or(max).clamp(min, max);
    let param = sched_param {
        sched_priority: wanted,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling process.
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        eyre::bail!("{err}; hint: run as root or grant CAP_SYS_NICE (setcap cap_sys_nice=ep)");
    }
    Ok(wanted)
}

#[cfg(target_os = "linux")]
fn pin_to_cpu(cpu: usize) -> eyre::Result<()> {
    use libc::{CPU_ISSET, CPU_SET, CPU_ZERO, cpu_set_t};

    let capacity = std::mem::size_of::<cpu_set_t>() * 8;
    if cpu >= capacity {
        eyre::bail!("CPU {cpu} exceeds cpu_set_t capacity {capacity}");
    }
    // SAFETY: cpu_set_t is plain data; the zeroed value is a valid empty set.
    let mut allowed: cpu_set_t = unsafe { std::mem::zeroed() };
    // SAFETY: `allowed` is a valid, exclusively borrowed cpu_set_t.
    let rc = unsafe {
        CPU_ZERO(&mut allowed);
        libc::sched_getaffinity(0, std::mem::size_of::<cpu_set_t>(), &mut allowed)
    };
    if rc != 0 {
        eyre::bail!("sched_getaffinity: {}", std::io::Error::last_os_error());
    }
    // SAFETY: `cpu` was checked against the set capacity above.
    if !unsafe { CPU_ISSET(cpu, &allowed) } {
        eyre::bail!("CPU {cpu} not permitted by current affinity mask");
    }
    // SAFETY: as above; `desired` is a valid cpu_set_t.
    let mut desired: cpu_set_t = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        CPU_ZERO(&mut desired);
        CPU_SET(cpu, &mut desired);
        libc::sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &desired)
    };
    if rc != 0 {
        eyre::bail!("sched_setaffinity: {}", std::io::Error::last_os_error());
    }
    Ok(())
}
