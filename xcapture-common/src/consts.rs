//! Fixed-size buffer limits and kernel constants shared by the kernel program
//! and the userspace consumer. Sizes mirror the original C tool so that wire
//! records stay a predictable, bounded shape under the eBPF verifier.

pub const TASK_COMM_LEN: usize = 16;
pub const MAX_STACK_LEN: usize = 127;
pub const MAX_FILENAME_LEN: usize = 256;
pub const MAX_CMDLINE_LEN: usize = 128;
/// Bound on the rendered `CONNECTION` column text. Unlike the other buffers
/// here, this one is never a `TaskSample` field: the kernel side only ever
/// fills in `sock_info`, and userspace formats the `addr:port->addr:port` /
/// `unix:path` text from it at render time (`render_connection`), the same
/// split the original tool's own `format_connection` makes. `unix_path`'s
/// own bound (`UNIX_PATH_LEN`) plus the `unix:` prefix stay well under this.
pub const MAX_CONN_INFO_LEN: usize = 128;
pub const TRACE_PAYLOAD_LEN: usize = 512;
pub const UNIX_PATH_LEN: usize = 108;

/// Verifier-friendly bound on the first syscall argument when it is treated
/// as a file descriptor. A convenience bound that should eventually be
/// replaced by a lookup against `fdt->max_fds`.
pub const MAX_TRACKED_FD: u32 = 1024;

/// Bound on AIO inflight events walked per sample (`io_submit`/`io_getevents`).
pub const MAX_AIO_EVENTS_WALKED: usize = 16;
/// Bound on user-stack frames walked via frame-pointer chasing.
pub const MAX_USER_FRAMES: usize = 20;
/// Bound on io_uring CQEs inspected per sample.
pub const MAX_CQES_WALKED: usize = 8;

/// Scheduler task-state bitflags, matching `include/linux/sched.h`.
pub mod task_state {
    pub const TASK_RUNNING: u32 = 0x0000;
    pub const TASK_INTERRUPTIBLE: u32 = 0x0001;
    pub const TASK_UNINTERRUPTIBLE: u32 = 0x0002;
    pub const TASK_STOPPED: u32 = 0x0004;
    pub const TASK_TRACED: u32 = 0x0008;
    pub const EXIT_DEAD: u32 = 0x0010;
    pub const EXIT_ZOMBIE: u32 = 0x0020;
    pub const TASK_PARKED: u32 = 0x0040;
    pub const TASK_DEAD: u32 = 0x0080;
    pub const TASK_WAKEKILL: u32 = 0x0100;
    pub const TASK_WAKING: u32 = 0x0200;
    pub const TASK_NOLOAD: u32 = 0x0400;
    pub const TASK_NEW: u32 = 0x0800;
    pub const TASK_IDLE: u32 = TASK_UNINTERRUPTIBLE | TASK_NOLOAD;
}

pub const PF_KTHREAD: u32 = 0x0020_0000;

pub const MINORBITS: u32 = 20;
pub const MINORMASK: u32 = (1 << MINORBITS) - 1;

#[must_use]
pub const fn major(dev: u32) -> u32 {
    dev >> MINORBITS
}

#[must_use]
pub const fn minor(dev: u32) -> u32 {
    dev & MINORMASK
}

#[must_use]
pub const fn mkdev(major: u32, minor: u32) -> u32 {
    (major << MINORBITS) | (minor & MINORMASK)
}

/// Event kinds carried by `TaskSample`-adjacent ring buffer records.
pub mod event_type {
    pub const TASK_INFO: u8 = 1;
    pub const SYSCALL_COMPLETION: u8 = 2;
    pub const IORQ_COMPLETION: u8 = 3;
    pub const STACK_TRACE: u8 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdev_roundtrip() {
        let dev = mkdev(8, 17);
        assert_eq!(major(dev), 8);
        assert_eq!(minor(dev), 17);
    }

    #[test]
    fn task_idle_is_uninterruptible_noload() {
        assert_eq!(
            task_state::TASK_IDLE,
            task_state::TASK_UNINTERRUPTIBLE | task_state::TASK_NOLOAD
        );
    }
}
