//! Ring-buffer wire records produced by the kernel program and consumed by
//! userspace. Every field must be explicitly overwritten by the producer on
//! every reservation: ring buffer pages are physically reused and are not
//! zeroed between reservations.

use crate::consts::{MAX_CMDLINE_LEN, MAX_FILENAME_LEN, MAX_STACK_LEN, TASK_COMM_LEN};
use crate::socket::SocketInfo;
use crate::task_state::TaskState;
use crate::tcp_stats::TcpStatsInfo;

/// One row per sampled task per tick.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TaskSample {
    pub pid: u32,
    pub tgid: u32,
    /// Raw scheduler state bits, see [`crate::consts::task_state`].
    pub state: u32,
    pub flags: u32,
    pub euid: u32,

    pub comm: [u8; TASK_COMM_LEN],

    /// 0 = unset; non-zero emit reasons are a small internal enum used for
    /// diagnostics only, not part of the wire contract consumers rely on.
    pub emit_reason: u8,
    pub _pad0: [u8; 3],

    pub syscall_nr: i32,
    pub syscall_args: [u64; 6],

    pub filename: [u8; MAX_FILENAME_LEN],
    pub exe_file: [u8; MAX_FILENAME_LEN],

    pub cmdline_len: u16,
    pub _pad1: [u8; 2],
    pub cmdline: [u8; MAX_CMDLINE_LEN],

    pub has_socket_info: u8,
    pub has_tcp_stats: u8,
    pub _pad2: [u8; 2],
    pub sock_info: SocketInfo,
    pub tcp_stats: TcpStatsInfo,

    pub aio_fd: i32,
    pub aio_filename: [u8; MAX_FILENAME_LEN],

    pub ur_filename: [u8; MAX_FILENAME_LEN],
    pub ur_sq_filename: [u8; MAX_FILENAME_LEN],
    pub uring_fd: i32,
    pub uring_reg_idx: i32,
    pub uring_offset: u64,
    pub uring_len: u32,
    pub uring_opcode: u8,
    pub uring_flags: u8,
    pub uring_rw_flags: u8,
    pub _pad3: u8,

    pub on_cpu: u8,
    pub on_rq: u8,
    pub migration_pending: u8,
    /// bit 0: in_execve, bit 1: in_iowait, bit 2: sched_remote_wakeup
    pub sched_bits: u8,

    pub storage: TaskState,

    pub kstack_hash: u64,
    pub ustack_hash: u64,
}

impl TaskSample {
    #[must_use]
    pub const fn in_execve(&self) -> bool {
        self.sched_bits & 0x1 != 0
    }

    #[must_use]
    pub const fn in_iowait(&self) -> bool {
        self.sched_bits & 0x2 != 0
    }

    #[must_use]
    pub const fn sched_remote_wakeup(&self) -> bool {
        self.sched_bits & 0x4 != 0
    }
}

/// One row per syscall exit whose entry was previously sampled.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SyscallCompletion {
    pub pid: u32,
    pub tgid: u32,
    pub syscall_nr: i32,
    pub _pad: u32,
    pub sequence_num: u64,
    pub enter_ktime: u64,
    pub exit_ktime: u64,
    pub ret: i64,
}

/// One row per block-I/O completion whose in-flight snapshot was sampled.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IorqCompletion {
    pub insert_pid: u32,
    pub insert_tgid: u32,
    pub issue_pid: u32,
    pub issue_tgid: u32,
    pub complete_pid: u32,
    pub complete_tgid: u32,

    pub iorq_sequence_num: u64,
    pub insert_ktime: u64,
    pub issue_ktime: u64,
    pub complete_ktime: u64,

    pub dev: u32,
    pub sector: u64,
    pub nr_bytes: u32,
    pub cmd_flags: u32,
    pub errno: i32,
    pub _pad: [u8; 4],
}

/// One row per unique stack hash.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StackTraceEvent {
    pub hash: u64,
    pub is_kernel: u8,
    pub _pad: [u8; 3],
    pub pid: u32,
    pub len: u32,
    pub addrs: [u64; MAX_STACK_LEN],
}

#[cfg(feature = "user")]
mod pod_impls {
    use super::{IorqCompletion, StackTraceEvent, SyscallCompletion, TaskSample};

    #[allow(unsafe_code)]
    unsafe impl aya::Pod for TaskSample {}
    #[allow(unsafe_code)]
    unsafe impl aya::Pod for SyscallCompletion {}
    #[allow(unsafe_code)]
    unsafe impl aya::Pod for IorqCompletion {}
    #[allow(unsafe_code)]
    unsafe impl aya::Pod for StackTraceEvent {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sched_bits_decode_independently() {
        let mut sample = zeroed_sample();
        sample.sched_bits = 0x5; // in_execve + sched_remote_wakeup
        assert!(sample.in_execve());
        assert!(!sample.in_iowait());
        assert!(sample.sched_remote_wakeup());
    }

    fn zeroed_sample() -> TaskSample {
        // SAFETY: TaskSample is a plain-old-data repr(C) struct; an
        // all-zero bit pattern is valid for every field (u8/u32/u64/arrays).
        #[allow(unsafe_code)]
        unsafe {
            core::mem::zeroed()
        }
    }
}
