//! The TaskStore entry's emitted projection: everything about a task's
//! syscall/iorq/scheduling bookkeeping that survives into a `TaskSample`.
//!
//! This is the map value for the kernel-side per-task store (keyed by tid)
//! and is embedded verbatim into every emitted `TaskSample`, matching the
//! original tool's `struct task_state` nested inside `struct task_output_event`.

use crate::consts::TRACE_PAYLOAD_LEN;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct TaskState {
    pub pid: u32,
    pub tgid: u32,

    pub sample_start_ktime: u64,
    pub sample_actual_ktime: u64,

    /// True from the moment the Sampler observes this task mid-syscall until
    /// `SyscallProbe` emits the matching completion.
    pub sc_sampled: u8,
    pub _pad0: [u8; 3],
    /// -1 when not in a syscall.
    pub in_syscall_nr: i32,
    /// Monotonic ns; 0 means not yet retroactively stamped.
    pub sc_enter_time: u64,
    pub sc_sequence_num: u64,
    pub prev_sc_sequence_num: u64,

    pub iorq_sequence_num: u64,
    pub last_iorq_rq: u64,
    pub last_iorq_dev: u32,
    pub last_iorq_sector: u64,
    pub last_iorq_sampled: u8,
    pub last_iorq_dev_sampled: u32,
    pub last_iorq_sector_sampled: u64,
    pub last_iorq_sequence_num: u64,

    pub aio_inflight_reqs: u32,
    pub io_uring_sq_pending: u32,
    pub io_uring_cq_pending: u32,
    /// Kernel `struct file *` of the most recently resolved SQE target,
    /// zero if none has been resolved yet or the last SQE used a
    /// registered fixed-file index this program can't resolve. Lets a CQ
    /// backlog sighting on a later tick (with no fresh SQE to resolve)
    /// still report the file the backlog is most likely draining.
    pub uring_last_sqe_file_ptr: u64,

    pub nvcsw: u64,
    pub nivcsw: u64,
    pub last_total_ctxsw: u64,

    pub pid_ns_id: u32,
    pub cgroup_id: u64,

    /// Optional read/write payload capture (`-X`); zero length when disabled
    /// or not applicable to the syscall in progress.
    pub trace_payload_len: u16,
    pub trace_payload_syscall: i32,
    pub trace_payload_seq_num: u64,
    pub trace_payload: [u8; TRACE_PAYLOAD_LEN],
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            pid: 0,
            tgid: 0,
            sample_start_ktime: 0,
            sample_actual_ktime: 0,
            sc_sampled: 0,
            _pad0: [0; 3],
            in_syscall_nr: -1,
            sc_enter_time: 0,
            sc_sequence_num: 0,
            prev_sc_sequence_num: 0,
            iorq_sequence_num: 0,
            last_iorq_rq: 0,
            last_iorq_dev: 0,
            last_iorq_sector: 0,
            last_iorq_sampled: 0,
            last_iorq_dev_sampled: 0,
            last_iorq_sector_sampled: 0,
            last_iorq_sequence_num: 0,
            aio_inflight_reqs: 0,
            io_uring_sq_pending: 0,
            io_uring_cq_pending: 0,
            uring_last_sqe_file_ptr: 0,
            nvcsw: 0,
            nivcsw: 0,
            last_total_ctxsw: 0,
            pid_ns_id: 0,
            cgroup_id: 0,
            trace_payload_len: 0,
            trace_payload_syscall: -1,
            trace_payload_seq_num: 0,
            trace_payload: [0; TRACE_PAYLOAD_LEN],
        }
    }
}

impl TaskState {
    #[must_use]
    pub const fn in_syscall(&self) -> bool {
        self.in_syscall_nr >= 0
    }

    /// Retroactive `sc_enter_time` stamping: a syscall that pre-dates this
    /// program's startup is only ever observed passively by the Sampler, so
    /// the first observation backdates the entry time to "now" rather than
    /// leaving it at zero.
    pub fn stamp_retroactive_enter(&mut self, now_ktime: u64) {
        if self.in_syscall() && self.sc_enter_time == 0 {
            self.sc_enter_time = now_ktime;
        }
    }
}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl aya::Pod for TaskState {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_not_in_syscall() {
        let s = TaskState::default();
        assert!(!s.in_syscall());
    }

    #[test]
    fn retroactive_stamp_only_when_zero() {
        let mut s = TaskState { in_syscall_nr: 3, sc_enter_time: 0, ..TaskState::default() };
        s.stamp_retroactive_enter(500);
        assert_eq!(s.sc_enter_time, 500);

        s.stamp_retroactive_enter(900);
        assert_eq!(s.sc_enter_time, 500, "must not overwrite an already-stamped entry time");
    }

    #[test]
    fn retroactive_stamp_noop_outside_syscall() {
        let mut s = TaskState::default();
        s.stamp_retroactive_enter(42);
        assert_eq!(s.sc_enter_time, 0);
    }
}
