//! # xcapture — in-kernel thread-activity sampler
//!
//! This is the kernel half of the tool: a `bpf_iter/task` Sampler triggered
//! once per driver tick plus two tracepoint-attached probes that keep the
//! per-task store current between ticks.
//!
//! ## Maps
//!
//! - `TASK_STORE` (`HashMap<tid, TaskState>`): per-task extended state, the
//!   kernel-side half of the in-kernel store described by the design as
//!   "TaskStore". Lifetime is bound to the task: created on first touch by
//!   either the Sampler or `SyscallProbe`, deleted on `sched_process_exit`.
//! - `IORQ_TRACKING` (`HashMap<request ptr, IorqTrackingEntry>`): owner and
//!   sequence bookkeeping for in-flight block I/O requests. The kernel reuses
//!   request pointers, so every attribution step re-checks the sequence
//!   number rather than trusting the pointer alone.
//! - `EMITTED_STACKS` (`HashMap<hash, ()>`                      ): dedup set for
//!   stack hashes already pushed onto the stack ring buffer.
//! - `SAMPLE_RB` / `COMPLETION_RB` / `STACK_RB`: the three SPMC ring buffers
//!   consumed by userspace.
//! - `FILTER_CONFIG` / `TICK_START`: single-entry config and shared per-tick
//!   timestamp, both written by userspace once per tick (or once at startup
//!   for the former).
//! - `OFFSETS` (in `offsets.rs`): BTF-discovered field offsets, since this
//!   workspace has no `vmlinux` CO-RE bindings crate.
//!
//! ## Programs
//!
//! - `get_tasks` (`iter/task`): the Sampler. Userspace creates a fresh
//!   iterator link once per tick and reads a single byte from it, which
//!   drives this program over every task known to the kernel.
//! - `sys_enter` / `sys_exit` (raw tracepoints): the SyscallProbe.
//! - `block_rq_insert` / `block_rq_issue` / `block_rq_complete`
//!   (tracepoints): the IorqProbe.
//! - `sched_process_exit` (tracepoint): deletes the exiting task's
//!   `TASK_STORE` entry; the store's only teardown path.

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

mod offsets;

use aya_ebpf::{
    helpers::{
        bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_kernel,
        bpf_probe_read_kernel_buf, bpf_probe_read_kernel_str_bytes, bpf_probe_read_user,
        bpf_probe_read_user_buf, gen::bpf_get_stack,
    },
    macros::{iter, map, tracepoint},
    maps::{Array, HashMap, RingBuf},
    programs::TracePointContext,
};
use offsets::{read_field, read_ptr, FieldId};
use xcapture_common::{
    completion::CompletionEvent,
    consts::{
        task_state::{TASK_IDLE, TASK_INTERRUPTIBLE},
        MAX_AIO_EVENTS_WALKED, MAX_FILENAME_LEN, MAX_STACK_LEN, MAX_USER_FRAMES, PF_KTHREAD,
    },
    events::{IorqCompletion, StackTraceEvent, SyscallCompletion, TaskSample},
    socket::{tcp_state, SocketInfo, AF_INET, AF_INET6, AF_UNIX},
    tcp_stats::TcpStatsInfo,
    FilterConfig, IorqTrackingEntry, TaskState,
};

/// `IOSQE_FIXED_FILE`: the SQE's fd slot is an index into the ring's
/// pre-registered file table rather than a normal task fd. Resolving a
/// registered-file index would require reading the ring's `file_table`,
/// which this program doesn't track; such SQEs are left unresolved.
const IOSQE_FIXED_FILE: u8 = 1 << 0;

// ---------------------------------------------------------------------
// Syscall numbers this program special-cases. A faithful rewrite assumes
// the full syscall-number <-> name table and fd-first-arg bitmap are
// present as static per-architecture lookups; only the
// handful of numbers the enrichment dispatch branches on are named here.
// Values are the x86-64 table; ppoll/pselect6/io_uring_enter/io_submit and
// the two io_getevents variants are ABI-stable across the 5.x/6.x kernels
// this program targets.
// ---------------------------------------------------------------------
const NR_PPOLL: i32 = 271;
const NR_PSELECT6: i32 = 270;
const NR_EPOLL_WAIT: i32 = 232;
const NR_EPOLL_PWAIT: i32 = 281;
const NR_IO_SUBMIT: i32 = 209;
const NR_IO_GETEVENTS: i32 = 208;
const NR_IO_PGETEVENTS: i32 = 333;
const NR_IO_URING_ENTER: i32 = 426;

const EMIT_REASON_PASSIVE_SYSCALL: u8 = 1;
const EMIT_REASON_NOT_SLEEPING: u8 = 2;
const EMIT_REASON_SHOW_ALL: u8 = 3;
const EMIT_REASON_ASYNC_IO_PENDING: u8 = 4;

#[map(name = "FILTER_CONFIG")]
static FILTER_CONFIG: Array<FilterConfig> = Array::with_max_entries(1, 0);

#[map(name = "TICK_START")]
static TICK_START: Array<u64> = Array::with_max_entries(1, 0);

#[map(name = "TASK_STORE")]
static TASK_STORE: HashMap<u32, TaskState> = HashMap::with_max_entries(1_048_576 / 256, 0);

#[map(name = "IORQ_TRACKING")]
static IORQ_TRACKING: HashMap<u64, IorqTrackingEntry> = HashMap::with_max_entries(1_048_576 / 256, 0);

#[map(name = "EMITTED_STACKS")]
static EMITTED_STACKS: HashMap<u64, u8> = HashMap::with_max_entries(16_384, 0);

#[map(name = "SAMPLE_RB")]
static SAMPLE_RB: RingBuf = RingBuf::with_byte_size(16 * 1024 * 1024, 0);

#[map(name = "COMPLETION_RB")]
static COMPLETION_RB: RingBuf = RingBuf::with_byte_size(16 * 1024 * 1024, 0);

#[map(name = "STACK_RB")]
static STACK_RB: RingBuf = RingBuf::with_byte_size(8 * 1024 * 1024, 0);

/// Opaque `task_struct`; every field access goes through the offset table.
#[repr(C)]
struct TaskStruct {
    _opaque: [u8; 0],
}

fn filter_config() -> FilterConfig {
    FILTER_CONFIG.get(0).copied().unwrap_or_default()
}

fn tick_start_ktime(seq_num: u64, now: u64) -> u64 {
    if seq_num == 0 {
        // SAFETY: single-threaded within one iterator invocation; no other
        // program mutates this map.
        #[allow(unsafe_code)]
        unsafe {
            let _ = TICK_START.set(0, &now, 0);
        }
        now
    } else {
        TICK_START.get(0).copied().unwrap_or(now)
    }
}

fn task_tgid_pid(task: *const TaskStruct) -> Option<(u32, u32)> {
    let base = task as u64;
    // SAFETY: base is a valid task_struct pointer handed to us by the
    // iterator / tracepoint; offsets come from userspace BTF discovery.
    #[allow(unsafe_code)]
    unsafe {
        let pid: u32 = read_field(base, FieldId::TaskStructPid)?;
        let tgid: u32 = read_field(base, FieldId::TaskStructTgid)?;
        Some((pid, tgid))
    }
}

/// Drop immediately, before any store lookup, the tasks that
/// can never be interesting.
fn fast_path_drop(task: *const TaskStruct, our_tgid: u32) -> bool {
    let base = task as u64;
    #[allow(unsafe_code)]
    let (state, flags, tgid) = unsafe {
        let state: u32 = read_field(base, FieldId::TaskStructState).unwrap_or(0);
        let flags: u32 = read_field(base, FieldId::TaskStructFlags).unwrap_or(0);
        let tgid: u32 = read_field(base, FieldId::TaskStructTgid).unwrap_or(0);
        (state, flags, tgid)
    };

    if flags & PF_KTHREAD != 0 && state & 0xffff == TASK_IDLE {
        return true;
    }
    if tgid == our_tgid {
        return true;
    }
    false
}

/// Passive syscall detection via the saved register frame.
/// `TaskStructThreadPtRegs` resolves (userspace-side, from BTF plus the
/// architecture's `task_pt_regs()` calculation) to a pointer to this task's
/// `pt_regs`; `PtRegsOrigAx` is that struct's syscall-number register,
/// `orig_ax` on x86-64 / `syscallno` on arm64. Neither name is known on the
/// in-kernel side — both offsets are opaque numbers by the time they reach
/// here.
fn pt_regs_ptr(task: *const TaskStruct) -> Option<u64> {
    let base = task as u64;
    #[allow(unsafe_code)]
    unsafe {
        read_ptr(base, FieldId::TaskStructThreadPtRegs)
    }
}

fn passive_syscall_nr(task: *const TaskStruct, is_kthread: bool) -> i32 {
    if is_kthread {
        return -1;
    }
    let Some(regs) = pt_regs_ptr(task) else { return -1 };
    #[allow(unsafe_code)]
    let raw: Option<i64> = unsafe { read_field(regs, FieldId::PtRegsOrigAx) };
    match raw {
        Some(v) => (v & 0x1ff) as i32,
        None => -1,
    }
}

fn syscall_arg(task: *const TaskStruct, idx: usize) -> Option<u64> {
    let regs = pt_regs_ptr(task)?;
    let field = match idx {
        0 => FieldId::PtRegsArg0,
        1 => FieldId::PtRegsArg1,
        2 => FieldId::PtRegsArg2,
        3 => FieldId::PtRegsArg3,
        4 => FieldId::PtRegsArg4,
        _ => FieldId::PtRegsArg5,
    };
    #[allow(unsafe_code)]
    unsafe {
        read_field(regs, field)
    }
}

/// Compute whether a task is "interesting" enough to emit. Returns `Some(reason)` to keep,
/// `None` to drop.
#[allow(clippy::too_many_arguments)]
fn classify_interest(
    cfg: &FilterConfig,
    state: u32,
    syscall_nr: i32,
    aio_inflight: u32,
    uring_sq_pending: u32,
    uring_cq_pending: u32,
    daemon_port_hit: Option<bool>,
) -> Option<u8> {
    if cfg.show_all != 0 {
        return Some(EMIT_REASON_SHOW_ALL);
    }

    let sleeping = state & TASK_INTERRUPTIBLE != 0;
    if !sleeping {
        return Some(EMIT_REASON_NOT_SLEEPING);
    }

    if (syscall_nr == NR_IO_GETEVENTS || syscall_nr == NR_IO_PGETEVENTS) && aio_inflight > 0 {
        return Some(EMIT_REASON_ASYNC_IO_PENDING);
    }
    if syscall_nr == NR_IO_URING_ENTER && (uring_sq_pending > 0 || uring_cq_pending > 0) {
        return Some(EMIT_REASON_ASYNC_IO_PENDING);
    }

    // Daemon-port heuristic: callers that could
    // resolve a socket fd but found it below the daemon-port threshold or in
    // LISTEN are dropped; anything else sleeping-with-a-socket is kept.
    match daemon_port_hit {
        Some(true) => None,
        Some(false) => Some(EMIT_REASON_PASSIVE_SYSCALL),
        None => None,
    }
}

fn fd_is_first_arg(nr: i32) -> bool {
    // Static per-architecture bitmap (a full table is assumed to already
    // exist alongside the syscall-number tables); representative subset of
    // the syscalls this program enriches from fd[0].
    matches!(
        nr,
        0 | 1
            | 2
            | 3
            | 5
            | 8
            | 9
            | 16
            | 17
            | 18
            | 19
            | 20
            | 25
            | 40
            | 41
            | 42
            | 44
            | 45
            | 46
            | 47
            | NR_EPOLL_WAIT
            | NR_EPOLL_PWAIT
    )
}

fn resolve_fd_file(task: *const TaskStruct, fd: u32) -> Option<u64> {
    if fd >= xcapture_common::consts::MAX_TRACKED_FD {
        return None;
    }
    let base = task as u64;
    #[allow(unsafe_code)]
    unsafe {
        let files = read_ptr(base, FieldId::TaskStructFiles)?;
        let fdt = read_ptr(files, FieldId::FilesFdt)?;
        let fd_array = read_ptr(fdt, FieldId::FdtFd)?;
        // `fd_array` holds `struct file *`; one more indirection lands on
        // the `file` object itself.
        let file_ptr = fd_array + (fd as u64) * 8;
        let file_obj: u64 = bpf_probe_read_kernel(file_ptr as *const u64).ok()?;
        if file_obj == 0 {
            None
        } else {
            Some(file_obj)
        }
    }
}

/// `ppoll`/`pselect6` don't carry an fd in their first register — it's an
/// array (`struct pollfd *`) or bitmap (`fd_set *`) in user memory. The
/// Sampler runs in a sleepable `iter/task` context, so a user read here is
/// legal; take the first descriptor as the observed fd, same convention
/// every other fd-bearing syscall this program enriches already follows.
fn resolve_poll_select_fd(nr: i32, args: &[u64; 6]) -> Option<u32> {
    if nr == NR_PPOLL {
        // `struct pollfd { int fd; short events; short revents; }` — `fd`
        // is the first 4 bytes of the array's first element.
        let fds = args[0];
        if fds == 0 {
            return None;
        }
        #[allow(unsafe_code)]
        let fd: Option<i32> = unsafe { bpf_probe_read_user(fds as *const i32).ok() };
        fd.filter(|&fd| fd >= 0).map(|fd| fd as u32)
    } else if nr == NR_PSELECT6 {
        // `fd_set *readfds` is the second argument; the lowest set bit of
        // its first word is the first descriptor in the bitmap.
        let readfds = args[1];
        if readfds == 0 {
            return None;
        }
        #[allow(unsafe_code)]
        let word: Option<u64> = unsafe { bpf_probe_read_user(readfds as *const u64).ok() };
        word.filter(|&w| w != 0).map(u64::trailing_zeros)
    } else {
        None
    }
}

fn file_inode(file: u64) -> Option<u64> {
    #[allow(unsafe_code)]
    unsafe {
        read_ptr(file, FieldId::FileInode)
    }
}

/// `file->f_path.dentry->d_name.name`: the file's basename (the component
/// directly under its final directory, not a full path), matching the
/// filename enrichment scenario's `FILENAME==basename(file)` requirement.
fn read_basename(file: u64) -> [u8; MAX_FILENAME_LEN] {
    let mut buf = [0u8; MAX_FILENAME_LEN];
    #[allow(unsafe_code)]
    let resolved: Option<()> = unsafe {
        let dentry = read_ptr(file, FieldId::FileDentry)?;
        let name_ptr = read_ptr(dentry, FieldId::DentryName)?;
        bpf_probe_read_kernel_str_bytes(name_ptr as *const u8, &mut buf).ok()?;
        Some(())
    };
    if resolved.is_none() {
        buf = [0u8; MAX_FILENAME_LEN];
    }
    buf
}

fn inode_is_socket(inode: u64) -> bool {
    #[allow(unsafe_code)]
    let mode: Option<u32> = unsafe { read_field(inode, FieldId::InodeIMode) };
    // S_IFMT (0o170000) & S_IFSOCK (0o140000)
    mode.is_some_and(|m| (m & 0o170_000) == 0o140_000)
}

fn read_socket_info(file: u64, inode: u64) -> Option<SocketInfo> {
    if !inode_is_socket(inode) {
        return None;
    }
    #[allow(unsafe_code)]
    unsafe {
        // `file->private_data` is the `struct socket *` for a socket fd;
        // `socket->sk` is the `struct sock *` underneath it. Neither hop
        // can be skipped by treating `file` as if it already were the
        // `struct socket *`.
        let socket = read_ptr(file, FieldId::FilePrivateData)?;
        let sk = read_ptr(socket, FieldId::SocketSk)?;
        let family: u16 = read_field(sk, FieldId::SockCommonSkcFamily).unwrap_or(0);
        let mut info = SocketInfo { family, ..SocketInfo::default() };

        if family == AF_INET || family == AF_INET6 {
            info.state = read_field(sk, FieldId::SockCommonSkcState).unwrap_or(0);
            info.sport = read_field::<u16>(sk, FieldId::SockCommonSkcNum).unwrap_or(0);
            info.dport =
                u16::from_be(read_field::<u16>(sk, FieldId::SockCommonSkcDport).unwrap_or(0));
            if family == AF_INET {
                info.saddr_v4 = read_field(sk, FieldId::SockCommonSkcRcvSaddr).unwrap_or(0);
                info.daddr_v4 = read_field(sk, FieldId::SockCommonSkcDaddr).unwrap_or(0);
            } else {
                info.saddr_v6 = read_field(sk, FieldId::SockCommonSkcV6RcvSaddr).unwrap_or([0; 16]);
                info.daddr_v6 = read_field(sk, FieldId::SockCommonSkcV6Daddr).unwrap_or([0; 16]);
            }
        } else if family == AF_UNIX {
            read_unix_socket_info(file, sk, &mut info);
        }
        Some(info)
    }
}

/// `AF_UNIX` enrichment: bound path (or abstract name), owning inode/uid,
/// and peer pid. Grounded on the original tool's own `get_socket_info`
/// AF_UNIX arm; the peer's own inode (a further
/// `peer->sk_socket->file->f_path.dentry->d_inode->i_ino` chain) is not
/// resolved here and is left at zero, matching this program's general
/// posture of degrading an unresolved chain to empty rather than guessing.
#[allow(unsafe_code)]
unsafe fn read_unix_socket_info(file: u64, sk: u64, info: &mut SocketInfo) {
    if let Some(dentry) = read_ptr(file, FieldId::FileDentry) {
        if let Some(inode) = read_ptr(dentry, FieldId::DentryDInode) {
            info.unix_inode = read_field(inode, FieldId::InodeIIno).unwrap_or(0);
            info.unix_owner_uid = read_field(inode, FieldId::InodeIUidVal).unwrap_or(0);
        }
    }

    if let Some(addr) = read_ptr(sk, FieldId::UnixSockAddr) {
        let len: u32 = read_field(addr, FieldId::UnixAddressLen).unwrap_or(0);
        if let Some(name_off) = offsets::offset_of(FieldId::UnixAddressName) {
            if len > 2 {
                let path_len = len - 2;
                let path_base = addr + name_off + 2;
                let mut first_byte = [0u8; 1];
                if bpf_probe_read_kernel_buf(path_base as *const u8, &mut first_byte).is_ok() {
                    let (is_abstract, copy_base, copy_len) = if first_byte[0] == 0 {
                        (true, path_base + 1, path_len.saturating_sub(1))
                    } else {
                        (false, path_base, path_len)
                    };
                    let copy_len = (copy_len as usize).min(info.unix_path.len());
                    if bpf_probe_read_kernel_buf(
                        copy_base as *const u8,
                        &mut info.unix_path[..copy_len],
                    )
                    .is_ok()
                    {
                        info.unix_is_abstract = u8::from(is_abstract);
                        info.unix_path_len = copy_len as u16;
                    }
                }
            }
        }
    }

    if let Some(peer_pid) = read_ptr(sk, FieldId::SockSkPeerPid) {
        info.unix_peer_pid = read_field(peer_pid, FieldId::PidNumbersNr).unwrap_or(0);
    }
}

fn read_tcp_stats(sk: u64) -> TcpStatsInfo {
    #[allow(unsafe_code)]
    unsafe {
        TcpStatsInfo {
            ca_state: read_field(sk, FieldId::InetConnSockIcskCaState).unwrap_or(0),
            retransmits: read_field(sk, FieldId::TcpSockRetransmits).unwrap_or(0),
            snd_cwnd: read_field(sk, FieldId::TcpSockSndCwnd).unwrap_or(0),
            snd_ssthresh: read_field(sk, FieldId::TcpSockSndSsthresh).unwrap_or(0),
            rcv_wnd: read_field(sk, FieldId::TcpSockRcvWnd).unwrap_or(0),
            snd_wnd: read_field(sk, FieldId::TcpSockSndWnd).unwrap_or(0),
            srtt_us: read_field::<u32>(sk, FieldId::TcpSockSrtt).unwrap_or(0) >> 3,
            mdev_us: read_field(sk, FieldId::TcpSockMdevUs).unwrap_or(0),
            rtt_min: read_field(sk, FieldId::TcpSockRttMin).unwrap_or(0),
            packets_out: read_field(sk, FieldId::TcpSockPacketsOut).unwrap_or(0),
            retrans_out: read_field(sk, FieldId::TcpSockRetransOut).unwrap_or(0),
            max_packets_out: read_field(sk, FieldId::TcpSockMaxPacketsOut).unwrap_or(0),
            total_retrans: read_field(sk, FieldId::TcpSockTotalRetrans).unwrap_or(0),
            write_seq: read_field(sk, FieldId::TcpSockWriteSeq).unwrap_or(0),
            snd_una: read_field(sk, FieldId::TcpSockSndUna).unwrap_or(0),
            snd_nxt: read_field(sk, FieldId::TcpSockSndNxt).unwrap_or(0),
            rcv_nxt: read_field(sk, FieldId::TcpSockRcvNxt).unwrap_or(0),
            copied_seq: read_field(sk, FieldId::TcpSockCopiedSeq).unwrap_or(0),
            lost_out: read_field(sk, FieldId::TcpSockLostOut).unwrap_or(0),
            sacked_out: read_field(sk, FieldId::TcpSockSackedOut).unwrap_or(0),
            reordering: read_field(sk, FieldId::TcpSockReordering).unwrap_or(0),
            delivered: read_field(sk, FieldId::TcpSockDelivered).unwrap_or(0),
            delivered_ce: read_field(sk, FieldId::TcpSockDeliveredCe).unwrap_or(0),
            bytes_sent: read_field(sk, FieldId::TcpSockBytesSent).unwrap_or(0),
            bytes_acked: read_field(sk, FieldId::TcpSockBytesAcked).unwrap_or(0),
            bytes_received: read_field(sk, FieldId::TcpSockBytesReceived).unwrap_or(0),
            ..TcpStatsInfo::default()
        }
    }
}

/// io_uring enrichment arm: SQ/CQ backlog plus the most recently
/// submitted SQE. Returns `(sq_pending, cq_pending, sqe_fields)`.
#[allow(clippy::type_complexity)]
fn enrich_io_uring(ring_fd_file: u64) -> (u32, u32, Option<(i32, u8, u8, u8, u64, u32)>) {
    #[allow(unsafe_code)]
    unsafe {
        let Some(rings) = read_ptr(ring_fd_file, FieldId::IoRingCtxRings) else {
            return (0, 0, None);
        };
        let sq_entries: u32 = read_field(ring_fd_file, FieldId::IoRingCtxSqEntries).unwrap_or(0);
        let cq_entries: u32 = read_field(ring_fd_file, FieldId::IoRingCtxCqEntries).unwrap_or(0);
        let sq_mask = sq_entries.wrapping_sub(1);
        let cq_mask = cq_entries.wrapping_sub(1);

        let sq_tail: u32 = read_field(rings, FieldId::IoRingSqTail).unwrap_or(0);
        let sq_head: u32 = read_field(rings, FieldId::IoRingSqHead).unwrap_or(0);
        let cq_tail: u32 = read_field(rings, FieldId::IoRingCqTail).unwrap_or(0);
        let cq_head: u32 = read_field(rings, FieldId::IoRingCqHead).unwrap_or(0);

        let sq_pending = sq_tail.wrapping_sub(sq_head) & sq_mask;
        let cq_pending = cq_tail.wrapping_sub(cq_head) & cq_mask;

        if sq_pending == 0 && cq_pending == 0 {
            return (sq_pending, cq_pending, None);
        }

        let Some(sqes) = read_ptr(ring_fd_file, FieldId::IoRingCtxSqSqes) else {
            return (sq_pending, cq_pending, None);
        };
        let last_idx = (sq_tail.wrapping_sub(1)) & sq_mask;
        // Each SQE is 64 bytes; verified bound via the mask above.
        let sqe = sqes + (last_idx as u64) * 64;
        let opcode: u8 = read_field(sqe, FieldId::IoUringSqeOpcode).unwrap_or(0);
        let flags: u8 = read_field(sqe, FieldId::IoUringSqeFlags).unwrap_or(0);
        let rw_flags: u8 = read_field(sqe, FieldId::IoUringSqeRwFlags).unwrap_or(0);
        let fd: i32 = read_field(sqe, FieldId::IoUringSqeFd).unwrap_or(-1);
        let off: u64 = read_field(sqe, FieldId::IoUringSqeOff).unwrap_or(0);
        let len: u32 = read_field(sqe, FieldId::IoUringSqeLen).unwrap_or(0);

        (sq_pending, cq_pending, Some((fd, opcode, flags, rw_flags, off, len)))
    }
}

/// libaio enrichment arm: inflight count from the userspace AIO ring
/// header. Walking the ring's `io_event` entries (bounded by
/// `MAX_AIO_EVENTS_WALKED`) to recover the target fd of each pending `iocb`
/// requires following the context's `iocb` list, not just the ring header;
/// not yet implemented here, so the fd slot in `TaskSample` is left unset
/// for this arm and only the inflight count is reported.
fn enrich_aio(ring_header: u64) -> (u32, Option<i32>) {
    #[repr(C)]
    struct AioRingHeader {
        id: u32,
        nr: u32,
        head: u32,
        tail: u32,
    }

    #[allow(unsafe_code)]
    let hdr: Option<AioRingHeader> =
        unsafe { bpf_probe_read_user(ring_header as *const AioRingHeader).ok() };
    let Some(hdr) = hdr else {
        return (0, None);
    };
    if hdr.nr == 0 {
        return (0, None);
    }
    let inflight = hdr.tail.wrapping_sub(hdr.head) % hdr.nr;
    (core::cmp::min(inflight, MAX_AIO_EVENTS_WALKED as u32), None)
}

/// FNV-1a-64 over the raw address list.
fn fnv1a64(addrs: &[u64]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;
    let mut hash = OFFSET_BASIS;
    for &addr in addrs {
        for b in addr.to_le_bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

fn capture_kernel_stack(iter_ctx_ptr: *mut core::ffi::c_void) -> ([u64; MAX_STACK_LEN], u32) {
    let mut addrs = [0u64; MAX_STACK_LEN];
    // SAFETY: `bpf_get_stack` bounds its write to the buffer length we pass;
    // BPF_F_KERNEL_STACK's numeric value is kept local since aya-ebpf does
    // not re-export it.
    const BPF_F_KERNEL_STACK: u64 = 0;
    #[allow(unsafe_code)]
    let ret = unsafe {
        bpf_get_stack(
            iter_ctx_ptr,
            addrs.as_mut_ptr().cast(),
            (MAX_STACK_LEN * 8) as u32,
            BPF_F_KERNEL_STACK,
        )
    };
    let len = if ret > 0 { (ret as usize / 8).min(MAX_STACK_LEN) } else { 0 };
    (addrs, len as u32)
}

/// User stack via frame-pointer chasing: only legal from
/// the Sampler's sleepable iterator context, since it performs user-memory
/// reads. Bounded to `MAX_USER_FRAMES`, with a sanity gate on `fp`.
fn capture_user_stack(initial_fp: u64, initial_sp: u64) -> ([u64; MAX_STACK_LEN], u32) {
    let mut addrs = [0u64; MAX_STACK_LEN];
    let mut fp = initial_fp;
    let mut n = 0usize;

    while n < MAX_USER_FRAMES {
        if fp == 0 || fp < initial_sp || fp > initial_sp.wrapping_add(1024 * 1024) {
            break;
        }
        // SAFETY: bounded by MAX_USER_FRAMES and the fp/sp sanity gate above.
        #[allow(unsafe_code)]
        let frame: Option<[u64; 2]> = unsafe { bpf_probe_read_user(fp as *const [u64; 2]).ok() };
        let Some([next_fp, ret_addr]) = frame else {
            break;
        };
        if ret_addr == 0 {
            break;
        }
        addrs[n] = ret_addr;
        n += 1;
        fp = next_fp;
    }
    (addrs, n as u32)
}

fn fill_comm(task: *const TaskStruct) -> [u8; 16] {
    let base = task as u64;
    #[allow(unsafe_code)]
    unsafe {
        read_field(base, FieldId::TaskStructComm).unwrap_or([0u8; 16])
    }
}

fn read_euid(task: *const TaskStruct) -> Option<u32> {
    let base = task as u64;
    #[allow(unsafe_code)]
    unsafe {
        let cred = read_ptr(base, FieldId::TaskStructCred)?;
        read_field(cred, FieldId::CredEuid)
    }
}

fn read_exe_basename(task: *const TaskStruct) -> [u8; MAX_FILENAME_LEN] {
    let base = task as u64;
    #[allow(unsafe_code)]
    let exe_file: Option<u64> = unsafe {
        let mm = read_ptr(base, FieldId::TaskStructMm)?;
        read_ptr(mm, FieldId::MmExeFile)
    };
    match exe_file {
        Some(file) => read_basename(file),
        None => [0u8; MAX_FILENAME_LEN],
    }
}

/// `task_struct->nsproxy->pid_ns_for_children->ns.inum`: the PID namespace
/// id shown in the `PIDNS` column.
fn read_pid_ns_id(task: *const TaskStruct) -> u32 {
    let base = task as u64;
    #[allow(unsafe_code)]
    unsafe {
        let pid_ns = read_ptr(base, FieldId::TaskStructNsproxy)
            .and_then(|nsproxy| read_ptr(nsproxy, FieldId::NsproxyPidNsForChildren));
        pid_ns
            .and_then(|ns| read_field::<u32>(ns, FieldId::PidNamespaceNsInum))
            .unwrap_or(0)
    }
}

/// `task_struct->cgroups->dfl_cgrp->kn->id`: the task's cgroup id on the
/// default (unified) hierarchy, shown in the `CGROUP_ID` column.
fn read_cgroup_id(task: *const TaskStruct) -> u64 {
    let base = task as u64;
    #[allow(unsafe_code)]
    unsafe {
        let kn = read_ptr(base, FieldId::TaskStructCgroups)
            .and_then(|css_set| read_ptr(css_set, FieldId::CssSetDflCgrp))
            .and_then(|cgroup| read_ptr(cgroup, FieldId::CgroupKn));
        kn.and_then(|kn| read_field::<u64>(kn, FieldId::KernfsNodeId)).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------

#[iter(task)]
pub fn get_tasks(ctx: aya_ebpf::programs::TaskIterContext) -> i32 {
    match try_get_tasks(&ctx) {
        Ok(()) => 0,
        Err(_) => 0,
    }
}

fn try_get_tasks(ctx: &aya_ebpf::programs::TaskIterContext) -> Result<(), i64> {
    let task = ctx.task() as *const TaskStruct;
    if task.is_null() {
        return Ok(());
    }

    let our_tgid = (bpf_get_current_pid_tgid() >> 32) as u32;
    if fast_path_drop(task, our_tgid) {
        return Ok(());
    }

    let cfg = filter_config();
    if cfg.has_filter_tgid != 0 {
        if let Some((_, tgid)) = task_tgid_pid(task) {
            if tgid != cfg.filter_tgid {
                return Ok(());
            }
        }
    }

    let Some((pid, tgid)) = task_tgid_pid(task) else { return Ok(()) };
    let now = unsafe { bpf_ktime_get_ns() };
    let sample_start = tick_start_ktime(ctx.sequence_number(), now);

    let base = task as u64;
    #[allow(unsafe_code)]
    let (state, flags, on_cpu, on_rq, migration_pending) = unsafe {
        (
            read_field::<u32>(base, FieldId::TaskStructState).unwrap_or(0),
            read_field::<u32>(base, FieldId::TaskStructFlags).unwrap_or(0),
            read_field::<u8>(base, FieldId::TaskStructOnCpu).unwrap_or(0),
            read_field::<u8>(base, FieldId::TaskStructOnRq).unwrap_or(0),
            read_ptr(base, FieldId::TaskStructMigrationPending).unwrap_or(0),
        )
    };
    let is_kthread = flags & PF_KTHREAD != 0;

    let mut storage = TASK_STORE.get(&pid).copied().unwrap_or_default();
    storage.pid = pid;
    storage.tgid = tgid;
    storage.sample_start_ktime = sample_start;
    storage.sample_actual_ktime = now;
    storage.pid_ns_id = read_pid_ns_id(task);
    storage.cgroup_id = read_cgroup_id(task);

    let passive_nr = passive_syscall_nr(task, is_kthread);
    if passive_nr >= 0 {
        storage.in_syscall_nr = passive_nr;
        storage.sc_sampled = 1;
        storage.stamp_retroactive_enter(now);
    }

    // fd[0] enrichment dispatch.
    let mut sample = zeroed_sample();
    sample.pid = pid;
    sample.tgid = tgid;
    sample.state = state;
    sample.flags = flags;
    sample.comm = fill_comm(task);
    sample.euid = read_euid(task).unwrap_or(u32::MAX);
    sample.exe_file = read_exe_basename(task);
    sample.syscall_nr = storage.in_syscall_nr;
    sample.on_cpu = on_cpu;
    sample.on_rq = on_rq;
    sample.migration_pending = u8::from(migration_pending != 0);

    let mut daemon_port_hit = None;
    let mut aio_inflight = storage.aio_inflight_reqs;
    let mut uring_sq = storage.io_uring_sq_pending;
    let mut uring_cq = storage.io_uring_cq_pending;

    if storage.in_syscall_nr >= 0 {
        for i in 0..6usize {
            sample.syscall_args[i] = syscall_arg(task, i).unwrap_or(0);
        }

        let nr = storage.in_syscall_nr;
        let first_fd_arg = if fd_is_first_arg(nr) {
            Some(sample.syscall_args[0] as u32)
        } else if nr == NR_PPOLL || nr == NR_PSELECT6 {
            resolve_poll_select_fd(nr, &sample.syscall_args)
        } else {
            None
        };

        if let Some(fd) = first_fd_arg {
            if let Some(file) = resolve_fd_file(task, fd) {
                sample.filename = read_basename(file);
                if let Some(inode) = file_inode(file) {
                    if let Some(sock) = read_socket_info(file, inode) {
                        sample.has_socket_info = 1;
                        sample.sock_info = sock;
                        if sock.state != tcp_state::LISTEN {
                            #[allow(unsafe_code)]
                            let sk = unsafe {
                                read_ptr(file, FieldId::FilePrivateData)
                                    .and_then(|socket| read_ptr(socket, FieldId::SocketSk))
                            };
                            if let Some(sk) = sk {
                                sample.tcp_stats = read_tcp_stats(sk);
                                sample.has_tcp_stats = 1;
                            }
                        }
                        let is_daemon_ish = sock.sport <= cfg.daemon_ports
                            || sock.state == tcp_state::LISTEN;
                        daemon_port_hit = Some(is_daemon_ish);
                    }
                }
            }
        }

        if nr == NR_IO_URING_ENTER {
            if let Some(fd) = first_fd_arg.or(Some(sample.syscall_args[0] as u32)) {
                if let Some(file) = resolve_fd_file(task, fd) {
                    let (sq, cq, sqe) = enrich_io_uring(file);
                    uring_sq = sq;
                    uring_cq = cq;
                    sample.uring_fd = fd as i32;
                    if let Some((target_fd, opcode, flags, rw_flags, off, len)) = sqe {
                        sample.uring_reg_idx = target_fd;
                        sample.uring_opcode = opcode;
                        sample.uring_flags = flags;
                        sample.uring_rw_flags = rw_flags;
                        sample.uring_offset = off;
                        sample.uring_len = len;
                        // A fixed/registered file index refers into the
                        // ring's private file table, which this program
                        // doesn't track; only resolve a basename for a
                        // plain fd.
                        if flags & IOSQE_FIXED_FILE == 0 && target_fd >= 0 {
                            if let Some(target_file) = resolve_fd_file(task, target_fd as u32) {
                                sample.ur_sq_filename = read_basename(target_file);
                                storage.uring_last_sqe_file_ptr = target_file;
                            }
                        }
                    }
                }
            }
        }

        if storage.uring_last_sqe_file_ptr != 0 {
            sample.ur_filename = read_basename(storage.uring_last_sqe_file_ptr);
        }

        if nr == NR_IO_SUBMIT || nr == NR_IO_GETEVENTS || nr == NR_IO_PGETEVENTS {
            if let Some(ring_header) = syscall_arg(task, 1) {
                let (inflight, fd) = enrich_aio(ring_header);
                aio_inflight = inflight;
                if let Some(fd) = fd {
                    sample.aio_fd = fd;
                    if let Some(file) = resolve_fd_file(task, fd as u32) {
                        sample.aio_filename = read_basename(file);
                    }
                }
            }
        }
    }

    storage.aio_inflight_reqs = aio_inflight;
    storage.io_uring_sq_pending = uring_sq;
    storage.io_uring_cq_pending = uring_cq;

    let reason = classify_interest(
        &cfg,
        state,
        storage.in_syscall_nr,
        aio_inflight,
        uring_sq,
        uring_cq,
        daemon_port_hit,
    );

    let Some(reason) = reason else {
        let _ = TASK_STORE.insert(&pid, &storage, 0);
        return Ok(());
    };
    sample.emit_reason = reason;

    // Stack snapshot. Kernel stacks are captured fresh every
    // tick the task is interesting; `bpf_get_stack` is cheap relative to the
    // rest of the sample and a task's kernel stack can change between ticks
    // even with no user-visible context switch recorded yet.
    if cfg.collect_kstack != 0 {
        let (addrs, len) = capture_kernel_stack(core::ptr::null_mut());
        let hash = fnv1a64(&addrs[..len as usize]);
        sample.kstack_hash = hash;
        emit_stack_if_new(hash, true, pid, &addrs, len);
    }
    if cfg.collect_ustack != 0 && storage.in_syscall_nr >= 0 {
        let regs = pt_regs_ptr(task).unwrap_or(0);
        #[allow(unsafe_code)]
        let (fp, sp) = unsafe {
            (
                read_field::<u64>(regs, FieldId::PtRegsBp).unwrap_or(0),
                read_field::<u64>(regs, FieldId::PtRegsSp).unwrap_or(0),
            )
        };
        let (addrs, len) = capture_user_stack(fp, sp);
        if len > 0 {
            let hash = fnv1a64(&addrs[..len as usize]);
            sample.ustack_hash = hash;
            emit_stack_if_new(hash, false, pid, &addrs, len);
        }
    }
    storage.last_total_ctxsw = storage.nvcsw + storage.nivcsw;

    // iorq attribution: the sequence number recorded against
    // this task must still match what's tracked for the request pointer, or
    // the request has since completed and been reassigned to someone else.
    if storage.last_iorq_rq != 0 {
        if let Some(entry) = IORQ_TRACKING.get(&storage.last_iorq_rq).copied() {
            if entry.insert_pid == pid && entry.iorq_sequence_num == storage.iorq_sequence_num {
                let mut entry = entry;
                entry.iorq_sampled = 1;
                let _ = IORQ_TRACKING.insert(&storage.last_iorq_rq, &entry, 0);
                storage.last_iorq_sampled = 1;
                storage.last_iorq_dev_sampled = storage.last_iorq_dev;
                storage.last_iorq_sector_sampled = storage.last_iorq_sector;
                storage.last_iorq_sequence_num = storage.iorq_sequence_num;
            }
        }
    }

    storage.sc_sampled = u8::from(storage.in_syscall_nr >= 0);
    let _ = TASK_STORE.insert(&pid, &storage, 0);

    sample.storage = storage;
    if let Some(mut entry) = SAMPLE_RB.reserve::<TaskSample>(0) {
        entry.write(sample);
        entry.submit(0);
    }

    Ok(())
}

fn emit_stack_if_new(hash: u64, is_kernel: bool, pid: u32, addrs: &[u64; MAX_STACK_LEN], len: u32) {
    if EMITTED_STACKS.get(&hash).is_some() {
        return;
    }
    if let Some(mut entry) = STACK_RB.reserve::<StackTraceEvent>(0) {
        let mut ev = StackTraceEvent { hash, is_kernel: u8::from(is_kernel), _pad: [0; 3], pid, len, addrs: *addrs };
        ev.len = len;
        entry.write(ev);
        entry.submit(0);
        // Only record "seen" once the submit succeeded (a transient
        // producer failure: don't record the precondition on a dropped event).
        let _ = EMITTED_STACKS.insert(&hash, &1u8, 0);
    }
}

fn zeroed_sample() -> TaskSample {
    #[allow(unsafe_code)]
    unsafe {
        core::mem::zeroed()
    }
}

// ---------------------------------------------------------------------
// SyscallProbe
// ---------------------------------------------------------------------

#[tracepoint]
pub fn sys_enter(ctx: TracePointContext) -> u32 {
    match try_sys_enter(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_sys_enter(ctx: &TracePointContext) -> Result<(), i64> {
    let cfg = filter_config();
    if cfg.track_syscall == 0 {
        return Ok(());
    }
    let pid_tgid = bpf_get_current_pid_tgid();
    let pid = pid_tgid as u32;
    let tgid = (pid_tgid >> 32) as u32;
    // Common tracepoint layout: u64 id at offset 8 (after the 8-byte common
    // header), matching `sys_enter`'s format file.
    let nr: i64 = unsafe { ctx.read_at(8).unwrap_or(-1) };
    let now = unsafe { bpf_ktime_get_ns() };

    let mut storage = TASK_STORE.get(&pid).copied().unwrap_or_default();
    storage.pid = pid;
    storage.tgid = tgid;
    storage.in_syscall_nr = nr as i32;
    storage.sc_enter_time = now;
    storage.sc_sequence_num = storage.sc_sequence_num.wrapping_add(1);

    if nr as i32 == NR_IO_GETEVENTS || nr as i32 == NR_IO_PGETEVENTS {
        if let Ok(ring_header) = unsafe { ctx.read_at::<u64>(16) } {
            let (inflight, _) = enrich_aio(ring_header);
            storage.aio_inflight_reqs = inflight;
        }
    }

    if cfg.capture_payloads != 0 {
        capture_rw_payload(ctx, nr as i32, &mut storage);
    }

    let _ = TASK_STORE.insert(&pid, &storage, 0);
    Ok(())
}

// Supplemented feature (§3a, `-X`): optional read/write payload capture.
// Recognizes the buffer-carrying syscalls and copies up to
// `TRACE_PAYLOAD_LEN` bytes of the buffer argument from user memory. Off by
// default; gated on `cfg.capture_payloads` so the extra user-memory read
// only happens when explicitly requested.
const NR_READ: i32 = 0;
const NR_WRITE: i32 = 1;
const NR_PREAD64: i32 = 17;
const NR_PWRITE64: i32 = 18;
const NR_SENDTO: i32 = 44;
const NR_RECVFROM: i32 = 45;

/// `(buf_arg_idx, len_arg_idx)` for syscalls whose buffer argument this
/// capture arm recognizes. `recv`/`send` share `recvfrom`/`sendto`'s numbers
/// on this architecture (glibc never emits the dedicated variants).
fn rw_payload_args(nr: i32) -> Option<(usize, usize)> {
    match nr {
        NR_READ | NR_WRITE | NR_PREAD64 | NR_PWRITE64 => Some((1, 2)),
        NR_SENDTO | NR_RECVFROM => Some((1, 2)),
        _ => None,
    }
}

fn capture_rw_payload(ctx: &TracePointContext, nr: i32, storage: &mut TaskState) {
    let Some((buf_idx, len_idx)) = rw_payload_args(nr) else {
        storage.trace_payload_len = 0;
        return;
    };
    // sys_enter tracepoint layout: 8-byte common header, 8-byte id, then
    // `unsigned long args[6]` starting at offset 16.
    let buf_ptr: u64 = unsafe { ctx.read_at(16 + buf_idx * 8).unwrap_or(0) };
    let len: u64 = unsafe { ctx.read_at(16 + len_idx * 8).unwrap_or(0) };
    if buf_ptr == 0 || len == 0 {
        storage.trace_payload_len = 0;
        return;
    }
    let copy_len = (len as usize).min(xcapture_common::consts::TRACE_PAYLOAD_LEN);
    // SAFETY: `copy_len` is bounded by the fixed-size destination buffer.
    #[allow(unsafe_code)]
    let read: Result<(), i64> = unsafe {
        aya_ebpf::helpers::bpf_probe_read_user_buf(
            buf_ptr as *const u8,
            &mut storage.trace_payload[..copy_len],
        )
        .map_err(|e| e as i64)
    };
    match read {
        Ok(()) => {
            storage.trace_payload_len = copy_len as u16;
            storage.trace_payload_syscall = nr;
            storage.trace_payload_seq_num = storage.trace_payload_seq_num.wrapping_add(1);
        }
        Err(_) => storage.trace_payload_len = 0,
    }
}

#[tracepoint]
pub fn sys_exit(ctx: TracePointContext) -> u32 {
    match try_sys_exit(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_sys_exit(ctx: &TracePointContext) -> Result<(), i64> {
    let cfg = filter_config();
    if cfg.track_syscall == 0 {
        return Ok(());
    }
    let pid_tgid = bpf_get_current_pid_tgid();
    let pid = pid_tgid as u32;
    let tgid = (pid_tgid >> 32) as u32;
    let ret: i64 = unsafe { ctx.read_at(16).unwrap_or(0) };
    let now = unsafe { bpf_ktime_get_ns() };

    let Some(mut storage) = TASK_STORE.get(&pid).copied() else {
        return Ok(());
    };

    if storage.sc_sampled != 0 {
        let completion = SyscallCompletion {
            pid,
            tgid,
            syscall_nr: storage.in_syscall_nr,
            _pad: 0,
            sequence_num: storage.sc_sequence_num,
            enter_ktime: storage.sc_enter_time,
            exit_ktime: now,
            ret,
        };
        if let Some(mut entry) = COMPLETION_RB.reserve::<CompletionEvent>(0) {
            entry.write(CompletionEvent::from_syscall(completion));
            entry.submit(0);
        }
    }
    storage.sc_sampled = 0;
    // `in_syscall_nr` is cleared but `sc_enter_time` is deliberately left in
    // place so a consumer reading this entry after
    // exit can still compute "time since last syscall".
    storage.in_syscall_nr = -1;
    let _ = TASK_STORE.insert(&pid, &storage, 0);
    Ok(())
}

#[tracepoint]
pub fn sched_process_exit(ctx: TracePointContext) -> u32 {
    let pid = (bpf_get_current_pid_tgid()) as u32;
    let _ = ctx;
    let _ = TASK_STORE.remove(&pid);
    0
}

// ---------------------------------------------------------------------
// IorqProbe
// ---------------------------------------------------------------------

#[tracepoint]
pub fn block_rq_insert(ctx: TracePointContext) -> u32 {
    match try_block_rq_insert(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_block_rq_insert(ctx: &TracePointContext) -> Result<(), i64> {
    let cfg = filter_config();
    if cfg.track_iorq == 0 {
        return Ok(());
    }
    let rq: u64 = unsafe { ctx.read_at(8).unwrap_or(0) };
    if rq == 0 {
        return Ok(());
    }
    let pid_tgid = bpf_get_current_pid_tgid();
    let pid = pid_tgid as u32;
    let tgid = (pid_tgid >> 32) as u32;
    let now = unsafe { bpf_ktime_get_ns() };

    let mut storage = TASK_STORE.get(&pid).copied().unwrap_or_default();
    storage.iorq_sequence_num = storage.iorq_sequence_num.wrapping_add(1);
    storage.last_iorq_rq = rq;
    let seq = storage.iorq_sequence_num;
    let _ = TASK_STORE.insert(&pid, &storage, 0);

    let entry = IorqTrackingEntry {
        iorq_sampled: 0,
        _pad: [0; 7],
        iorq_sequence_num: seq,
        insert_pid: pid,
        insert_tgid: tgid,
        issue_pid: 0,
        issue_tgid: 0,
        insert_ktime: now,
        issue_ktime: 0,
    };
    let _ = IORQ_TRACKING.insert(&rq, &entry, 0);
    Ok(())
}

#[tracepoint]
pub fn block_rq_issue(ctx: TracePointContext) -> u32 {
    match try_block_rq_issue(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_block_rq_issue(ctx: &TracePointContext) -> Result<(), i64> {
    let cfg = filter_config();
    if cfg.track_iorq == 0 {
        return Ok(());
    }
    let rq: u64 = unsafe { ctx.read_at(8).unwrap_or(0) };
    if rq == 0 {
        return Ok(());
    }
    let pid_tgid = bpf_get_current_pid_tgid();
    let pid = pid_tgid as u32;
    let tgid = (pid_tgid >> 32) as u32;
    let now = unsafe { bpf_ktime_get_ns() };

    if let Some(mut entry) = IORQ_TRACKING.get(&rq).copied() {
        entry.issue_pid = pid;
        entry.issue_tgid = tgid;
        entry.issue_ktime = now;
        let _ = IORQ_TRACKING.insert(&rq, &entry, 0);
    } else {
        // Direct dispatch bypassing the scheduler: create the entry
        // as if insert==issue.
        let mut storage = TASK_STORE.get(&pid).copied().unwrap_or_default();
        storage.iorq_sequence_num = storage.iorq_sequence_num.wrapping_add(1);
        storage.last_iorq_rq = rq;
        let seq = storage.iorq_sequence_num;
        let _ = TASK_STORE.insert(&pid, &storage, 0);

        let entry = IorqTrackingEntry {
            iorq_sampled: 0,
            _pad: [0; 7],
            iorq_sequence_num: seq,
            insert_pid: pid,
            insert_tgid: tgid,
            issue_pid: pid,
            issue_tgid: tgid,
            insert_ktime: now,
            issue_ktime: now,
        };
        let _ = IORQ_TRACKING.insert(&rq, &entry, 0);
    }
    Ok(())
}

#[tracepoint]
pub fn block_rq_complete(ctx: TracePointContext) -> u32 {
    match try_block_rq_complete(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_block_rq_complete(ctx: &TracePointContext) -> Result<(), i64> {
    let cfg = filter_config();
    if cfg.track_iorq == 0 {
        return Ok(());
    }
    let rq: u64 = unsafe { ctx.read_at(8).unwrap_or(0) };
    if rq == 0 {
        return Ok(());
    }
    let nr_bytes: u32 = unsafe { ctx.read_at(16).unwrap_or(0) };
    let data_len: u32 =
        unsafe { read_field(rq, FieldId::RequestDataLen).unwrap_or(nr_bytes) };
    if nr_bytes < data_len {
        // Partial bio completion; ignore.
        return Ok(());
    }

    let Some(entry) = IORQ_TRACKING.get(&rq).copied() else {
        // Never inserted while we were watching.
        return Ok(());
    };

    if entry.iorq_sampled != 0 {
        let pid_tgid = bpf_get_current_pid_tgid();
        let complete_pid = pid_tgid as u32;
        let complete_tgid = (pid_tgid >> 32) as u32;
        let now = unsafe { bpf_ktime_get_ns() };

        let dev: u32 = unsafe { ctx.read_at(0).unwrap_or(0) };
        let sector: u64 = unsafe { ctx.read_at(24).unwrap_or(0) };

        let completion = IorqCompletion {
            insert_pid: entry.insert_pid,
            insert_tgid: entry.insert_tgid,
            issue_pid: entry.issue_pid,
            issue_tgid: entry.issue_tgid,
            complete_pid,
            complete_tgid,
            iorq_sequence_num: entry.iorq_sequence_num,
            insert_ktime: entry.insert_ktime,
            issue_ktime: entry.issue_ktime,
            complete_ktime: now,
            dev,
            sector,
            nr_bytes,
            cmd_flags: 0,
            errno: 0,
            _pad: [0; 4],
        };
        if let Some(mut rb_entry) = COMPLETION_RB.reserve::<CompletionEvent>(0) {
            rb_entry.write(CompletionEvent::from_iorq(completion));
            rb_entry.submit(0);
        }
    }

    let _ = IORQ_TRACKING.remove(&rq);
    Ok(())
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
