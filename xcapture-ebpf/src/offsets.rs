//! Offset-based kernel struct field access.
//!
//! There is no `vmlinux` bindings crate in this workspace, so the kernel
//! program cannot rely on CO-RE field names the way a libbpf-based program
//! would. Instead, userspace walks BTF once at load time (see
//! `xcapture/src/profiling/btf_offsets.rs`), resolves every field this
//! program touches to a byte offset from its containing struct, and writes
//! those offsets into the `OFFSETS` map before any probe/sampler runs.
//! Every kernel-struct read in this crate goes through [`read_field`]
//! rather than a fixed `#[repr(C)]` guess at kernel layout.

use aya_ebpf::{helpers::bpf_probe_read_kernel, macros::map, maps::HashMap};

/// Identifies one kernel struct field this program depends on. Values are
/// populated by userspace as keys into the `OFFSETS` map; order here has no
/// significance beyond stable identity.
#[repr(u32)]
#[derive(Clone, Copy)]
pub enum FieldId {
    TaskStructState = 0,
    TaskStructPid = 1,
    TaskStructTgid = 2,
    TaskStructFlags = 3,
    TaskStructOnCpu = 4,
    TaskStructOnRq = 5,
    TaskStructMigrationPending = 6,
    TaskStructCred = 7,
    TaskStructComm = 8,
    TaskStructMm = 9,
    TaskStructFiles = 10,
    TaskStructNvcsw = 11,
    TaskStructNivcsw = 12,
    TaskStructThreadPtRegs = 13,
    PtRegsArg0 = 90,
    PtRegsArg1 = 91,
    PtRegsArg2 = 92,
    PtRegsArg3 = 93,
    PtRegsArg4 = 94,
    PtRegsArg5 = 95,
    TaskStructNsproxy = 14,
    TaskStructCgroups = 15,
    CredEuid = 16,
    MmExeFile = 17,
    FilesFdt = 18,
    FdtFd = 19,
    FdtMaxFds = 20,
    FileInode = 21,
    FileFOp = 22,
    FilePrivateData = 23,
    InodeIMode = 24,
    InodeISize = 25,
    SocketSk = 26,
    SockCommonSkcFamily = 27,
    SockCommonSkcRcvSaddr = 28,
    SockCommonSkcDaddr = 29,
    SockCommonSkcV6RcvSaddr = 30,
    SockCommonSkcV6Daddr = 31,
    SockCommonSkcNum = 32,
    SockCommonSkcDport = 33,
    SockCommonSkcState = 34,
    InetConnSockIcskCaState = 35,
    TcpSockSndCwnd = 36,
    TcpSockSndSsthresh = 37,
    TcpSockRcvWnd = 38,
    TcpSockSndWnd = 39,
    TcpSockSrtt = 40,
    TcpSockMdevUs = 41,
    TcpSockRttMin = 42,
    TcpSockPacketsOut = 43,
    TcpSockRetransOut = 44,
    TcpSockMaxPacketsOut = 45,
    TcpSockTotalRetrans = 46,
    TcpSockWriteSeq = 47,
    TcpSockSndUna = 48,
    TcpSockSndNxt = 49,
    TcpSockRcvNxt = 50,
    TcpSockCopiedSeq = 51,
    TcpSockLostOut = 52,
    TcpSockSackedOut = 53,
    TcpSockReordering = 54,
    TcpSockDelivered = 55,
    TcpSockDeliveredCe = 56,
    TcpSockBytesSent = 57,
    TcpSockBytesAcked = 58,
    TcpSockBytesReceived = 59,
    TcpSockRetransmits = 60,
    RequestStartTimeNs = 61,
    RequestIoStartTimeNs = 62,
    RequestDataLen = 63,
    IoRingCtxRings = 64,
    IoRingCtxSqEntries = 65,
    IoRingCtxCqEntries = 66,
    IoRingCtxSqSqes = 67,
    IoRingSqTail = 68,
    IoRingSqHead = 69,
    IoRingCqTail = 70,
    IoRingCqHead = 71,
    IoUringSqeOpcode = 72,
    IoUringSqeFlags = 73,
    IoUringSqeFd = 74,
    IoUringSqeOff = 75,
    IoUringSqeLen = 76,
    IoUringSqeRwFlags = 77,
    KiocbAioFildes = 78,
    PtRegsOrigAx = 89,
    PtRegsBp = 96,
    PtRegsSp = 97,
    /// `file->f_path.dentry`, a two-hop offset userspace resolves as
    /// `offsetof(file, f_path) + offsetof(path, dentry)`.
    FileDentry = 98,
    /// `dentry->d_name.name`, resolved as
    /// `offsetof(dentry, d_name) + offsetof(qstr, name)`.
    DentryName = 99,
    /// `unix_sock->addr` (`struct unix_address *`). `unix_sock` embeds
    /// `struct sock sk` as its first member, so a `sock *` already points
    /// at a valid `unix_sock *`.
    UnixSockAddr = 100,
    UnixAddressLen = 101,
    /// Offset of the flexible `name[]` member of `struct unix_address`,
    /// looked up directly via [`offset_of`] rather than [`read_field`]:
    /// the bound path bytes start 2 bytes past this offset (past
    /// `sockaddr_un::sun_family`), not at a value read through it.
    UnixAddressName = 102,
    SockSkPeerPid = 103,
    DentryDInode = 104,
    InodeIIno = 105,
    /// `pid->numbers[0].nr`, resolved as
    /// `offsetof(pid, numbers) + offsetof(upid, nr)`.
    PidNumbersNr = 106,
    /// `inode->i_uid.val`, resolved as
    /// `offsetof(inode, i_uid) + offsetof(kuid_t, val)`.
    InodeIUidVal = 107,
    /// `nsproxy->pid_ns_for_children` (`struct pid_namespace *`).
    NsproxyPidNsForChildren = 108,
    /// `pid_namespace->ns.inum`, resolved as
    /// `offsetof(pid_namespace, ns) + offsetof(ns_common, inum)`.
    PidNamespaceNsInum = 109,
    /// `css_set->dfl_cgrp` (`struct cgroup *`), the task's cgroup on the
    /// default (unified) hierarchy.
    CssSetDflCgrp = 110,
    /// `cgroup->kn` (`struct kernfs_node *`).
    CgroupKn = 111,
    /// `kernfs_node->id`, a single `u64` on the kernels this program
    /// targets (older kernels split this into a two-word
    /// `union kernfs_node_id`; not supported here).
    KernfsNodeId = 112,
}

#[map(name = "OFFSETS")]
pub static OFFSETS: HashMap<u32, u64> = HashMap::with_max_entries(113, 0);

/// Look up a discovered field offset. Returns `None` if userspace never
/// populated this field (e.g. the running kernel's BTF lacks it), in which
/// case the caller must degrade that enrichment to the empty/`-` value
/// rather than guess.
#[inline(always)]
pub fn offset_of(field: FieldId) -> Option<u64> {
    unsafe { OFFSETS.get(&(field as u32)).copied() }
}

/// Read a `Copy` field out of a kernel struct at `base + offset(field)`.
#[inline(always)]
pub unsafe fn read_field<T: Copy>(base: u64, field: FieldId) -> Option<T> {
    let off = offset_of(field)?;
    let ptr = (base + off) as *const T;
    bpf_probe_read_kernel(ptr).ok()
}

/// Read a pointer-sized field and return it as a `u64` kernel address.
#[inline(always)]
pub unsafe fn read_ptr(base: u64, field: FieldId) -> Option<u64> {
    read_field::<u64>(base, field)
}
