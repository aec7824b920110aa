//! `IorqTracking` map value, keyed by the kernel block-request pointer.
//! The pointer is reused by the kernel across unrelated requests; correctness
//! of attribution relies entirely on `iorq_sequence_num` agreeing between
//! this entry and the snapshot `TaskStore` recorded at sample time (the
//! races between the probes and the sampler are otherwise unresolvable from
//! the pointer alone).

#[repr(C)]
#[derive(Clone, Copy)]
pub struct IorqTrackingEntry {
    pub iorq_sampled: u8,
    pub _pad: [u8; 7],
    pub iorq_sequence_num: u64,

    pub insert_pid: u32,
    pub insert_tgid: u32,
    pub issue_pid: u32,
    pub issue_tgid: u32,

    pub insert_ktime: u64,
    pub issue_ktime: u64,
}

impl Default for IorqTrackingEntry {
    fn default() -> Self {
        Self {
            iorq_sampled: 0,
            _pad: [0; 7],
            iorq_sequence_num: 0,
            insert_pid: 0,
            insert_tgid: 0,
            issue_pid: 0,
            issue_tgid: 0,
            insert_ktime: 0,
            issue_ktime: 0,
        }
    }
}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl aya::Pod for IorqTrackingEntry {}
