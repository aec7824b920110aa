//! Runtime-tunable filtering/collection knobs, written once by userspace into
//! a single-entry map before the first tick and read by the Sampler and both
//! probes on every invocation. Mirrors the CLI surface: `-a` (show_all),
//! `-P` (filter_tgid), `-t` (track_syscall/track_iorq), `-k`/`-u` (stack
//! collection), `-F` (sample_freq_hz) and the daemon-port heuristic threshold.

#[repr(C)]
#[derive(Clone, Copy)]
pub struct FilterConfig {
    /// `-a`: keep every task that survives the in-kernel fast-path filter.
    pub show_all: u8,
    pub has_filter_tgid: u8,
    pub collect_kstack: u8,
    pub collect_ustack: u8,
    pub track_syscall: u8,
    pub track_iorq: u8,
    /// `-X`: capture up to `TRACE_PAYLOAD_LEN` bytes of the buffer argument
    /// for recognized read/write syscalls.
    pub capture_payloads: u8,
    pub _pad: u8,

    pub filter_tgid: u32,
    /// Local port threshold for the daemon-port heuristic (default 10000).
    pub daemon_ports: u16,
    pub _pad1: [u8; 2],
    pub sample_freq_hz: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            show_all: 0,
            has_filter_tgid: 0,
            collect_kstack: 0,
            collect_ustack: 0,
            track_syscall: 1,
            track_iorq: 1,
            capture_payloads: 0,
            _pad: 0,
            filter_tgid: 0,
            daemon_ports: 10_000,
            _pad1: [0; 2],
            sample_freq_hz: 1,
        }
    }
}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl aya::Pod for FilterConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tracks_both_completion_kinds() {
        let cfg = FilterConfig::default();
        assert_eq!(cfg.track_syscall, 1);
        assert_eq!(cfg.track_iorq, 1);
        assert_eq!(cfg.daemon_ports, 10_000);
    }
}
