//! TCP congestion/statistics snapshot, read from `struct tcp_sock` when a
//! sampled fd resolves to a non-`LISTEN` TCP socket.

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct TcpStatsInfo {
    pub ca_state: u8,
    pub retransmits: u8,
    pub probes_out: u8,
    pub backoff: u8,

    pub snd_cwnd: u32,
    pub snd_ssthresh: u32,
    pub rcv_wnd: u32,
    pub snd_wnd: u32,
    pub srtt_us: u32,
    pub mdev_us: u32,
    pub rtt_min: u32,
    pub packets_out: u32,
    pub retrans_out: u32,
    pub max_packets_out: u32,
    pub total_retrans: u32,
    pub write_seq: u32,
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub rcv_nxt: u32,
    pub copied_seq: u32,
    pub lost_out: u32,
    pub sacked_out: u32,
    pub reordering: u32,
    pub delivered: u32,
    pub delivered_ce: u32,

    pub bytes_sent: u64,
    pub bytes_acked: u64,
    pub bytes_received: u64,

    pub ecn_flags: u32,

    /// bit 0: reord_seen, bit 1: is_cwnd_limited, remaining bits reserved.
    pub flags: u8,
    pub _pad: [u8; 3],
}

impl TcpStatsInfo {
    #[must_use]
    pub const fn reord_seen(&self) -> bool {
        self.flags & 0x1 != 0
    }

    #[must_use]
    pub const fn is_cwnd_limited(&self) -> bool {
        self.flags & 0x2 != 0
    }
}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl aya::Pod for TcpStatsInfo {}
