//! Builds the `EXTRA_INFO` column: a semicolon-separated `key=value`
//! document carrying whichever enrichment arm fired for this sample's fd
//! (io_uring SQ/CQ backlog, libaio inflight count, TCP congestion stats).
//! At most one arm is populated per sample — the Sampler's enrichment
//! dispatch (spec §4.2) is already mutually exclusive per fd — so this is a
//! straight-line sequence of `if` checks, not a priority table.

use std::fmt::Write as _;

use xcapture_common::TaskSample;

#[must_use]
pub fn build(sample: &TaskSample) -> String {
    let mut out = String::new();

    if sample.storage.aio_inflight_reqs > 0 {
        write!(out, "aio_inflight={}", sample.storage.aio_inflight_reqs).ok();
        if sample.aio_fd >= 0 {
            let _ = write!(out, ";aio_fd={}", sample.aio_fd);
            let _ = write!(out, ";aio_file={}", cstr(&sample.aio_filename));
        }
        return out;
    }

    if sample.storage.io_uring_sq_pending > 0 || sample.storage.io_uring_cq_pending > 0 {
        let _ = write!(
            out,
            "uring_sq_pending={};uring_cq_pending={}",
            sample.storage.io_uring_sq_pending, sample.storage.io_uring_cq_pending
        );
        if sample.uring_fd >= 0 {
            let _ = write!(out, ";uring_fd={}", sample.uring_fd);
        }
        if sample.uring_reg_idx >= 0 {
            let _ = write!(out, ";uring_reg_idx={}", sample.uring_reg_idx);
        }
        let sq_file = cstr(&sample.ur_sq_filename);
        if !sq_file.is_empty() {
            let _ = write!(out, ";uring_sq_file={sq_file}");
        }
        let file = cstr(&sample.ur_filename);
        if !file.is_empty() {
            let _ = write!(out, ";uring_file={file}");
        }
        let _ = write!(
            out,
            ";uring_opcode={};uring_flags=0x{:x};uring_rw_flags=0x{:x};uring_off={};uring_len={}",
            sample.uring_opcode,
            sample.uring_flags,
            sample.uring_rw_flags,
            sample.uring_offset,
            sample.uring_len
        );
        return out;
    }

    if sample.has_tcp_stats != 0 {
        let t = &sample.tcp_stats;
        let _ = write!(
            out,
            "ca_state={};snd_cwnd={};snd_ssthresh={};rtt_us={};rttvar_us={};retrans={};lost={};\
             bytes_sent={};bytes_acked={};bytes_received={}",
            t.ca_state,
            t.snd_cwnd,
            t.snd_ssthresh,
            t.srtt_us >> 3,
            t.mdev_us >> 2,
            t.total_retrans,
            t.lost_out,
            t.bytes_sent,
            t.bytes_acked,
            t.bytes_received
        );
        if t.is_cwnd_limited() {
            out.push_str(";cwnd_limited=1");
        }
        return out;
    }

    "-".to_string()
}

fn cstr(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeroed_sample() -> TaskSample {
        #[allow(unsafe_code)]
        unsafe {
            core::mem::zeroed()
        }
    }

    #[test]
    fn empty_sample_renders_dash() {
        assert_eq!(build(&zeroed_sample()), "-");
    }

    #[test]
    fn aio_inflight_takes_priority_when_set() {
        let mut sample = zeroed_sample();
        sample.storage.aio_inflight_reqs = 3;
        sample.aio_fd = -1;
        let info = build(&sample);
        assert!(info.contains("aio_inflight=3"));
    }

    #[test]
    fn tcp_stats_render_when_present() {
        let mut sample = zeroed_sample();
        sample.has_tcp_stats = 1;
        sample.tcp_stats.ca_state = 2;
        sample.tcp_stats.snd_cwnd = 10;
        let info = build(&sample);
        assert!(info.contains("ca_state=2"));
        assert!(info.contains("snd_cwnd=10"));
    }
}
