//! Pure STATE-column encoding, factored out of the Consumer so it can
//! be unit tested without a live ring buffer.

use crate::consts::task_state::{
    EXIT_DEAD, TASK_IDLE, TASK_INTERRUPTIBLE, TASK_NEW, TASK_NOLOAD, TASK_RUNNING, TASK_STOPPED,
    TASK_UNINTERRUPTIBLE, TASK_WAKING,
};

/// Decode the low bits of the raw scheduler state to its mnemonic label. An
/// exact match against the known bit patterns, not a bitmask test (e.g.
/// `NOLOAD` alone and `IDLE` = `NOLOAD|UNINTERRUPTIBLE` are distinct labels
/// that happen to collide if truncated to a single byte, since `NOLOAD` is
/// bit 10). Returns `None` for any bit pattern outside the recognized set,
/// in which case the caller falls back to `0x<hex>`.
#[must_use]
pub fn decode_state_label(state: u32) -> Option<&'static str> {
    let bits = state & 0xffff;
    Some(match bits {
        TASK_RUNNING => "RUN",
        TASK_INTERRUPTIBLE => "SLEEP",
        TASK_UNINTERRUPTIBLE => "DISK",
        TASK_STOPPED => "STOPPED",
        EXIT_DEAD => "DEAD",
        TASK_WAKING => "WAKING",
        TASK_NOLOAD => "NOLOAD",
        TASK_IDLE => "IDLE",
        TASK_NEW => "NEW",
        _ => return None,
    })
}

/// Build the `Q`/`M` scheduler-hint suffix appended to the STATE column.
#[must_use]
pub fn state_suffix(on_rq: bool, on_cpu: bool, migration_pending: bool) -> &'static str {
    match (on_rq && !on_cpu, migration_pending) {
        (true, true) => "QM",
        (true, false) => "Q",
        (false, true) => "M",
        (false, false) => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_states() {
        assert_eq!(decode_state_label(TASK_RUNNING), Some("RUN"));
        assert_eq!(decode_state_label(TASK_UNINTERRUPTIBLE), Some("DISK"));
        assert_eq!(decode_state_label(TASK_IDLE), Some("IDLE"));
    }

    #[test]
    fn noload_and_idle_are_distinct_despite_sharing_a_low_byte() {
        // TASK_NOLOAD (bit 10) and TASK_IDLE (NOLOAD|UNINTERRUPTIBLE) both
        // mask down to the same low byte as other states; decoding must use
        // enough bits to tell them apart rather than truncating to u8.
        assert_eq!(decode_state_label(TASK_NOLOAD), Some("NOLOAD"));
        assert_ne!(decode_state_label(TASK_NOLOAD), decode_state_label(TASK_RUNNING));
        assert_ne!(decode_state_label(TASK_IDLE), decode_state_label(TASK_UNINTERRUPTIBLE));
    }

    #[test]
    fn unknown_state_falls_back_to_none() {
        assert_eq!(decode_state_label(0xee), None);
    }

    #[test]
    fn suffix_combines_independent_flags() {
        assert_eq!(state_suffix(true, false, false), "Q");
        assert_eq!(state_suffix(false, false, true), "M");
        assert_eq!(state_suffix(true, false, true), "QM");
        assert_eq!(state_suffix(false, true, false), "");
    }
}
