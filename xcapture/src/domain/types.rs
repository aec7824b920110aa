//! Newtype wrappers around the raw integers xcapture passes around, so a
//! `Pid` and a `Tid` can't be swapped for each other by the type checker.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU{}", self.0)
    }
}

/// Kernel-assigned device namespace identifier for an io_uring worker; kept
/// distinct from `Tid` even though both wrap a `u32` thread id, since a
/// `WorkerId` is only ever meaningful relative to its owning ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// FNV-1a-64 stack hash, as emitted by the kernel program. Kept distinct
/// from a bare `u64` so a cache keyed by it can't be indexed by e.g. a ktime
/// value by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackId(pub u64);

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Monotonic nanosecond duration, e.g. a syscall's enter-to-exit span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub u64);

impl Duration {
    #[must_use]
    pub fn as_micros(&self) -> u64 {
        self.0 / 1_000
    }

    #[must_use]
    pub fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.as_micros())
    }
}

/// Wall-clock nanoseconds since the Unix epoch, reconstructed from a
/// monotonic ktime via `TimeCorrelation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(pub i64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionName(pub String);

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_display_matches_error_messages() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
    }

    #[test]
    fn duration_converts_to_micros_and_millis() {
        let d = Duration(2_500_000);
        assert_eq!(d.as_micros(), 2_500);
        assert_eq!(d.as_millis(), 2);
    }

    #[test]
    fn stack_id_formats_as_hex() {
        assert_eq!(StackId(0xdead_beef).to_string(), "00000000deadbeef");
    }
}
