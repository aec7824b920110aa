//! Structured error types for xcapture
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

use super::types::Pid;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to load eBPF program: {0}")]
    EbpfLoadFailed(String),

    #[error("eBPF map not found: {0}")]
    MapNotFound(&'static str),

    #[error("Failed to attach {program} ({kind}): {error}")]
    ProgramAttachFailed { program: &'static str, kind: &'static str, error: String },

    #[error("Failed to pin map {map} under {path}: {error}")]
    BpffsPinFailed { map: &'static str, path: String, error: String },

    #[error("Could not resolve kernel field offset for {0}")]
    OffsetDiscoveryFailed(String),

    #[error("Preflight check failed: {0}")]
    PreflightFailed(String),

    #[error("Insufficient privileges: must run as root (effective uid {0})")]
    NotPrivileged(u32),

    #[error("Kernel version {found} is older than the minimum supported {min}")]
    KernelTooOld { found: String, min: String },

    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Failed to read /proc/{0}")]
    ProcReadFailed(Pid),

    #[error("Failed to rotate output file: {0}")]
    RotationFailed(String),

    #[error("Symbol resolution failed: {0}")]
    SymbolizationFailed(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Aya(#[from] aya::EbpfError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_not_found_display() {
        let err = CaptureError::ProcessNotFound(Pid(1234));
        assert_eq!(err.to_string(), "Process PID:1234 not found");
    }

    #[test]
    fn program_attach_failed_mentions_program_and_error() {
        let err = CaptureError::ProgramAttachFailed {
            program: "get_tasks",
            kind: "iter/task",
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("get_tasks"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn kernel_too_old_display() {
        let err = CaptureError::KernelTooOld { found: "4.19.0".into(), min: "5.8".into() };
        assert!(err.to_string().contains("4.19.0"));
        assert!(err.to_string().contains("5.8"));
    }
}
