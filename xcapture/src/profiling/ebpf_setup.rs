//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled `xcapture-ebpf` bytecode, discovers kernel struct
//! field offsets via BTF, writes the filter configuration and offset
//! table into their maps, then attaches every probe.
//!
//! ## Attachment points
//!
//! - `iter/task` program `get_tasks` (the Sampler) — not attached here;
//!   the driver loop opens a fresh link and reads it once per tick (see
//!   `driver.rs`).
//! - Tracepoints: `raw_syscalls/sys_enter`, `raw_syscalls/sys_exit`,
//!   `block/block_rq_insert`, `block/block_rq_issue`,
//!   `block/block_rq_complete`, `sched/sched_process_exit`.

use std::path::Path;

use anyhow::{Context, Result};
use aya::{
    include_bytes_aligned,
    maps::{Array, HashMap as AyaHashMap},
    programs::TracePoint,
    Ebpf,
};
use aya_log::EbpfLogger;
use log::{info, warn};

use crate::cli::Args;
use crate::profiling::btf_offsets;
use xcapture_common::FilterConfig;

/// Load the eBPF program binary.
///
/// Always the release build: debug builds pull in formatting code that's
/// incompatible with the BPF verifier, and eBPF programs are small enough
/// that release compiles fast regardless.
///
/// # Errors
/// Returns an error if the eBPF bytecode cannot be loaded into the kernel.
pub fn load_ebpf_program() -> Result<Ebpf> {
    let bpf =
        Ebpf::load(include_bytes_aligned!("../../../target/bpfel-unknown-none/release/xcapture"))?;
    Ok(bpf)
}

/// Initialize the eBPF logger, honoring `LIBBPF_LOG_LEVEL` the way the
/// teacher's loader honors `RUST_LOG` for the userspace side.
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Ok(level) = std::env::var("LIBBPF_LOG_LEVEL") {
        if std::env::var("RUST_LOG").is_err() {
            // SAFETY: called once, early in `main`, before any other thread exists.
            unsafe {
                std::env::set_var("RUST_LOG", level);
            }
        }
    }
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("failed to initialize eBPF logger: {e}");
    }
}

/// Discover kernel struct field offsets via BTF and populate the `OFFSETS`
/// map the kernel program reads through for every field access.
///
/// # Errors
/// Returns an error if BTF cannot be parsed or the `OFFSETS` map is missing.
pub fn populate_offsets(bpf: &mut Ebpf) -> Result<()> {
    let offsets = btf_offsets::discover_offsets()?;
    let mut map: AyaHashMap<_, u32, u64> =
        AyaHashMap::try_from(bpf.map_mut("OFFSETS").context("OFFSETS map not found")?)?;
    for (field_id, offset) in &offsets {
        map.insert(field_id, offset, 0)?;
    }
    info!("resolved {} kernel struct field offsets via BTF", offsets.len());
    Ok(())
}

/// Translate parsed CLI flags into the wire `FilterConfig` and write it
/// into the single-entry `FILTER_CONFIG` array map.
///
/// # Errors
/// Returns an error if the `FILTER_CONFIG` map is missing.
pub fn populate_filter_config(bpf: &mut Ebpf, args: &Args) -> Result<()> {
    let cfg = FilterConfig {
        show_all: u8::from(args.show_all),
        has_filter_tgid: u8::from(args.filter_tgid.is_some()),
        collect_kstack: u8::from(args.collect_kstack()),
        collect_ustack: u8::from(args.collect_ustack()),
        track_syscall: u8::from(args.track_syscall()),
        track_iorq: u8::from(args.track_iorq()),
        capture_payloads: u8::from(args.capture_payloads),
        _pad: 0,
        filter_tgid: args.filter_tgid.unwrap_or(0),
        daemon_ports: args.daemon_ports,
        _pad1: [0; 2],
        sample_freq_hz: args.sample_freq_hz,
    };

    let mut map: Array<_, FilterConfig> =
        Array::try_from(bpf.map_mut("FILTER_CONFIG").context("FILTER_CONFIG map not found")?)?;
    map.set(0, cfg, 0)?;
    info!(
        "filter config: show_all={} filter_tgid={:?} kstack={} ustack={} syscall={} iorq={} payloads={}",
        args.show_all,
        args.filter_tgid,
        args.collect_kstack(),
        args.collect_ustack(),
        args.track_syscall(),
        args.track_iorq(),
        args.capture_payloads
    );
    Ok(())
}

/// Attach every tracepoint-backed probe: SyscallProbe, IorqProbe, and the
/// TaskStore teardown hook. The Sampler (`iter/task`) is intentionally not
/// attached here — the driver loop invokes it once per tick.
///
/// # Errors
/// Returns an error if any program fails to load or attach.
pub fn attach_probes(bpf: &mut Ebpf) -> Result<()> {
    attach_tracepoint(bpf, "sys_enter", "raw_syscalls", "sys_enter")?;
    attach_tracepoint(bpf, "sys_exit", "raw_syscalls", "sys_exit")?;
    attach_tracepoint(bpf, "block_rq_insert", "block", "block_rq_insert")?;
    attach_tracepoint(bpf, "block_rq_issue", "block", "block_rq_issue")?;
    attach_tracepoint(bpf, "block_rq_complete", "block", "block_rq_complete")?;
    attach_tracepoint(bpf, "sched_process_exit", "sched", "sched_process_exit")?;
    info!("✓ attached SyscallProbe, IorqProbe, and TaskStore teardown tracepoints");
    Ok(())
}

fn attach_tracepoint(bpf: &mut Ebpf, program_name: &str, category: &str, event: &str) -> Result<()> {
    let program: &mut TracePoint = bpf
        .program_mut(program_name)
        .with_context(|| format!("{program_name} program not found"))?
        .try_into()?;
    program.load()?;
    program.attach(category, event).with_context(|| format!("failed to attach {category}/{event}"))?;
    Ok(())
}

/// Pin every shared map under `dir` by name, per the `XCAPTURE_BPFFS`
/// contract in §6: when set, maps are pinned once at load so a restarted
/// process (or a secondary program) can reuse the same file descriptors
/// instead of creating fresh maps.
///
/// # Errors
/// Returns an error if a map is missing or the pin syscall fails.
pub fn pin_maps(bpf: &mut Ebpf, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create BPFFS pin directory {}", dir.display()))?;

    const MAP_NAMES: &[&str] = &[
        "FILTER_CONFIG",
        "TICK_START",
        "OFFSETS",
        "TASK_STORE",
        "IORQ_TRACKING",
        "EMITTED_STACKS",
        "SAMPLE_RB",
        "COMPLETION_RB",
        "STACK_RB",
    ];

    for name in MAP_NAMES {
        let map = bpf.map_mut(name).with_context(|| format!("{name} map not found for pinning"))?;
        let path = dir.join(name);
        map.pin(&path).with_context(|| format!("failed to pin {name} at {}", path.display()))?;
    }
    info!("✓ pinned {} maps under {}", MAP_NAMES.len(), dir.display());
    Ok(())
}

/// Unpin every map pinned by [`pin_maps`], best-effort. Called on clean
/// shutdown; logs and continues on failure rather than aborting exit.
pub fn unpin_maps(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!("failed to remove BPFFS pin directory {}: {e}", dir.display());
    } else {
        info!("✓ unpinned maps under {}", dir.display());
    }
}
