//! xcapture — low-overhead Linux thread-activity sampler.
//!
//! Loads the `xcapture-ebpf` program, attaches the SyscallProbe and
//! IorqProbe tracepoints, then hands off to the driver loop, which triggers
//! the Sampler once per tick and drains its ring buffers through the
//! Consumer.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use xcapture::cli::Args;
use xcapture::consumer::Consumer;
use xcapture::preflight;
use xcapture::profiling::{
    attach_probes, init_ebpf_logger, load_ebpf_program, pin_maps, populate_filter_config,
    populate_offsets,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.verbose && std::env::var("RUST_LOG").is_err() {
        // SAFETY: called once, early in `main`, before any other thread exists.
        unsafe {
            std::env::set_var("RUST_LOG", "debug");
        }
    }
    env_logger::init();

    let bpffs_dir = std::env::var("XCAPTURE_BPFFS").ok();
    preflight::run_preflight_checks(bpffs_dir.as_deref()).context("pre-flight checks failed")?;

    if let Some(tgid) = args.filter_tgid {
        preflight::check_process_exists(tgid as i32)?;
    }

    info!("loading eBPF program");
    let mut bpf = load_ebpf_program().context("failed to load eBPF program")?;
    init_ebpf_logger(&mut bpf);

    populate_offsets(&mut bpf).context("failed to resolve kernel struct field offsets")?;
    populate_filter_config(&mut bpf, &args).context("failed to write filter configuration")?;
    attach_probes(&mut bpf).context("failed to attach SyscallProbe/IorqProbe tracepoints")?;

    if let Some(dir) = &bpffs_dir {
        pin_maps(&mut bpf, std::path::Path::new(dir)).context("failed to pin maps under XCAPTURE_BPFFS")?;
    }

    let consumer = Consumer::new(&args).context("failed to initialize consumer")?;

    info!(
        "xcapture running: freq={}Hz mode={} tgid_filter={:?}",
        args.sample_freq_hz,
        if args.csv { "csv" } else { "stdout" },
        args.filter_tgid
    );

    let result = xcapture::driver::run(bpf, &args, consumer).await;

    if let Some(dir) = &bpffs_dir {
        xcapture::profiling::unpin_maps(std::path::Path::new(dir));
    }

    result
}
