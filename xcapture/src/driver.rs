//! The driver loop: per tick, captures the wall/mono clock pair, triggers
//! the Sampler, drains the three ring buffers into the [`Consumer`], and
//! paces the next tick to the configured sample frequency. Grounded on the
//! original tool's `main()` consume loop (`xcapture_user.c`), generalized
//! behind `Consumer` and kept on the teacher's `tokio::select!` idiom for
//! racing the tick sleep against shutdown signals.

use std::io::Read;
use std::os::fd::OwnedFd;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use aya::maps::{MapData, RingBuf};
use aya::programs::{links::FdLink, Iter};
use aya::Ebpf;
use log::{info, warn};
use signal_hook::consts::{SIGPIPE, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::sync::watch;

use xcapture_common::{CompletionEvent, StackTraceEvent, TaskSample, TimeCorrelation};

use crate::cli::Args;
use crate::consumer::{self, Consumer};

/// Runs ticks until a stop signal arrives or `-i N` iterations are reached.
///
/// # Errors
/// Returns an error if a ring-buffer map is missing or the Sampler iterator
/// program cannot be attached for a tick.
pub async fn run(mut bpf: Ebpf, args: &Args, mut consumer: Consumer) -> Result<()> {
    let mut sample_rb = open_ring_buf(&mut bpf, "SAMPLE_RB")?;
    let mut completion_rb = open_ring_buf(&mut bpf, "COMPLETION_RB")?;
    let mut stack_rb = open_ring_buf(&mut bpf, "STACK_RB")?;

    let hz = args.sample_freq_hz.max(1);
    let interval = Duration::from_secs_f64(1.0 / f64::from(hz));
    let weight_us = 1_000_000 / u64::from(hz);

    let mut sigterm_rx = spawn_terminate_watch().context("failed to install SIGTERM/SIGPIPE handler")?;

    if consumer.is_stdout_mode() {
        consumer::print_header(consumer.columns());
    }

    let mut iterations_done: u64 = 0;
    loop {
        let tick_start = Instant::now();
        let time = TimeCorrelation::new(wall_clock_ns(), mono_clock_ns());

        trigger_sampler(&mut bpf).context("failed to trigger Sampler iterator")?;

        let mut tick_stack_hashes = Vec::new();

        while let Some(item) = sample_rb.next() {
            if let Some(sample) = read_record::<TaskSample>(&item) {
                consumer.handle_sample(&time, weight_us, &sample);
            } else {
                warn!("dropped truncated TaskSample record");
            }
        }
        while let Some(item) = stack_rb.next() {
            if let Some(stack) = read_record::<StackTraceEvent>(&item) {
                tick_stack_hashes.push(stack.hash);
                consumer.handle_stack(&stack);
            } else {
                warn!("dropped truncated StackTraceEvent record");
            }
        }
        while let Some(item) = completion_rb.next() {
            if let Some(completion) = read_record::<CompletionEvent>(&item) {
                consumer.handle_completion(&completion);
            } else {
                warn!("dropped truncated CompletionEvent record");
            }
        }

        if args.print_stacks && !tick_stack_hashes.is_empty() {
            println!(
                "tick: {} unique stack(s): {}",
                tick_stack_hashes.len(),
                tick_stack_hashes.iter().map(|h| format!("{h:016x}")).collect::<Vec<_>>().join(",")
            );
        }

        consumer.flush();

        iterations_done += 1;
        if args.iterations > 0 && iterations_done >= args.iterations {
            info!("completed {iterations_done} iteration(s), stopping");
            break;
        }

        let elapsed = tick_start.elapsed();
        let remaining = interval.saturating_sub(elapsed);
        if elapsed > interval {
            warn!("sampling took longer than the interval: {elapsed:?} > {interval:?}");
        }

        tokio::select! {
            () = tokio::time::sleep(remaining) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                break;
            }
            Ok(()) = sigterm_rx.changed() => {
                if *sigterm_rx.borrow() {
                    info!("received SIGTERM/SIGPIPE, shutting down");
                    break;
                }
            }
        }
    }

    Ok(())
}

fn open_ring_buf(bpf: &mut Ebpf, name: &'static str) -> Result<RingBuf<MapData>> {
    RingBuf::try_from(bpf.take_map(name).with_context(|| format!("{name} map not found"))?)
        .with_context(|| format!("{name} is not a ring buffer map"))
}

/// Opens a fresh `iter/task` link and reads a single byte from it, which
/// drives the kernel program (`get_tasks`) over every task known to the
/// kernel for this tick — step 3 of the driver loop (§4.6). A new link is
/// created every tick rather than reused, matching the original's
/// "create a fresh iterator handle bound to the sampler" semantics.
fn trigger_sampler(bpf: &mut Ebpf) -> Result<()> {
    let program: &mut Iter = bpf
        .program_mut("get_tasks")
        .context("get_tasks program not found")?
        .try_into()
        .context("get_tasks is not an iter/task program")?;
    let link_id = program.attach().context("failed to attach Sampler iterator")?;
    let link = program.take_link(link_id).context("failed to take Sampler iterator link")?;
    let fd_link: FdLink = link.try_into().context("Sampler iterator link has no file descriptor")?;
    let owned_fd: OwnedFd =
        fd_link.try_into().context("failed to convert Sampler iterator link to an owned fd")?;
    let mut file = std::fs::File::from(owned_fd);
    let mut one_byte = [0u8; 1];
    // The read itself runs the whole in-kernel enumeration; a short read
    // (including zero bytes at EOF) is not a failure.
    let _ = file.read(&mut one_byte);
    Ok(())
}

/// # Safety invariant
/// Every ring-buffer record type above is `#[repr(C)]` plain old data and
/// the kernel producer always overwrites every field before submitting, so
/// reading a truncated buffer is the only failure mode; a short read is
/// treated as "drop this record", matching §7's transient-failure handling.
fn read_record<T: Copy>(bytes: &[u8]) -> Option<T> {
    if bytes.len() < std::mem::size_of::<T>() {
        return None;
    }
    // SAFETY: length checked above; every wire record is `#[repr(C)]` POD
    // and ring-buffer pages are reused but always fully overwritten by the
    // producer, so any in-bounds read yields a valid (if stale) value.
    #[allow(unsafe_code)]
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<T>()) })
}

fn wall_clock_ns() -> u64 {
    clock_gettime_ns(libc::CLOCK_REALTIME)
}

fn mono_clock_ns() -> u64 {
    clock_gettime_ns(libc::CLOCK_MONOTONIC)
}

fn clock_gettime_ns(clock_id: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, fully-initialized out-parameter for clock_gettime.
    #[allow(unsafe_code)]
    unsafe {
        libc::clock_gettime(clock_id, &raw mut ts);
    }
    (ts.tv_sec as u64).saturating_mul(1_000_000_000).saturating_add(ts.tv_nsec as u64)
}

/// Bridges `signal_hook`'s blocking signal iterator (run on a dedicated
/// thread) into the async `select!` in the main loop via a `watch` channel,
/// so SIGTERM/SIGPIPE can race the tick sleep the same way `ctrl_c()` does.
fn spawn_terminate_watch() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);
    let mut signals = Signals::new([SIGTERM, SIGPIPE])?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            let _ = tx.send(true);
        }
    });
    Ok(rx)
}
