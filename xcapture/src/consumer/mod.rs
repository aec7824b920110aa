//! The Consumer: drains the three ring buffers once per tick, enriches and
//! renders each record, and fans out to stdout and/or the CSV streams.
//! Grounded on the original tool's `xcapture_user.c` main consume loop,
//! generalized behind the caches/column-engine/CSV-writer pieces below.

pub mod caches;
pub mod columns;
pub mod csv_writer;
pub mod extra_info;
pub mod syscall_table;

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

use anyhow::Result;
use log::warn;
use xcapture_common::{CompletionEvent, StackTraceEvent, TaskSample, TimeCorrelation};
use xcapture_common::{completion_kind, elapsed_ns_clamped};

use crate::cli::Args;
use crate::symbolization::{DwarfSymbolizer, KallsymsSymbolizer, NullSymbolizer, Symbolizer};

use caches::{CgroupCache, StackSymbolCache, UsernameCache};
use columns::{find, resolve_names, ColumnId, RenderCtx, ALL_COLUMNS, NARROW_COLUMNS, NORMAL_COLUMNS, SAMPLE_CSV_COLUMNS, WIDE_COLUMNS};
use csv_writer::RotatingWriter;

struct CsvStreams {
    samples: RotatingWriter,
    syscend: RotatingWriter,
    iorqend: RotatingWriter,
    kstacks: Option<RotatingWriter>,
    ustacks: Option<RotatingWriter>,
    cgroups: Option<RotatingWriter>,
}

/// Everything the driver loop needs once per tick: caches, the chosen
/// column set, symbolizers, and (in `-s` mode) the CSV stream set.
pub struct Consumer {
    columns: Vec<ColumnId>,
    username_cache: UsernameCache,
    cgroup_cache: CgroupCache,
    stack_symbol_cache: StackSymbolCache,
    kernel_symbolizer: Box<dyn Symbolizer>,
    user_symbolizer: Box<dyn Symbolizer>,
    csv: Option<CsvStreams>,
    emitted_cgroup_ids: HashSet<u64>,
    print_stacks: bool,
}

impl Consumer {
    /// # Errors
    /// Returns an error if an explicit `-g`/`-G` column name is unrecognized
    /// or a CSV output directory cannot be created.
    pub fn new(args: &Args) -> Result<Self> {
        let columns = resolve_columns(args)?;

        let (kernel_symbolizer, user_symbolizer): (Box<dyn Symbolizer>, Box<dyn Symbolizer>) =
            if args.no_symbolize {
                (Box::new(NullSymbolizer), Box::new(NullSymbolizer))
            } else {
                let kernel: Box<dyn Symbolizer> = match KallsymsSymbolizer::load() {
                    Ok(sym) => Box::new(sym),
                    Err(e) => {
                        warn!("kallsyms symbolizer unavailable, falling back to raw addresses: {e}");
                        Box::new(NullSymbolizer)
                    }
                };
                (kernel, Box::new(DwarfSymbolizer::new()))
            };

        let csv = if args.csv {
            let dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
            Some(CsvStreams {
                samples: RotatingWriter::new(&dir, "xcapture_samples", sample_csv_header())?,
                syscend: RotatingWriter::new(
                    &dir,
                    "xcapture_syscend",
                    vec!["PID", "TGID", "SYSCALL", "SEQ_NUM", "ENTER_NS", "EXIT_NS", "DURATION_NS", "RET"],
                )?,
                iorqend: RotatingWriter::new(
                    &dir,
                    "xcapture_iorqend",
                    vec![
                        "INSERT_PID", "INSERT_TGID", "ISSUE_PID", "ISSUE_TGID", "COMPLETE_PID",
                        "COMPLETE_TGID", "SEQ_NUM", "DEV", "SECTOR", "NR_BYTES", "CMD_FLAGS",
                        "QUEUE_NS", "SERVICE_NS", "ERRNO",
                    ],
                )?,
                kstacks: args
                    .collect_kstack()
                    .then(|| RotatingWriter::new(&dir, "xcapture_kstacks", vec!["HASH", "PID", "FRAMES"]))
                    .transpose()?,
                ustacks: args
                    .collect_ustack()
                    .then(|| RotatingWriter::new(&dir, "xcapture_ustacks", vec!["HASH", "PID", "FRAMES"]))
                    .transpose()?,
                cgroups: args
                    .cgroup_paths
                    .then(|| RotatingWriter::new(&dir, "xcapture_cgroups", vec!["CGROUP_ID", "PATH"]))
                    .transpose()?,
            })
        } else {
            None
        };

        Ok(Self {
            columns,
            username_cache: UsernameCache::new(),
            cgroup_cache: CgroupCache::new(),
            stack_symbol_cache: StackSymbolCache::new(),
            kernel_symbolizer,
            user_symbolizer,
            csv,
            emitted_cgroup_ids: HashSet::new(),
            print_stacks: args.print_stacks,
        })
    }

    /// Process one tick's worth of drained ring-buffer records.
    pub fn handle_sample(&mut self, time: &TimeCorrelation, weight_us: u64, sample: &TaskSample) {
        let username = self.username_cache.lookup(sample.euid);
        let cgroup_path = self.cgroup_cache.lookup(sample.storage.cgroup_id, sample.pid);
        let exe = cstr(&sample.exe_file);
        let filename = cstr(&sample.filename);
        let connection = render_connection(sample);
        let extra_info = extra_info::build(sample);
        let sc_entry_wallclock =
            time.syscall_entry_wallclock(sample.storage.sample_actual_ktime, sample.storage.sc_enter_time);
        let sc_ns_so_far =
            elapsed_ns_clamped(sample.storage.sample_actual_ktime, sample.storage.sc_enter_time);

        let ctx = RenderCtx {
            sample,
            weight_us,
            timestamp_ns: time.wall_from_mono(sample.storage.sample_actual_ktime) as i64,
            username: &username,
            exe: &exe,
            filename: &filename,
            connection: &connection,
            extra_info: &extra_info,
            sc_entry_time_ns: sc_entry_wallclock as i64,
            sc_ns_so_far,
            pid_ns_id: sample.storage.pid_ns_id,
            cgroup_id: sample.storage.cgroup_id,
        };

        if let Some(csv) = &mut self.csv {
            let row: Vec<String> = SAMPLE_CSV_COLUMNS.iter().map(|&id| (find(id).render)(&ctx)).collect();
            csv.samples.write_row(&row);
            if let Some(cgroups) = &mut csv.cgroups {
                if self.emitted_cgroup_ids.insert(sample.storage.cgroup_id) {
                    cgroups.write_row(&[sample.storage.cgroup_id.to_string(), cgroup_path]);
                }
            }
        } else {
            print_stdout_row(&self.columns, &ctx);
        }
    }

    pub fn handle_completion(&mut self, event: &CompletionEvent) {
        let Some(csv) = &mut self.csv else { return };
        match event.kind {
            completion_kind::SYSCALL => {
                let c = &event.syscall;
                let duration = elapsed_ns_clamped(c.exit_ktime, c.enter_ktime);
                csv.syscend.write_row(&[
                    c.pid.to_string(),
                    c.tgid.to_string(),
                    syscall_table::name_for(c.syscall_nr),
                    c.sequence_num.to_string(),
                    c.enter_ktime.to_string(),
                    c.exit_ktime.to_string(),
                    duration.to_string(),
                    c.ret.to_string(),
                ]);
            }
            completion_kind::IORQ => {
                let c = &event.iorq;
                let queue_ns = elapsed_ns_clamped(c.issue_ktime, c.insert_ktime);
                let service_ns = elapsed_ns_clamped(c.complete_ktime, c.issue_ktime);
                csv.iorqend.write_row(&[
                    c.insert_pid.to_string(),
                    c.insert_tgid.to_string(),
                    c.issue_pid.to_string(),
                    c.issue_tgid.to_string(),
                    c.complete_pid.to_string(),
                    c.complete_tgid.to_string(),
                    c.iorq_sequence_num.to_string(),
                    c.dev.to_string(),
                    c.sector.to_string(),
                    c.nr_bytes.to_string(),
                    format!("0x{:x}", c.cmd_flags),
                    queue_ns.to_string(),
                    service_ns.to_string(),
                    c.errno.to_string(),
                ]);
            }
            _ => {}
        }
    }

    pub fn handle_stack(&mut self, event: &StackTraceEvent) {
        let is_kernel = event.is_kernel != 0;
        let addrs = &event.addrs[..(event.len as usize).min(event.addrs.len())];

        if self.stack_symbol_cache.get(event.hash, is_kernel).is_none() {
            let symbolizer: &dyn Symbolizer =
                if is_kernel { self.kernel_symbolizer.as_ref() } else { self.user_symbolizer.as_ref() };
            let pid = (!is_kernel).then_some(event.pid);
            let frames = symbolizer.resolve(addrs, pid);
            self.stack_symbol_cache.insert(event.hash, is_kernel, frames);
        }

        let frames = self.stack_symbol_cache.get(event.hash, is_kernel).unwrap_or(&[]).to_vec();

        if self.print_stacks {
            println!(
                "{} {:016x} pid={} {}",
                if is_kernel { "KSTACK" } else { "USTACK" },
                event.hash,
                event.pid,
                frames.join(" <- ")
            );
        }

        if let Some(csv) = &mut self.csv {
            let stream = if is_kernel { csv.kstacks.as_mut() } else { csv.ustacks.as_mut() };
            if let Some(writer) = stream {
                writer.write_row(&[
                    format!("{:016x}", event.hash),
                    event.pid.to_string(),
                    frames.join(" <- "),
                ]);
            }
        }
    }

    /// Flush every open CSV stream. Called once per tick after draining.
    pub fn flush(&mut self) {
        if let Some(csv) = &mut self.csv {
            csv.samples.flush();
            csv.syscend.flush();
            csv.iorqend.flush();
            if let Some(w) = &mut csv.kstacks {
                w.flush();
            }
            if let Some(w) = &mut csv.ustacks {
                w.flush();
            }
            if let Some(w) = &mut csv.cgroups {
                w.flush();
            }
        }
    }

    /// Whether stdout mode is active (as opposed to `-s` CSV mode); used by
    /// the driver to decide whether to print a column header before the
    /// first tick.
    #[must_use]
    pub fn is_stdout_mode(&self) -> bool {
        self.csv.is_none()
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }
}

fn resolve_columns(args: &Args) -> Result<Vec<ColumnId>> {
    let mut columns = if !args.columns_replace.is_empty() {
        resolve_names(&args.columns_replace)?
    } else if args.wide {
        WIDE_COLUMNS.to_vec()
    } else if args.narrow {
        NARROW_COLUMNS.to_vec()
    } else {
        NORMAL_COLUMNS.to_vec()
    };

    if !args.columns_append.is_empty() {
        columns.extend(resolve_names(&args.columns_append)?);
    }
    Ok(columns)
}

fn sample_csv_header() -> Vec<&'static str> {
    SAMPLE_CSV_COLUMNS.iter().map(|&id| find(id).name).collect()
}

fn print_stdout_row(columns: &[ColumnId], ctx: &RenderCtx) {
    let rendered: Vec<String> = columns
        .iter()
        .map(|&id| {
            let def = find(id);
            format!("{:width$}", (def.render)(ctx), width = def.width)
        })
        .collect();
    println!("{}", rendered.join(" "));
}

/// Prints the header row for the currently active stdout column set.
pub fn print_header(columns: &[ColumnId]) {
    let rendered: Vec<String> =
        columns.iter().map(|&id| { let def = find(id); format!("{:width$}", def.header, width = def.width) }).collect();
    println!("{}", rendered.join(" "));
}

fn cstr(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn render_connection(sample: &TaskSample) -> String {
    if sample.has_socket_info == 0 {
        return "-".to_string();
    }
    let sock = &sample.sock_info;
    match sock.family {
        xcapture_common::socket::AF_INET => {
            let saddr = Ipv4Addr::from(sock.saddr_v4.to_be());
            let daddr = Ipv4Addr::from(sock.daddr_v4.to_be());
            format!("{}:{}->{}:{}", saddr, sock.sport, daddr, sock.dport)
        }
        xcapture_common::socket::AF_INET6 => {
            let saddr = Ipv6Addr::from(sock.saddr_v6);
            let daddr = Ipv6Addr::from(sock.daddr_v6);
            format!("[{}]:{}->[{}]:{}", saddr, sock.sport, daddr, sock.dport)
        }
        xcapture_common::socket::AF_UNIX => {
            let path_len = (sock.unix_path_len as usize).min(sock.unix_path.len());
            let path = String::from_utf8_lossy(&sock.unix_path[..path_len]);
            format!("unix:{path}")
        }
        _ => "-".to_string(),
    }
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
    fn connection_renders_dash_without_socket_info() {
        assert_eq!(render_connection(&zeroed_sample()), "-");
    }

    #[test]
    fn connection_renders_ipv4_tuple() {
        let mut sample = zeroed_sample();
        sample.has_socket_info = 1;
        sample.sock_info.family = xcapture_common::socket::AF_INET;
        sample.sock_info.saddr_v4 = u32::from(Ipv4Addr::new(127, 0, 0, 1)).to_be();
        sample.sock_info.daddr_v4 = u32::from(Ipv4Addr::new(10, 0, 0, 1)).to_be();
        sample.sock_info.sport = 5000;
        sample.sock_info.dport = 80;
        assert_eq!(render_connection(&sample), "127.0.0.1:5000->10.0.0.1:80");
    }

    #[test]
    fn all_columns_list_has_no_duplicate_render_targets() {
        // every narrow/normal/wide column must resolve; catches a typo in
        // the predefined-set tables before it ever reaches a live tick.
        for set in [NARROW_COLUMNS, NORMAL_COLUMNS, WIDE_COLUMNS, ALL_COLUMNS] {
            for &id in set {
                let _ = find(id);
            }
        }
    }
}
