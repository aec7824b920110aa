//! CLI argument definitions.
//!
//! The flag set is fixed by the external interface contract (short,
//! mnemonic flags rather than long GNU-style ones, matching the original
//! tool): `-a/-P/-p/-t/-T/-F/-o/-k/-u/-s/-C/-g/-G/-w/-n/-i/-l/-v/-X` plus
//! `--daemon-ports`.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "xcapture",
    about = "Low-overhead Linux thread-activity sampler",
    after_help = "\
EXAMPLES:
    sudo xcapture                       Sample once a second, print to stdout
    sudo xcapture -s -o /var/log/xcap    Write hourly-rotated CSV streams
    sudo xcapture -p 1234 -F 10 -w       Sample one TGID at 10 Hz, wide columns
    sudo xcapture -a -k -u -T            Show every task with stack collection"
)]
pub struct Args {
    /// Show all tasks that survive the fast-path filter (disable the
    /// interest filter: daemon-port heuristic, async-I/O keep rules, ...).
    #[arg(short = 'a', long = "all")]
    pub show_all: bool,

    /// Filter to the current process only. Accepted for compatibility with
    /// the original CLI surface; xcapture already excludes itself
    /// unconditionally, so this flag has no additional effect.
    #[arg(short = 'P')]
    pub self_only: bool,

    /// Filter to a single TGID.
    #[arg(short = 'p', value_name = "TGID")]
    pub filter_tgid: Option<u32>,

    /// Comma-separated list of tracking/collection kinds to enable:
    /// `iorq`, `syscall`, `k` (kernel stacks), `u` (user stacks). Replaces
    /// the default `iorq,syscall` set rather than adding to it.
    #[arg(short = 't', value_name = "KINDS", value_delimiter = ',')]
    pub kinds: Vec<String>,

    /// Print the set of unique stack hashes seen each tick to stdout.
    #[arg(short = 'T')]
    pub print_stacks: bool,

    /// Sample frequency in Hz (default 1 Hz, i.e. one tick per second).
    #[arg(short = 'F', value_name = "HZ", default_value_t = 1)]
    pub sample_freq_hz: u32,

    /// Output directory for CSV mode (`-s`).
    #[arg(short = 'o', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Dump kernel stack traces (implies kernel-stack collection, writes
    /// the `xcapture_kstacks` stream in CSV mode).
    #[arg(short = 'k')]
    pub kernel_stacks: bool,

    /// Dump user stack traces (implies user-stack collection, writes the
    /// `xcapture_ustacks` stream in CSV mode).
    #[arg(short = 'u')]
    pub user_stacks: bool,

    /// Write CSV (structured) output instead of the stdout column table.
    #[arg(short = 's')]
    pub csv: bool,

    /// Resolve and write cgroup paths (the `xcapture_cgroups` stream).
    /// Requires `-s`.
    #[arg(short = 'C', requires = "csv")]
    pub cgroup_paths: bool,

    /// Replace the active stdout column set with this comma-separated list.
    #[arg(short = 'g', value_name = "COLS", value_delimiter = ',')]
    pub columns_replace: Vec<String>,

    /// Append these columns to the active stdout column set.
    #[arg(short = 'G', value_name = "COLS", value_delimiter = ',')]
    pub columns_append: Vec<String>,

    /// Use the predefined "wide" column set.
    #[arg(short = 'w', conflicts_with = "narrow")]
    pub wide: bool,

    /// Use the predefined "narrow" column set.
    #[arg(short = 'n', conflicts_with = "wide")]
    pub narrow: bool,

    /// Stop after N iterations (0 = unlimited).
    #[arg(short = 'i', value_name = "N", default_value_t = 0)]
    pub iterations: u64,

    /// Disable symbolization (stack hashes are reported but frames are not
    /// resolved to names).
    #[arg(short = 'l')]
    pub no_symbolize: bool,

    /// Verbose logging. Sets `RUST_LOG=debug` if the environment variable
    /// is not already set.
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Enable read/write payload capture (off by default).
    #[arg(short = 'X')]
    pub capture_payloads: bool,

    /// Local-port threshold for the daemon-port heuristic.
    #[arg(long = "daemon-ports", value_name = "N", default_value_t = 10_000)]
    pub daemon_ports: u16,
}

impl Args {
    #[must_use]
    pub fn track_iorq(&self) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|k| k == "iorq")
    }

    #[must_use]
    pub fn track_syscall(&self) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|k| k == "syscall")
    }

    #[must_use]
    pub fn collect_kstack(&self) -> bool {
        self.kernel_stacks || self.kinds.iter().any(|k| k == "k")
    }

    #[must_use]
    pub fn collect_ustack(&self) -> bool {
        self.user_stacks || self.kinds.iter().any(|k| k == "u")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kinds_track_both_completion_streams() {
        let args = Args::parse_from(["xcapture"]);
        assert!(args.track_iorq());
        assert!(args.track_syscall());
        assert!(!args.collect_kstack());
        assert!(!args.collect_ustack());
    }

    #[test]
    fn explicit_kinds_replace_the_default_set() {
        let args = Args::parse_from(["xcapture", "-t", "k,u"]);
        assert!(!args.track_iorq());
        assert!(!args.track_syscall());
        assert!(args.collect_kstack());
        assert!(args.collect_ustack());
    }

    #[test]
    fn dash_k_implies_kernel_stack_collection_without_dash_t() {
        let args = Args::parse_from(["xcapture", "-k"]);
        assert!(args.collect_kstack());
        assert!(args.track_iorq());
    }

    #[test]
    fn wide_and_narrow_are_mutually_exclusive() {
        let result = Args::try_parse_from(["xcapture", "-w", "-n"]);
        assert!(result.is_err());
    }

    #[test]
    fn cgroup_paths_requires_csv_mode() {
        let result = Args::try_parse_from(["xcapture", "-C"]);
        assert!(result.is_err());
    }
}
