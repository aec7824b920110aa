#![no_std]

//! Wire types shared between the `xcapture-ebpf` kernel program and the
//! `xcapture` userspace consumer. Every `#[repr(C)]` type here crosses the
//! ring-buffer or map boundary; the kernel side writes it, the `user` feature
//! (enabled only in the userspace binary) derives `aya::Pod` so it can be
//! read back out of the raw ring buffer bytes.

pub mod completion;
pub mod consts;
pub mod events;
pub mod filter_config;
pub mod iorq_tracking;
pub mod sched_state;
pub mod socket;
pub mod task_state;
pub mod tcp_stats;
pub mod time_correlation;

pub use completion::{completion_kind, CompletionEvent};
pub use consts::event_type;
pub use events::{IorqCompletion, StackTraceEvent, SyscallCompletion, TaskSample};
pub use filter_config::FilterConfig;
pub use iorq_tracking::IorqTrackingEntry;
pub use sched_state::{decode_state_label, state_suffix};
pub use socket::{tcp_state, SocketInfo};
pub use task_state::TaskState;
pub use tcp_stats::TcpStatsInfo;
pub use time_correlation::{elapsed_ns_clamped, TimeCorrelation};
