//! Profiling core: BTF offset discovery and eBPF program loading/attachment.

pub mod btf_offsets;
pub mod ebpf_setup;

pub use btf_offsets::discover_offsets;
pub use ebpf_setup::{
    attach_probes, init_ebpf_logger, load_ebpf_program, pin_maps, populate_filter_config,
    populate_offsets, unpin_maps,
};
