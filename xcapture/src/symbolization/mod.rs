//! # Symbol Resolution and Address Translation
//!
//! Symbolization itself is out of scope for the core sampler (the wire
//! contract only ever carries a stack *hash*); this module is the opaque
//! "symbolizer" the design defers to, given an address list and an optional
//! pid. Three implementations ship:
//!
//! - [`NullSymbolizer`] — the default when `-l` is passed or no executable
//!   is resolvable. Formats every frame as `0x{addr:x}`.
//! - [`kallsyms::KallsymsSymbolizer`] — kernel addresses, nearest-symbol-below
//!   lookup against `/proc/kallsyms`.
//! - [`dwarf::DwarfSymbolizer`] — user addresses, DWARF debug info via
//!   `addr2line`/`gimli`/`object`, PIE-adjusted using `/proc/<pid>/exe` and
//!   its memory map.

pub mod dwarf;
pub mod kallsyms;
pub mod memory_maps;

pub use dwarf::DwarfSymbolizer;
pub use kallsyms::KallsymsSymbolizer;
pub use memory_maps::{parse_memory_maps, MemoryRange};

/// Resolves a list of raw addresses to display strings. Implementations may
/// cache internally; `pid` disambiguates per-process address spaces (kernel
/// symbolizers ignore it).
pub trait Symbolizer {
    fn resolve(&self, addrs: &[u64], pid: Option<u32>) -> Vec<String>;
}

/// Default symbolizer: no resolution is attempted, every frame renders as
/// its raw hex address. Used when `-l` is passed, or when no more specific
/// symbolizer could be constructed for a given stack kind.
#[derive(Default)]
pub struct NullSymbolizer;

impl Symbolizer for NullSymbolizer {
    fn resolve(&self, addrs: &[u64], _pid: Option<u32>) -> Vec<String> {
        addrs.iter().map(|addr| format!("0x{addr:x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_symbolizer_formats_hex() {
        let sym = NullSymbolizer;
        let out = sym.resolve(&[0xdead_beef, 0x1234], None);
        assert_eq!(out, vec!["0xdeadbeef".to_string(), "0x1234".to_string()]);
    }
}
