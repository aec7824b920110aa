//! Kernel-address symbolizer: nearest-symbol-below lookup against
//! `/proc/kallsyms`, no external process required.

use anyhow::{Context, Result};
use std::fs;

use super::Symbolizer;

/// One `/proc/kallsyms` entry: address, symbol name. Sorted by address so
/// resolution is a binary search for the nearest symbol at or below the
/// queried address.
pub struct KallsymsSymbolizer {
    symbols: Vec<(u64, String)>,
}

impl KallsymsSymbolizer {
    /// # Errors
    /// Returns an error if `/proc/kallsyms` cannot be read (e.g.
    /// `kptr_restrict` hides addresses from an unprivileged reader).
    pub fn load() -> Result<Self> {
        let text = fs::read_to_string("/proc/kallsyms").context("Failed to read /proc/kallsyms")?;
        let mut symbols: Vec<(u64, String)> = text
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let addr = u64::from_str_radix(parts.next()?, 16).ok()?;
                let _kind = parts.next()?;
                let name = parts.next()?;
                Some((addr, name.to_string()))
            })
            .filter(|(addr, _)| *addr != 0)
            .collect();
        symbols.sort_unstable_by_key(|(addr, _)| *addr);
        Ok(Self { symbols })
    }

    /// Nearest symbol at or below `addr`, with its offset from that symbol's
    /// start. `None` if `addr` is below every known symbol.
    fn lookup(&self, addr: u64) -> Option<(&str, u64)> {
        let idx = self.symbols.partition_point(|(sym_addr, _)| *sym_addr <= addr);
        if idx == 0 {
            return None;
        }
        let (sym_addr, name) = &self.symbols[idx - 1];
        Some((name.as_str(), addr - sym_addr))
    }
}

impl Symbolizer for KallsymsSymbolizer {
    fn resolve(&self, addrs: &[u64], _pid: Option<u32>) -> Vec<String> {
        addrs
            .iter()
            .map(|&addr| match self.lookup(addr) {
                Some((name, 0)) => name.to_string(),
                Some((name, offset)) => format!("{name}+0x{offset:x}"),
                None => format!("0x{addr:x}"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(addrs: &[(u64, &str)]) -> KallsymsSymbolizer {
        KallsymsSymbolizer {
            symbols: addrs.iter().map(|(a, n)| (*a, (*n).to_string())).collect(),
        }
    }

    #[test]
    fn exact_address_has_zero_offset() {
        let k = sym(&[(0x1000, "foo"), (0x2000, "bar")]);
        assert_eq!(k.resolve(&[0x1000], None), vec!["foo".to_string()]);
    }

    #[test]
    fn in_between_address_reports_offset_from_preceding_symbol() {
        let k = sym(&[(0x1000, "foo"), (0x2000, "bar")]);
        assert_eq!(k.resolve(&[0x1500], None), vec!["foo+0x500".to_string()]);
    }

    #[test]
    fn below_every_symbol_falls_back_to_hex() {
        let k = sym(&[(0x1000, "foo")]);
        assert_eq!(k.resolve(&[0x500], None), vec!["0x500".to_string()]);
    }
}
