// String formatting intentionally uses format! for clarity.
#![allow(clippy::format_push_string)]

//! User-address symbolizer: DWARF debug info via `addr2line`/`gimli`,
//! scoped per-pid through `/proc/<pid>/exe` and memory-map offset
//! adjustment (PIE binaries are loaded at a runtime-randomized base; the
//! DWARF info is keyed by file offset, not runtime address).

use addr2line::Context;
use gimli::{EndianRcSlice, RunTimeEndian};
use object::{Object, ObjectSection};
use rustc_demangle::demangle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;

use super::memory_maps::{parse_memory_maps, MemoryRange};
use super::Symbolizer;

type Dwarf = Context<EndianRcSlice<RunTimeEndian>>;

struct PerPidContext {
    ctx: Dwarf,
    memory_range: Option<MemoryRange>,
    cache: HashMap<u64, String>,
}

/// Per-pid DWARF symbolizer. Each pid's executable is parsed lazily on
/// first use and kept resident for the process's lifetime; a pid with no
/// resolvable executable (short-lived process, permission denied, no debug
/// info) degrades that pid's frames to the `0x{addr:x}` fallback rather
/// than failing the whole resolve call.
#[derive(Default)]
pub struct DwarfSymbolizer {
    per_pid: RefCell<HashMap<u32, Option<PerPidContext>>>,
}

impl DwarfSymbolizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn build_context(pid: u32) -> Option<PerPidContext> {
        let exe_path = fs::read_link(format!("/proc/{pid}/exe")).ok()?;
        let binary_data = fs::read(&exe_path).ok()?;
        let obj_file = object::File::parse(&*binary_data).ok()?;

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };
        let load_section =
            |id: gimli::SectionId| -> std::result::Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };
        let dwarf = gimli::Dwarf::load(&load_section).ok()?;
        let ctx = Context::from_dwarf(dwarf).ok()?;
        let memory_range = parse_memory_maps(pid as i32, &exe_path.to_string_lossy()).ok();

        Some(PerPidContext { ctx, memory_range, cache: HashMap::new() })
    }

    fn resolve_one(ctx: &mut PerPidContext, addr: u64) -> String {
        if let Some(cached) = ctx.cache.get(&addr) {
            return cached.clone();
        }
        let file_offset = ctx
            .memory_range
            .filter(|range| range.contains(addr))
            .map_or(addr, |range| addr - range.start);

        let resolved = Self::format_frame(&ctx.ctx, file_offset, addr);
        ctx.cache.insert(addr, resolved.clone());
        resolved
    }

    fn format_frame(ctx: &Dwarf, file_offset: u64, original_addr: u64) -> String {
        let Ok(mut frame_iter) = ctx.find_frames(file_offset).skip_all_loads() else {
            return format!("0x{original_addr:x}");
        };
        let Ok(Some(frame)) = frame_iter.next() else {
            return format!("0x{original_addr:x}");
        };
        let function = frame
            .function
            .and_then(|f| f.demangle().ok().map(|s| demangle(&s).to_string()))
            .unwrap_or_else(|| format!("0x{original_addr:x}"));
        match frame.location.and_then(|loc| loc.file.map(|f| (f.to_string(), loc.line))) {
            Some((file, Some(line))) => format!("{function} ({file}:{line})"),
            Some((file, None)) => format!("{function} ({file})"),
            None => function,
        }
    }
}

impl Symbolizer for DwarfSymbolizer {
    fn resolve(&self, addrs: &[u64], pid: Option<u32>) -> Vec<String> {
        let Some(pid) = pid else {
            return addrs.iter().map(|addr| format!("0x{addr:x}")).collect();
        };

        let mut per_pid = self.per_pid.borrow_mut();
        let entry = per_pid.entry(pid).or_insert_with(|| Self::build_context(pid));

        match entry {
            Some(ctx) => addrs.iter().map(|&addr| Self::resolve_one(ctx, addr)).collect(),
            None => addrs.iter().map(|addr| format!("0x{addr:x}")).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pid_falls_back_to_hex() {
        let sym = DwarfSymbolizer::new();
        let out = sym.resolve(&[0x1234], Some(999_999_999));
        assert_eq!(out, vec!["0x1234".to_string()]);
    }

    #[test]
    fn no_pid_falls_back_to_hex() {
        let sym = DwarfSymbolizer::new();
        let out = sym.resolve(&[0x1234, 0x5678], None);
        assert_eq!(out, vec!["0x1234".to_string(), "0x5678".to_string()]);
    }
}
