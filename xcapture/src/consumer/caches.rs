//! The three process-wide lookup caches the Consumer consults once per
//! sampled task per tick. Each trades a little memory for avoiding a
//! syscall/file-read per row; sizes and eviction policy are fixed by §6 /
//! §4.5 rather than left to a general-purpose cache crate, since the
//! original tool's `cgroup_cache.h` shape (a small fixed hash table with a
//! direct-mapped or chained bucket array) is itself part of the contract
//! being reimplemented.

use std::collections::HashMap;
use std::fs;

const USERNAME_BUCKETS: usize = 256;
const CGROUP_BUCKETS: usize = 4096;
const STACK_SYMBOL_BUCKETS: usize = 4096;

/// uid → username, 256 direct-mapped buckets (`uid % 256`). A collision
/// simply overwrites the bucket; the next lookup for the evicted uid
/// re-reads `/etc/passwd`. Refreshed wholesale on every miss since
/// `/etc/passwd` is cheap to parse and rarely changes mid-run.
pub struct UsernameCache {
    buckets: Vec<Option<(u32, String)>>,
}

impl Default for UsernameCache {
    fn default() -> Self {
        Self { buckets: vec![None; USERNAME_BUCKETS] }
    }
}

impl UsernameCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&mut self, uid: u32) -> String {
        let idx = (uid as usize) % USERNAME_BUCKETS;
        if let Some((cached_uid, name)) = &self.buckets[idx] {
            if *cached_uid == uid {
                return name.clone();
            }
        }
        let name = read_passwd_entry(uid).unwrap_or_else(|| uid.to_string());
        self.buckets[idx] = Some((uid, name.clone()));
        name
    }
}

fn read_passwd_entry(uid: u32) -> Option<String> {
    let text = fs::read_to_string("/etc/passwd").ok()?;
    text.lines().find_map(|line| {
        let mut fields = line.split(':');
        let name = fields.next()?;
        let _passwd = fields.next()?;
        let entry_uid: u32 = fields.next()?.parse().ok()?;
        (entry_uid == uid).then(|| name.to_string())
    })
}

/// cgroup id → path, 4096 chained buckets (`id % 4096`, each bucket a small
/// `Vec` of entries). Populated lazily from `/proc/<pid>/cgroup` the first
/// time a given cgroup id is seen for any pid; the path itself, once
/// resolved, doesn't change for the lifetime of the cgroup.
#[derive(Default)]
pub struct CgroupCache {
    buckets: HashMap<u64, Vec<(u64, String)>>,
}

impl CgroupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&mut self, cgroup_id: u64, pid: u32) -> String {
        let idx = cgroup_id % CGROUP_BUCKETS as u64;
        if let Some(chain) = self.buckets.get(&idx) {
            if let Some((_, path)) = chain.iter().find(|(id, _)| *id == cgroup_id) {
                return path.clone();
            }
        }
        let path = read_cgroup_path(pid).unwrap_or_else(|| "-".to_string());
        self.buckets.entry(idx).or_default().push((cgroup_id, path.clone()));
        path
    }
}

fn read_cgroup_path(pid: u32) -> Option<String> {
    let text = fs::read_to_string(format!("/proc/{pid}/cgroup")).ok()?;
    // cgroup v2 is the single `0::<path>` line; v1 hybrid layouts carry
    // several numbered hierarchies, take the first as the best-effort path.
    let line = text.lines().next()?;
    let path = line.splitn(3, ':').nth(2)?;
    Some(path.to_string())
}

/// `(stack hash, is_kernel)` → symbolized frame list, 4096 direct-mapped
/// buckets keyed by the hash alone (`hash % 4096`); `is_kernel` is stored
/// alongside the hash to validate the bucket on lookup since a kernel and a
/// user stack can collide in the low bits of an FNV-1a-64 hash.
#[derive(Default)]
pub struct StackSymbolCache {
    buckets: Vec<Option<(u64, bool, Vec<String>)>>,
}

impl StackSymbolCache {
    #[must_use]
    pub fn new() -> Self {
        Self { buckets: vec![None; STACK_SYMBOL_BUCKETS] }
    }

    #[must_use]
    pub fn get(&self, hash: u64, is_kernel: bool) -> Option<&[String]> {
        let idx = (hash as usize) % STACK_SYMBOL_BUCKETS;
        self.buckets[idx].as_ref().and_then(|(cached_hash, cached_kind, frames)| {
            (*cached_hash == hash && *cached_kind == is_kernel).then_some(frames.as_slice())
        })
    }

    pub fn insert(&mut self, hash: u64, is_kernel: bool, frames: Vec<String>) {
        let idx = (hash as usize) % STACK_SYMBOL_BUCKETS;
        self.buckets[idx] = Some((hash, is_kernel, frames));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_cache_falls_back_to_uid_string_when_unresolvable() {
        let mut cache = UsernameCache::new();
        let name = cache.lookup(u32::MAX);
        assert_eq!(name, u32::MAX.to_string());
    }

    #[test]
    fn username_cache_caches_the_bucket_on_second_lookup() {
        let mut cache = UsernameCache::new();
        let first = cache.lookup(u32::MAX);
        let second = cache.lookup(u32::MAX);
        assert_eq!(first, second);
    }

    #[test]
    fn cgroup_cache_unresolvable_pid_falls_back_to_dash() {
        let mut cache = CgroupCache::new();
        assert_eq!(cache.lookup(42, 0), "-");
    }

    #[test]
    fn stack_symbol_cache_round_trips() {
        let mut cache = StackSymbolCache::new();
        assert!(cache.get(123, true).is_none());
        cache.insert(123, true, vec!["foo".to_string(), "bar".to_string()]);
        assert_eq!(cache.get(123, true), Some(&["foo".to_string(), "bar".to_string()][..]));
    }

    #[test]
    fn stack_symbol_cache_distinguishes_kernel_and_user_on_collision() {
        let mut cache = StackSymbolCache::new();
        cache.insert(123, true, vec!["kernel_frame".to_string()]);
        assert!(cache.get(123, false).is_none());
    }
}
