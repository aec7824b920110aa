//! BTF-based kernel struct field offset discovery.
//!
//! There is no `vmlinux` CO-RE bindings crate in this workspace (see
//! `xcapture-ebpf/src/offsets.rs`), so the kernel program cannot address
//! struct fields by name the way a libbpf CO-RE skeleton would. Instead we
//! walk the running kernel's BTF once here, at load time, resolve every
//! field the eBPF side touches to a byte offset, and write the resulting
//! table into the `OFFSETS` map before any probe runs. The numeric
//! `FieldId` values below MUST stay in lockstep with the enum of the same
//! name in `xcapture-ebpf/src/offsets.rs` — there is no shared crate for
//! it because the eBPF side cannot depend on `aya::Btf`.

use anyhow::{Context, Result};
use aya::{Btf, BtfKind};
use std::collections::HashMap;

/// Mirrors `xcapture_ebpf::offsets::FieldId`. Kept as a flat numeric table
/// rather than a shared enum so this crate's BTF-walking code doesn't leak
/// into the `#![no_std]` eBPF crate.
const FIELD_TABLE: &[(u32, &str, &str)] = &[
    (0, "task_struct", "__state"),
    (1, "task_struct", "pid"),
    (2, "task_struct", "tgid"),
    (3, "task_struct", "flags"),
    (4, "task_struct", "on_cpu"),
    (5, "task_struct", "on_rq"),
    (6, "task_struct", "migration_pending"),
    (7, "task_struct", "cred"),
    (8, "task_struct", "comm"),
    (9, "task_struct", "mm"),
    (10, "task_struct", "files"),
    (11, "task_struct", "nvcsw"),
    (12, "task_struct", "nivcsw"),
    (13, "task_struct", "thread"),
    (14, "task_struct", "nsproxy"),
    (15, "task_struct", "cgroups"),
    (16, "cred", "euid"),
    (17, "mm_struct", "exe_file"),
    (18, "files_struct", "fdt"),
    (19, "fdtable", "fd"),
    (20, "fdtable", "max_fds"),
    (21, "file", "f_inode"),
    (22, "file", "f_op"),
    (23, "file", "private_data"),
    (24, "inode", "i_mode"),
    (25, "inode", "i_size"),
    (26, "socket", "sk"),
    (27, "sock_common", "skc_family"),
    (28, "sock_common", "skc_rcv_saddr"),
    (29, "sock_common", "skc_daddr"),
    (30, "sock_common", "skc_v6_rcv_saddr"),
    (31, "sock_common", "skc_v6_daddr"),
    (32, "sock_common", "skc_num"),
    (33, "sock_common", "skc_dport"),
    (34, "sock_common", "skc_state"),
    (35, "inet_connection_sock", "icsk_ca_state"),
    (36, "tcp_sock", "snd_cwnd"),
    (37, "tcp_sock", "snd_ssthresh"),
    (38, "tcp_sock", "rcv_wnd"),
    (39, "tcp_sock", "snd_wnd"),
    (40, "tcp_sock", "srtt_us"),
    (41, "tcp_sock", "mdev_us"),
    (42, "tcp_sock", "rtt_min"),
    (43, "tcp_sock", "packets_out"),
    (44, "tcp_sock", "retrans_out"),
    (45, "tcp_sock", "max_packets_out"),
    (46, "tcp_sock", "total_retrans"),
    (47, "tcp_sock", "write_seq"),
    (48, "tcp_sock", "snd_una"),
    (49, "tcp_sock", "snd_nxt"),
    (50, "tcp_sock", "rcv_nxt"),
    (51, "tcp_sock", "copied_seq"),
    (52, "tcp_sock", "lost_out"),
    (53, "tcp_sock", "sacked_out"),
    (54, "tcp_sock", "reordering"),
    (55, "tcp_sock", "delivered"),
    (56, "tcp_sock", "delivered_ce"),
    (57, "tcp_sock", "bytes_sent"),
    (58, "tcp_sock", "bytes_acked"),
    (59, "tcp_sock", "bytes_received"),
    // Lives on inet_connection_sock in upstream kernels, not tcp_sock; kept
    // under the same lookup path since both structs start at the same
    // address for a tcp_sock (icsk is sk's first member).
    (60, "inet_connection_sock", "icsk_retransmits"),
    (61, "request", "start_time_ns"),
    (62, "request", "io_start_time_ns"),
    (63, "request", "__data_len"),
    (64, "io_ring_ctx", "rings"),
    (65, "io_ring_ctx", "sq_entries"),
    (66, "io_ring_ctx", "cq_entries"),
    (67, "io_ring_ctx", "sq_sqes"),
    (68, "io_rings", "sq_tail"),
    (69, "io_rings", "sq_head"),
    (70, "io_rings", "cq_tail"),
    (71, "io_rings", "cq_head"),
    (72, "io_uring_sqe", "opcode"),
    (73, "io_uring_sqe", "flags"),
    (74, "io_uring_sqe", "fd"),
    (75, "io_uring_sqe", "off"),
    (76, "io_uring_sqe", "len"),
    (77, "io_uring_sqe", "rw_flags"),
    (78, "kiocb", "ki_filp"),
    (89, "pt_regs", "orig_ax"),
    (90, "pt_regs", "di"),
    (91, "pt_regs", "si"),
    (92, "pt_regs", "dx"),
    (93, "pt_regs", "r10"),
    (94, "pt_regs", "r8"),
    (95, "pt_regs", "r9"),
    (96, "pt_regs", "bp"),
    (97, "pt_regs", "sp"),
    (100, "unix_sock", "addr"),
    (101, "unix_address", "len"),
    (102, "unix_address", "name"),
    (103, "sock", "sk_peer_pid"),
    (104, "dentry", "d_inode"),
    (105, "inode", "i_ino"),
    (108, "nsproxy", "pid_ns_for_children"),
    (110, "css_set", "dfl_cgrp"),
    (111, "cgroup", "kn"),
    (112, "kernfs_node", "id"),
];

/// Two-hop fields: `offsetof(outer, outer_field) + offsetof(inner, inner_field)`,
/// for nested members the single-level [`FIELD_TABLE`] can't express (e.g.
/// `file->f_path.dentry`, which requires stepping through the embedded
/// `struct path` to reach `dentry`).
const COMPOUND_FIELD_TABLE: &[(u32, (&str, &str), (&str, &str))] = &[
    (98, ("file", "f_path"), ("path", "dentry")),
    (99, ("dentry", "d_name"), ("qstr", "name")),
    (106, ("pid", "numbers"), ("upid", "nr")),
    (107, ("inode", "i_uid"), ("kuid_t", "val")),
    (109, ("pid_namespace", "ns"), ("ns_common", "inum")),
];

/// Walks `/sys/kernel/btf/vmlinux` and resolves every field in
/// [`FIELD_TABLE`] to a byte offset within its containing struct. A field
/// this kernel's BTF doesn't carry (renamed, removed, or belonging to a
/// struct `io_rings`'s anonymous nested `sq`/`cq` members that some BTF
/// generations flatten differently) is simply omitted from the result; the
/// eBPF side treats a missing offset as "can't enrich this", never as "read
/// garbage".
pub fn discover_offsets() -> Result<HashMap<u32, u64>> {
    let btf = Btf::from_sys_fs().context("failed to parse /sys/kernel/btf/vmlinux")?;
    let mut offsets = HashMap::with_capacity(FIELD_TABLE.len());

    for &(field_id, struct_name, field_name) in FIELD_TABLE {
        match resolve_one(&btf, struct_name, field_name) {
            Some(byte_offset) => {
                offsets.insert(field_id, byte_offset);
            }
            None => {
                log::debug!(
                    "BTF offset discovery: {struct_name}::{field_name} not found, \
                     enrichment using field {field_id} will degrade to empty"
                );
            }
        }
    }

    for &(field_id, (outer_struct, outer_field), (inner_struct, inner_field)) in COMPOUND_FIELD_TABLE {
        let outer = resolve_one(&btf, outer_struct, outer_field);
        let inner = resolve_one(&btf, inner_struct, inner_field);
        match (outer, inner) {
            (Some(a), Some(b)) => {
                offsets.insert(field_id, a + b);
            }
            _ => {
                log::debug!(
                    "BTF offset discovery: {outer_struct}::{outer_field} + \
                     {inner_struct}::{inner_field} not found, enrichment using field \
                     {field_id} will degrade to empty"
                );
            }
        }
    }

    Ok(offsets)
}

fn resolve_one(btf: &Btf, struct_name: &str, field_name: &str) -> Option<u64> {
    let type_id = btf.id_by_type_name_kind(struct_name, BtfKind::Struct).ok()?;
    let ty = btf.type_by_id(type_id).ok()?;
    let members = ty.members()?;

    for member in members {
        let name = btf.type_name(member).ok()?;
        if name == field_name {
            // BTF member offsets are in bits; every field we resolve here is
            // byte-aligned (no bitfields among them).
            return Some(u64::from(member.offset()) / 8);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_table_has_no_duplicate_ids() {
        let mut ids: Vec<u32> = FIELD_TABLE
            .iter()
            .map(|(id, _, _)| *id)
            .chain(COMPOUND_FIELD_TABLE.iter().map(|(id, _, _)| *id))
            .collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len(), "duplicate FieldId across FIELD_TABLE/COMPOUND_FIELD_TABLE");
    }
}
