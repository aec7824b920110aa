//! Declarative stdout column engine, generalizing the original tool's
//! `column_def_t[]` / `column_id_t` pair. Each [`ColumnDef`] pairs a name
//! (what `-g`/`-G` match against) with a pure render function over a
//! [`RenderCtx`]; the four predefined sets below are concrete column lists,
//! exactly as §6 requires.

use xcapture_common::{decode_state_label, state_suffix, tcp_state, SocketInfo, TaskSample};

/// Everything a column's render function needs, assembled once per sampled
/// task per tick by the Consumer.
pub struct RenderCtx<'a> {
    pub sample: &'a TaskSample,
    pub weight_us: u64,
    pub timestamp_ns: i64,
    pub username: &'a str,
    pub exe: &'a str,
    pub filename: &'a str,
    pub connection: &'a str,
    pub extra_info: &'a str,
    pub sc_entry_time_ns: i64,
    pub sc_ns_so_far: u64,
    pub pid_ns_id: u32,
    pub cgroup_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnId {
    Timestamp,
    WeightUs,
    Tid,
    Tgid,
    Pidns,
    CgroupId,
    State,
    Username,
    Exe,
    Comm,
    Syscall,
    SyscallActive,
    SyscEntryTime,
    SyscNsSoFar,
    SyscSeqNum,
    IorqSeqNum,
    SyscArg1,
    SyscArg2,
    SyscArg3,
    SyscArg4,
    SyscArg5,
    SyscArg6,
    Filename,
    Connection,
    ConnState,
    ExtraInfo,
    KstackHash,
    UstackHash,
}

pub struct ColumnDef {
    pub id: ColumnId,
    pub name: &'static str,
    pub header: &'static str,
    pub width: usize,
    pub render: fn(&RenderCtx) -> String,
}

fn comm_str(ctx: &RenderCtx) -> String {
    let end = ctx.sample.comm.iter().position(|&b| b == 0).unwrap_or(ctx.sample.comm.len());
    String::from_utf8_lossy(&ctx.sample.comm[..end]).into_owned()
}

fn state_str(ctx: &RenderCtx) -> String {
    let label = decode_state_label(ctx.sample.state)
        .map_or_else(|| format!("0x{:x}", ctx.sample.state & 0xffff), str::to_string);
    let suffix = state_suffix(
        ctx.sample.on_rq != 0,
        ctx.sample.on_cpu != 0,
        ctx.sample.migration_pending != 0,
    );
    format!("{label}{suffix}")
}

fn syscall_name(nr: i32) -> String {
    if nr < 0 {
        "-".to_string()
    } else {
        super::syscall_table::name_for(nr)
    }
}

fn conn_state_str(sock: &SocketInfo) -> &'static str {
    match sock.state {
        tcp_state::ESTABLISHED => "ESTABLISHED",
        tcp_state::SYN_SENT => "SYN_SENT",
        tcp_state::SYN_RECV => "SYN_RECV",
        tcp_state::FIN_WAIT1 => "FIN_WAIT1",
        tcp_state::FIN_WAIT2 => "FIN_WAIT2",
        tcp_state::TIME_WAIT => "TIME_WAIT",
        tcp_state::CLOSE => "CLOSE",
        tcp_state::CLOSE_WAIT => "CLOSE_WAIT",
        tcp_state::LAST_ACK => "LAST_ACK",
        tcp_state::LISTEN => "LISTEN",
        tcp_state::CLOSING => "CLOSING",
        _ => "-",
    }
}

pub const COLUMN_DEFS: &[ColumnDef] = &[
    ColumnDef {
        id: ColumnId::Timestamp,
        name: "TIMESTAMP",
        header: "TIMESTAMP",
        width: 20,
        render: |ctx| ctx.timestamp_ns.to_string(),
    },
    ColumnDef {
        id: ColumnId::WeightUs,
        name: "WEIGHT_US",
        header: "WEIGHT_US",
        width: 10,
        render: |ctx| ctx.weight_us.to_string(),
    },
    ColumnDef { id: ColumnId::Tid, name: "TID", header: "TID", width: 8, render: |ctx| ctx.sample.pid.to_string() },
    ColumnDef {
        id: ColumnId::Tgid,
        name: "TGID",
        header: "TGID",
        width: 8,
        render: |ctx| ctx.sample.tgid.to_string(),
    },
    ColumnDef {
        id: ColumnId::Pidns,
        name: "PIDNS",
        header: "PIDNS",
        width: 10,
        render: |ctx| ctx.pid_ns_id.to_string(),
    },
    ColumnDef {
        id: ColumnId::CgroupId,
        name: "CGROUP_ID",
        header: "CGROUP_ID",
        width: 12,
        render: |ctx| ctx.cgroup_id.to_string(),
    },
    ColumnDef { id: ColumnId::State, name: "STATE", header: "STATE", width: 8, render: state_str },
    ColumnDef {
        id: ColumnId::Username,
        name: "USERNAME",
        header: "USERNAME",
        width: 10,
        render: |ctx| ctx.username.to_string(),
    },
    ColumnDef { id: ColumnId::Exe, name: "EXE", header: "EXE", width: 20, render: |ctx| ctx.exe.to_string() },
    ColumnDef { id: ColumnId::Comm, name: "COMM", header: "COMM", width: 16, render: comm_str },
    ColumnDef {
        id: ColumnId::Syscall,
        name: "SYSCALL",
        header: "SYSCALL",
        width: 14,
        render: |ctx| syscall_name(ctx.sample.syscall_nr),
    },
    ColumnDef {
        id: ColumnId::SyscallActive,
        name: "SYSCALL_ACTIVE",
        header: "SYSCALL_ACTIVE",
        width: 14,
        render: |ctx| syscall_name(ctx.sample.storage.in_syscall_nr),
    },
    ColumnDef {
        id: ColumnId::SyscEntryTime,
        name: "SYSC_ENTRY_TIME",
        header: "SYSC_ENTRY_TIME",
        width: 20,
        render: |ctx| ctx.sc_entry_time_ns.to_string(),
    },
    ColumnDef {
        id: ColumnId::SyscNsSoFar,
        name: "SYSC_NS_SO_FAR",
        header: "SYSC_NS_SO_FAR",
        width: 14,
        render: |ctx| ctx.sc_ns_so_far.to_string(),
    },
    ColumnDef {
        id: ColumnId::SyscSeqNum,
        name: "SYSC_SEQ_NUM",
        header: "SYSC_SEQ_NUM",
        width: 12,
        render: |ctx| ctx.sample.storage.sc_sequence_num.to_string(),
    },
    ColumnDef {
        id: ColumnId::IorqSeqNum,
        name: "IORQ_SEQ_NUM",
        header: "IORQ_SEQ_NUM",
        width: 12,
        render: |ctx| ctx.sample.storage.iorq_sequence_num.to_string(),
    },
    ColumnDef {
        id: ColumnId::SyscArg1,
        name: "SYSC_ARG1",
        header: "ARG1",
        width: 18,
        render: |ctx| format!("0x{:x}", ctx.sample.syscall_args[0]),
    },
    ColumnDef {
        id: ColumnId::SyscArg2,
        name: "SYSC_ARG2",
        header: "ARG2",
        width: 18,
        render: |ctx| format!("0x{:x}", ctx.sample.syscall_args[1]),
    },
    ColumnDef {
        id: ColumnId::SyscArg3,
        name: "SYSC_ARG3",
        header: "ARG3",
        width: 18,
        render: |ctx| format!("0x{:x}", ctx.sample.syscall_args[2]),
    },
    ColumnDef {
        id: ColumnId::SyscArg4,
        name: "SYSC_ARG4",
        header: "ARG4",
        width: 18,
        render: |ctx| format!("0x{:x}", ctx.sample.syscall_args[3]),
    },
    ColumnDef {
        id: ColumnId::SyscArg5,
        name: "SYSC_ARG5",
        header: "ARG5",
        width: 18,
        render: |ctx| format!("0x{:x}", ctx.sample.syscall_args[4]),
    },
    ColumnDef {
        id: ColumnId::SyscArg6,
        name: "SYSC_ARG6",
        header: "ARG6",
        width: 18,
        render: |ctx| format!("0x{:x}", ctx.sample.syscall_args[5]),
    },
    ColumnDef {
        id: ColumnId::Filename,
        name: "FILENAME",
        header: "FILENAME",
        width: 24,
        render: |ctx| ctx.filename.to_string(),
    },
    ColumnDef {
        id: ColumnId::Connection,
        name: "CONNECTION",
        header: "CONNECTION",
        width: 30,
        render: |ctx| ctx.connection.to_string(),
    },
    ColumnDef {
        id: ColumnId::ConnState,
        name: "CONN_STATE",
        header: "CONN_STATE",
        width: 12,
        render: |ctx| {
            if ctx.sample.has_socket_info != 0 {
                conn_state_str(&ctx.sample.sock_info).to_string()
            } else {
                "-".to_string()
            }
        },
    },
    ColumnDef {
        id: ColumnId::ExtraInfo,
        name: "EXTRA_INFO",
        header: "EXTRA_INFO",
        width: 40,
        render: |ctx| ctx.extra_info.to_string(),
    },
    ColumnDef {
        id: ColumnId::KstackHash,
        name: "KSTACK_HASH",
        header: "KSTACK_HASH",
        width: 18,
        render: |ctx| format!("{:016x}", ctx.sample.kstack_hash),
    },
    ColumnDef {
        id: ColumnId::UstackHash,
        name: "USTACK_HASH",
        header: "USTACK_HASH",
        width: 18,
        render: |ctx| format!("{:016x}", ctx.sample.ustack_hash),
    },
];

pub const NARROW_COLUMNS: &[ColumnId] = &[
    ColumnId::Tid,
    ColumnId::Tgid,
    ColumnId::State,
    ColumnId::Comm,
    ColumnId::Syscall,
    ColumnId::Filename,
];

pub const NORMAL_COLUMNS: &[ColumnId] = &[
    ColumnId::Tid,
    ColumnId::Tgid,
    ColumnId::State,
    ColumnId::Username,
    ColumnId::Exe,
    ColumnId::Comm,
    ColumnId::Syscall,
    ColumnId::SyscNsSoFar,
    ColumnId::Filename,
    ColumnId::Connection,
    ColumnId::ExtraInfo,
];

pub const WIDE_COLUMNS: &[ColumnId] = &[
    ColumnId::Tid,
    ColumnId::Tgid,
    ColumnId::Pidns,
    ColumnId::CgroupId,
    ColumnId::State,
    ColumnId::Username,
    ColumnId::Exe,
    ColumnId::Comm,
    ColumnId::Syscall,
    ColumnId::SyscallActive,
    ColumnId::SyscEntryTime,
    ColumnId::SyscNsSoFar,
    ColumnId::SyscSeqNum,
    ColumnId::IorqSeqNum,
    ColumnId::Filename,
    ColumnId::Connection,
    ColumnId::ConnState,
    ColumnId::ExtraInfo,
    ColumnId::KstackHash,
    ColumnId::UstackHash,
];

pub const ALL_COLUMNS: &[ColumnId] = &[
    ColumnId::Timestamp,
    ColumnId::WeightUs,
    ColumnId::Tid,
    ColumnId::Tgid,
    ColumnId::Pidns,
    ColumnId::CgroupId,
    ColumnId::State,
    ColumnId::Username,
    ColumnId::Exe,
    ColumnId::Comm,
    ColumnId::Syscall,
    ColumnId::SyscallActive,
    ColumnId::SyscEntryTime,
    ColumnId::SyscNsSoFar,
    ColumnId::SyscSeqNum,
    ColumnId::IorqSeqNum,
    ColumnId::SyscArg1,
    ColumnId::SyscArg2,
    ColumnId::SyscArg3,
    ColumnId::SyscArg4,
    ColumnId::SyscArg5,
    ColumnId::SyscArg6,
    ColumnId::Filename,
    ColumnId::Connection,
    ColumnId::ConnState,
    ColumnId::ExtraInfo,
    ColumnId::KstackHash,
    ColumnId::UstackHash,
];

/// Sample CSV column order, fixed by §6 — a distinct (smaller) list from
/// the stdout predefined sets, since the CSV stream always carries the full
/// set of identity/syscall/connection fields regardless of `-g`/`-G`.
pub const SAMPLE_CSV_COLUMNS: &[ColumnId] = &[
    ColumnId::Timestamp,
    ColumnId::WeightUs,
    ColumnId::Tid,
    ColumnId::Tgid,
    ColumnId::Pidns,
    ColumnId::CgroupId,
    ColumnId::State,
    ColumnId::Username,
    ColumnId::Exe,
    ColumnId::Comm,
    ColumnId::Syscall,
    ColumnId::SyscallActive,
    ColumnId::SyscEntryTime,
    ColumnId::SyscNsSoFar,
    ColumnId::SyscSeqNum,
    ColumnId::IorqSeqNum,
    ColumnId::SyscArg1,
    ColumnId::SyscArg2,
    ColumnId::SyscArg3,
    ColumnId::SyscArg4,
    ColumnId::SyscArg5,
    ColumnId::SyscArg6,
    ColumnId::Filename,
    ColumnId::Connection,
    ColumnId::ConnState,
    ColumnId::ExtraInfo,
    ColumnId::KstackHash,
    ColumnId::UstackHash,
];

#[must_use]
pub fn find(id: ColumnId) -> &'static ColumnDef {
    COLUMN_DEFS.iter().find(|c| c.id == id).expect("every ColumnId has a ColumnDef")
}

/// Resolve a comma-separated column-name list (as passed to `-g`/`-G`) to
/// concrete [`ColumnId`]s. An unknown name is a hard error per §6.
///
/// # Errors
/// Returns an error naming the first unrecognized column.
pub fn resolve_names(names: &[String]) -> anyhow::Result<Vec<ColumnId>> {
    names
        .iter()
        .map(|n| {
            COLUMN_DEFS
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(n))
                .map(|c| c.id)
                .ok_or_else(|| anyhow::anyhow!("unknown column: {n}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_predefined_column_resolves_to_a_def() {
        for &id in ALL_COLUMNS {
            let _ = find(id);
        }
    }

    #[test]
    fn unknown_column_name_is_an_error() {
        let err = resolve_names(&["NOT_A_COLUMN".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn known_column_name_resolves_case_insensitively() {
        let resolved = resolve_names(&["tid".to_string(), "COMM".to_string()]).unwrap();
        assert_eq!(resolved, vec![ColumnId::Tid, ColumnId::Comm]);
    }
}
