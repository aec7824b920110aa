//! Syscall number → name table, x86-64 only. Generalizes the teacher's
//! `classification.rs` static-prefix-table idiom to a different lookup
//! shape: a flat `match` over the small set of syscalls this tool actually
//! cares about (the ones recognized by enrichment dispatch and payload
//! capture), falling back to `sys_<nr>` for everything else so an unknown
//! or future syscall number never renders as a bare, unlabeled integer.

#[must_use]
pub fn name_for(nr: i32) -> String {
    known_name(nr).map_or_else(|| format!("sys_{nr}"), str::to_string)
}

#[allow(clippy::match_same_arms)]
fn known_name(nr: i32) -> Option<&'static str> {
    Some(match nr {
        0 => "read",
        1 => "write",
        2 => "open",
        3 => "close",
        4 => "stat",
        5 => "fstat",
        6 => "lstat",
        7 => "poll",
        8 => "lseek",
        9 => "mmap",
        10 => "mprotect",
        11 => "munmap",
        12 => "brk",
        13 => "rt_sigaction",
        16 => "ioctl",
        17 => "pread64",
        18 => "pwrite64",
        19 => "readv",
        20 => "writev",
        21 => "access",
        22 => "pipe",
        23 => "select",
        24 => "sched_yield",
        32 => "dup",
        33 => "dup2",
        35 => "nanosleep",
        39 => "getpid",
        41 => "socket",
        42 => "connect",
        43 => "accept",
        44 => "sendto",
        45 => "recvfrom",
        46 => "sendmsg",
        47 => "recvmsg",
        48 => "shutdown",
        49 => "bind",
        50 => "listen",
        54 => "setsockopt",
        55 => "getsockopt",
        56 => "clone",
        57 => "fork",
        59 => "execve",
        60 => "exit",
        61 => "wait4",
        62 => "kill",
        72 => "fcntl",
        78 => "getdents",
        79 => "getcwd",
        82 => "rename",
        83 => "mkdir",
        84 => "rmdir",
        85 => "creat",
        86 => "link",
        87 => "unlink",
        90 => "chmod",
        95 => "umask",
        96 => "gettimeofday",
        97 => "getrlimit",
        102 => "getuid",
        104 => "getgid",
        107 => "geteuid",
        108 => "getegid",
        137 => "statfs",
        186 => "gettid",
        202 => "futex",
        204 => "sched_getaffinity",
        208 => "io_getevents",
        209 => "io_submit",
        217 => "getdents64",
        218 => "set_tid_address",
        228 => "clock_gettime",
        230 => "clock_nanosleep",
        231 => "exit_group",
        232 => "epoll_wait",
        233 => "epoll_ctl",
        257 => "openat",
        262 => "newfstatat",
        263 => "unlinkat",
        270 => "pselect6",
        271 => "ppoll",
        281 => "epoll_pwait",
        290 => "eventfd2",
        291 => "epoll_create1",
        292 => "dup3",
        293 => "pipe2",
        302 => "prlimit64",
        318 => "getrandom",
        319 => "memfd_create",
        332 => "statx",
        333 => "io_pgetevents",
        426 => "io_uring_enter",
        427 => "io_uring_register",
        428 => "io_uring_setup",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_syscalls_resolve_by_name() {
        assert_eq!(name_for(0), "read");
        assert_eq!(name_for(1), "write");
        assert_eq!(name_for(426), "io_uring_enter");
    }

    #[test]
    fn unknown_syscall_falls_back_to_sys_nr() {
        assert_eq!(name_for(9999), "sys_9999");
    }
}
