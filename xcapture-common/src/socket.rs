//! Socket identity carried alongside a sampled file descriptor.

use crate::consts::UNIX_PATH_LEN;

pub const AF_INET: u16 = 2;
pub const AF_INET6: u16 = 10;
pub const AF_UNIX: u16 = 1;

/// 4-tuple plus address-family metadata for a socket file descriptor found
/// behind a sampled syscall argument. Address bytes are kept in network byte
/// order exactly as read from the kernel; formatting happens in the Consumer.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SocketInfo {
    pub family: u16,
    pub protocol: u16,
    pub state: u8,
    pub socket_type: u8,
    pub _pad0: [u8; 2],

    /// IPv4 source/destination, valid when `family == AF_INET`.
    pub saddr_v4: u32,
    pub daddr_v4: u32,
    /// IPv6 source/destination, valid when `family == AF_INET6`.
    pub saddr_v6: [u8; 16],
    pub daddr_v6: [u8; 16],

    pub sport: u16,
    pub dport: u16,

    pub unix_peer_pid: u32,
    pub unix_owner_uid: u32,
    pub unix_inode: u64,
    pub unix_peer_inode: u64,
    pub unix_path_len: u16,
    pub unix_is_abstract: u8,
    pub _pad1: u8,
    pub unix_path: [u8; UNIX_PATH_LEN],
}

impl Default for SocketInfo {
    fn default() -> Self {
        Self {
            family: 0,
            protocol: 0,
            state: 0,
            socket_type: 0,
            _pad0: [0; 2],
            saddr_v4: 0,
            daddr_v4: 0,
            saddr_v6: [0; 16],
            daddr_v6: [0; 16],
            sport: 0,
            dport: 0,
            unix_peer_pid: 0,
            unix_owner_uid: 0,
            unix_inode: 0,
            unix_peer_inode: 0,
            unix_path_len: 0,
            unix_is_abstract: 0,
            _pad1: 0,
            unix_path: [0; UNIX_PATH_LEN],
        }
    }
}

/// Well-known TCP connection states (`include/net/tcp_states.h` subset).
pub mod tcp_state {
    pub const ESTABLISHED: u8 = 1;
    pub const SYN_SENT: u8 = 2;
    pub const SYN_RECV: u8 = 3;
    pub const FIN_WAIT1: u8 = 4;
    pub const FIN_WAIT2: u8 = 5;
    pub const TIME_WAIT: u8 = 6;
    pub const CLOSE: u8 = 7;
    pub const CLOSE_WAIT: u8 = 8;
    pub const LAST_ACK: u8 = 9;
    pub const LISTEN: u8 = 10;
    pub const CLOSING: u8 = 11;
}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl aya::Pod for SocketInfo {}
