//! Local message channel. A browser bridge, the dashboard relay and the CLI connect over TCP on
//! localhost and exchange one JSON object per line: every request line gets one reply line.

pub mod messages;
pub mod server;

use std::net::{Ipv4Addr, SocketAddr};

pub fn local_address(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Longest request line accepted. Requests are small, a longer line is garbage.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;
