use std::net::IpAddr;
use std::net::UdpSocket;

use crate::Result;

/// Local address the OS picks to reach `server` (`host:port`).
///
/// Nothing is sent: connecting a UDP socket only resolves the route.
pub fn local_ip_towards(server: &str) -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(server)?;
    Ok(socket.local_addr()?.ip())
}
