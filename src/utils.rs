use std::{net::UdpSocket, time::Duration};

use crate::{config::Endpoint, error::Result};

pub fn udp_sock(bind: &Endpoint, read_timeout: Duration) -> Result<UdpSocket> {
    let method_name = "udp_sock";
    let sock = UdpSocket::bind(bind.addr()).map_err(|e| {
        tracing::error!(method_name, "can't create udp socket for {bind} : {e}");
        e
    })?;
    sock.set_read_timeout(Some(read_timeout))?;
    tracing::debug!(method_name, "bound udp socket at {:?}", sock.local_addr());
    Ok(sock)
}

/// Decodes one datagram as text, the vehicle only speaks ascii on these channels.
/// Trailing NUL padding is dropped.
pub fn datagram_text(buff: &[u8]) -> Option<String> {
    std::str::from_utf8(buff)
        .ok()
        .map(|s| s.trim_end_matches('\0').to_owned())
}
