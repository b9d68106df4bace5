//! UDP command server
//!
//! Owns the command socket on the active profile's listen port and sends
//! status reports from the same socket.

use core::net::Ipv4Addr;

use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use log::{debug, info, warn};

use crate::command::Reply;
use crate::{BoardError, config};

/// Socket buffers; kept outside the server so they can live on the task stack
pub struct UdpBuffers {
    rx_meta: [PacketMetadata; 8],
    rx: [u8; 2 * config::MAX_PACKET_SIZE],
    tx_meta: [PacketMetadata; 8],
    tx: [u8; 2 * config::MAX_REPLY_SIZE],
}

impl UdpBuffers {
    pub const fn new() -> Self {
        Self {
            rx_meta: [PacketMetadata::EMPTY; 8],
            rx: [0; 2 * config::MAX_PACKET_SIZE],
            tx_meta: [PacketMetadata::EMPTY; 8],
            tx: [0; 2 * config::MAX_REPLY_SIZE],
        }
    }
}

impl Default for UdpBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// IPv4 part of a remote endpoint
pub(crate) fn endpoint_v4(endpoint: IpEndpoint) -> Option<(Ipv4Addr, u16)> {
    match endpoint.addr {
        IpAddress::Ipv4(address) => Some((address, endpoint.port)),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// UDP server for command packets
pub struct UdpServer<'a> {
    socket: UdpSocket<'a>,
    port: u16,
}

impl<'a> UdpServer<'a> {
    /// Bind to `port` on `stack`
    pub fn bind(stack: Stack<'a>, buffers: &'a mut UdpBuffers, port: u16) -> Result<Self, BoardError> {
        let UdpBuffers { rx_meta, rx, tx_meta, tx } = buffers;
        let mut socket = UdpSocket::new(stack, rx_meta, rx, tx_meta, tx);

        if let Err(e) = socket.bind(port) {
            warn!("[UDP] Failed to bind to port {}: {:?}", port, e);
            return Err(BoardError::UdpError);
        }
        info!("[UDP] Listening on port {}", port);
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the next packet; returns its length and IPv4 sender
    pub async fn receive(&mut self, buffer: &mut [u8]) -> Result<(usize, (Ipv4Addr, u16)), BoardError> {
        loop {
            let (len, meta) = self.socket.recv_from(buffer).await.map_err(|e| {
                warn!("[UDP] Receive error: {:?}", e);
                BoardError::UdpError
            })?;
            match endpoint_v4(meta.endpoint) {
                Some(sender) => {
                    debug!("[UDP] Received {} bytes from {}:{}", len, sender.0, sender.1);
                    return Ok((len, sender));
                }
                None => debug!("[UDP] Ignoring non-IPv4 packet"),
            }
        }
    }

    /// Send a reply or status report
    pub async fn send(&mut self, reply: &Reply) -> Result<(), BoardError> {
        let endpoint = IpEndpoint::new(IpAddress::Ipv4(reply.address), reply.port);
        match self.socket.send_to(&reply.payload, endpoint).await {
            Ok(()) => {
                debug!("[UDP] Sent {} bytes to {}:{}", reply.payload.len(), reply.address, reply.port);
                Ok(())
            }
            Err(e) => {
                warn!("[UDP] Failed to send to {}:{}: {:?}", reply.address, reply.port, e);
                Err(BoardError::UdpError)
            }
        }
    }
}
