//! TCP side of the HTTP GET board
//!
//! One connection at a time: accept, read the request head, answer, close.

use core::net::Ipv4Addr;

use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, with_timeout};
use log::{debug, warn};

use crate::BoardError;
use crate::udp_server::endpoint_v4;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Read until the end of the request line or a full buffer.
/// Returns the bytes read and the peer.
pub async fn read_request(
    socket: &mut TcpSocket<'_>,
    buffer: &mut [u8],
) -> Result<(usize, (Ipv4Addr, u16)), BoardError> {
    let peer = socket
        .remote_endpoint()
        .and_then(endpoint_v4)
        .ok_or(BoardError::NetworkError)?;

    let mut len = 0;
    while len < buffer.len() {
        let read = match with_timeout(REQUEST_TIMEOUT, socket.read(&mut buffer[len..])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(read)) => read,
            Ok(Err(e)) => {
                warn!("[HTTP] Read error from {}: {:?}", peer.0, e);
                return Err(BoardError::NetworkError);
            }
            Err(_) => {
                warn!("[HTTP] Request from {} timed out", peer.0);
                return Err(BoardError::NetworkError);
            }
        };
        len += read;
        if buffer[..len].windows(2).any(|w| w == b"\r\n") {
            break;
        }
    }
    debug!("[HTTP] {} request bytes from {}", len, peer.0);
    Ok((len, peer))
}

/// Write the whole response and close the connection
pub async fn respond(socket: &mut TcpSocket<'_>, payload: &[u8]) -> Result<(), BoardError> {
    let mut sent = 0;
    while sent < payload.len() {
        match socket.write(&payload[sent..]).await {
            Ok(0) | Err(_) => {
                warn!("[HTTP] Connection dropped after {} bytes", sent);
                socket.abort();
                return Err(BoardError::NetworkError);
            }
            Ok(n) => sent += n,
        }
    }
    let _ = socket.flush().await;
    socket.close();
    Ok(())
}
