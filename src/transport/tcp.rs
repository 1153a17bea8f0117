//! TCP Transport Implementation
//!
//! Every overlay packet travels over a TCP stream framed by its own
//! 28-byte header. The receiver answers each packet with `ACK`. Outbound
//! streams are cached per destination and reused until a send fails.

use super::{now_ms, PacketTx, ReceivedPacket, TransportError, TransportState, ACK};
use crate::address::Address;
use crate::config::TransportConfig;
use crate::protocol::{Packet, HEADER_SIZE};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// TCP transport for the overlay.
pub struct TcpTransport {
    /// Overlay address to listen on.
    listen: Address,
    /// Configuration.
    config: TransportConfig,
    /// Current state.
    state: TransportState,
    /// Channel for delivering received packets to the node.
    packet_tx: PacketTx,
    /// Accept loop task handle.
    accept_task: Option<JoinHandle<()>>,
    /// Local bound address (after start).
    local_addr: Option<SocketAddr>,
    /// Cached outbound streams.
    streams: HashMap<Address, TcpStream>,
}

impl TcpTransport {
    /// Create a new TCP transport.
    pub fn new(listen: Address, config: TransportConfig, packet_tx: PacketTx) -> Self {
        Self {
            listen,
            config,
            state: TransportState::Configured,
            packet_tx,
            accept_task: None,
            local_addr: None,
            streams: HashMap::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Get the local bound address (only valid after start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of cached outbound streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Start the transport asynchronously.
    ///
    /// Binds the listener and spawns the accept loop.
    pub async fn start_async(&mut self) -> Result<(), TransportError> {
        if !self.state.can_start() {
            return Err(TransportError::AlreadyStarted);
        }

        self.state = TransportState::Starting;

        let listener = match TcpListener::bind(self.listen.socket_addr()).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state = TransportState::Failed;
                return Err(TransportError::StartFailed(format!("bind failed: {}", e)));
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::StartFailed(format!("get local addr: {}", e)))?;
        self.local_addr = Some(local_addr);

        let packet_tx = self.packet_tx.clone();
        self.accept_task = Some(tokio::spawn(async move {
            tcp_accept_loop(listener, packet_tx).await;
        }));
        self.state = TransportState::Up;

        info!(local_addr = %local_addr, "TCP transport started");
        Ok(())
    }

    /// Stop the transport asynchronously.
    ///
    /// Aborting the accept loop also closes every inbound connection.
    pub async fn stop_async(&mut self) -> Result<(), TransportError> {
        if !self.state.is_operational() {
            return Err(TransportError::NotStarted);
        }

        if let Some(task) = self.accept_task.take() {
            task.abort();
            let _ = task.await; // Ignore JoinError from abort
        }

        self.streams.clear();
        self.local_addr = None;
        self.state = TransportState::Down;

        debug!(listen = %self.listen, "TCP transport stopped");
        Ok(())
    }

    /// Send one packet and wait for the receiver's `ACK`.
    ///
    /// A cached stream that fails is retried once on a fresh connection.
    /// On error no stream is kept for `addr`.
    pub async fn send_async(&mut self, addr: &Address, data: &[u8]) -> Result<(), TransportError> {
        if !self.state.is_operational() {
            return Err(TransportError::NotStarted);
        }

        if let Some(mut stream) = self.streams.remove(addr) {
            match self.exchange(&mut stream, data).await {
                Ok(()) => {
                    self.streams.insert(*addr, stream);
                    return Ok(());
                }
                Err(e) => {
                    trace!(remote = %addr, error = %e, "Cached stream failed, reconnecting");
                }
            }
        }

        let mut stream = self.connect(addr).await?;
        self.exchange(&mut stream, data).await?;
        self.streams.insert(*addr, stream);
        Ok(())
    }

    /// Drop the cached stream to `addr`, if any.
    pub fn close(&mut self, addr: &Address) -> bool {
        self.streams.remove(addr).is_some()
    }

    async fn connect(&self, addr: &Address) -> Result<TcpStream, TransportError> {
        let socket_addr = SocketAddr::V4(addr.socket_addr());
        let wait = Duration::from_millis(self.config.connect_timeout_ms());
        let stream = timeout(wait, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectFailed {
                addr: socket_addr,
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        debug!(remote = %addr, "TCP connection established");
        Ok(stream)
    }

    async fn exchange(&self, stream: &mut TcpStream, data: &[u8]) -> Result<(), TransportError> {
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let wait = Duration::from_millis(self.config.ack_timeout_ms());
        let mut ack = [0u8; 3];
        timeout(wait, stream.read_exact(&mut ack))
            .await
            .map_err(|_| TransportError::Timeout)??;
        if &ack != ACK {
            return Err(TransportError::BadAck(ack.to_vec()));
        }
        Ok(())
    }
}

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP accept loop - runs as a spawned task.
///
/// Connection tasks live in a `JoinSet` owned by the loop, so aborting
/// the loop also aborts every open inbound connection.
async fn tcp_accept_loop(listener: TcpListener, packet_tx: PacketTx) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    trace!(remote_addr = %remote_addr, "Accepted TCP connection");
                    let packet_tx = packet_tx.clone();
                    connections.spawn(tcp_connection_loop(stream, remote_addr, packet_tx));
                }
                Err(e) => {
                    // Persistent failures (fd exhaustion) would otherwise spin.
                    warn!(error = %e, "TCP accept error");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

/// Read framed packets from one inbound stream until it closes.
async fn tcp_connection_loop(mut stream: TcpStream, remote_addr: SocketAddr, packet_tx: PacketTx) {
    loop {
        let mut header = [0u8; HEADER_SIZE];
        if let Err(e) = stream.read_exact(&mut header).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                debug!(remote_addr = %remote_addr, error = %e, "TCP read error");
            }
            break;
        }

        let body_len = match Packet::peek_body_length(&header) {
            Ok(len) => len,
            Err(e) => {
                debug!(remote_addr = %remote_addr, error = %e, "Unframeable packet, closing connection");
                break;
            }
        };

        let mut data = Vec::with_capacity(HEADER_SIZE + body_len);
        data.extend_from_slice(&header);
        data.resize(HEADER_SIZE + body_len, 0);
        if let Err(e) = stream.read_exact(&mut data[HEADER_SIZE..]).await {
            debug!(remote_addr = %remote_addr, error = %e, "Truncated packet body");
            break;
        }

        trace!(remote_addr = %remote_addr, bytes = data.len(), "TCP packet received");

        if packet_tx
            .send(ReceivedPacket::with_timestamp(remote_addr, data, now_ms()))
            .await
            .is_err()
        {
            debug!("Packet channel closed, stopping connection loop");
            break;
        }

        if let Err(e) = stream.write_all(ACK).await {
            debug!(remote_addr = %remote_addr, error = %e, "Failed to write ACK");
            break;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::packet_channel;
    use tokio::time::{timeout, Duration};

    fn loopback() -> Address {
        Address::new([127, 0, 0, 1], 0)
    }

    fn config() -> TransportConfig {
        TransportConfig {
            connect_timeout_ms: Some(500),
            ack_timeout_ms: Some(500),
            channel_capacity: None,
        }
    }

    async fn started() -> (TcpTransport, crate::transport::PacketRx, Address) {
        let (tx, rx) = packet_channel(16);
        let mut transport = TcpTransport::new(loopback(), config(), tx);
        transport.start_async().await.unwrap();
        let local = transport.local_addr().unwrap();
        let addr = Address::try_from(local).unwrap();
        (transport, rx, addr)
    }

    #[tokio::test]
    async fn test_start_stop() {
        let (tx, _rx) = packet_channel(16);
        let mut transport = TcpTransport::new(loopback(), config(), tx);
        assert_eq!(transport.state(), TransportState::Configured);

        transport.start_async().await.unwrap();
        assert_eq!(transport.state(), TransportState::Up);
        assert!(transport.local_addr().is_some());

        transport.stop_async().await.unwrap();
        assert_eq!(transport.state(), TransportState::Down);
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let (mut transport, _rx, _) = started().await;
        assert!(matches!(
            transport.start_async().await,
            Err(TransportError::AlreadyStarted)
        ));
        transport.stop_async().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_not_started() {
        let (tx, _rx) = packet_channel(16);
        let mut transport = TcpTransport::new(loopback(), config(), tx);
        let target = Address::new([127, 0, 0, 1], 9);
        assert!(matches!(
            transport.send_async(&target, b"x").await,
            Err(TransportError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_send_recv_with_ack() {
        let (mut sender, _rx1, _) = started().await;
        let (mut receiver, mut rx2, receiver_addr) = started().await;

        let packet = Packet::message(Address::new([10, 0, 0, 1], 5000), "over tcp").unwrap();
        let bytes = packet.encode();
        sender.send_async(&receiver_addr, &bytes).await.unwrap();
        sender.send_async(&receiver_addr, &bytes).await.unwrap();
        assert_eq!(sender.stream_count(), 1);

        for _ in 0..2 {
            let received = timeout(Duration::from_secs(1), rx2.recv())
                .await
                .expect("timeout")
                .expect("channel closed");
            assert_eq!(received.data, bytes);
            assert_eq!(Packet::decode(&received.data).unwrap(), packet);
        }

        sender.stop_async().await.unwrap();
        receiver.stop_async().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_to_closed_port_fails() {
        let (mut sender, _rx, _) = started().await;

        // Bind and immediately drop a listener to get a port nobody uses.
        let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);

        let target = Address::new([127, 0, 0, 1], port);
        let packet = Packet::join(Address::new([10, 0, 0, 1], 5000));
        assert!(sender.send_async(&target, &packet.encode()).await.is_err());
        assert_eq!(sender.stream_count(), 0);

        sender.stop_async().await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_header_closes_connection() {
        let (mut receiver, mut rx, receiver_addr) = started().await;

        let mut raw = TcpStream::connect(SocketAddr::V4(receiver_addr.socket_addr()))
            .await
            .unwrap();
        raw.write_all(&[b'x'; HEADER_SIZE]).await.unwrap();

        let mut buf = [0u8; 3];
        let read = timeout(Duration::from_secs(1), raw.read(&mut buf))
            .await
            .expect("timeout")
            .unwrap_or(0);
        assert_eq!(read, 0);
        assert!(rx.try_recv().is_err());

        receiver.stop_async().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_closes_inbound_connections() {
        let (mut receiver, mut rx, receiver_addr) = started().await;

        let mut raw = TcpStream::connect(SocketAddr::V4(receiver_addr.socket_addr()))
            .await
            .unwrap();
        let packet = Packet::join(Address::new([10, 0, 0, 1], 5000));
        raw.write_all(&packet.encode()).await.unwrap();
        let mut ack = [0u8; 3];
        raw.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack, ACK);
        assert!(rx.recv().await.is_some());

        receiver.stop_async().await.unwrap();

        let mut buf = [0u8; 1];
        let read = timeout(Duration::from_secs(1), raw.read(&mut buf))
            .await
            .expect("connection left open after stop")
            .unwrap_or(0);
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_close_drops_stream() {
        let (mut sender, _rx1, _) = started().await;
        let (mut receiver, _rx2, receiver_addr) = started().await;

        let packet = Packet::join(Address::new([10, 0, 0, 1], 5000));
        sender.send_async(&receiver_addr, &packet.encode()).await.unwrap();
        assert!(sender.close(&receiver_addr));
        assert!(!sender.close(&receiver_addr));

        sender.stop_async().await.unwrap();
        receiver.stop_async().await.unwrap();
    }
}
