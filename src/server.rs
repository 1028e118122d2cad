//! DNS listeners and lifecycle management.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::authority::{Transport, ZoneAuthority};
use crate::config::DnsConfig;
use crate::error::CoolDnsError;
use crate::metrics;
use crate::state::Directory;

/// Interval for emitting directory metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Idle time after which a TCP connection is closed.
pub const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Receive buffer for UDP requests.
const MAX_UDP_REQUEST: usize = 4096;

/// Periodically emit directory metrics.
async fn metrics_loop(directory: Directory, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                directory.emit_metrics();
                trace!(
                    records = directory.records_count(),
                    credentials = directory.credentials_count(),
                    "emitted directory metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// Authoritative DNS server answering from the directory.
pub struct DnsServer {
    authority: Arc<ZoneAuthority>,
    directory: Directory,
    udp: Arc<UdpSocket>,
    tcp: TcpListener,
}

impl DnsServer {
    /// Bind UDP and TCP listeners on the configured address.
    ///
    /// With port 0 the TCP listener takes the port the UDP socket got.
    pub async fn bind(config: &DnsConfig, directory: Directory) -> Result<Self, CoolDnsError> {
        let authority = ZoneAuthority::new(config, directory.clone())?;

        let udp = UdpSocket::bind(config.listen_addr).await?;
        let addr = udp.local_addr()?;
        info!(%addr, "DNS UDP listening");

        let tcp = TcpListener::bind(addr).await?;
        info!(%addr, "DNS TCP listening");

        Ok(Self {
            authority: Arc::new(authority),
            directory,
            udp: Arc::new(udp),
            tcp,
        })
    }

    /// Address both listeners are bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CoolDnsError> {
        Ok(self.udp.local_addr()?)
    }

    /// The answer engine used by this server.
    pub fn authority(&self) -> &ZoneAuthority {
        &self.authority
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), CoolDnsError> {
        info!(
            zone = %self.authority.origin(),
            signed = self.authority.signs_replies(),
            records = self.directory.records_count(),
            "DNS server ready to serve queries"
        );
        self.directory.emit_metrics();

        let udp_handle = tokio::spawn(serve_udp(
            self.authority.clone(),
            self.udp,
            shutdown.clone(),
        ));
        let tcp_handle = tokio::spawn(serve_tcp(
            self.authority.clone(),
            self.tcp,
            shutdown.clone(),
        ));
        let metrics_handle = tokio::spawn(metrics_loop(self.directory, shutdown.clone()));

        shutdown.cancelled().await;
        info!("DNS server shutdown requested");

        let _ = udp_handle.await;
        let _ = tcp_handle.await;
        let _ = metrics_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}

async fn serve_udp(
    authority: Arc<ZoneAuthority>,
    socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_UDP_REQUEST];

    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.cancelled() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "UDP receive failed");
                    continue;
                }
            },
        };

        let packet = buf[..len].to_vec();
        let authority = authority.clone();
        let socket = socket.clone();
        tokio::spawn(async move {
            let Some(reply) = authority.respond(&packet, Transport::Udp) else {
                return;
            };
            if let Err(e) = socket.send_to(&reply, peer).await {
                warn!(%peer, error = %e, "failed to send UDP reply");
                metrics::record_send_failure("udp");
            }
        });
    }
}

async fn serve_tcp(
    authority: Arc<ZoneAuthority>,
    listener: TcpListener,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(%peer, "accepted TCP connection");
                    tokio::spawn(handle_tcp(authority.clone(), stream, peer, shutdown.clone()));
                }
                Err(e) => warn!(error = %e, "TCP accept failed"),
            },
        }
    }
}

async fn handle_tcp(
    authority: Arc<ZoneAuthority>,
    mut stream: TcpStream,
    peer: SocketAddr,
    shutdown: CancellationToken,
) {
    loop {
        let packet = tokio::select! {
            _ = shutdown.cancelled() => return,
            read = tokio::time::timeout(TCP_IDLE_TIMEOUT, read_frame(&mut stream)) => match read {
                Ok(Ok(Some(packet))) => packet,
                Ok(Ok(None)) => return,
                Ok(Err(e)) => {
                    debug!(%peer, error = %e, "TCP read failed");
                    return;
                }
                Err(_) => {
                    debug!(%peer, "TCP connection idle, closing");
                    return;
                }
            },
        };

        let Some(reply) = authority.respond(&packet, Transport::Tcp) else {
            continue;
        };
        if let Err(e) = write_frame(&mut stream, &reply).await {
            warn!(%peer, error = %e, "failed to send TCP reply");
            metrics::record_send_failure("tcp");
            return;
        }
    }
}

/// Read one length-prefixed message. `None` on a clean close.
async fn read_frame(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut len = [0u8; 2];
    match stream.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut packet = vec![0u8; usize::from(u16::from_be_bytes(len))];
    stream.read_exact(&mut packet).await?;
    Ok(Some(packet))
}

async fn write_frame(stream: &mut TcpStream, reply: &[u8]) -> io::Result<()> {
    let len = u16::try_from(reply.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "reply exceeds 65535 bytes"))?;
    let mut frame = Vec::with_capacity(reply.len() + 2);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(reply);
    stream.write_all(&frame).await
}
