//! Per-connection handling (C6, §4.6).
//!
//! One [`Session`] is spawned per accepted TCP connection. It frames the
//! stream with `battlespy-codec`'s [`FrameCodec`], extracts the
//! validate-nonce/filter/requested-fields from the first well-formed frame,
//! runs the filter pipeline, encodes the matching servers, encrypts the
//! blob, writes it, and closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

use battlespy_codec::FrameCodec;
use battlespy_proto::{encode, enctypex, run_filter};

use crate::context::{AppContext, HANDOFF_KEY};

/// A frame with too few non-empty segments to contain a validate/filter
/// part and a field list (§4.6: "frames with fewer than 3 segments are
/// malformed and dropped").
#[derive(Debug)]
struct MalformedFrame;

/// One accepted connection. Owns the framed stream and the peer address for
/// the lifetime of the exchange; logs exactly one disconnect line on drop,
/// regardless of which exit path was taken (§5).
pub struct Session {
    peer_addr: SocketAddr,
    context: Arc<AppContext>,
    framed: Framed<TcpStream, FrameCodec>,
    disposed: bool,
}

impl Session {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, context: Arc<AppContext>) -> Self {
        Self {
            peer_addr,
            context,
            framed: Framed::new(stream, FrameCodec::default()),
            disposed: false,
        }
    }

    /// Runs the session to completion: reads one valid frame (bounded by the
    /// configured idle-read timeout), answers it, and closes. Never returns
    /// an error to the caller — every failure path is logged and the
    /// session simply disposes (§4.8).
    pub async fn run(mut self) {
        let idle_timeout = Duration::from_secs(self.context.config.server.idle_timeout_secs);

        loop {
            let next = tokio::time::timeout(idle_timeout, self.framed.next()).await;
            let frame = match next {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(err))) => {
                    tracing::debug!(peer = %self.peer_addr, error = %err, "frame decode error");
                    return;
                }
                Ok(None) => {
                    tracing::debug!(peer = %self.peer_addr, "peer disconnected before sending a frame");
                    return;
                }
                Err(_) => {
                    tracing::debug!(peer = %self.peer_addr, "idle timeout, closing session");
                    return;
                }
            };

            match self.handle_frame(frame.as_bytes()).await {
                Ok(()) => {
                    self.disposed = true;
                    return;
                }
                Err(MalformedFrame) => {
                    tracing::debug!(peer = %self.peer_addr, "malformed frame, dropping");
                    continue;
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> Result<(), MalformedFrame> {
        let segments: Vec<&[u8]> = frame.split(|&b| b == 0x00).filter(|s| !s.is_empty()).collect();
        if segments.len() < 3 {
            return Err(MalformedFrame);
        }

        let validate_and_filter = segments[segments.len() - 2];
        let requested_fields = segments[segments.len() - 1];

        if validate_and_filter.len() < 8 {
            return Err(MalformedFrame);
        }
        let mut nonce: enctypex::Nonce = [0; 8];
        nonce.copy_from_slice(&validate_and_filter[..8]);
        let raw_filter = String::from_utf8_lossy(&validate_and_filter[8..]).into_owned();

        let fields: Vec<String> = String::from_utf8_lossy(requested_fields)
            .split('\\')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        let client_ip = match self.peer_addr {
            SocketAddr::V4(addr) => *addr.ip(),
            SocketAddr::V6(_) => std::net::Ipv4Addr::UNSPECIFIED,
        };

        let snapshot = self.context.registry.snapshot();
        let matched = run_filter(&raw_filter, &snapshot);

        let blob = match encode::encode(client_ip, &fields, &matched) {
            Ok(blob) => blob,
            Err(err) => {
                tracing::warn!(peer = %self.peer_addr, error = %err, "encoding failed, closing session");
                return Ok(());
            }
        };

        let framed = enctypex::encrypt(&HANDOFF_KEY, &nonce, &blob);

        if let Err(err) = self.framed.send(Bytes::from(framed)).await {
            tracing::debug!(peer = %self.peer_addr, error = %err, "write failed, peer likely disconnected");
        }

        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::info!(peer = %self.peer_addr, disposed = self.disposed, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use battlespy_registry::{InMemoryDatabase, Registry};
    use std::net::Ipv4Addr;

    fn server(ip: [u8; 4], query_port: u16, hostname: &str) -> battlespy_proto::GameServer {
        battlespy_proto::GameServer {
            ip: Ipv4Addr::from(ip),
            query_port,
            game_port: query_port,
            hostname: hostname.into(),
            game_type: "gpm_cq".into(),
            map_name: "strike_at_karkand".into(),
            game_variant: "bf2".into(),
            num_players: 8,
            max_players: 32,
            round_time: 900,
            connection_type: "LAN".into(),
            password_protected: false,
            ranked: true,
            punkbuster: true,
            dedicated: true,
            time_limit: 30,
            anticheat: true,
            last_refreshed: 1_700_000_000,
            is_validated: true,
            database_id: 1,
        }
    }

    fn build_registry() -> Arc<Registry> {
        let registry = Registry::new(Arc::new(InMemoryDatabase::new()));
        registry.upsert(server([1, 2, 3, 4], 16567, "alpha"));
        registry.mark_validated((Ipv4Addr::new(1, 2, 3, 4), 16567));
        Arc::new(registry)
    }

    fn frame_bytes(filter: &str, fields: &str) -> Vec<u8> {
        let mut bytes = b"battlefield2".to_vec();
        bytes.push(0);
        bytes.push(0);
        bytes.push(0);
        bytes.extend_from_slice(b"12345678");
        bytes.extend_from_slice(filter.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(fields.as_bytes());
        bytes.push(0);
        bytes
    }

    #[tokio::test]
    async fn well_formed_frame_is_accepted_and_produces_a_reply() {
        let config = crate::config::Config {
            database: crate::config::DatabaseConfig {
                hostname: "localhost".into(),
                port: 3306,
                username: "x".into(),
                password: "x".into(),
                master_database: "battlefield2".into(),
            },
            server: crate::config::ServerConfig {
                listen_address: "127.0.0.1".into(),
                listen_port: 0,
                idle_timeout_secs: 5,
            },
        };
        let context = Arc::new(AppContext::new(build_registry(), config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            stream
                .write_all(&frame_bytes("hostname='alpha'", "hostname\\numplayers"))
                .await
                .unwrap();
            // The wire request (§6) carries no trailing 4-NUL delimiter; the
            // client half-closes so the server's decode_eof flushes it.
            stream.shutdown().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let (stream, peer_addr) = listener.accept().await.unwrap();
        let session = Session::new(stream, peer_addr, context);
        session.run().await;

        let reply = client.await.unwrap();
        // header (8 bytes) from enctypex, never empty for a matched query.
        assert!(reply.len() > 8);
    }

    #[test]
    fn too_few_segments_is_malformed() {
        let frame = b"battlefield2\012345678filter";
        let segments: Vec<&[u8]> = frame.split(|&b| b == 0x00).filter(|s| !s.is_empty()).collect();
        assert_eq!(segments.len(), 2);
    }
}
