use crate::models::websocket::ServerMessage;

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use log::{ info, warn, error, debug };
use futures::{ SinkExt, StreamExt };
use uuid::Uuid;

const BROADCAST_CAPACITY: usize = 64;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).expect("non-zero quota")));
}

/// Fan-out of server events to every connected subscriber. Publishing never
/// waits; subscribers that fall behind skip what they missed.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<ServerMessage>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Returns how many subscribers the message was queued for.
    pub fn publish(&self, message: ServerMessage) -> usize {
        match self.sender.send(message) {
            Ok(count) => count,
            Err(_) => {
                debug!("No broadcast subscribers connected");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.sender.subscribe()
    }
}

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let key = match pkcs8_private_keys(&mut key_reader).next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    // Both rustls providers are compiled in; pick ring explicitly.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

/// Pulls the client's key from the `X-API-Key` header, falling back to the `api_key` query parameter.
fn provided_api_key(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if from_header.is_some() {
        return from_header;
    }
    let query = req.uri().query()?;
    url::form_urlencoded
        ::parse(query.as_bytes())
        .find(|(name, _)| name == "api_key")
        .map(|(_, value)| value.into_owned())
}

pub async fn start_ws_server(
    addr: &str,
    broadcaster: Broadcaster,
    api_key: Option<String>,
    tls_paths: Option<(String, String)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let tls_acceptor = match tls_paths {
        Some((cert_path, key_path)) => {
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let config = load_tls_config(&cert_path, &key_path)?;
            Some(TlsAcceptor::from(config))
        }
        None => None,
    };
    let protocol = if tls_acceptor.is_some() { "wss" } else { "ws" };
    info!("{} broadcast server listening on: {}", protocol.to_uppercase(), addr);

    let api_key = api_key.filter(|k| !k.trim().is_empty());
    if api_key.is_none() {
        warn!("Broadcast socket configured WITHOUT API Key authentication. Connections are open.");
    }

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let updates = broadcaster.subscribe();
        let required_api_key = api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, updates, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, updates, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    updates: broadcast::Receiver<ServerMessage>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let Some(required) = &required_api_key else {
            return Ok(response);
        };
        if provided_api_key(req).as_deref() != Some(required.as_str()) {
            warn!("{}: bad or missing API key", peer);
            let mut resp = ErrorResponse::new(Some("Unauthorized".into()));
            *resp.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(resp);
        }
        info!("{} authenticated", peer);
        Ok(response)
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_subscriber(peer, ws, updates).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn handle_subscriber<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    updates: broadcast::Receiver<ServerMessage>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let subscriber_id = Uuid::new_v4();
    info!("Subscriber {} connected from {}", subscriber_id, peer);

    let (mut tx, mut rx) = websocket.split();
    let mut updates = BroadcastStream::new(updates);

    loop {
        tokio::select! {
            update = updates.next() => {
                match update {
                    Some(Ok(message)) => {
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("Failed to serialize broadcast message: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = tx.send(Message::Text(json)).await {
                            error!("Error sending update to {}: {}", peer, e);
                            break;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!("Subscriber {} lagged, skipped {} updates", subscriber_id, skipped);
                    }
                    None => break,
                }
            }
            incoming = rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Received close from {}", peer);
                        break;
                    }
                    Some(Ok(Message::Ping(ping_data))) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring client frame from {}", peer);
                    }
                    Some(Err(e)) => {
                        info!("WebSocket connection closed or errored for {}: {}", peer, e);
                        break;
                    }
                }
            }
        }
    }
    info!("Subscriber {} disconnected ({})", subscriber_id, peer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reading::Reading;

    fn new_reading(date: &str) -> ServerMessage {
        ServerMessage::NewReading {
            date: date.to_string(),
            reading: Reading { hba1c: Some(5.4), ..Default::default() },
            timestamp: 0,
        }
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        assert_eq!(Broadcaster::new().publish(new_reading("2024-01-01")), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_readings() {
        let broadcaster = Broadcaster::new();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        assert_eq!(broadcaster.publish(new_reading("2024-01-01")), 2);
        assert_eq!(first.recv().await.unwrap(), new_reading("2024-01-01"));
        assert_eq!(second.recv().await.unwrap(), new_reading("2024-01-01"));
    }

    #[test]
    fn new_reading_frame_is_tagged() {
        let json = serde_json::to_value(new_reading("2024-01-01")).unwrap();
        assert_eq!(json["type"], "new_reading");
        assert_eq!(json["date"], "2024-01-01");
        assert_eq!(json["reading"]["hba1c"], 5.4);
    }

    #[test]
    fn api_key_read_from_header_or_query() {
        let from_header = Request::builder()
            .uri("/updates")
            .header("X-API-Key", "k1")
            .body(())
            .unwrap();
        assert_eq!(provided_api_key(&from_header).as_deref(), Some("k1"));

        let from_query = Request::builder().uri("/updates?foo=1&api_key=k2").body(()).unwrap();
        assert_eq!(provided_api_key(&from_query).as_deref(), Some("k2"));

        let missing = Request::builder().uri("/updates").body(()).unwrap();
        assert!(provided_api_key(&missing).is_none());
    }
}
