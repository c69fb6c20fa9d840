use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::{Connection, Frame, FrameReceiver, FrameSender, Transport, TransportError};
use crate::models::{ConnectionSettings, SslMode};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Connection, TransportError> {
        info!("Connecting to {} (ssl mode: {:?})", settings.url, settings.ssl_mode);
        check_scheme(settings)?;

        let connector = match settings.ssl_mode {
            // tokio-tungstenite builds a verifying rustls config for wss:// URLs
            SslMode::Regular => None,
            SslMode::Insecure => Some(Connector::Rustls(Arc::new(insecure_tls_config(
                &settings.url,
            )?))),
            SslMode::None => Some(Connector::Plain),
        };

        let (stream, _response) =
            connect_async_tls_with_config(settings.url.as_str(), None, false, connector)
                .await
                .map_err(|e| classify_connect_error(settings, e))?;

        info!("Connected to {}", settings.url);

        let (sink, stream) = stream.split();
        Ok(Connection {
            sender: Box::new(WebSocketSender { sink }),
            receiver: Box::new(WebSocketReceiver { stream }),
        })
    }
}

struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSender for WebSocketSender {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
        };
        self.sink.send(message).await.map_err(|e| match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            other => TransportError::Send {
                message: other.to_string(),
            },
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!("Closing WebSocket connection");
        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send {
                message: e.to_string(),
            }),
        }
    }
}

struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data.to_vec())),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => {
                    return Err(TransportError::Closed)
                }
                Some(Err(e)) => {
                    return Err(TransportError::Receive {
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

/// Plain TCP cannot carry a `wss://` URL.
fn check_scheme(settings: &ConnectionSettings) -> Result<(), TransportError> {
    if settings.ssl_mode == SslMode::None && settings.url.starts_with("wss://") {
        return Err(TransportError::Connect {
            url: settings.url.clone(),
            message: "ssl mode `none` needs a ws:// URL; use ws:// or choose ssl mode `regular` or `insecure`"
                .to_string(),
        });
    }
    Ok(())
}

/// A reset or garbled handshake against a `wss://` URL almost always means the
/// server does not speak TLS.
fn classify_connect_error(settings: &ConnectionSettings, err: tungstenite::Error) -> TransportError {
    let url = settings.url.clone();
    let uses_tls = settings.ssl_mode != SslMode::None && settings.url.starts_with("wss://");
    let handshake_failed = match &err {
        tungstenite::Error::Tls(_) => true,
        tungstenite::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::InvalidData | ErrorKind::UnexpectedEof
        ),
        _ => false,
    };

    if uses_tls && handshake_failed {
        TransportError::SecurityMismatch {
            url,
            message: err.to_string(),
        }
    } else {
        TransportError::Connect {
            url,
            message: err.to_string(),
        }
    }
}

fn insecure_tls_config(url: &str) -> Result<ClientConfig, TransportError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Connect {
            url: url.to_string(),
            message: format!("invalid TLS configuration: {}", e),
        })?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
        .with_no_client_auth();
    Ok(config)
}

/// Certificate verifier for `SslMode::Insecure`: signatures are still checked,
/// the certificate chain is not.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
