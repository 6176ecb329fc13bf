//! QUIC client used by the orchestrator side to issue CSI requests.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::crypto::rustls::QuicClientConfig;
use tracing::{debug, instrument};

use super::MAX_MESSAGE_SIZE;
use crate::error::CsiError;
use crate::message::CsiMessage;

/// A lightweight CSI client that sends [`CsiMessage`] requests over a single
/// QUIC connection and returns the server's response.
pub struct CsiClient {
    endpoint: quinn::Endpoint,
    connection: quinn::Connection,
}

impl CsiClient {
    /// Establish a new QUIC connection to the CSI server at `addr`.
    ///
    /// `server_name` must match a SAN in the server certificate.
    pub async fn connect(
        addr: SocketAddr,
        server_name: &str,
        tls_config: rustls::ClientConfig,
    ) -> Result<Self, CsiError> {
        let quic_client_config = QuicClientConfig::try_from(tls_config)
            .map_err(|e| CsiError::TransportError(format!("invalid TLS config: {e}")))?;
        let client_config = quinn::ClientConfig::new(Arc::new(quic_client_config));

        let bind: SocketAddr = if addr.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };
        let mut endpoint = quinn::Endpoint::client(bind).map_err(CsiError::transport)?;
        endpoint.set_default_client_config(client_config);

        let connection = endpoint
            .connect(addr, server_name)
            .map_err(CsiError::transport)?
            .await
            .map_err(CsiError::transport)?;

        debug!(%addr, %server_name, "CSI QUIC connection established");
        Ok(Self {
            endpoint,
            connection,
        })
    }

    /// Send a request and wait for the corresponding response.
    ///
    /// Each call opens a new bi-directional QUIC stream.  Response variants
    /// are refused locally without touching the connection.
    #[instrument(skip(self), fields(msg = %msg))]
    pub async fn request(&self, msg: &CsiMessage) -> Result<CsiMessage, CsiError> {
        if !msg.is_request() {
            return Err(CsiError::invalid(format!("{msg} is not a request")));
        }

        let (mut send, mut recv) = self
            .connection
            .open_bi()
            .await
            .map_err(CsiError::transport)?;

        let payload = serde_json::to_vec(msg).map_err(CsiError::internal)?;
        send.write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        send.finish().map_err(CsiError::transport)?;

        let buf = recv
            .read_to_end(MAX_MESSAGE_SIZE)
            .await
            .map_err(CsiError::transport)?;

        let response: CsiMessage = serde_json::from_slice(&buf).map_err(CsiError::transport)?;
        debug!(%response, "CSI response received");
        Ok(response)
    }

    /// Send a request and turn [`CsiMessage::Error`] into `Err`.
    pub async fn call(&self, msg: &CsiMessage) -> Result<CsiMessage, CsiError> {
        match self.request(msg).await? {
            CsiMessage::Error(e) => Err(e),
            response => Ok(response),
        }
    }

    /// Close the connection and wait for the peer to acknowledge.
    pub async fn close(&self) {
        self.connection
            .close(quinn::VarInt::from_u32(0), b"client shutdown");
        self.endpoint.wait_idle().await;
    }
}
