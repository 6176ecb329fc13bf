//! QUIC server that runs on each worker node and dispatches incoming CSI
//! requests to the appropriate trait implementations.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use quinn::crypto::rustls::QuicServerConfig;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use super::MAX_MESSAGE_SIZE;
use crate::controller::CsiController;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::message::CsiMessage;
use crate::node::CsiNode;

/// Held by every connection and stream task; the drain completes once all
/// clones are dropped.
type InFlight = mpsc::Sender<()>;

/// A CSI server that accepts QUIC connections and dispatches
/// [`CsiMessage`] requests to an [`CsiIdentity`] + [`CsiController`] +
/// [`CsiNode`] implementation.
pub struct CsiServer<T> {
    endpoint: quinn::Endpoint,
    handler: Arc<T>,
}

impl<T> CsiServer<T>
where
    T: CsiIdentity + CsiController + CsiNode + 'static,
{
    /// Create a new server bound to `addr`.
    pub fn new(
        addr: SocketAddr,
        tls_config: rustls::ServerConfig,
        handler: Arc<T>,
    ) -> Result<Self, CsiError> {
        let quic_server_config = QuicServerConfig::try_from(tls_config)
            .map_err(|e| CsiError::TransportError(format!("invalid TLS config: {e}")))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_server_config));
        let endpoint = quinn::Endpoint::server(server_config, addr).map_err(CsiError::transport)?;
        info!(addr = %endpoint.local_addr().unwrap_or(addr), "CSI QUIC server listening");
        Ok(Self { endpoint, handler })
    }

    /// Accept connections until the endpoint is closed.
    pub async fn serve(&self) -> Result<(), CsiError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then drain.
    ///
    /// Draining refuses new connections and new streams, waits for every
    /// in-flight request to write its response and finally closes the
    /// endpoint.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> Result<(), CsiError>
    where
        F: Future<Output = ()> + Send,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (in_flight, mut drained) = mpsc::channel::<()>(1);
        tokio::pin!(shutdown);

        loop {
            let incoming = tokio::select! {
                _ = &mut shutdown => break,
                incoming = self.endpoint.accept() => incoming,
            };
            let Some(incoming) = incoming else {
                debug!("endpoint closed");
                break;
            };

            let handler = Arc::clone(&self.handler);
            let stop = stop_rx.clone();
            let guard = in_flight.clone();
            tokio::spawn(async move {
                match incoming.await {
                    Ok(conn) => {
                        let remote = conn.remote_address();
                        debug!(%remote, "CSI connection accepted");
                        if let Err(e) = Self::handle_connection(conn, handler, stop, guard).await
                        {
                            warn!(%remote, error = %e, "CSI connection error");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "CSI incoming connection failed");
                    }
                }
            });
        }

        info!("CSI server draining");
        self.endpoint.set_server_config(None);
        let _ = stop_tx.send(true);
        drop(in_flight);
        // Resolves with `None` once every guard is gone.
        let _ = drained.recv().await;

        self.endpoint
            .close(quinn::VarInt::from_u32(0), b"server shutdown");
        self.endpoint.wait_idle().await;
        info!("CSI server stopped");
        Ok(())
    }

    /// Handle all bi-streams on a single connection.
    async fn handle_connection(
        conn: quinn::Connection,
        handler: Arc<T>,
        mut stop: watch::Receiver<bool>,
        guard: InFlight,
    ) -> Result<(), CsiError> {
        loop {
            let stream = tokio::select! {
                _ = stop.wait_for(|stopping| *stopping) => return Ok(()),
                stream = conn.accept_bi() => stream,
            };
            let (send, recv) = match stream {
                Ok(stream) => stream,
                Err(quinn::ConnectionError::ApplicationClosed(_))
                | Err(quinn::ConnectionError::LocallyClosed) => return Ok(()),
                Err(e) => return Err(CsiError::transport(e)),
            };

            let handler = Arc::clone(&handler);
            let guard = guard.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_stream(send, recv, &handler).await {
                    error!(error = %e, "CSI stream handler error");
                }
                drop(guard);
            });
        }
    }

    /// Process a single bi-stream: read request → dispatch → write response.
    #[instrument(skip_all)]
    async fn handle_stream(
        mut send: quinn::SendStream,
        mut recv: quinn::RecvStream,
        handler: &T,
    ) -> Result<(), CsiError> {
        let buf = recv
            .read_to_end(MAX_MESSAGE_SIZE)
            .await
            .map_err(CsiError::transport)?;

        let response = match serde_json::from_slice::<CsiMessage>(&buf) {
            Ok(request) => {
                debug!(%request, "CSI request received");
                Self::dispatch(handler, request).await
            }
            Err(e) => {
                warn!(error = %e, "malformed CSI request");
                CsiMessage::Error(CsiError::invalid(format!("malformed request: {e}")))
            }
        };
        debug!(%response, "CSI response");

        let payload = serde_json::to_vec(&response).map_err(CsiError::internal)?;
        send.write_all(&payload)
            .await
            .map_err(CsiError::transport)?;
        send.finish().map_err(CsiError::transport)?;
        Ok(())
    }

    /// Map a [`CsiMessage`] request to the correct trait method call and
    /// wrap the result in a response [`CsiMessage`].
    async fn dispatch(handler: &T, request: CsiMessage) -> CsiMessage {
        let result = match request {
            // --- Identity ---------------------------------------------------
            CsiMessage::Probe => handler.probe().await.map(CsiMessage::ProbeResult),
            CsiMessage::GetPluginInfo => handler
                .get_plugin_info()
                .await
                .map(CsiMessage::PluginInfoResponse),
            CsiMessage::GetPluginCapabilities => handler
                .get_plugin_capabilities()
                .await
                .map(CsiMessage::PluginCapabilitiesResponse),

            // --- Controller -------------------------------------------------
            CsiMessage::CreateVolume(req) => handler
                .create_volume(req)
                .await
                .map(CsiMessage::VolumeCreated),
            CsiMessage::DeleteVolume(id) => {
                handler.delete_volume(&id).await.map(|()| CsiMessage::Ok)
            }
            CsiMessage::ValidateVolumeCapabilities {
                volume_id,
                capabilities,
            } => handler
                .validate_volume_capabilities(&volume_id, &capabilities)
                .await
                .map(CsiMessage::CapabilitiesValidated),
            CsiMessage::ControllerGetCapabilities => CsiController::get_capabilities(handler)
                .await
                .map(CsiMessage::ControllerCapabilities),

            // --- Node -------------------------------------------------------
            CsiMessage::StageVolume(req) => {
                handler.stage_volume(req).await.map(|()| CsiMessage::Ok)
            }
            CsiMessage::UnstageVolume {
                volume_id,
                staging_target_path,
            } => handler
                .unstage_volume(&volume_id, &staging_target_path)
                .await
                .map(|()| CsiMessage::Ok),
            CsiMessage::PublishVolume(req) => {
                handler.publish_volume(req).await.map(|()| CsiMessage::Ok)
            }
            CsiMessage::UnpublishVolume {
                volume_id,
                target_path,
            } => handler
                .unpublish_volume(&volume_id, &target_path)
                .await
                .map(|()| CsiMessage::Ok),
            CsiMessage::GetNodeInfo => handler.get_info().await.map(CsiMessage::NodeInfoResponse),
            CsiMessage::NodeGetCapabilities => CsiNode::get_capabilities(handler)
                .await
                .map(CsiMessage::NodeCapabilities),

            // --- Response variants should never arrive as requests ----------
            other => {
                warn!(msg = %other, "unexpected message variant received as request");
                Err(CsiError::invalid(format!("unexpected message: {other}")))
            }
        };
        result.unwrap_or_else(CsiMessage::Error)
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CsiError> {
        self.endpoint.local_addr().map_err(CsiError::transport)
    }

    /// Return a reference to the underlying QUIC endpoint.
    pub fn endpoint(&self) -> &quinn::Endpoint {
        &self.endpoint
    }
}
