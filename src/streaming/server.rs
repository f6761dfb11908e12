use crate::error::{AppError, Result, StreamError};
use crate::events::UiBroadcaster;
use crate::frame_bus::FrameBus;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handlers::{crop_handler, index_handler, overlay_handler, video_handler, ws_handler};

/// Shared state for the browser-facing Axum server.
#[derive(Clone)]
pub struct FrontendState {
    pub(crate) frame_bus: Arc<FrameBus>,
    pub(crate) ui: Arc<UiBroadcaster>,
    pub(crate) target_frame_interval: Duration,
}

/// Serves the MJPEG views and the UI event websocket on one HTTP listener.
pub struct FrontendServer {
    host: String,
    port: u16,
    state: FrontendState,
}

impl FrontendServer {
    pub fn new(host: String, port: u16, frame_bus: Arc<FrameBus>, ui: Arc<UiBroadcaster>) -> Self {
        Self {
            host,
            port,
            state: FrontendState {
                frame_bus,
                ui,
                // ~20 Hz, per the MJPEG endpoint's pacing.
                target_frame_interval: Duration::from_millis(50),
            },
        }
    }

    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let app = Router::new()
            .route("/", get(index_handler))
            .route("/video", get(video_handler))
            .route("/overlay", get(overlay_handler))
            .route("/crop", get(crop_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.state);

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;
        info!("frontend server listening on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| AppError::Stream(StreamError::Http(e.to_string())))?;

        Ok(())
    }
}
