use super::types::{Component, ComponentState};
use crate::arena::ArenaMapper;
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::UiBroadcaster;
use crate::frame_bus::FrameBus;
use crate::frame_source::{build_source, FrameSource};
use crate::marker::MarkerDetector;
use crate::overlay::OverlayRenderer;
use crate::robot::{MlWorker, RobotRegistry, RobotServer, UnconfiguredMlWorker};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinates every long-lived component: the frame ingest/processing
/// pipeline, the browser-facing MJPEG/websocket server, and the robot
/// protocol server with its ping ticker.
pub struct ProcessSupervisor {
    pub(super) config: AppConfig,
    pub(super) ui: Arc<UiBroadcaster>,
    pub(super) frame_bus: Arc<FrameBus>,
    pub(super) registry: Arc<RobotRegistry>,
    pub(super) arena: Arc<Mutex<ArenaMapper>>,
    pub(super) frame_source: Arc<dyn FrameSource>,
    pub(super) ml_worker: Arc<dyn MlWorker>,

    pub(super) component_states: Arc<Mutex<HashMap<Component, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<super::types::ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<super::types::ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,

    pub(super) pipeline_task: Option<JoinHandle<()>>,
    pub(super) frontend_task: Option<JoinHandle<()>>,
    pub(super) robot_task: Option<JoinHandle<()>>,
    pub(super) ping_task: Option<JoinHandle<()>>,
}

impl ProcessSupervisor {
    /// `ui` is created and wired into the tracing subscriber by the caller
    /// before this is constructed, so `WebSinkLayer` and the browser
    /// websocket endpoint share the exact same broadcaster.
    pub fn new(config: AppConfig, ui: Arc<UiBroadcaster>) -> Result<Self> {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let frame_source = build_source(&config.camera);

        Ok(Self {
            ui,
            frame_bus: Arc::new(FrameBus::new()),
            registry: Arc::new(RobotRegistry::new()),
            arena: Arc::new(Mutex::new(ArenaMapper::new(config.arena.clone()))),
            frame_source,
            ml_worker: Arc::new(UnconfiguredMlWorker),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            pipeline_task: None,
            frontend_task: None,
            robot_task: None,
            ping_task: None,
            config,
        })
    }

    pub(super) fn marker_detector(&self) -> Result<MarkerDetector> {
        MarkerDetector::new()
    }

    pub(super) fn overlay_renderer(&self) -> OverlayRenderer {
        OverlayRenderer::new(
            self.config.arena.jpeg_quality.clone(),
            self.config.arena.output_width,
            self.config.arena.output_height,
        )
    }

    pub(super) fn robot_server(&self) -> RobotServer {
        RobotServer::new(
            self.config.communications.ws_host.clone(),
            self.config.communications.ws_port,
            Arc::clone(&self.registry),
            Arc::clone(&self.arena),
            Arc::clone(&self.ui),
            Arc::clone(&self.ml_worker),
        )
    }
}
