use super::{Component, ComponentState, ProcessSupervisor};
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::port_guard;
use crate::robot::RobotServer;
use crate::streaming::FrontendServer;
use tracing::{error, info};

impl ProcessSupervisor {
    /// Startup order: port guard -> frame source -> detector+mapper ->
    /// overlay renderer loop -> frame bus -> MJPEG endpoint -> robot
    /// protocol server -> UI broadcaster.
    pub async fn start(&mut self) -> Result<()> {
        info!("starting arena vision system");

        port_guard::ensure_ports_available(&self.config)?;

        self.set_component_state(Component::FrameSource, ComponentState::Starting)
            .await;
        self.frame_source.start().await.map_err(|e| {
            error!("failed to start frame source: {e}");
            e
        })?;
        self.set_component_state(Component::FrameSource, ComponentState::Running)
            .await;

        self.set_component_state(Component::Pipeline, ComponentState::Starting)
            .await;
        let pipeline = Pipeline::new(
            std::sync::Arc::clone(&self.frame_source),
            self.marker_detector()?,
            std::sync::Arc::clone(&self.arena),
            self.overlay_renderer(),
            std::sync::Arc::clone(&self.frame_bus),
            std::sync::Arc::clone(&self.registry),
            std::sync::Arc::clone(&self.ui),
        );
        let pipeline_cancel = self.cancellation_token.clone();
        self.pipeline_task = Some(tokio::spawn(pipeline.run(pipeline_cancel)));
        self.set_component_state(Component::Pipeline, ComponentState::Running)
            .await;

        self.set_component_state(Component::Frontend, ComponentState::Starting)
            .await;
        let frontend = FrontendServer::new(
            self.config.frontend.host.clone(),
            self.config.frontend.port,
            std::sync::Arc::clone(&self.frame_bus),
            std::sync::Arc::clone(&self.ui),
        );
        let frontend_cancel = self.cancellation_token.clone();
        self.frontend_task = Some(tokio::spawn(async move {
            if let Err(e) = frontend.serve(frontend_cancel).await {
                error!("frontend server error: {e}");
            }
        }));
        self.set_component_state(Component::Frontend, ComponentState::Running)
            .await;

        self.set_component_state(Component::RobotServer, ComponentState::Starting)
            .await;
        let robot_server = self.robot_server();
        let robot_cancel = self.cancellation_token.clone();
        self.robot_task = Some(tokio::spawn(async move {
            if let Err(e) = robot_server.serve(robot_cancel).await {
                error!("robot protocol server error: {e}");
            }
        }));
        self.set_component_state(Component::RobotServer, ComponentState::Running)
            .await;

        self.set_component_state(Component::PingTicker, ComponentState::Starting)
            .await;
        let ping_registry = std::sync::Arc::clone(&self.registry);
        let ping_ui = std::sync::Arc::clone(&self.ui);
        let ping_cancel = self.cancellation_token.clone();
        self.ping_task = Some(tokio::spawn(RobotServer::run_ping_ticker(
            ping_registry,
            ping_ui,
            ping_cancel,
        )));
        self.set_component_state(Component::PingTicker, ComponentState::Running)
            .await;

        info!("arena vision system started successfully");
        Ok(())
    }
}
