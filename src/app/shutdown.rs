use super::{Component, ComponentState, ProcessSupervisor, ShutdownReason};
use crate::error::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

impl ProcessSupervisor {
    /// Blocks until a shutdown signal arrives, then runs the stop sequence.
    pub async fn run(&mut self) -> Result<i32> {
        info!("arena vision system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| AppError::system("shutdown sender already taken"))?;
        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| AppError::system("shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| AppError::system("shutdown channel closed unexpectedly"))?;
        info!("shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;
        info!("arena vision system shutdown complete");
        Ok(exit_code)
    }

    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                if let Some(()) = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler")
                    .recv()
                    .await
                {
                    info!("received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }

    /// Stop every component in the reverse of startup order, each bounded by
    /// a short timeout so one wedged task can't hang the whole shutdown.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if self
            .await_task(Component::PingTicker, self.ping_task.take(), Duration::from_secs(2))
            .await
            .is_err()
        {
            exit_code = 1;
        }
        if self
            .await_task(Component::RobotServer, self.robot_task.take(), Duration::from_secs(3))
            .await
            .is_err()
        {
            exit_code = 1;
        }
        if self
            .await_task(Component::Frontend, self.frontend_task.take(), Duration::from_secs(3))
            .await
            .is_err()
        {
            exit_code = 1;
        }
        if self
            .await_task(Component::Pipeline, self.pipeline_task.take(), Duration::from_secs(3))
            .await
            .is_err()
        {
            exit_code = 1;
        }

        self.set_component_state(Component::FrameSource, ComponentState::Stopping)
            .await;
        self.frame_source.stop().await;
        self.set_component_state(Component::FrameSource, ComponentState::Stopped)
            .await;

        info!("graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn await_task(
        &self,
        component: Component,
        task: Option<JoinHandle<()>>,
        bound: Duration,
    ) -> Result<()> {
        let Some(task) = task else {
            return Ok(());
        };
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(bound, task).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{component} stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{component} task panicked: {e}");
                Err(AppError::system(format!("{component} task panicked: {e}")))
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{component} stop timed out");
                Err(AppError::system(format!("{component} stop timeout")))
            }
        }
    }
}
