//! TCP/WebSocket server driving the robot protocol on its own port, and the
//! 5 s server-initiated ping ticker.

use crate::arena::ArenaMapper;
use crate::error::{AppError, Result, StreamError};
use crate::events::{warn_unregistered_but_invisible_aruco, UiBroadcaster, UiEvent};
use crate::robot::ml::MlWorker;
use crate::robot::protocol::{self, Op, PingStatus};
use crate::robot::registry::{ConnectionHandle, RobotRegistry};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct RobotServerState {
    registry: Arc<RobotRegistry>,
    arena: Arc<Mutex<ArenaMapper>>,
    ui: Arc<UiBroadcaster>,
    ml_worker: Arc<dyn MlWorker>,
}

pub struct RobotServer {
    host: String,
    port: u16,
    state: RobotServerState,
}

impl RobotServer {
    pub fn new(
        host: String,
        port: u16,
        registry: Arc<RobotRegistry>,
        arena: Arc<Mutex<ArenaMapper>>,
        ui: Arc<UiBroadcaster>,
        ml_worker: Arc<dyn MlWorker>,
    ) -> Self {
        Self {
            host,
            port,
            state: RobotServerState {
                registry,
                arena,
                ui,
                ml_worker,
            },
        }
    }

    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone());

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;
        info!("robot protocol server listening on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| AppError::Stream(StreamError::Http(e.to_string())))?;

        Ok(())
    }

    /// Server-initiated ping ticker: every 5 seconds, increment every
    /// connected robot's missed-ping count and send it a ping; disconnect
    /// whoever just crossed 5 consecutive misses.
    pub async fn run_ping_ticker(registry: Arc<RobotRegistry>, ui: Arc<UiBroadcaster>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {}
            }

            let timed_out = registry.tick_pings();
            for name in &timed_out {
                warn!(team = %name, "robot missed 5 consecutive pings, disconnecting");
                ui.log(tracing::Level::WARN, format!("{name} timed out (no ping response)"));
            }
            if !timed_out.is_empty() {
                ui.publish(UiEvent::Roster {
                    robots: registry.snapshot(),
                });
            }

            for name in registry.names() {
                if let Some(conn) = registry.connection_of(&name) {
                    if conn.send(protocol::ping_request()).is_err() {
                        registry.disconnect(&name, conn.id);
                    }
                }
            }
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RobotServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RobotServerState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = ConnectionHandle::new(tx);
    let mut adopted_name: Option<String> = None;

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else {
            continue;
        };

        let op = match protocol::parse_message(&text) {
            Ok(op) => op,
            Err(e) => {
                state.ui.log_error(&e);
                continue;
            }
        };

        if adopted_name.is_none() {
            adopted_name = op.team_name().map(|s| s.to_string());
        }

        if let Some(name) = op.team_name() {
            state.registry.record_seen(name);
        }

        if let Err(e) = dispatch(&state, &conn, op).await {
            state.ui.log_error(&e);
            if e.disconnects_connection() {
                break;
            }
        }
    }

    if let Some(name) = adopted_name {
        state.registry.disconnect(&name, conn.id);
        state.ui.log(tracing::Level::INFO, format!("{name} disconnected"));
        state.ui.publish(UiEvent::Roster {
            robots: state.registry.snapshot(),
        });
    }
    writer.abort();
}

async fn dispatch(state: &RobotServerState, conn: &ConnectionHandle, op: Op) -> Result<()> {
    match op {
        Op::Begin {
            team_name,
            team_type,
            marker_id,
        } => {
            state
                .registry
                .assign_connection(&team_name, team_type, marker_id, conn.clone())?;
            state.ui.log(
                tracing::Level::INFO,
                format!("{team_name} registered (marker {marker_id})"),
            );
            state.ui.publish(UiEvent::Roster {
                robots: state.registry.snapshot(),
            });
            if marker_id >= 0 {
                let seen = state.arena.lock().await.seen(marker_id);
                if !seen {
                    warn_unregistered_but_invisible_aruco(&team_name, marker_id);
                }
            }
            Ok(())
        }
        Op::Print { team_name, message } => {
            state.ui.publish(UiEvent::TeamLog {
                team_name,
                message,
                timestamp: std::time::SystemTime::now(),
            });
            Ok(())
        }
        Op::Ping { team_name, status } => match status {
            PingStatus::Ping => {
                state.registry.reset_missed_pings(&team_name);
                conn.send(protocol::pong_reply(&team_name))
            }
            PingStatus::Pong => {
                state.registry.reset_missed_pings(&team_name);
                Ok(())
            }
        },
        Op::Aruco { team_name } => {
            let reply = match state.registry.latest_valid_pose(&team_name) {
                Some((x, y, theta)) => protocol::aruco_reply(x, y, theta, true),
                None => protocol::aruco_reply(-1.0, -1.0, -1.0, false),
            };
            conn.send(reply)
        }
        Op::PredictionRequest {
            team_name,
            index,
            frame,
        } => {
            state.ui.publish(UiEvent::PredictionRequest {
                team_name: team_name.clone(),
                index,
                frame: frame.clone(),
            });
            state.ml_worker.enqueue(&team_name, index, frame).await
        }
        Op::Ignore => Ok(()),
    }
}
