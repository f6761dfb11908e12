use crate::events::UiEvent;
use crate::frame_bus::Slot;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use bytes::Bytes;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::server::FrontendState;

async fn mjpeg_handler(state: FrontendState, slot: Slot) -> impl IntoResponse {
    let stream = async_stream::stream! {
        let mut ticker = interval(state.target_frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let jpeg = state.frame_bus.snapshot(slot);
            let part = format!(
                "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                jpeg.len()
            );

            yield Ok::<_, axum::Error>(Bytes::from(part));
            yield Ok(Bytes::from(jpeg.as_ref().clone()));
            yield Ok(Bytes::from_static(b"\r\n"));
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .body(axum::body::Body::from_stream(stream))
        .unwrap()
}

pub async fn video_handler(State(state): State<FrontendState>) -> impl IntoResponse {
    mjpeg_handler(state, Slot::Raw).await
}

pub async fn overlay_handler(State(state): State<FrontendState>) -> impl IntoResponse {
    mjpeg_handler(state, Slot::Overlay).await
}

pub async fn crop_handler(State(state): State<FrontendState>) -> impl IntoResponse {
    mjpeg_handler(state, Slot::Crop).await
}

/// Placeholder landing page; the real UI markup is an external collaborator.
pub async fn index_handler() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Arena Vision</title>
</head>
<body>
    <img src="/overlay" alt="overlay stream">
</body>
</html>
"#,
    )
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<FrontendState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ui_socket(socket, state))
}

async fn handle_ui_socket(mut socket: WebSocket, state: FrontendState) {
    info!("ui websocket client connected");
    let mut rx = state.ui.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let event: UiEvent = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "ui websocket client lagged, dropping oldest events");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn index_handler_returns_html() {
        let response = index_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
