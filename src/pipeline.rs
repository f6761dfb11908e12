//! Per-frame glue: frame source -> decode -> detect -> arena map -> overlay
//! render -> frame bus. Runs as one background task and yields after every
//! frame so connection I/O on the other tasks is never starved.

use crate::arena::ArenaMapper;
use crate::error::{AppError, FrameError, Result};
use crate::events::UiBroadcaster;
use crate::frame_bus::{FrameBus, Slot};
use crate::frame_source::FrameSource;
use crate::marker::MarkerDetector;
use crate::overlay::OverlayRenderer;
use crate::robot::RobotRegistry;
use opencv::core::Vector;
use opencv::imgcodecs;
use opencv::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Pipeline {
    source: Arc<dyn FrameSource>,
    detector: MarkerDetector,
    arena: Arc<Mutex<ArenaMapper>>,
    overlay: OverlayRenderer,
    frame_bus: Arc<FrameBus>,
    registry: Arc<RobotRegistry>,
    ui: Arc<UiBroadcaster>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: MarkerDetector,
        arena: Arc<Mutex<ArenaMapper>>,
        overlay: OverlayRenderer,
        frame_bus: Arc<FrameBus>,
        registry: Arc<RobotRegistry>,
        ui: Arc<UiBroadcaster>,
    ) -> Self {
        Self {
            source,
            detector,
            arena,
            overlay,
            frame_bus,
            registry,
            ui,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut frames = self.source.subscribe();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = frames.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            let Some(raw) = frames.borrow_and_update().clone() else {
                continue;
            };

            if let Err(e) = self.process_one(&raw.data).await {
                self.ui.log_error(&e);
            }

            tokio::task::yield_now().await;
        }
    }

    async fn process_one(&mut self, jpeg: &[u8]) -> Result<()> {
        let buf: Vector<u8> = Vector::from_slice(jpeg);
        let bgr = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR).map_err(|e| {
            AppError::Frame(FrameError::JpegDecode {
                details: format!("imdecode failed: {e}"),
            })
        })?;
        if bgr.empty() {
            return Err(AppError::Frame(FrameError::JpegDecode {
                details: "decoded frame is empty".to_string(),
            }));
        }

        let markers = self.detector.detect(&bgr)?;

        let mut arena = self.arena.lock().await;
        arena.process(markers.clone())?;
        let transform = arena.transform().cloned();

        for name in self.registry.names() {
            if let Some(marker_id) = self.registry.marker_id_of(&name) {
                if marker_id >= 0 {
                    self.registry.push_pose(&name, arena.pose_of(marker_id));
                }
            }
        }
        drop(arena);

        let outputs = self.overlay.render(&bgr, &markers, transform.as_ref())?;
        self.frame_bus.publish(Slot::Raw, jpeg.to_vec());
        self.frame_bus.publish(Slot::Overlay, outputs.overlay_jpeg);
        if let Some(crop_jpeg) = outputs.crop_jpeg {
            self.frame_bus.publish(Slot::Crop, crop_jpeg);
        }

        debug!(markers = markers.len(), "frame processed");
        Ok(())
    }
}
