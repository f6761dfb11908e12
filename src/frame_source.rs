//! Owns the video ingest path. Two interchangeable implementations behind
//! one contract: start a background task, expose the newest frame, stop on
//! command. Modelled after a background-task-plus-atomic-slot pattern, with
//! a `watch` channel standing in for the atomic slot so the processing loop
//! can await new frames instead of polling.

use crate::config::CameraConfig;
use crate::error::{AppError, IngestError, Result, StartupError};
use crate::frame::RawFrame;
use crate::jpeg_extractor::JpegExtractor;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self);
    fn latest_frame(&self) -> Option<RawFrame>;
    fn subscribe(&self) -> watch::Receiver<Option<RawFrame>>;
}

/// Binds a UDP socket; each datagram that looks like a complete JPEG
/// atomically replaces the latest frame. Malformed datagrams are dropped.
pub struct UdpJpegSource {
    bind_addr: String,
    is_running: Arc<AtomicBool>,
    frame_counter: Arc<AtomicU64>,
    tx: watch::Sender<Option<RawFrame>>,
    rx: watch::Receiver<Option<RawFrame>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl UdpJpegSource {
    pub fn new(config: &CameraConfig) -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            bind_addr: format!("{}:{}", config.bind_ip, config.bind_port),
            is_running: Arc::new(AtomicBool::new(false)),
            frame_counter: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FrameSource for UdpJpegSource {
    async fn start(&self) -> Result<()> {
        let socket = UdpSocket::bind(&self.bind_addr)
            .await
            .map_err(|e| AppError::Startup(StartupError::Io(e)))?;
        info!("udp jpeg frame source bound to {}", self.bind_addr);

        self.is_running.store(true, Ordering::SeqCst);
        let is_running = self.is_running.clone();
        let frame_counter = self.frame_counter.clone();
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 65536];
            while is_running.load(Ordering::SeqCst) {
                match socket.recv(&mut buf).await {
                    Ok(n) => {
                        let datagram = &buf[..n];
                        if RawFrame::looks_like_jpeg(datagram) {
                            let id = frame_counter.fetch_add(1, Ordering::SeqCst);
                            let frame = RawFrame::new(id, SystemTime::now(), datagram.to_vec());
                            let _ = tx.send(Some(frame));
                        }
                    }
                    Err(e) => {
                        warn!("udp jpeg source read error: {e}");
                    }
                }
            }
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    fn latest_frame(&self) -> Option<RawFrame> {
        self.rx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<RawFrame>> {
        self.rx.clone()
    }
}

/// Spawns an external `udpsrc ! rtph264depay ! h264parse ! avdec_h264 !
/// jpegenc ! fdsink` pipeline (conceptually) and carves JPEGs out of its
/// stdout via `JpegExtractor`.
pub struct RtpH264Source {
    launch_command: String,
    launch_args: Vec<String>,
    is_running: Arc<AtomicBool>,
    frame_counter: Arc<AtomicU64>,
    tx: watch::Sender<Option<RawFrame>>,
    rx: watch::Receiver<Option<RawFrame>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RtpH264Source {
    pub fn new(config: &CameraConfig) -> Self {
        let (tx, rx) = watch::channel(None);
        let caps = format!(
            "application/x-rtp,media=video,encoding-name=H264,payload={}",
            config.rtp_payload
        );
        Self {
            launch_command: "gst-launch-1.0".to_string(),
            launch_args: vec![
                "-q".into(),
                format!("udpsrc port={} caps=\"{caps}\"", config.bind_port),
                "!".into(),
                "rtph264depay".into(),
                "!".into(),
                "h264parse".into(),
                "!".into(),
                "avdec_h264".into(),
                "!".into(),
                "jpegenc".into(),
                "!".into(),
                "fdsink".into(),
                "fd=1".into(),
            ],
            is_running: Arc::new(AtomicBool::new(false)),
            frame_counter: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FrameSource for RtpH264Source {
    async fn start(&self) -> Result<()> {
        let mut child = tokio::process::Command::new(&self.launch_command)
            .args(&self.launch_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                AppError::Startup(StartupError::DecoderMissing {
                    details: format!("failed to launch {}: {e}", self.launch_command),
                })
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            AppError::Startup(StartupError::DecoderMissing {
                details: "decoder pipeline produced no stdout handle".to_string(),
            })
        })?;

        self.is_running.store(true, Ordering::SeqCst);
        let is_running = self.is_running.clone();
        let frame_counter = self.frame_counter.clone();
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            let mut extractor = JpegExtractor::new();
            let mut buf = vec![0u8; 65536];
            loop {
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        warn!("decoder pipeline stdout closed; freezing latest frame");
                        break;
                    }
                    Ok(n) => {
                        for jpeg in extractor.feed(&buf[..n]) {
                            let id = frame_counter.fetch_add(1, Ordering::SeqCst);
                            let frame = RawFrame::new(id, SystemTime::now(), jpeg);
                            let _ = tx.send(Some(frame));
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{}",
                            AppError::Ingest(IngestError::SocketRead(e))
                        );
                        break;
                    }
                }
            }
            let _ = child.kill().await;
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }

    fn latest_frame(&self) -> Option<RawFrame> {
        self.rx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<RawFrame>> {
        self.rx.clone()
    }
}

/// Builds the configured source variant.
pub fn build_source(config: &CameraConfig) -> Arc<dyn FrameSource> {
    match config.mode {
        crate::config::CameraMode::UdpJpeg => Arc::new(UdpJpegSource::new(config)),
        crate::config::CameraMode::RtpH264 => Arc::new(RtpH264Source::new(config)),
    }
}
