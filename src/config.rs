#![allow(dead_code)]

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub system: SystemConfig,
    pub camera: CameraConfig,
    pub frontend: FrontendConfig,
    pub communications: CommunicationsConfig,
    pub machinelearning: MachineLearningConfig,
    pub arena: ArenaConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    RtpH264,
    UdpJpeg,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_camera_mode")]
    pub mode: CameraMode,

    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,

    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    #[serde(default = "default_rtp_payload")]
    pub rtp_payload: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_host")]
    pub host: String,

    #[serde(default = "default_frontend_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommunicationsConfig {
    #[serde(default = "default_ws_host")]
    pub ws_host: String,

    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MachineLearningConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_models_dir")]
    pub models_dir: String,
}

/// Corner marker ids in BL, TL, TR, BR order.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct CornerIds {
    pub bl: i32,
    pub tl: i32,
    pub tr: i32,
    pub br: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JpegQualityConfig {
    #[serde(default = "default_overlay_quality")]
    pub overlay: u8,

    #[serde(default = "default_crop_quality")]
    pub crop: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArenaConfig {
    #[serde(default = "default_corner_ids")]
    pub ids: CornerIds,

    /// Physical arena corner coordinates, in BL, TL, TR, BR order.
    #[serde(default = "default_world_corners")]
    pub world_corners: [(f64, f64); 4],

    #[serde(default = "default_crop_refresh_seconds")]
    pub crop_refresh_seconds: f64,

    #[serde(default = "default_border_marker_fraction")]
    pub border_marker_fraction: f64,

    #[serde(default = "default_output_width")]
    pub output_width: u32,

    #[serde(default = "default_output_height")]
    pub output_height: u32,

    #[serde(default = "default_vertical_padding_fraction")]
    pub vertical_padding_fraction: f64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: JpegQualityConfig,
}

impl AppConfig {
    /// Load configuration from built-in defaults, an optional JSON file, and
    /// `VISION_`-prefixed environment variable overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("system.log_level", default_log_level())?
            .set_default("camera.mode", "udp_jpeg")?
            .set_default("camera.bind_ip", default_bind_ip())?
            .set_default("camera.bind_port", default_bind_port())?
            .set_default("camera.rtp_payload", default_rtp_payload() as i64)?
            .set_default("frontend.host", default_frontend_host())?
            .set_default("frontend.port", default_frontend_port())?
            .set_default("communications.ws_host", default_ws_host())?
            .set_default("communications.ws_port", default_ws_port())?
            .set_default("machinelearning.enabled", false)?
            .set_default("machinelearning.models_dir", default_models_dir())?
            .set_default("arena.ids.bl", 0)?
            .set_default("arena.ids.tl", 1)?
            .set_default("arena.ids.tr", 2)?
            .set_default("arena.ids.br", 3)?
            .set_default(
                "arena.world_corners",
                default_world_corners()
                    .iter()
                    .map(|(x, y)| vec![*x, *y])
                    .collect::<Vec<_>>(),
            )?
            .set_default("arena.crop_refresh_seconds", default_crop_refresh_seconds())?
            .set_default(
                "arena.border_marker_fraction",
                default_border_marker_fraction(),
            )?
            .set_default("arena.output_width", default_output_width() as i64)?
            .set_default("arena.output_height", default_output_height() as i64)?
            .set_default(
                "arena.vertical_padding_fraction",
                default_vertical_padding_fraction(),
            )?
            .set_default("arena.jpeg_quality.overlay", default_overlay_quality() as i64)?
            .set_default("arena.jpeg_quality.crop", default_crop_quality() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("VISION").separator("_"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully from: {}", path_str);
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena.output_width == 0 || self.arena.output_height == 0 {
            return Err(ConfigError::Message(
                "arena.output_width and arena.output_height must be greater than 0".to_string(),
            ));
        }

        if self.arena.crop_refresh_seconds <= 0.0 {
            return Err(ConfigError::Message(
                "arena.crop_refresh_seconds must be positive".to_string(),
            ));
        }

        let ids = [
            self.arena.ids.bl,
            self.arena.ids.tl,
            self.arena.ids.tr,
            self.arena.ids.br,
        ];
        let mut sorted = ids;
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != ids.len() {
            return Err(ConfigError::Message(
                "arena.ids must name four distinct corner marker ids".to_string(),
            ));
        }

        if self.camera.bind_port == self.frontend.port || self.camera.bind_port == self.communications.ws_port {
            return Err(ConfigError::Message(
                "camera.bind_port must differ from frontend.port and communications.ws_port"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig {
                log_level: default_log_level(),
            },
            camera: CameraConfig {
                mode: default_camera_mode(),
                bind_ip: default_bind_ip(),
                bind_port: default_bind_port(),
                rtp_payload: default_rtp_payload(),
            },
            frontend: FrontendConfig {
                host: default_frontend_host(),
                port: default_frontend_port(),
            },
            communications: CommunicationsConfig {
                ws_host: default_ws_host(),
                ws_port: default_ws_port(),
            },
            machinelearning: MachineLearningConfig {
                enabled: false,
                models_dir: default_models_dir(),
            },
            arena: ArenaConfig {
                ids: default_corner_ids(),
                world_corners: default_world_corners(),
                crop_refresh_seconds: default_crop_refresh_seconds(),
                border_marker_fraction: default_border_marker_fraction(),
                output_width: default_output_width(),
                output_height: default_output_height(),
                vertical_padding_fraction: default_vertical_padding_fraction(),
                jpeg_quality: default_jpeg_quality(),
            },
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_camera_mode() -> CameraMode {
    CameraMode::UdpJpeg
}
fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_bind_port() -> u16 {
    5000
}
fn default_rtp_payload() -> u8 {
    96
}
fn default_frontend_host() -> String {
    "0.0.0.0".to_string()
}
fn default_frontend_port() -> u16 {
    8080
}
fn default_ws_host() -> String {
    "0.0.0.0".to_string()
}
fn default_ws_port() -> u16 {
    7755
}
fn default_models_dir() -> String {
    "./models".to_string()
}
fn default_corner_ids() -> CornerIds {
    CornerIds {
        bl: 0,
        tl: 1,
        tr: 2,
        br: 3,
    }
}
fn default_world_corners() -> [(f64, f64); 4] {
    [(0.0, 0.0), (0.0, 2.0), (4.0, 2.0), (4.0, 0.0)]
}
fn default_crop_refresh_seconds() -> f64 {
    600.0
}
fn default_border_marker_fraction() -> f64 {
    0.5
}
fn default_output_width() -> u32 {
    1000
}
fn default_output_height() -> u32 {
    500
}
fn default_vertical_padding_fraction() -> f64 {
    0.01
}
fn default_overlay_quality() -> u8 {
    80
}
fn default_crop_quality() -> u8 {
    75
}
fn default_jpeg_quality() -> JpegQualityConfig {
    JpegQualityConfig {
        overlay: default_overlay_quality(),
        crop: default_crop_quality(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_output_dimensions() {
        let mut config = AppConfig::default();
        config.arena.output_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_corner_ids() {
        let mut config = AppConfig::default();
        config.arena.ids.tl = config.arena.ids.bl;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_colliding_ports() {
        let mut config = AppConfig::default();
        config.camera.bind_port = config.frontend.port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn environment_variable_override_is_visible_to_config_crate() {
        env::set_var("VISION_FRONTEND_PORT", "9090");
        assert_eq!(env::var("VISION_FRONTEND_PORT").unwrap(), "9090");
        env::remove_var("VISION_FRONTEND_PORT");
    }

    #[test]
    fn default_world_corners_match_bl_tl_tr_br_order() {
        let corners = default_world_corners();
        assert_eq!(corners[0], (0.0, 0.0));
        assert_eq!(corners[2], (4.0, 2.0));
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("arena-vision.json");
        std::fs::write(&path, r#"{"frontend": {"port": 9191}}"#).unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.frontend.port, 9191);
        assert_eq!(config.camera.bind_port, default_bind_port());
    }

    #[test]
    fn load_from_file_missing_path_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/arena-vision.json").unwrap();
        assert_eq!(config.frontend.port, default_frontend_port());
    }
}
