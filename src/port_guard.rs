//! Trial-binds every port the system needs before anything else starts, so
//! a conflict surfaces as one clear startup error instead of a confusing
//! failure deep inside whichever component grabs its port last.

use crate::config::{AppConfig, CameraMode};
use crate::error::{AppError, Result, StartupError};
use std::net::{TcpListener, UdpSocket};
use tracing::info;

struct PortCheck {
    host: String,
    port: u16,
    proto: &'static str,
}

fn try_bind(check: &PortCheck) -> Result<()> {
    let addr = (check.host.as_str(), check.port);
    let bound = match check.proto {
        "tcp" => TcpListener::bind(addr).map(drop),
        "udp" => UdpSocket::bind(addr).map(drop),
        _ => unreachable!("unknown protocol"),
    };
    bound.map_err(|_| {
        AppError::Startup(StartupError::PortInUse {
            host: check.host.clone(),
            port: check.port,
            proto: check.proto,
        })
    })
}

/// Checks the frontend and robot-protocol TCP ports, plus the camera UDP
/// ingest port when running in datagram-JPEG mode. Returns the first
/// conflict found; callers should treat any error here as startup-fatal.
pub fn ensure_ports_available(config: &AppConfig) -> Result<()> {
    let mut checks = vec![
        PortCheck {
            host: config.frontend.host.clone(),
            port: config.frontend.port,
            proto: "tcp",
        },
        PortCheck {
            host: config.communications.ws_host.clone(),
            port: config.communications.ws_port,
            proto: "tcp",
        },
    ];

    if config.camera.mode == CameraMode::UdpJpeg {
        checks.push(PortCheck {
            host: config.camera.bind_ip.clone(),
            port: config.camera.bind_port,
            proto: "udp",
        });
    }

    for check in &checks {
        try_bind(check)?;
    }

    info!(
        "port guard ok: frontend {}:{}, robot protocol {}:{}",
        config.frontend.host, config.frontend.port, config.communications.ws_host, config.communications.ws_port
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_ports_are_all_free() {
        let config = AppConfig::default();
        assert!(ensure_ports_available(&config).is_ok());
    }

    #[test]
    fn already_bound_tcp_port_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = AppConfig::default();
        config.frontend.host = "127.0.0.1".to_string();
        config.frontend.port = port;
        config.communications.ws_port = port + 1;

        let err = ensure_ports_available(&config).unwrap_err();
        assert!(matches!(
            err,
            AppError::Startup(StartupError::PortInUse { .. })
        ));
    }

    #[test]
    fn rtp_mode_skips_the_udp_camera_check() {
        let mut config = AppConfig::default();
        config.camera.mode = CameraMode::RtpH264;
        config.communications.ws_port = config.frontend.port + 1;
        assert!(ensure_ports_available(&config).is_ok());
    }
}
