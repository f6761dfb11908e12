#![allow(dead_code)]

use thiserror::Error;

/// Top-level error type for the arena vision system.
///
/// Variant families line up with the behavioural error kinds the system
/// distinguishes at runtime: a `Startup` error always aborts the process,
/// the rest are absorbed where they occur and only ever reach a log line.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("startup error: {0}")]
    Startup(#[from] StartupError),

    #[error("frame ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("frame processing error: {0}")]
    Frame(#[from] FrameError),

    #[error("robot protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("robot registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("streaming error: {0}")]
    Stream(#[from] StreamError),

    #[error("external collaborator error: {0}")]
    External(#[from] ExternalError),

    #[error("system error: {message}")]
    System { message: String },
}

/// Startup-fatal: port unavailable, missing decoder, malformed configuration.
/// Each variant carries the exit code the supervisor should use when it
/// surfaces from `main`.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("port {port} ({proto}) is already in use at {host}")]
    PortInUse {
        host: String,
        port: u16,
        proto: &'static str,
    },

    #[error("decoder pipeline could not be launched: {details}")]
    DecoderMissing { details: String },

    #[error("io error during startup: {0}")]
    Io(#[from] std::io::Error),
}

impl StartupError {
    /// Process exit code this failure should produce, per the exit-code table.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Config(_) => 3,
            StartupError::PortInUse { .. } => 1,
            StartupError::DecoderMissing { .. } => 2,
            StartupError::Io(_) => 1,
        }
    }
}

/// Ingest-degraded: decode subprocess exits, socket read error.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("udp socket read failed: {0}")]
    SocketRead(#[from] std::io::Error),

    #[error("decoder process exited unexpectedly (status: {status})")]
    DecoderExited { status: String },

    #[error("decoder pipe closed")]
    PipeClosed,
}

/// Per-frame-recoverable: detector or homography failure for a single frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("marker detection failed: {details}")]
    Detection { details: String },

    #[error("homography computation failed: {details}")]
    Homography { details: String },

    #[error("jpeg encode failed: {details}")]
    JpegEncode { details: String },

    #[error("jpeg decode failed: {details}")]
    JpegDecode { details: String },
}

/// Per-connection-transient and validation errors for the robot protocol.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("socket send failed: {0}")]
    Send(#[from] std::io::Error),

    #[error("invalid json frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("team name \"{0}\" is already registered on another live connection")]
    DuplicateName(String),

    #[error("op {op} received before begin")]
    NotRegistered { op: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// RobotRegistry-local errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown robot: {0}")]
    UnknownRobot(String),
}

/// MJPEG / websocket streaming errors.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("http server error: {0}")]
    Http(String),

    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// External-collaborator errors: ML worker, decoder binary, static config loader.
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("ml worker enqueue failed: {details}")]
    MlEnqueueFailed { details: String },
}

impl AppError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Behavioural severity, matching the error-kind table: used to pick the
    /// tracing level a call site logs at.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Startup(_) => ErrorSeverity::Fatal,
            AppError::Ingest(_) => ErrorSeverity::Warning,
            AppError::Frame(_) => ErrorSeverity::Debug,
            AppError::Protocol(ProtocolError::DuplicateName(_))
            | AppError::Protocol(ProtocolError::NotRegistered { .. })
            | AppError::Protocol(ProtocolError::MissingField(_)) => ErrorSeverity::Validation,
            AppError::Protocol(_) => ErrorSeverity::Debug,
            AppError::Registry(_) => ErrorSeverity::Debug,
            AppError::Stream(_) => ErrorSeverity::Warning,
            AppError::External(_) => ErrorSeverity::Warning,
            AppError::System { .. } => ErrorSeverity::Error,
        }
    }

    /// True when this error should cause the robot connection it occurred
    /// on to be disconnected, per the RobotProtocol transition table.
    pub fn disconnects_connection(&self) -> bool {
        matches!(
            self,
            AppError::Protocol(ProtocolError::Send(_)) | AppError::Protocol(ProtocolError::DuplicateName(_))
        )
    }
}

/// Severity levels matching §7's behavioural error kinds, mapped onto
/// tracing levels by the logging facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Fatal,
    Error,
    Warning,
    Validation,
    Debug,
}

impl ErrorSeverity {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            ErrorSeverity::Fatal | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning | ErrorSeverity::Validation => tracing::Level::WARN,
            ErrorSeverity::Debug => tracing::Level::DEBUG,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_exit_codes_are_distinct_by_kind() {
        let port = StartupError::PortInUse {
            host: "0.0.0.0".into(),
            port: 8080,
            proto: "tcp",
        };
        let decoder = StartupError::DecoderMissing {
            details: "gst-launch-1.0 not found".into(),
        };
        assert_ne!(port.exit_code(), 0);
        assert_ne!(decoder.exit_code(), 0);
        assert_ne!(port.exit_code(), decoder.exit_code());
    }

    #[test]
    fn duplicate_name_is_validation_severity_and_no_disconnect() {
        let err = AppError::Protocol(ProtocolError::DuplicateName("Gamma".into()));
        assert_eq!(err.severity(), ErrorSeverity::Validation);
        assert!(err.disconnects_connection());
    }

    #[test]
    fn send_failure_disconnects_the_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err = AppError::Protocol(ProtocolError::Send(io));
        assert!(err.disconnects_connection());
    }

    #[test]
    fn ingest_errors_are_warning_severity() {
        let err = AppError::Ingest(IngestError::PipeClosed);
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn error_display_formatting() {
        let err = AppError::Registry(RegistryError::UnknownRobot("Beta".into()));
        assert_eq!(
            err.to_string(),
            "robot registry error: unknown robot: Beta"
        );
    }
}
