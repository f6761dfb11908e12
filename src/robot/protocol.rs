//! Wire format and op parsing for the robot-facing JSON protocol. Connection
//! state and dispatch live in `server.rs`; this module only knows how to
//! turn bytes into a typed `Op` and an `Op` reply into bytes.

use crate::error::{AppError, ProtocolError, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct RawMessage {
    op: String,
    #[serde(rename = "teamName")]
    team_name: Option<String>,
    #[serde(rename = "teamType")]
    team_type: Option<String>,
    aruco: Option<i32>,
    message: Option<String>,
    status: Option<String>,
    index: Option<i64>,
    frame: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    Ping,
    Pong,
}

#[derive(Debug, Clone)]
pub enum Op {
    Begin {
        team_name: String,
        team_type: String,
        marker_id: i32,
    },
    Print {
        team_name: String,
        message: String,
    },
    Ping {
        team_name: String,
        status: PingStatus,
    },
    Aruco {
        team_name: String,
    },
    PredictionRequest {
        team_name: String,
        index: i64,
        frame: Vec<u8>,
    },
    /// Frame with no `teamName`, an unrecognised `op`, or invalid JSON.
    Ignore,
}

impl Op {
    /// The team name this frame carries, used to "adopt" a connection for
    /// cleanup purposes on its first named frame.
    pub fn team_name(&self) -> Option<&str> {
        match self {
            Op::Begin { team_name, .. }
            | Op::Print { team_name, .. }
            | Op::Ping { team_name, .. }
            | Op::Aruco { team_name }
            | Op::PredictionRequest { team_name, .. } => Some(team_name),
            Op::Ignore => None,
        }
    }
}

/// Parse one inbound text frame. Never returns an error for unknown ops or
/// missing team names — those resolve to `Op::Ignore` per the protocol's
/// "unknown ops are ignored" rule. Only a malformed *required* field for a
/// recognised op surfaces as `ProtocolError`.
pub fn parse_message(text: &str) -> Result<Op> {
    let raw: RawMessage = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(_) => return Ok(Op::Ignore),
    };

    let Some(team_name) = raw.team_name else {
        return Ok(Op::Ignore);
    };

    match raw.op.as_str() {
        "begin" => {
            let team_type = raw.team_type.ok_or(AppError::Protocol(
                ProtocolError::MissingField("teamType"),
            ))?;
            let marker_id = raw.aruco.unwrap_or(-1);
            Ok(Op::Begin {
                team_name,
                team_type,
                marker_id,
            })
        }
        "print" => {
            let message = raw
                .message
                .ok_or(AppError::Protocol(ProtocolError::MissingField("message")))?;
            Ok(Op::Print { team_name, message })
        }
        "ping" => {
            let status = match raw.status.as_deref() {
                Some("ping") => PingStatus::Ping,
                Some("pong") => PingStatus::Pong,
                _ => {
                    return Err(AppError::Protocol(ProtocolError::MissingField("status")))
                }
            };
            Ok(Op::Ping { team_name, status })
        }
        "aruco" => Ok(Op::Aruco { team_name }),
        "prediction_request" => {
            let index = raw
                .index
                .ok_or(AppError::Protocol(ProtocolError::MissingField("index")))?;
            let encoded = raw
                .frame
                .ok_or(AppError::Protocol(ProtocolError::MissingField("frame")))?;
            let frame = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| {
                    AppError::Frame(crate::error::FrameError::JpegDecode {
                        details: format!("invalid base64 prediction frame: {e}"),
                    })
                })?;
            Ok(Op::PredictionRequest {
                team_name,
                index,
                frame,
            })
        }
        _ => Ok(Op::Ignore),
    }
}

pub fn pong_reply(team_name: &str) -> String {
    json!({"op": "ping", "teamName": team_name, "status": "pong"}).to_string()
}

pub fn ping_request() -> String {
    json!({"op": "ping", "status": "ping"}).to_string()
}

pub fn aruco_reply(x: f64, y: f64, theta: f64, is_visible: bool) -> String {
    json!({"op": "aruco", "x": x, "y": y, "theta": theta, "is_visible": is_visible}).to_string()
}

pub fn prediction_reply(prediction: i64) -> String {
    json!({"op": "prediction", "prediction": prediction}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_without_team_name_is_ignored() {
        let msg = parse_message(r#"{"op":"ping","status":"ping"}"#).unwrap();
        assert!(matches!(msg, Op::Ignore));
    }

    #[test]
    fn invalid_json_is_ignored_not_an_error() {
        let msg = parse_message("not json").unwrap();
        assert!(matches!(msg, Op::Ignore));
    }

    #[test]
    fn unknown_op_is_ignored() {
        let msg = parse_message(r#"{"op":"dance","teamName":"Alpha"}"#).unwrap();
        assert!(matches!(msg, Op::Ignore));
    }

    #[test]
    fn begin_parses_team_type_and_marker_id() {
        let msg = parse_message(
            r#"{"op":"begin","teamName":"Alpha","teamType":"CRASH_SITE","aruco":42}"#,
        )
        .unwrap();
        match msg {
            Op::Begin {
                team_name,
                team_type,
                marker_id,
            } => {
                assert_eq!(team_name, "Alpha");
                assert_eq!(team_type, "CRASH_SITE");
                assert_eq!(marker_id, 42);
            }
            _ => panic!("expected Begin"),
        }
    }

    #[test]
    fn begin_without_team_type_is_missing_field_error() {
        let err = parse_message(r#"{"op":"begin","teamName":"Alpha"}"#).unwrap_err();
        assert!(!err.disconnects_connection());
    }

    #[test]
    fn ping_defaults_to_missing_field_on_bad_status() {
        assert!(parse_message(r#"{"op":"ping","teamName":"Alpha","status":"huh"}"#).is_err());
    }

    #[test]
    fn prediction_request_decodes_base64_frame() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([0xFFu8, 0xD8, 0xFF, 0xD9]);
        let msg = parse_message(&format!(
            r#"{{"op":"prediction_request","teamName":"Alpha","index":3,"frame":"{encoded}"}}"#
        ))
        .unwrap();
        match msg {
            Op::PredictionRequest { frame, index, .. } => {
                assert_eq!(index, 3);
                assert_eq!(frame, vec![0xFF, 0xD8, 0xFF, 0xD9]);
            }
            _ => panic!("expected PredictionRequest"),
        }
    }

    #[test]
    fn aruco_reply_has_fixed_sentinel_schema() {
        let reply = aruco_reply(-1.0, -1.0, -1.0, false);
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["is_visible"], false);
        assert_eq!(value["x"], -1.0);
    }
}
