//! In-memory roster of every robot that has ever sent a `begin`.

use crate::arena::MarkerPose;
use crate::error::{AppError, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;

const POSE_HISTORY_LEN: usize = 5;

/// Handle to a connection's outbound write queue. Cloning is cheap; sends
/// are serialised per connection through the channel, never interleaved.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: u64,
    outbound: mpsc::UnboundedSender<String>,
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionHandle {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            outbound,
        }
    }

    pub fn send(&self, json: String) -> Result<()> {
        self.outbound
            .send(json)
            .map_err(|_| AppError::Protocol(ProtocolError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection write queue closed",
            ))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PoseSample {
    x: f64,
    y: f64,
    theta: f64,
    visible: bool,
}

#[derive(Debug, Default)]
pub struct PoseHistory {
    samples: VecDeque<PoseSample>,
}

impl PoseHistory {
    fn push(&mut self, pose: MarkerPose) {
        let sample = PoseSample {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            visible: !pose.is_sentinel(),
        };
        if self.samples.len() == POSE_HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Newest visible sample, scanning back from the tail; `None` if every
    /// retained sample is the sentinel.
    fn latest_valid(&self) -> Option<(f64, f64, f64)> {
        self.samples
            .iter()
            .rev()
            .find(|s| s.visible)
            .map(|s| (s.x, s.y, s.theta))
    }
}

pub struct RobotState {
    pub name: String,
    pub team_type: String,
    pub marker_id: i32,
    pub connection: Option<ConnectionHandle>,
    pub connected: bool,
    pub missed_pings: u32,
    pub last_seen: Instant,
    pose_history: PoseHistory,
}

impl RobotState {
    fn new(name: String) -> Self {
        Self {
            name,
            team_type: String::new(),
            marker_id: -1,
            connection: None,
            connected: false,
            missed_pings: 0,
            last_seen: Instant::now(),
            pose_history: PoseHistory::default(),
        }
    }
}

/// Roster entry broadcast to the UI, per the UIBroadcaster roster schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotSnapshot {
    pub name: String,
    pub connected: bool,
    pub team_type: String,
    pub aruco: i32,
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

pub struct RobotRegistry {
    inner: Mutex<HashMap<String, RobotState>>,
}

impl RobotRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Handle a `begin`: bind the connection, record team type and marker
    /// id, reset `missedPings`. Rejects only when the name is already live
    /// on a *different* connection.
    pub fn assign_connection(
        &self,
        name: &str,
        team_type: String,
        marker_id: i32,
        connection: ConnectionHandle,
    ) -> Result<()> {
        let mut map = self.inner.lock().unwrap();
        if let Some(existing) = map.get(name) {
            let same_connection = existing
                .connection
                .as_ref()
                .is_some_and(|c| c.id == connection.id);
            if existing.connected && !same_connection {
                return Err(AppError::Protocol(ProtocolError::DuplicateName(
                    name.to_string(),
                )));
            }
        }

        let entry = map
            .entry(name.to_string())
            .or_insert_with(|| RobotState::new(name.to_string()));
        entry.team_type = team_type;
        entry.marker_id = marker_id;
        entry.connection = Some(connection);
        entry.connected = true;
        entry.missed_pings = 0;
        entry.last_seen = Instant::now();
        Ok(())
    }

    /// Record any inbound message, regardless of op.
    pub fn record_seen(&self, name: &str) {
        if let Some(state) = self.inner.lock().unwrap().get_mut(name) {
            state.last_seen = Instant::now();
        }
    }

    /// Reset the missed-ping counter; only ping/pong does this.
    pub fn reset_missed_pings(&self, name: &str) {
        if let Some(state) = self.inner.lock().unwrap().get_mut(name) {
            state.last_seen = Instant::now();
            state.missed_pings = 0;
        }
    }

    /// Disconnects `name` only if its currently bound connection is
    /// `conn_id`, so a stale task can't clobber a freshly reconnected robot.
    pub fn disconnect(&self, name: &str, conn_id: u64) {
        if let Some(state) = self.inner.lock().unwrap().get_mut(name) {
            let matches = state.connection.as_ref().is_some_and(|c| c.id == conn_id);
            if matches {
                state.connected = false;
                state.connection = None;
            }
        }
    }

    /// Increment every connected robot's missed-ping counter and disconnect
    /// those that have missed 5 in a row, per the ping-timeout policy.
    pub fn tick_pings(&self) -> Vec<String> {
        let mut timed_out = Vec::new();
        let mut map = self.inner.lock().unwrap();
        for (name, state) in map.iter_mut() {
            if !state.connected {
                continue;
            }
            state.missed_pings += 1;
            if state.missed_pings >= 5 {
                state.connected = false;
                state.connection = None;
                timed_out.push(name.clone());
            }
        }
        timed_out
    }

    pub fn connection_of(&self, name: &str) -> Option<ConnectionHandle> {
        self.inner
            .lock()
            .unwrap()
            .get(name)
            .and_then(|s| s.connection.clone())
    }

    pub fn marker_id_of(&self, name: &str) -> Option<i32> {
        self.inner.lock().unwrap().get(name).map(|s| s.marker_id)
    }

    pub fn push_pose(&self, name: &str, pose: MarkerPose) {
        if let Some(state) = self.inner.lock().unwrap().get_mut(name) {
            state.pose_history.push(pose);
        }
    }

    pub fn latest_valid_pose(&self, name: &str) -> Option<(f64, f64, f64)> {
        self.inner
            .lock()
            .unwrap()
            .get(name)
            .and_then(|s| s.pose_history.latest_valid())
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    /// Ordered roster for the UI broadcast, case-insensitive by name.
    pub fn snapshot(&self) -> Vec<RobotSnapshot> {
        let map = self.inner.lock().unwrap();
        let mut entries: Vec<RobotSnapshot> = map
            .values()
            .map(|s| {
                let (x, y, theta, visible) = match s.pose_history.latest_valid() {
                    Some((x, y, theta)) => (x, y, theta, true),
                    None => (-1.0, -1.0, -1.0, false),
                };
                RobotSnapshot {
                    name: s.name.clone(),
                    connected: s.connected,
                    team_type: s.team_type.clone(),
                    aruco: s.marker_id,
                    visible,
                    x,
                    y,
                    theta,
                }
            })
            .collect();
        entries.sort_by_key(|e| e.name.to_lowercase());
        entries
    }
}

impl Default for RobotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionHandle::new(tx)
    }

    #[test]
    fn assign_connection_creates_and_binds() {
        let reg = RobotRegistry::new();
        reg.assign_connection("Alpha", "CRASH_SITE".into(), 42, handle())
            .unwrap();
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "Alpha");
        assert!(snap[0].connected);
        assert_eq!(snap[0].aruco, 42);
    }

    #[test]
    fn rebinding_same_connection_is_idempotent() {
        let reg = RobotRegistry::new();
        let conn = handle();
        reg.assign_connection("Alpha", "A".into(), 1, conn.clone())
            .unwrap();
        reg.assign_connection("Alpha", "A".into(), 1, conn).unwrap();
        assert_eq!(reg.snapshot().len(), 1);
    }

    #[test]
    fn duplicate_name_on_different_connection_is_rejected() {
        let reg = RobotRegistry::new();
        reg.assign_connection("Gamma", "A".into(), 1, handle())
            .unwrap();
        let err = reg
            .assign_connection("Gamma", "A".into(), 1, handle())
            .unwrap_err();
        assert!(err.disconnects_connection());
    }

    #[test]
    fn ping_timeout_disconnects_after_five_misses() {
        let reg = RobotRegistry::new();
        reg.assign_connection("Delta", "A".into(), 1, handle())
            .unwrap();
        for _ in 0..4 {
            let timed_out = reg.tick_pings();
            assert!(timed_out.is_empty());
        }
        let timed_out = reg.tick_pings();
        assert_eq!(timed_out, vec!["Delta".to_string()]);
        assert!(!reg.snapshot()[0].connected);
    }

    #[test]
    fn reset_missed_pings_clears_the_counter() {
        let reg = RobotRegistry::new();
        reg.assign_connection("Echo", "A".into(), 1, handle())
            .unwrap();
        reg.tick_pings();
        reg.tick_pings();
        reg.reset_missed_pings("Echo");
        for _ in 0..4 {
            assert!(reg.tick_pings().is_empty());
        }
    }

    #[test]
    fn roster_sorted_case_insensitively() {
        let reg = RobotRegistry::new();
        reg.assign_connection("bravo", "A".into(), 1, handle())
            .unwrap();
        reg.assign_connection("Alpha", "A".into(), 1, handle())
            .unwrap();
        let snap = reg.snapshot();
        assert_eq!(snap[0].name, "Alpha");
        assert_eq!(snap[1].name, "bravo");
    }

    #[test]
    fn pose_history_reports_sentinel_when_no_valid_sample() {
        let reg = RobotRegistry::new();
        reg.assign_connection("Foxtrot", "A".into(), 1, handle())
            .unwrap();
        reg.push_pose("Foxtrot", MarkerPose { x: -1.0, y: -1.0, theta: -1.0 });
        assert_eq!(reg.latest_valid_pose("Foxtrot"), None);
    }

    #[test]
    fn pose_history_keeps_only_last_five_samples() {
        let reg = RobotRegistry::new();
        reg.assign_connection("Golf", "A".into(), 1, handle())
            .unwrap();
        for i in 0..7 {
            reg.push_pose(
                "Golf",
                MarkerPose {
                    x: i as f64,
                    y: 0.0,
                    theta: 0.0,
                },
            );
        }
        assert_eq!(reg.latest_valid_pose("Golf"), Some((6.0, 0.0, 0.0)));
    }
}
