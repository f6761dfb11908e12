use std::fmt;

/// The fixed set of long-lived tasks `ProcessSupervisor` owns. Used as the
/// key for component state tracking instead of a bare `&str`, so a typo in
/// a component name is a compile error rather than a silently-missed state
/// transition (startup previously tracked the ping ticker and the robot
/// protocol server under the same `"robot_server"` name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    FrameSource,
    Pipeline,
    Frontend,
    RobotServer,
    PingTicker,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::FrameSource => "frame_source",
            Component::Pipeline => "pipeline",
            Component::Frontend => "frontend",
            Component::RobotServer => "robot_server",
            Component::PingTicker => "ping_ticker",
        };
        f.write_str(name)
    }
}

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}
