use std::fmt;
use std::io;

use sliplink_frame::FrameError;
use sliplink_link::LinkError;
use sliplink_transport::TransportError;

// Process exit codes; 64 follows sysexits EX_USAGE, 124 follows timeout(1).
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. }
        | TransportError::Open { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Closed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::UnknownNextHop(_) => CliError::new(USAGE, format!("{context}: {err}")),
        LinkError::NoLinks
        | LinkError::DuplicateNextHop(_)
        | LinkError::InvalidConfig(_)
        | LinkError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        LinkError::ReadConfig { source, .. } => io_error(context, source),
    }
}
