use std::fmt;
use std::io;

/// Errors returned by the clustering engines and their collaborators.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Bad parameters (empty site set, `k` out of `1..=sites.len()`, zero
    /// iteration cap, ...).
    InvalidArgument(String),

    /// The distributed runtime is not configured (e.g. its install root
    /// environment variable is missing).
    Configuration(String),

    /// Input data cannot be clustered (no usable site, non-finite
    /// coordinates).
    Data(String),

    /// The distributed run failed: handoff file missing or unparseable,
    /// malformed message, broken connection, failed rank.
    Protocol(String),

    /// Read/write error.
    Io(io::Error),

    /// JSON (de)serialization error.
    Json(serde_json::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Error::Data(msg) => write!(f, "data error: {msg}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Io(_) => write!(f, "read/write error"),
            Error::Json(_) => write!(f, "malformed json"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Check the preconditions shared by every engine.
pub(crate) fn check_arguments(site_count: usize, k: usize, max_iterations: usize) -> Result<()> {
    if site_count == 0 {
        return Err(Error::InvalidArgument("empty site set".to_string()));
    }
    if k == 0 || site_count < k {
        return Err(Error::InvalidArgument(format!(
            "expected 1 <= k <= {site_count}, got k = {k}",
        )));
    }
    if max_iterations == 0 {
        return Err(Error::InvalidArgument(
            "iteration cap must be positive".to_string(),
        ));
    }
    Ok(())
}
