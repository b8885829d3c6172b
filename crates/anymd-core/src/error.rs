use thiserror::Error;

pub type AnymdResult<T> = Result<T, AnymdError>;

/// Structured error payload returned by the remote store.
///
/// `status` is the HTTP status (0 when the request never reached the
/// server), `code` a machine-readable code such as `space_not_found`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status}, code {code})")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnymdError {
    /// Network/transport failure or server-side 5xx.
    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The active space no longer exists or is no longer accessible.
    #[error("space invalid: {0}")]
    SpaceInvalid(String),

    /// A specific resource is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote store rejected a malformed request.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Structured remote error that has not been mapped further.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Routing class produced by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Active space is stale; route to context recovery.
    SpaceInvalid,
    /// Network-ish failure; worth a later retry, not a recovery prompt.
    Transient,
    /// Anything else; degrade to a generic error surface.
    Unknown,
}

/// Error codes that indicate the space does not exist or is invalid.
const SPACE_ERROR_CODES: &[&str] = &["space_not_found", "invalid_space", "forbidden"];

/// Classify an error for UI routing.
///
/// Two tiers: structured `ApiError` codes are authoritative; when only
/// a human-readable message is available, a textual heuristic requires
/// the message to mention the space concept plus an invalidity marker.
/// The heuristic is best-effort: a false negative degrades to
/// `Unknown` (generic error surface), never to auto-recovery.
pub fn classify(err: &AnymdError) -> ErrorClass {
    match err {
        AnymdError::SpaceInvalid(_) => ErrorClass::SpaceInvalid,
        AnymdError::RemoteUnavailable(_) => ErrorClass::Transient,
        AnymdError::Api(api) => {
            if SPACE_ERROR_CODES.contains(&api.code.as_str()) {
                ErrorClass::SpaceInvalid
            } else if api.status >= 500 || api.status == 0 {
                ErrorClass::Transient
            } else {
                classify_message(&api.message)
            }
        }
        AnymdError::NotFound(msg) | AnymdError::ValidationFailed(msg) => classify_message(msg),
        AnymdError::Io(_) => ErrorClass::Transient,
        AnymdError::Config(_) => ErrorClass::Unknown,
        AnymdError::Other(err) => classify_message(&err.to_string()),
    }
}

fn classify_message(message: &str) -> ErrorClass {
    let msg = message.to_lowercase();

    let invalid_marker = msg.contains("not found")
        || msg.contains("does not exist")
        || msg.contains("invalid")
        || msg.contains("deleted");
    if msg.contains("space") && invalid_marker {
        return ErrorClass::SpaceInvalid;
    }

    if msg.contains("network") || msg.contains("connection") || msg.contains("timeout") {
        return ErrorClass::Transient;
    }

    ErrorClass::Unknown
}
