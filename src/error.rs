use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{count} conflict(s) left unresolved, first at {first}")]
    Unresolved { count: usize, first: String },

    #[error("no conflict numbered {0}")]
    UnknownConflict(usize),

    #[error("invalid selection {0:?}, expected <N>=<GROUP>")]
    InvalidSelection(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction API key is missing, set {0}")]
    MissingApiKey(String),

    #[error("no classes were found in the timetable image")]
    Empty,

    #[error("extraction service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("extraction response was not a schedule: {0}")]
    Malformed(String),

    #[error("extraction request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),

    #[error("no class with id {0} in the schedule")]
    EntryNotFound(String),

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contains invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email is required")]
    MissingEmail,

    #[error("user already exists, please log in")]
    AlreadyRegistered,

    #[error("OTP expired or not sent")]
    OtpNotSent,

    #[error("OTP expired")]
    OtpExpired,

    #[error("invalid OTP")]
    OtpMismatch,

    #[error("password must be at least {0} characters long")]
    WeakPassword(usize),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("failed to send OTP: {0}")]
    Mail(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
