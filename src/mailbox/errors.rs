use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("mailbox credentials are not configured")]
    MissingCredentials,

    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("request timeout")]
    RequestTimeout,

    #[error("http error {status}")]
    Http {
        status: reqwest::StatusCode,
        retriable: bool,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("unknown: {0}")]
    Unknown(String),
}

impl MailboxError {
    pub fn should_retry(&self) -> bool {
        match self {
            // Fatal - a retry with the same inputs cannot succeed
            Self::InvalidUrl(_) => false,
            Self::MissingCredentials => false,
            Self::RefreshFailed(_) => false,
            Self::Unauthorized => false,
            Self::MalformedResponse(_) => false,
            Self::Http { retriable, .. } => *retriable,

            // Temporary
            Self::ConnectTimeout => true,
            Self::RequestTimeout => true,
            Self::Io(_) => true,
            Self::Unknown(_) => true,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            if err.is_connect() {
                Self::ConnectTimeout
            } else {
                Self::RequestTimeout
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status,
                retriable: status.is_server_error(),
            }
        } else if err.is_request() {
            // DNS, connection errors
            Self::Io(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}
