use wapanel_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bot configuration upload failed validation.
    #[error("invalid bot configuration: {message}")]
    InvalidUpload { message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_upload(message: impl Into<String>) -> Self {
        Self::InvalidUpload {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

wapanel_common::impl_context!(Error);
