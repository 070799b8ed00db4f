use {wapanel_auto_reply::Error as AutoReplyError, wapanel_channels::DispatchError};

/// Failures surfaced to the operator.
///
/// An HTTP layer maps these with [`PanelError::status_code`]; transient
/// transport conditions become 503 so the panel can offer a retry.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("invalid request: {message}")]
    InvalidInput { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    AutoReply(#[from] AutoReplyError),
}

impl PanelError {
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Dispatch(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } | Self::AutoReply(AutoReplyError::InvalidUpload { .. }) => 400,
            Self::NotFound { .. } => 404,
            e if e.is_transient() => 503,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, wapanel_channels::Error as TransportError};

    fn send_failed(message: &str, retryable: bool) -> PanelError {
        PanelError::Dispatch(DispatchError::SendFailed {
            attempts: 1,
            retryable,
            source: TransportError::transport(message),
        })
    }

    #[rstest]
    #[case(PanelError::invalid_input("empty text"), 400)]
    #[case(PanelError::not_found("no chat"), 404)]
    #[case(PanelError::Dispatch(DispatchError::TransportNotReady { polls: 40 }), 503)]
    #[case(send_failed("Evaluation failed", true), 503)]
    #[case(send_failed("invalid wid", false), 500)]
    #[case(PanelError::AutoReply(AutoReplyError::invalid_upload("x")), 400)]
    fn maps_status_codes(#[case] error: PanelError, #[case] expected: u16) {
        assert_eq!(error.status_code(), expected);
    }
}
