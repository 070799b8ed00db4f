/// Crate-wide result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed transport errors.
///
/// The dispatcher classifies failures by their rendered text, so transport
/// adapters should keep the underlying client's message intact.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure reported by the transport client itself.
    #[error("{message}")]
    Transport { message: String },
}

impl Error {
    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }
}
