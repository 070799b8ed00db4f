//! `.context()` for crate error types without pulling `anyhow` into
//! library crates.
//!
//! A crate implements [`FromMessage`] for its error enum and invokes
//! [`impl_context!`] once in its error module:
//!
//! ```ignore
//! impl FromMessage for Error {
//!     fn from_message(message: String) -> Self {
//!         Self::Message { message }
//!     }
//! }
//!
//! wapanel_common::impl_context!(Error);
//! ```
//!
//! Failures then read `failed to read bot.json: No such file or directory`.

use std::fmt::Display;

/// An error type with a free-form message variant.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;

    /// `"<context>: <source>"`. Override to keep the source structured.
    fn from_context(context: String, source: &dyn Display) -> Self {
        Self::from_message(format!("{context}: {source}"))
    }
}

/// Generate a crate-local `Context` trait for `Result<T, impl Display>` and
/// `Option<T>`, producing the given error type.
///
/// The trait lives in the invoking crate so `?` needs no type annotations.
#[macro_export]
macro_rules! impl_context {
    ($err:ty) => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $err>;

            fn with_context<C: Into<String>>(
                self,
                context: impl FnOnce() -> C,
            ) -> std::result::Result<T, $err>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $err> {
                self.map_err(|e| <$err as $crate::FromMessage>::from_context(context.into(), &e))
            }

            fn with_context<C: Into<String>>(
                self,
                context: impl FnOnce() -> C,
            ) -> std::result::Result<T, $err> {
                self.map_err(|e| <$err as $crate::FromMessage>::from_context(context().into(), &e))
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $err> {
                self.ok_or_else(|| <$err as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C: Into<String>>(
                self,
                context: impl FnOnce() -> C,
            ) -> std::result::Result<T, $err> {
                self.ok_or_else(|| <$err as $crate::FromMessage>::from_message(context().into()))
            }
        }
    };
}
