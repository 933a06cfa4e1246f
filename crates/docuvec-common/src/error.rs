//! Common error handling utilities
//!
//! Each Docuvec crate defines its own `thiserror` enum; this module only
//! carries the pieces shared between them.

use std::fmt;

/// Trait for adding context to errors
///
/// Provides a consistent way to attach context to errors across all crates,
/// similar to anyhow's `context()` but usable at trait-object seams where the
/// caller only needs a message.
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Add context with a closure (lazy evaluation)
    fn with_context<C, F>(self, f: F) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| format!("{context}: {e}"))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| format!("{}: {}", f(), e))
    }
}
