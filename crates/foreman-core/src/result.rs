//! Result type aliases for Foreman.

use crate::ForemanError;

/// A specialized `Result` type for Foreman operations.
pub type ForemanResult<T> = Result<T, ForemanError>;

/// A boxed future returning a `ForemanResult`.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = ForemanResult<T>> + Send + 'a>>;
