//! Ergonomic error context helpers.
//!
//! Provides extension traits for converting IO errors raised by the
//! platform resolver into `NetError` codes, logging the failing host.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Fold a platform resolution error into a `NetError`.
    ///
    /// Everything except a reported loss of connectivity becomes
    /// [`NetError::NameNotResolved`].
    ///
    /// # Example
    /// ```ignore
    /// use hostresolver::base::context::IoResultExt;
    ///
    /// let addrs = ("example.com", 0).to_socket_addrs()
    ///     .dns_context("example.com")?;
    /// ```
    fn dns_context(self, host: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn dns_context(self, host: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, error = %e, "platform resolution failed");
            match e.kind() {
                io::ErrorKind::NetworkDown | io::ErrorKind::NetworkUnreachable => {
                    NetError::InternetDisconnected
                }
                _ => NetError::NameNotResolved,
            }
        })
    }
}
