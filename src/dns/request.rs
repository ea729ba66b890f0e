//! Caller-visible request types.

use crate::base::address::{AddressFamily, AddressList, HostResolverFlags};
use crate::base::neterror::NetError;
use crate::base::priority::RequestPriority;

/// Longest hostname accepted by [`HostResolverImpl`](super::HostResolverImpl).
pub const MAX_HOSTNAME_LEN: usize = 4096;

/// Parameters of a single resolve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    hostname: String,
    port: u16,
    address_family: AddressFamily,
    flags: HostResolverFlags,
    priority: RequestPriority,
    allow_cached_response: bool,
    is_speculative: bool,
}

impl RequestInfo {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            address_family: AddressFamily::Unspecified,
            flags: HostResolverFlags::empty(),
            priority: RequestPriority::default(),
            allow_cached_response: true,
            is_speculative: false,
        }
    }

    pub fn with_address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = family;
        self
    }

    pub fn with_flags(mut self, flags: HostResolverFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether a cached result may satisfy this request.
    pub fn allow_cached_response(mut self, allow: bool) -> Self {
        self.allow_cached_response = allow;
        self
    }

    /// Mark this request as a prefetch nobody is waiting on yet.
    pub fn speculative(mut self, speculative: bool) -> Self {
        self.is_speculative = speculative;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address_family(&self) -> AddressFamily {
        self.address_family
    }

    pub fn flags(&self) -> HostResolverFlags {
        self.flags
    }

    pub fn priority(&self) -> RequestPriority {
        self.priority
    }

    pub fn is_cached_response_allowed(&self) -> bool {
        self.allow_cached_response
    }

    pub fn is_speculative(&self) -> bool {
        self.is_speculative
    }
}

/// Handle to a pending request, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(pub(crate) u64);

/// Completion callback of an asynchronous resolve.
pub type CompletionCallback = Box<dyn FnOnce(Result<AddressList, NetError>) + Send + 'static>;

/// Outcome of a successful [`resolve`](super::HostResolverImpl::resolve) call.
#[derive(Debug)]
pub enum Resolution {
    /// Answered synchronously; the callback will never run.
    Complete(AddressList),
    /// The callback runs exactly once later, unless the request is cancelled.
    Pending(RequestHandle),
}

impl Resolution {
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending(_))
    }

    pub fn handle(&self) -> Option<RequestHandle> {
        match self {
            Resolution::Pending(handle) => Some(*handle),
            Resolution::Complete(_) => None,
        }
    }

    pub fn addresses(&self) -> Option<&AddressList> {
        match self {
            Resolution::Complete(addrs) => Some(addrs),
            Resolution::Pending(_) => None,
        }
    }
}

/// Reject hostnames no resolver could answer for.
pub(crate) fn validate_hostname(hostname: &str) -> Result<(), NetError> {
    if hostname.is_empty() || hostname.len() > MAX_HOSTNAME_LEN {
        return Err(NetError::NameNotResolved);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_info_defaults() {
        let info = RequestInfo::new("example.com", 443);
        assert_eq!(info.hostname(), "example.com");
        assert_eq!(info.port(), 443);
        assert_eq!(info.address_family(), AddressFamily::Unspecified);
        assert_eq!(info.priority(), RequestPriority::Medium);
        assert!(info.is_cached_response_allowed());
        assert!(!info.is_speculative());
        assert!(info.flags().is_empty());
    }

    #[test]
    fn test_hostname_validation() {
        assert_eq!(validate_hostname(""), Err(NetError::NameNotResolved));
        assert_eq!(
            validate_hostname(&"a".repeat(MAX_HOSTNAME_LEN + 1)),
            Err(NetError::NameNotResolved)
        );
        assert!(validate_hostname(&"a".repeat(MAX_HOSTNAME_LEN)).is_ok());
    }
}
