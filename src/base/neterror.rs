use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic Errors
    #[error("Operation failed")]
    Failed,
    #[error("Request aborted")]
    Aborted,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Operation timed out")]
    TimedOut,
    #[error("Unexpected error")]
    Unexpected,

    // Resolution Errors
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Internet disconnected")]
    InternetDisconnected,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Host resolver queue too large")]
    HostResolverQueueTooLarge,
    #[error("Name resolution failed")]
    NameResolutionFailed,

    // DNS Client Errors
    #[error("DNS malformed response")]
    DnsMalformedResponse,
    #[error("DNS server requires TCP")]
    DnsServerRequiresTcp,
    #[error("DNS server failed")]
    DnsServerFailed,
    #[error("DNS timed out")]
    DnsTimedOut,
    #[error("DNS cache miss")]
    DnsCacheMiss,
    #[error("DNS search list empty")]
    DnsSearchEmpty,
    #[error("DNS sort error")]
    DnsSortError,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Failed => -2,
            NetError::Aborted => -3,
            NetError::InvalidArgument => -4,
            NetError::TimedOut => -7,
            NetError::Unexpected => -9,
            NetError::NameNotResolved => -105,
            NetError::InternetDisconnected => -106,
            NetError::AddressInvalid => -108,
            NetError::HostResolverQueueTooLarge => -119,
            NetError::NameResolutionFailed => -137,
            NetError::DnsMalformedResponse => -800,
            NetError::DnsServerRequiresTcp => -801,
            NetError::DnsServerFailed => -802,
            NetError::DnsTimedOut => -803,
            NetError::DnsCacheMiss => -804,
            NetError::DnsSearchEmpty => -805,
            NetError::DnsSortError => -806,
            NetError::Unknown(code) => *code,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -2 => NetError::Failed,
            -3 => NetError::Aborted,
            -4 => NetError::InvalidArgument,
            -7 => NetError::TimedOut,
            -9 => NetError::Unexpected,
            -105 => NetError::NameNotResolved,
            -106 => NetError::InternetDisconnected,
            -108 => NetError::AddressInvalid,
            -119 => NetError::HostResolverQueueTooLarge,
            -137 => NetError::NameResolutionFailed,
            -800 => NetError::DnsMalformedResponse,
            -801 => NetError::DnsServerRequiresTcp,
            -802 => NetError::DnsServerFailed,
            -803 => NetError::DnsTimedOut,
            -804 => NetError::DnsCacheMiss,
            -805 => NetError::DnsSearchEmpty,
            -806 => NetError::DnsSortError,
            _ => NetError::Unknown(code),
        }
    }
}
