//! Base types and error handling.
//!
//! Provides foundational types mirroring Chromium's `net/base/`:
//! - [`NetError`](neterror::NetError): Network error codes matching `net_error_list.h`
//! - [`AddressList`](address::AddressList): Resolved socket addresses
//! - [`RequestPriority`](priority::RequestPriority): Request priorities

pub mod address;
pub mod context;
pub mod neterror;
pub mod priority;
