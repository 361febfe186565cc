//! Command Hub - Protocol Types
//!
//! Correlated request/response types exchanged between the hub and its
//! backend adapters. This crate is the single source of truth for the wire
//! shapes, error codes, well-known method names and event names.

pub mod error;
pub mod events;
pub mod message;
pub mod methods;

pub use error::{ErrorCode, ProtocolError};
pub use events::{EventName, Events};
pub use message::{Notification, Params, Request, Response};
pub use methods::{MethodName, Methods, default_capabilities};
