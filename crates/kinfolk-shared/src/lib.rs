//! # kinfolk-shared
//!
//! Types shared by the backend adapter and the application layer: the
//! message/identity data model, the user-facing error taxonomy and the
//! constants that name backend tables, buckets and defaults.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{ChatError, Remediation};
pub use types::*;
