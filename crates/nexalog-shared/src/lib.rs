//! # nexalog-shared
//!
//! Types shared by every Nexalog crate: identities, the loosely-typed
//! payload wrapper, push/control protocol shapes, identity extraction and
//! the visibility filter for pushed records.

pub mod constants;
pub mod identity;
pub mod protocol;
pub mod types;
pub mod visibility;

pub use protocol::{ControlSignal, PushEvent, RawRecord};
pub use types::{MessageId, Scope, ScopeKind, ThreadId, UserId};
