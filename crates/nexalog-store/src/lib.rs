//! # nexalog-store
//!
//! In-memory client state for Nexalog: the reconciling message timeline of
//! the open thread, the friend activity ordering and online presence.
//!
//! Nothing here performs I/O. Callers feed raw backend records through
//! [`normalize`](normalize::normalize) and hand the results to a
//! [`Timeline`].

pub mod activity;
pub mod models;
pub mod normalize;
pub mod timeline;

pub use activity::{ActivityIndex, BumpOutcome, PresenceIndex};
pub use models::*;
pub use normalize::{normalize, NormalizeContext};
pub use timeline::{AppendOutcome, Timeline};
