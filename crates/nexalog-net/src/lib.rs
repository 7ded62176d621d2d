//! # nexalog-net
//!
//! Backend adapters: the REST client behind the [`Backend`] trait and the
//! Socket.IO push channel, which runs in its own tokio task and talks to the
//! application through command/notification channels.

pub mod api;
pub mod error;
pub mod packet;
pub mod push;

pub use api::{Backend, PageRequest, RestBackend};
pub use error::{NetError, Result};
pub use push::{spawn_push, PushCommand, PushConfig, PushNotification};
