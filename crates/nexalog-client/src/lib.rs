//! # nexalog-client
//!
//! Session controller and runtime for the Nexalog chat client. The
//! [`Session`](session::Session) state machine decides what the chat screen
//! shows; the [`runtime`] feeds it REST results and push events and exposes
//! it to a UI through [`ClientHandle`](runtime::ClientHandle).

pub mod config;
pub mod error;
pub mod events;
pub mod runtime;
pub mod session;
pub mod state;

pub use config::ClientConfig;
pub use error::{ClientError, Result, SessionError};
pub use events::UiEvent;
pub use runtime::{start, start_with, ClientCommand, ClientHandle};
pub use session::{Session, Target};
pub use state::ViewSnapshot;
