//! Client-side sync core for the Shark chat backend.
//!
//! - [`api`]: REST transport
//! - [`push`]: WebSocket push channel with keep-alive and reconnect
//! - [`store`]: reconciliation stores (snapshot replace + push patching)
//! - [`observable`]: change notification for store values
//! - [`engine`]: actor that owns the stores and serializes all mutation

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod observable;
pub mod push;
pub mod store;

#[cfg(test)]
mod test_helpers;

pub use api::ApiClient;
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncHandle};
pub use error::{ChannelError, SyncError, TransportError, ValidationError};
pub use observable::{Observable, Subscription};
pub use push::{ConnectionState, PushChannel, PushSubscription};
pub use store::LoadState;
