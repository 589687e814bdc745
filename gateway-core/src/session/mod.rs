//! Session state and registry.

pub mod model;
pub mod store;

pub use model::{ConversationItem, ItemStatus, Session, SessionConfig, TurnState};
pub use store::{SessionHandle, SessionStore, StoreStats};
