pub mod actions;
mod chat_store;
mod clock;
mod context_types;
mod countdown;
mod event_registry;
pub mod events;
mod navigation_history;

pub use chat_store::*;
pub use clock::*;
pub use context_types::*;
pub use countdown::*;
pub use event_registry::*;
pub use navigation_history::*;
