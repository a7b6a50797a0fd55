mod action;
mod backend;
mod block;
mod context_ref;
pub(crate) mod error;
mod event;
mod message;
mod navigation;
mod notification;
mod prompt_template;

pub use action::*;
pub use backend::*;
pub use block::*;
pub use context_ref::*;
pub use error::ChatError;
pub use error::ChatResult;
pub use event::*;
pub use message::*;
pub use navigation::*;
pub use notification::*;
pub use prompt_template::*;
