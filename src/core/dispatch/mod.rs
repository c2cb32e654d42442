//! Routing of transport messages to the playback paths.

pub mod dispatcher;
pub mod messages;

pub use dispatcher::{DispatchError, DispatchOutcome, DispatchResult, Dispatcher, Route};
pub use messages::IncomingMessage;
