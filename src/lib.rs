pub mod config;
pub mod core;
pub mod errors;
pub mod state;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::EngineConfig;
pub use crate::core::*;
pub use errors::{EngineError, EngineResult};
pub use state::EngineState;
