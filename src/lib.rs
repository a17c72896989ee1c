// Public API for integration tests and potential library usage

pub mod protocol;
pub mod state;
pub mod tasks;
pub mod types;
pub mod words;
pub mod ws;
