pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod output;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod worker;

pub use controller::Controller;
pub use error::{RelayError, Result};
