//! Domain layer for the Submission Queue.

pub mod config;
pub mod errors;
pub mod ready;
pub mod validation;

pub use config::QueueConfig;
pub use errors::QueueError;
pub use ready::ReadyQueue;
pub use validation::validate_request;
