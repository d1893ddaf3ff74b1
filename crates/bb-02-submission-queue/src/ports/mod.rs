//! Ports (Hexagonal Architecture) for the Submission Queue.

pub mod inbound;

pub use inbound::SubmissionApi;
