//! # Subsystem Container
//!
//! Central container holding every subsystem instance, wired to the chain
//! and pinning adapters selected by configuration.

pub mod config;
pub mod subsystems;

pub use config::{ChainMode, ConfigError, Environment, NodeConfig, PinningMode};
pub use subsystems::{ContainerError, SubsystemContainer};
