//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! Subsystems announce lifecycle changes of submissions here rather than
//! calling one another. The main consumer today is the read cache, which
//! invalidates a slot when its write is confirmed.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Chain Watcher│                    │  Read Cache  │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Delivery is best effort: a lagging subscriber skips events. Anything that
//! must not be lost (the record status) lives in the fingerprint store, and
//! the bus only shortens the time until consumers notice.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{subsystem, EventFilter, EventTopic, LedgerEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before backpressure.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
