pub mod inbound;

pub use inbound::{WatcherApi, WatcherStats};
