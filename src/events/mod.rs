pub mod streams;
pub use streams::{StatusStream, StatusStreamStats, Subscriber};

/// Per-subscriber backlog before a slow subscriber starts skipping values
pub const STATUS_CHANNEL_CAPACITY: usize = 16;
