mod channel;
mod stats;
mod timer;

pub use channel::{IpcChannel, OutputEvent, OUTPUT_FEED_CAPACITY};
pub use stats::{ChannelMetrics, ChannelStats, CommandMetrics};
pub use timer::CommandTimer;
