pub mod channels;
pub mod feed;

pub use channels::{ChannelManager, GLOBAL_TOPIC, VIEW_TOPIC};
pub use feed::Feed;
