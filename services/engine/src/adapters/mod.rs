pub mod channel;
pub mod http;

pub use channel::{ChannelHandle, InProcessChannel};
pub use http::HttpBackend;
