mod buffer;
mod channel;
pub mod connector;
mod error;
mod factory;
pub mod protocol;
mod stream;
mod util;

pub use channel::{Channel, ChannelState};
pub use connector::tcp::ADB_SERVER_PORT;
pub use connector::websocket::WEBSOCKET_PROXY_PORT;
pub use error::{Error, ErrorKind, Result};
pub use factory::{StreamFactory, Target};
pub use stream::{AdbStream, FnHandler, StreamChannel, StreamHandler};
