mod client;
pub mod connector;
pub mod dispatch;
mod error;
pub mod frame;
mod outstanding;
mod receiver;
mod sender;
mod shared;

pub use client::{ClientConfig, ForwardClient};
pub use connector::{BoxedStream, Connector, TcpConnector, TlsConnector, UpstreamStream, tls_client_config};
pub use dispatch::{Callback, Dispatcher, RuntimeDispatcher};
pub use error::{ClientError, FrameError};
