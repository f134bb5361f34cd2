//! Host side of the power strip: links, the retrying transport, typed
//! commands and the interactive console.

pub mod client;
pub mod config;
pub mod console;
pub mod link;
pub mod report;
pub mod session;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::Config;
pub use link::{Link, SerialLink, TcpLink};
pub use session::{Session, SessionError};
pub use transport::{Transport, TransportError};
