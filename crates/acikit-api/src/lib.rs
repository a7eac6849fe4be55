// acikit-api: Async client for the Cisco ACI controller (REST + subscription WebSocket)

pub mod auth;
pub mod backoff;
pub mod client;
pub mod error;
pub mod query;
pub mod response;
pub mod session;
pub mod subscription;
pub mod transport;
mod websocket;

pub use auth::{Credentials, RequestSigner};
pub use backoff::Backoff;
pub use client::ApicClient;
pub use error::Error;
pub use query::{Query, QueryTarget, RspSubtree};
pub use response::ApicResponse;
pub use session::{Session, SessionConfig, SessionState};
pub use subscription::SubscriptionEvent;
pub use transport::TlsMode;
