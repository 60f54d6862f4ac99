//! HTTP ingress subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID assigned and echoed)
//!     → webhook.rs (admission control, event handler, ack)
//!     → admin (status, breaker snapshot) when enabled
//! ```

pub mod request;
pub mod server;
pub mod webhook;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use webhook::{
    AckStatus, AcknowledgeHandler, EventAck, EventHandler, EventPipeline, ForwardingHandler,
    InboundEvent,
};
