//! Application Layer
//!
//! Use cases: discovering the backend, dispatching requests against it and
//! monitoring the connection.

pub mod backend_client;
pub mod backend_monitor;
pub mod discoverer;
pub mod dispatcher;

pub use backend_client::{BackendClient, ClientError};
pub use backend_monitor::BackendMonitor;
pub use discoverer::Discoverer;
pub use dispatcher::{ApiResponse, DispatchError, RequestOptions, ResilientDispatcher};
