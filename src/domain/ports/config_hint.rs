//! Config Hint Port
//!
//! Side-channel source for the backend port configured at runtime.

use async_trait::async_trait;

/// Best-effort provider of the configured backend port.
///
/// Absence, fetch failure and malformed content all map to `None`;
/// none of them is an error for the caller.
#[async_trait]
pub trait ConfigHintProvider: Send + Sync {
    async fn try_get_port(&self) -> Option<u16>;
}
