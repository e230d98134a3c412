use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Acknowledgement that an [`Applier`] committed a value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ack;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Value rejected: {0}")]
    Rejected(String),
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Apply timed out")]
    Timeout,
}

/// The side-effecting boundary that commits a decided value to the real system (a sysctl, a
/// wireless interface setting, a resolver configuration).
///
/// Once started, an `apply` call is always driven to completion by the control loop, even if
/// the tick that started it is abandoned or times out.
#[async_trait]
pub trait Applier: Send + Sync + 'static {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError>;
}

#[async_trait]
impl<A: Applier + ?Sized> Applier for Arc<A> {
    async fn apply(&self, tunable: &str, value: f64) -> Result<Ack, ApplyError> {
        (**self).apply(tunable, value).await
    }
}
