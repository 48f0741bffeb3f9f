//! Shared render context: the encoder handle and its lazily probed capabilities.

use std::sync::Arc;

use reelsmith_common::error::{ReelError, ReelResult};
use tokio::sync::{Mutex, MutexGuard, OnceCell};

use crate::encoder::{EncoderCapabilities, MediaEncoder};

/// Owned by the caller and passed to each render explicitly.
///
/// Capabilities are probed on first use. Renders take an exclusive lease for
/// their whole duration, so a second render on the same context waits.
pub struct RenderContext {
    encoder: Arc<dyn MediaEncoder>,
    capabilities: OnceCell<EncoderCapabilities>,
    lease: Mutex<()>,
}

/// Exclusive use of a [`RenderContext`] for one render.
pub struct RenderLease<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl RenderContext {
    pub fn new(encoder: Arc<dyn MediaEncoder>) -> Self {
        Self {
            encoder,
            capabilities: OnceCell::new(),
            lease: Mutex::new(()),
        }
    }

    pub fn encoder(&self) -> &Arc<dyn MediaEncoder> {
        &self.encoder
    }

    /// Probe the encoder once; later calls reuse the first successful result.
    pub async fn capabilities(&self) -> ReelResult<&EncoderCapabilities> {
        self.capabilities
            .get_or_try_init(|| async {
                if !self.encoder.is_available().await {
                    return Err(ReelError::unsupported(format!(
                        "render backend '{}' is not available",
                        self.encoder.name()
                    )));
                }
                let caps = self.encoder.capabilities().await?;
                tracing::info!(
                    backend = %caps.name,
                    version = caps.version.as_deref().unwrap_or("unknown"),
                    "Render backend ready"
                );
                Ok(caps)
            })
            .await
    }

    /// Wait for exclusive use of the context.
    pub async fn lease(&self) -> RenderLease<'_> {
        if self.lease.try_lock().is_err() {
            tracing::info!("Render context busy; queueing behind running render");
        }
        RenderLease {
            _guard: self.lease.lock().await,
        }
    }
}
