//! Scoped bridge lifecycle.
//!
//! [`BridgeManager`] initializes a bridge, lends it to a piece of work and
//! closes it afterwards, whether the work finished, failed or was cancelled.

use std::future::Future;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::bridge::Bridge;
use crate::llm::Backend;
use crate::tools::ToolHost;

/// Owns a [`Bridge`] for the length of one scoped run.
pub struct BridgeManager<B, H> {
    bridge: Bridge<B, H>,
}

impl<B: Backend, H: ToolHost> BridgeManager<B, H> {
    pub fn new(bridge: Bridge<B, H>) -> Self {
        Self { bridge }
    }

    /// Initialize, run `work`, close.
    ///
    /// `work` runs even if initialization failed; check
    /// [`Bridge::is_initialized`] to tell.
    pub async fn run<T, F>(self, work: F) -> T
    where
        F: for<'a> FnOnce(&'a mut Bridge<B, H>) -> BoxFuture<'a, T>,
    {
        let mut bridge = self.bridge;
        start(&mut bridge).await;
        let out = work(&mut bridge).await;
        finish(&mut bridge).await;
        out
    }

    /// Like [`run`](Self::run), but abandons initialization or `work` as
    /// soon as `cancel` completes. Returns `None` when cancelled; the bridge
    /// is closed either way.
    pub async fn run_until<T, F, C>(self, work: F, cancel: C) -> Option<T>
    where
        F: for<'a> FnOnce(&'a mut Bridge<B, H>) -> BoxFuture<'a, T>,
        C: Future<Output = ()>,
    {
        let mut bridge = self.bridge;

        let outcome = {
            let session = async {
                start(&mut bridge).await;
                work(&mut bridge).await
            };
            tokio::select! {
                out = session => Some(out),
                () = cancel => {
                    debug!("run: cancelled");
                    None
                }
            }
        };

        finish(&mut bridge).await;
        outcome
    }
}

async fn start<B: Backend, H: ToolHost>(bridge: &mut Bridge<B, H>) {
    if !bridge.initialize().await {
        warn!("start: bridge failed to initialize");
    }
}

async fn finish<B: Backend, H: ToolHost>(bridge: &mut Bridge<B, H>) {
    if let Err(e) = bridge.close().await {
        warn!(error = %e, "finish: close failed");
    }
}
