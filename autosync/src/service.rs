//! Sync worker loop
//!
//! A single worker waits for debounced triggers and runs the engine inline,
//! so runs never overlap. Changes that land while a run is in progress stay
//! in the debouncer and fire together once the run is over.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use crate::debounce::ChangeDebouncer;
use crate::engine::SyncEngine;
use crate::report::{self, Tag};

/// Connects a debouncer to a sync engine
pub struct SyncService {
    debouncer: Arc<ChangeDebouncer>,
    engine: Arc<SyncEngine>,
}

impl SyncService {
    pub fn new(debouncer: Arc<ChangeDebouncer>, engine: Arc<SyncEngine>) -> Self {
        Self { debouncer, engine }
    }

    pub fn debouncer(&self) -> &Arc<ChangeDebouncer> {
        &self.debouncer
    }

    /// Serve triggers until `shutdown` completes; returns the number of runs
    ///
    /// Shutdown is only observed between runs: a run that has started always
    /// reaches its outcome.
    pub async fn run<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        debug!("SyncService::run: called");
        tokio::pin!(shutdown);
        let mut runs = 0;

        loop {
            let trigger = tokio::select! {
                trigger = self.debouncer.next_trigger() => trigger,
                _ = &mut shutdown => {
                    info!(runs, "Sync worker shutting down");
                    break;
                }
            };

            report::emit(
                Tag::Sync,
                format!("{} changed path(s) settled, synchronizing", trigger.paths.len()),
            );
            let outcome = self.engine.synchronize().await;
            runs += 1;
            debug!(%outcome, runs, "SyncService::run: run finished");
        }

        runs
    }
}
