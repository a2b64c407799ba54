//! Store-to-index propagation actor
//!
//! Information Hiding:
//! - Queueing, retries and backoff hidden behind a fire-and-forget handle
//! - Index failures are recorded and swallowed inside the worker
//! - Documents are re-derived from the store, so a later job heals a stale one
//! - Only sessions with outstanding work are tracked; settled ones are forgotten

use crate::config::settings::SyncConfig;
use crate::core::{OwnerId, SearchDocument, SessionId};
use crate::search::SearchIndex;
use crate::storage::HistoryStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{channel, error::TrySendError, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Duration};

/// Upper bound on the delay between two upsert attempts
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Where a session stands from the index's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// Committed to the store, projection queued or running
    StoreCommitted,
    Indexed,
    /// Projection failed or was dropped; the next mutation retries it
    IndexStale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub submitted: u64,
    pub indexed: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncJob {
    pub session_id: SessionId,
    pub owner_id: OwnerId,
}

#[derive(Debug)]
enum SyncMessage {
    /// Job plus the ticket it was submitted under
    Project(SyncJob, u64),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Outstanding work for one session
#[derive(Debug, Default)]
struct Tracked {
    pending: u32,
    /// Ticket of the newest job that failed or was dropped
    stale_at: Option<u64>,
}

#[derive(Default)]
struct SyncShared {
    submitted: AtomicU64,
    indexed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    tickets: AtomicU64,
    tracked: Mutex<HashMap<SessionId, Tracked>>,
}

impl SyncShared {
    fn tracked(&self) -> MutexGuard<'_, HashMap<SessionId, Tracked>> {
        self.tracked.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register a job about to be queued and hand out its ticket
    fn begin(&self, session_id: SessionId) -> u64 {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        self.tracked().entry(session_id).or_default().pending += 1;
        ticket
    }

    /// Settle one job. A success only clears staleness recorded by an older
    /// ticket, since a job read the store before any later commit landed.
    fn finish(&self, session_id: SessionId, ticket: u64, indexed: bool) {
        let mut tracked = self.tracked();
        let entry = tracked.entry(session_id).or_default();
        entry.pending = entry.pending.saturating_sub(1);

        if indexed {
            if entry.stale_at.is_some_and(|stale| ticket > stale) {
                entry.stale_at = None;
            }
        } else {
            entry.stale_at = Some(entry.stale_at.map_or(ticket, |stale| stale.max(ticket)));
        }

        let settled = entry.pending == 0 && entry.stale_at.is_none();
        if settled {
            tracked.remove(&session_id);
        }
    }

    fn record_drop(&self, session_id: SessionId, ticket: u64) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.finish(session_id, ticket, false);
    }
}

#[derive(Clone)]
pub struct SyncCoordinatorHandle {
    sender: Sender<SyncMessage>,
    shared: Arc<SyncShared>,
}

impl SyncCoordinatorHandle {
    /// Spawn the worker on the current runtime
    pub fn new(
        store: Arc<dyn HistoryStore>,
        index: Arc<dyn SearchIndex>,
        config: SyncConfig,
    ) -> Self {
        let (sender, receiver) = channel(config.channel_buffer_size.max(1));
        let shared = Arc::new(SyncShared::default());
        tokio::spawn(sync_worker(
            receiver,
            store,
            index,
            config,
            Arc::clone(&shared),
        ));
        Self { sender, shared }
    }

    /// Queue a projection of a just-committed session. Never waits on the
    /// worker; a full queue leaves the document stale.
    pub fn submit(&self, session_id: SessionId, owner_id: OwnerId) {
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        let ticket = self.shared.begin(session_id);

        let job = SyncJob {
            session_id,
            owner_id,
        };
        match self.sender.try_send(SyncMessage::Project(job, ticket)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "[SyncCoordinator] Queue full, session {} left stale in index",
                    session_id
                );
                self.shared.record_drop(session_id, ticket);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(
                    "[SyncCoordinator] Worker stopped, session {} left stale in index",
                    session_id
                );
                self.shared.record_drop(session_id, ticket);
            }
        }
    }

    /// Wait until every job submitted before this call has been processed
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SyncMessage::Flush(tx))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send flush to SyncCoordinator: {}", e))?;
        rx.await
            .map_err(|e| anyhow::anyhow!("SyncCoordinator dropped flush: {}", e))
    }

    /// Finish jobs queued before this call, drop anything queued after, then
    /// stop the worker
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SyncMessage::Shutdown(tx))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send shutdown to SyncCoordinator: {}", e))?;
        rx.await
            .map_err(|e| anyhow::anyhow!("SyncCoordinator dropped shutdown: {}", e))
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            indexed: self.shared.indexed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    /// Sessions with a queued job report `StoreCommitted`, sessions whose
    /// latest projection failed report `IndexStale`. Anything else has no
    /// outstanding work and reports `Indexed`.
    pub fn state_of(&self, session_id: SessionId) -> SyncState {
        match self.shared.tracked().get(&session_id) {
            None => SyncState::Indexed,
            Some(entry) if entry.pending > 0 => SyncState::StoreCommitted,
            Some(_) => SyncState::IndexStale,
        }
    }

    /// Number of sessions with queued or failed projections
    pub fn outstanding(&self) -> usize {
        self.shared.tracked().len()
    }
}

async fn sync_worker(
    mut receiver: Receiver<SyncMessage>,
    store: Arc<dyn HistoryStore>,
    index: Arc<dyn SearchIndex>,
    config: SyncConfig,
    shared: Arc<SyncShared>,
) {
    tracing::info!("[SyncCoordinator] Worker started");

    while let Some(message) = receiver.recv().await {
        match message {
            SyncMessage::Project(job, ticket) => {
                let state = project(job, store.as_ref(), index.as_ref(), &config).await;
                let indexed = state == SyncState::Indexed;
                if indexed {
                    shared.indexed.fetch_add(1, Ordering::Relaxed);
                } else {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                }
                shared.finish(job.session_id, ticket, indexed);
            }
            SyncMessage::Flush(done) => {
                let _ = done.send(());
            }
            SyncMessage::Shutdown(done) => {
                tracing::info!("[SyncCoordinator] Received shutdown signal");
                receiver.close();
                discard_remaining(&mut receiver, &shared);
                let _ = done.send(());
                break;
            }
        }
    }

    tracing::info!("[SyncCoordinator] Worker stopped");
}

/// Account for everything still buffered after shutdown was requested
fn discard_remaining(receiver: &mut Receiver<SyncMessage>, shared: &SyncShared) {
    while let Ok(message) = receiver.try_recv() {
        match message {
            SyncMessage::Project(job, ticket) => {
                tracing::warn!(
                    "[SyncCoordinator] Shutting down, session {} left stale in index",
                    job.session_id
                );
                shared.record_drop(job.session_id, ticket);
            }
            SyncMessage::Flush(done) | SyncMessage::Shutdown(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// Re-derive the document from the store and upsert it with bounded retries
async fn project(
    job: SyncJob,
    store: &dyn HistoryStore,
    index: &dyn SearchIndex,
    config: &SyncConfig,
) -> SyncState {
    let detail = match store.get_session_detail(job.session_id, job.owner_id).await {
        Ok(detail) => detail,
        Err(e) => {
            tracing::warn!(
                "[SyncCoordinator] Could not load session {} for indexing: {}",
                job.session_id,
                e
            );
            return SyncState::IndexStale;
        }
    };
    let doc = SearchDocument::from_detail(&detail);

    let attempts = config.max_retries.max(1);
    let upsert_timeout = Duration::from_millis(config.upsert_timeout_ms);

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = backoff_delay(config.base_backoff_ms, attempt);
            tracing::debug!(
                "[SyncCoordinator] Retrying session {} (attempt {}/{}) after {:?}",
                job.session_id,
                attempt + 1,
                attempts,
                delay
            );
            sleep(delay).await;
        }

        match timeout(upsert_timeout, index.upsert_document(&doc)).await {
            Ok(Ok(())) => {
                tracing::debug!("[SyncCoordinator] Indexed session {}", job.session_id);
                return SyncState::Indexed;
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "[SyncCoordinator] Upsert of session {} failed: {}",
                    job.session_id,
                    e
                );
            }
            Err(_) => {
                tracing::warn!(
                    "[SyncCoordinator] Upsert of session {} timed out after {:?}",
                    job.session_id,
                    upsert_timeout
                );
            }
        }
    }

    tracing::warn!(
        "[SyncCoordinator] Giving up on session {} after {} attempts, index is stale",
        job.session_id,
        attempts
    );
    SyncState::IndexStale
}
