use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::state::{
    EngagementChange, EngagementError, EngagementState, EngagementStateMachine, MutationKind,
    MutationTicket, Settlement,
};
use crate::api::{Article, ArticleId, RemoteEngagementGateway};
use crate::storage::EngagementStorage;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Who the engagement writes are made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

impl AuthState {
    pub fn is_authenticated(self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

/// Events from background write-through tasks
#[derive(Debug)]
pub enum EngagementEvent {
    /// A write-through call finished.
    ///
    /// Fields:
    /// - `ticket`: The ticket returned by the toggle that issued the call
    /// - `result`: `Err` carries the gateway error message
    Settled {
        ticket: MutationTicket,
        result: Result<(), String>,
    },
}

/// Owns the [`EngagementStateMachine`] and routes its write-throughs.
///
/// Signed-in sessions write through the [`RemoteEngagementGateway`] and roll
/// back on failure. Anonymous sessions write to [`EngagementStorage`] only and
/// never roll back: a storage failure is logged and the optimistic value
/// stays.
///
/// Write-throughs run as spawned tasks and report back over a channel; the
/// owner applies them with [`process_event`](Self::process_event), so the
/// machine is only ever mutated from the owning task.
pub struct EngagementController {
    machine: EngagementStateMachine,
    auth: AuthState,
    remote: Arc<dyn RemoteEngagementGateway>,
    local: Arc<dyn EngagementStorage>,
    event_tx: mpsc::Sender<EngagementEvent>,
    event_rx: mpsc::Receiver<EngagementEvent>,
}

impl EngagementController {
    pub fn new(
        auth: AuthState,
        remote: Arc<dyn RemoteEngagementGateway>,
        local: Arc<dyn EngagementStorage>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            machine: EngagementStateMachine::new(),
            auth,
            remote,
            local,
            event_tx,
            event_rx,
        }
    }

    pub fn auth(&self) -> AuthState {
        self.auth
    }

    /// Switch sessions. In-memory state is dropped so every article reseeds
    /// from the new session's source; the device lists are left as they are.
    pub fn set_auth(&mut self, auth: AuthState) {
        if auth != self.auth {
            tracing::info!(from = ?self.auth, to = ?auth, "Engagement session changed");
            self.auth = auth;
            self.machine.reset();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngagementChange> {
        self.machine.subscribe()
    }

    pub fn snapshot(&self, article_id: &ArticleId) -> Option<EngagementState> {
        self.machine.snapshot(article_id)
    }

    pub fn machine(&self) -> &EngagementStateMachine {
        &self.machine
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    /// Seed state for a freshly fetched page of articles.
    ///
    /// Signed in: server-reported flags and counts. Anonymous: flags from the
    /// device lists (read once per page), counts from the server. An
    /// unreadable device store seeds everything as not liked / not saved.
    pub async fn seed_articles(&mut self, articles: &[Article]) {
        match self.auth {
            AuthState::Authenticated => {
                for article in articles {
                    self.machine
                        .seed(&article.id, EngagementState::from_server(article));
                }
            }
            AuthState::Anonymous => {
                let liked = self.read_local(MutationKind::Like).await;
                let saved = self.read_local(MutationKind::Save).await;
                for article in articles {
                    self.machine.seed(
                        &article.id,
                        EngagementState::from_local(article, &liked, &saved),
                    );
                }
            }
        }
    }

    async fn read_local(&self, kind: MutationKind) -> HashSet<ArticleId> {
        let result = match kind {
            MutationKind::Like => self.local.liked_ids().await,
            MutationKind::Save => self.local.saved_ids().await,
        };
        match result {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!(kind = ?kind, error = %e, "Failed to read local engagement list");
                HashSet::new()
            }
        }
    }

    // ========================================================================
    // Toggles
    // ========================================================================

    pub fn toggle_like(&mut self, article_id: &ArticleId) -> Result<EngagementState, EngagementError> {
        self.toggle(article_id, MutationKind::Like)
    }

    pub fn toggle_save(&mut self, article_id: &ArticleId) -> Result<EngagementState, EngagementError> {
        self.toggle(article_id, MutationKind::Save)
    }

    /// Flip the flag now and issue its write-through in the background.
    ///
    /// Returns the optimistic state. Must be called from within a tokio
    /// runtime.
    pub fn toggle(
        &mut self,
        article_id: &ArticleId,
        kind: MutationKind,
    ) -> Result<EngagementState, EngagementError> {
        let ticket = self.machine.toggle(article_id, kind)?;
        let state = self
            .machine
            .snapshot(article_id)
            .ok_or_else(|| EngagementError::NotSeeded(article_id.clone()))?;

        match self.auth {
            AuthState::Authenticated => self.spawn_remote_write(ticket),
            AuthState::Anonymous => self.spawn_local_write(ticket),
        }
        Ok(state)
    }

    fn spawn_remote_write(&self, ticket: MutationTicket) {
        let remote = Arc::clone(&self.remote);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = catch_task_panic(async {
                match ticket.kind {
                    MutationKind::Like => remote.toggle_like(&ticket.article_id).await,
                    MutationKind::Save => remote.toggle_bookmark(&ticket.article_id).await,
                }
            })
            .await;

            let result = match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    tracing::debug!(article_id = %ticket.article_id, kind = ?ticket.kind, error = %e, "Remote engagement write failed");
                    Err(e.to_string())
                }
                Err(panic_msg) => {
                    tracing::error!(task = "engagement_write", error = %panic_msg, "Background task panicked");
                    Err(panic_msg)
                }
            };

            if let Err(e) = tx.send(EngagementEvent::Settled { ticket, result }).await {
                tracing::debug!(error = %e, event = "Settled", "Channel send failed (receiver dropped)");
            }
        });
    }

    fn spawn_local_write(&self, ticket: MutationTicket) {
        let local = Arc::clone(&self.local);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = catch_task_panic(async {
                match ticket.kind {
                    MutationKind::Like => local.set_liked(&ticket.article_id, ticket.desired).await,
                    MutationKind::Save => local.set_saved(&ticket.article_id, ticket.desired).await,
                }
            })
            .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(article_id = %ticket.article_id, kind = ?ticket.kind, error = %e, "Local engagement write failed, keeping optimistic state");
                }
                Err(panic_msg) => {
                    tracing::error!(task = "engagement_local_write", error = %panic_msg, "Background task panicked");
                }
            }

            // Anonymous writes always settle as success
            if let Err(e) = tx
                .send(EngagementEvent::Settled {
                    ticket,
                    result: Ok(()),
                })
                .await
            {
                tracing::debug!(error = %e, event = "Settled", "Channel send failed (receiver dropped)");
            }
        });
    }

    // ========================================================================
    // Event Processing
    // ========================================================================

    /// Apply one background event to the state machine.
    pub fn process_event(&mut self, event: EngagementEvent) -> Settlement {
        match event {
            EngagementEvent::Settled { ticket, result } => {
                self.machine.settle(&ticket, result.is_ok())
            }
        }
    }

    /// Wait for the next background event and apply it.
    pub async fn process_next(&mut self) -> Option<Settlement> {
        let event = self.event_rx.recv().await?;
        Some(self.process_event(event))
    }

    /// Apply events until nothing is pending, then drain outcomes that have
    /// already arrived for superseded calls.
    ///
    /// A superseded call that is still in flight when the latest one settles
    /// reports later; [`process_next`](Self::process_next) then returns
    /// [`Settlement::Stale`] for it and the state is left alone.
    pub async fn settle_all(&mut self) {
        while self.machine.pending_count() > 0 {
            if self.process_next().await.is_none() {
                break;
            }
        }
        while let Ok(event) = self.event_rx.try_recv() {
            let settlement = self.process_event(event);
            tracing::trace!(?settlement, "Drained late engagement outcome");
        }
    }

    /// Fire-and-forget view tracking. Failures are logged and dropped.
    pub fn track_view(&self, article_id: &ArticleId) {
        // Detached: dropping the handle leaves the task running
        drop(spawn_track_view(Arc::clone(&self.remote), article_id.clone()));
    }
}

pub(crate) fn spawn_track_view(
    remote: Arc<dyn RemoteEngagementGateway>,
    article_id: ArticleId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match catch_task_panic(remote.track_view(&article_id)).await {
            Ok(Ok(())) => tracing::debug!(article_id = %article_id, "View tracked"),
            Ok(Err(e)) => {
                tracing::debug!(article_id = %article_id, error = %e, "View tracking failed")
            }
            Err(panic_msg) => {
                tracing::error!(task = "track_view", error = %panic_msg, "Background task panicked")
            }
        }
    })
}

/// Run a future, converting a panic into an `Err` with the panic message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}
