//! Authoritative in-memory engagement state for visible articles.
//!
//! The machine is synchronous and is the only code that mutates
//! [`EngagementState`]. Network and storage calls happen elsewhere; each one
//! is identified by the [`MutationTicket`] returned from a toggle and reported
//! back through [`EngagementStateMachine::settle`].
//!
//! Per (article, kind) the machine is either idle or holds one
//! [`PendingMutation`]. Repeated taps while pending reuse that record, so a
//! rollback always restores the state from before the *first* tap, and only
//! the outcome of the most recently issued call can settle it.
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::api::{Article, ArticleId};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngagementError {
    #[error("Article {0} has not been seeded")]
    NotSeeded(ArticleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Like,
    Save,
}

/// Engagement flags for one article, as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementState {
    pub is_liked: bool,
    pub is_saved: bool,
    pub likes_count: u64,
}

impl EngagementState {
    /// State reported by the server for an authenticated session.
    pub fn from_server(article: &Article) -> Self {
        Self {
            is_liked: article.is_liked.unwrap_or(false),
            is_saved: article.is_saved.unwrap_or(false),
            likes_count: article.server_likes(),
        }
    }

    /// State for an anonymous session: flags come from the device lists, the
    /// count from the server.
    pub fn from_local(
        article: &Article,
        liked: &HashSet<ArticleId>,
        saved: &HashSet<ArticleId>,
    ) -> Self {
        Self {
            is_liked: liked.contains(&article.id),
            is_saved: saved.contains(&article.id),
            likes_count: article.server_likes(),
        }
    }

    fn flag(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Like => self.is_liked,
            MutationKind::Save => self.is_saved,
        }
    }
}

/// An optimistic change awaiting its write-through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub article_id: ArticleId,
    pub kind: MutationKind,
    /// State before the first unsettled toggle of this kind.
    pub previous_state: EngagementState,
    pub issued_at: DateTime<Utc>,
}

/// Handle for one issued write-through call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationTicket {
    pub article_id: ArticleId,
    pub kind: MutationKind,
    pub generation: u64,
    /// Flag value this call is meant to establish.
    pub desired: bool,
}

/// Result of applying a call outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The latest call succeeded; the optimistic state is now authoritative.
    Confirmed(EngagementState),
    /// The latest call failed; the pre-mutation snapshot was restored.
    RolledBack(EngagementState),
    /// A newer call for the same (article, kind) is outstanding; this outcome
    /// was dropped.
    Superseded,
    /// Nothing was pending for this ticket (already settled or reset).
    Stale,
}

/// Notification sent to subscribers after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngagementChange {
    Seeded {
        article_id: ArticleId,
        state: EngagementState,
    },
    /// Sent synchronously with the flip; feedback (haptics) hangs off this.
    Optimistic {
        article_id: ArticleId,
        kind: MutationKind,
        state: EngagementState,
    },
    Confirmed {
        article_id: ArticleId,
        kind: MutationKind,
        state: EngagementState,
    },
    RolledBack {
        article_id: ArticleId,
        kind: MutationKind,
        state: EngagementState,
    },
    Reset,
}

#[derive(Debug, Clone)]
struct PendingSlot {
    mutation: PendingMutation,
    latest_generation: u64,
}

#[derive(Debug, Clone)]
struct ArticleEngagement {
    state: EngagementState,
    /// Seeded values; like counts are derived from these so that repeated
    /// toggles never drift.
    baseline: EngagementState,
    pending_like: Option<PendingSlot>,
    pending_save: Option<PendingSlot>,
}

impl ArticleEngagement {
    fn slot(&self, kind: MutationKind) -> &Option<PendingSlot> {
        match kind {
            MutationKind::Like => &self.pending_like,
            MutationKind::Save => &self.pending_save,
        }
    }

    fn slot_mut(&mut self, kind: MutationKind) -> &mut Option<PendingSlot> {
        match kind {
            MutationKind::Like => &mut self.pending_like,
            MutationKind::Save => &mut self.pending_save,
        }
    }

    fn has_pending(&self) -> bool {
        self.pending_like.is_some() || self.pending_save.is_some()
    }

    /// Like count for a given liked flag relative to the seeded values,
    /// floored at zero.
    fn likes_for(&self, liked: bool) -> u64 {
        let base = self.baseline.likes_count as i128;
        let delta = liked as i128 - self.baseline.is_liked as i128;
        (base + delta).max(0) as u64
    }
}

pub struct EngagementStateMachine {
    articles: HashMap<ArticleId, ArticleEngagement>,
    next_generation: u64,
    changes: broadcast::Sender<EngagementChange>,
}

impl Default for EngagementStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngagementStateMachine {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            articles: HashMap::new(),
            next_generation: 1,
            changes,
        }
    }

    /// Receive every subsequent [`EngagementChange`].
    pub fn subscribe(&self) -> broadcast::Receiver<EngagementChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: EngagementChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    /// Install the source-of-truth state for an article entering view.
    ///
    /// Seeding an idle article replaces its state, so seeding twice from the
    /// same values is a no-op. Articles with an unsettled mutation keep their
    /// optimistic state until it settles.
    pub fn seed(&mut self, article_id: &ArticleId, state: EngagementState) -> EngagementState {
        if let Some(existing) = self.articles.get(article_id) {
            if existing.has_pending() {
                tracing::debug!(article_id = %article_id, "Skipping seed for article with pending mutation");
                return existing.state;
            }
            if existing.baseline == state && existing.state == state {
                return state;
            }
        }

        self.articles.insert(
            article_id.clone(),
            ArticleEngagement {
                state,
                baseline: state,
                pending_like: None,
                pending_save: None,
            },
        );
        self.notify(EngagementChange::Seeded {
            article_id: article_id.clone(),
            state,
        });
        state
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn snapshot(&self, article_id: &ArticleId) -> Option<EngagementState> {
        self.articles.get(article_id).map(|a| a.state)
    }

    pub fn pending(&self, article_id: &ArticleId, kind: MutationKind) -> Option<&PendingMutation> {
        self.articles
            .get(article_id)?
            .slot(kind)
            .as_ref()
            .map(|slot| &slot.mutation)
    }

    pub fn is_pending(&self, article_id: &ArticleId, kind: MutationKind) -> bool {
        self.pending(article_id, kind).is_some()
    }

    /// Number of (article, kind) pairs with an unsettled mutation.
    pub fn pending_count(&self) -> usize {
        self.articles
            .values()
            .map(|a| a.pending_like.is_some() as usize + a.pending_save.is_some() as usize)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub fn toggle_like(&mut self, article_id: &ArticleId) -> Result<MutationTicket, EngagementError> {
        self.toggle(article_id, MutationKind::Like)
    }

    pub fn toggle_save(&mut self, article_id: &ArticleId) -> Result<MutationTicket, EngagementError> {
        self.toggle(article_id, MutationKind::Save)
    }

    /// Apply an optimistic flip and return the ticket for its write-through.
    ///
    /// The first toggle of an idle (article, kind) snapshots the current
    /// state. Further toggles before it settles flip the visible state again
    /// but keep that original snapshot.
    pub fn toggle(
        &mut self,
        article_id: &ArticleId,
        kind: MutationKind,
    ) -> Result<MutationTicket, EngagementError> {
        let generation = self.next_generation;
        let entry = self
            .articles
            .get_mut(article_id)
            .ok_or_else(|| EngagementError::NotSeeded(article_id.clone()))?;

        let previous_state = entry.state;
        let desired = !previous_state.flag(kind);
        match kind {
            MutationKind::Like => {
                entry.state.is_liked = desired;
                entry.state.likes_count = entry.likes_for(desired);
            }
            MutationKind::Save => entry.state.is_saved = desired,
        }

        let slot = entry.slot_mut(kind);
        if let Some(existing) = slot.as_mut() {
            tracing::debug!(
                article_id = %article_id,
                kind = ?kind,
                superseded = existing.latest_generation,
                generation,
                "Toggle superseded pending mutation"
            );
            existing.latest_generation = generation;
        } else {
            *slot = Some(PendingSlot {
                mutation: PendingMutation {
                    article_id: article_id.clone(),
                    kind,
                    previous_state,
                    issued_at: Utc::now(),
                },
                latest_generation: generation,
            });
        }
        let state = entry.state;
        self.next_generation += 1;

        self.notify(EngagementChange::Optimistic {
            article_id: article_id.clone(),
            kind,
            state,
        });

        Ok(MutationTicket {
            article_id: article_id.clone(),
            kind,
            generation,
            desired,
        })
    }

    /// Apply the outcome of the call identified by `ticket`.
    ///
    /// Only the most recently issued call for an (article, kind) settles its
    /// pending mutation. On failure the fields of that kind are restored from
    /// the pending snapshot; the other kind is left untouched.
    pub fn settle(&mut self, ticket: &MutationTicket, succeeded: bool) -> Settlement {
        let Some(entry) = self.articles.get_mut(&ticket.article_id) else {
            return Settlement::Stale;
        };
        let slot = entry.slot_mut(ticket.kind);
        let Some(pending) = slot.as_ref() else {
            return Settlement::Stale;
        };
        if pending.latest_generation != ticket.generation {
            tracing::debug!(
                article_id = %ticket.article_id,
                kind = ?ticket.kind,
                generation = ticket.generation,
                latest = pending.latest_generation,
                succeeded,
                "Dropping outcome of superseded call"
            );
            return Settlement::Superseded;
        }

        let previous = pending.mutation.previous_state;
        *slot = None;

        if succeeded {
            let state = entry.state;
            self.notify(EngagementChange::Confirmed {
                article_id: ticket.article_id.clone(),
                kind: ticket.kind,
                state,
            });
            return Settlement::Confirmed(state);
        }

        match ticket.kind {
            MutationKind::Like => {
                entry.state.is_liked = previous.is_liked;
                entry.state.likes_count = previous.likes_count;
            }
            MutationKind::Save => entry.state.is_saved = previous.is_saved,
        }
        let state = entry.state;
        tracing::warn!(
            article_id = %ticket.article_id,
            kind = ?ticket.kind,
            "Engagement write failed, rolled back"
        );
        self.notify(EngagementChange::RolledBack {
            article_id: ticket.article_id.clone(),
            kind: ticket.kind,
            state,
        });
        Settlement::RolledBack(state)
    }

    /// Forget all articles and pending mutations. Outcomes of calls still in
    /// flight settle as [`Settlement::Stale`].
    pub fn reset(&mut self) {
        let dropped = self.pending_count();
        if dropped > 0 {
            tracing::info!(dropped, "Resetting engagement state with pending mutations");
        }
        self.articles.clear();
        self.notify(EngagementChange::Reset);
    }
}
