//! Per-article engagement state (liked, saved, like count).
//!
//! - [`state`] holds the synchronous [`EngagementStateMachine`]: optimistic
//!   flips, pending mutations and rollback.
//! - [`controller`] wires the machine to the remote gateway or the on-device
//!   store depending on the session, and applies call outcomes as they
//!   arrive.

mod controller;
mod state;

pub use controller::{AuthState, EngagementController, EngagementEvent};
pub(crate) use controller::spawn_track_view;
pub use state::{
    EngagementChange, EngagementError, EngagementState, EngagementStateMachine, MutationKind,
    MutationTicket, PendingMutation, Settlement,
};
