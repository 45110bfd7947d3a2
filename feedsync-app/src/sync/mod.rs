pub mod feed;
pub mod identity;
pub mod state;
pub mod thread;

#[cfg(test)]
mod fake;

use crate::sync::{
    feed::FeedStore,
    identity::{IdentityProvider, Session},
    state::{SharedState, SyncState},
    thread::{CommentThreadController, ThreadPhase},
};
use feedsync_client::{ApiError, RemoteApi};
use feedsync_common::model::{Id, comment::InvalidCommentMessageError, post::PostMarker};
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] ApiError),
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl From<InvalidState> for SyncError {
    fn from(err: InvalidState) -> Self {
        Self::Usage(err.into())
    }
}

/// The caller asked for something the current state does not allow.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum UsageError {
    #[error("Post with id {0} was not found.")]
    PostNotFound(Id<PostMarker>),
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum InvalidState {
    #[error("Cannot {operation} while the thread is {phase}.")]
    WrongPhase {
        operation: &'static str,
        phase: ThreadPhase,
    },
    #[error("No user to comment as has been picked yet.")]
    SelfUnresolved,
    #[error("The draft cannot be posted: {0}")]
    Draft(#[from] InvalidCommentMessageError),
    #[error("The comment is already being posted.")]
    SubmitInFlight,
}

/// Wires the components to one shared state and routes user intents to them.
///
/// Remote failures end up as the state's transient message, so intent
/// handlers only return [`UsageError`].
pub struct SyncEngine {
    state: SharedState,
    session: Arc<Session>,
    feed: FeedStore,
    identity: IdentityProvider,
    thread: CommentThreadController,
}

impl SyncEngine {
    #[must_use]
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        let state = SharedState::new();
        let session = Arc::new(Session::new());

        Self {
            feed: FeedStore::new(Arc::clone(&api), state.clone()),
            identity: IdentityProvider::new(Arc::clone(&api), Arc::clone(&session), state.clone()),
            thread: CommentThreadController::new(api, state.clone(), Arc::clone(&session)),
            state,
            session,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncState {
        self.state.snapshot()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Loads the feed and picks the acting user side by side.
    ///
    /// Failures are left in the state; neither step waits on the other.
    pub async fn start(&self) {
        let (feed, identity) = tokio::join!(self.feed.load(), self.identity.resolve_self());
        if let Err(err) = feed {
            debug!(error = %err, "Startup feed load failed");
        }
        if let Err(err) = identity {
            debug!(error = %err, "Startup identity resolution failed");
        }
    }

    pub async fn reload_feed(&self) {
        if let Err(err) = self.feed.load().await {
            debug!(error = %err, "Feed reload failed");
        }
    }

    /// Counts the like immediately and persists it in the background.
    ///
    /// The handle resolves once the server has answered.
    pub fn like(&self, post_id: &Id<PostMarker>) -> Result<JoinHandle<()>, UsageError> {
        let pending = self.feed.like(post_id)?;

        Ok(tokio::spawn(async move {
            if let Err(err) = pending.persist().await {
                debug!(error = %err, "Like was not persisted");
            }
        }))
    }

    pub async fn expand_thread(&self, post_id: &Id<PostMarker>) -> Result<(), UsageError> {
        surface(self.thread.expand(post_id).await)
    }

    pub fn collapse_thread(&self) {
        self.thread.collapse();
    }

    /// Replaces the draft, opening the composer on a loaded thread first.
    pub fn compose_draft_changed(&self, text: impl Into<String>) -> Result<(), UsageError> {
        self.thread.start_compose()?;
        self.thread.update_draft(text)
    }

    pub async fn submit_comment(&self) -> Result<(), UsageError> {
        surface(self.thread.submit().await)
    }

    pub fn dismiss_message(&self) {
        self.state.modify(|state| state.transient_message = None);
    }
}

fn surface(result: Result<(), SyncError>) -> Result<(), UsageError> {
    match result {
        Ok(()) => Ok(()),
        Err(SyncError::Remote(err)) => {
            debug!(error = %err, "Remote failure left as status message");
            Ok(())
        }
        Err(SyncError::Usage(err)) => Err(err),
    }
}
