use crate::sync::{
    InvalidState, SyncError, UsageError,
    identity::Session,
    state::{SharedState, StatusMessage},
};
use feedsync_client::RemoteApi;
use feedsync_common::model::{
    Id,
    comment::{Comment, CommentMessage, CreateComment},
    post::PostMarker,
};
use std::{
    fmt::{Display, Formatter},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, warn};

/// The single expanded comment thread.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub enum ThreadState {
    #[default]
    Collapsed,
    Loading {
        post_id: Id<PostMarker>,
        /// Identifies the fetch whose response may fill this thread.
        ticket: u64,
    },
    Loaded {
        post_id: Id<PostMarker>,
        comments: Vec<Comment>,
    },
    Composing {
        post_id: Id<PostMarker>,
        comments: Vec<Comment>,
        draft: String,
        submitting: bool,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ThreadPhase {
    Collapsed,
    Loading,
    Loaded,
    Composing,
}

impl Display for ThreadPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ThreadPhase::Collapsed => "collapsed",
            ThreadPhase::Loading => "loading",
            ThreadPhase::Loaded => "loaded",
            ThreadPhase::Composing => "composing",
        };
        f.write_str(name)
    }
}

impl ThreadState {
    #[must_use]
    pub fn phase(&self) -> ThreadPhase {
        match self {
            ThreadState::Collapsed => ThreadPhase::Collapsed,
            ThreadState::Loading { .. } => ThreadPhase::Loading,
            ThreadState::Loaded { .. } => ThreadPhase::Loaded,
            ThreadState::Composing { .. } => ThreadPhase::Composing,
        }
    }

    #[must_use]
    pub fn post_id(&self) -> Option<&Id<PostMarker>> {
        match self {
            ThreadState::Collapsed => None,
            ThreadState::Loading { post_id, .. }
            | ThreadState::Loaded { post_id, .. }
            | ThreadState::Composing { post_id, .. } => Some(post_id),
        }
    }

    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        match self {
            ThreadState::Collapsed | ThreadState::Loading { .. } => &[],
            ThreadState::Loaded { comments, .. } | ThreadState::Composing { comments, .. } => {
                comments
            }
        }
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        match self {
            ThreadState::Composing { draft, .. } => draft,
            _ => "",
        }
    }

    #[must_use]
    pub fn is_composing(&self) -> bool {
        matches!(self, ThreadState::Composing { .. })
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        matches!(
            self,
            ThreadState::Composing {
                submitting: true,
                ..
            }
        )
    }

    fn is_loading(&self, expected_post: &Id<PostMarker>, expected_ticket: u64) -> bool {
        matches!(
            self,
            ThreadState::Loading { post_id, ticket }
                if post_id == expected_post && *ticket == expected_ticket
        )
    }
}

/// Owns the expand, compose and submit protocol of the active thread.
///
/// Every fetch carries a ticket. A response only lands if the thread is still
/// loading under that ticket, so results for an abandoned thread are dropped
/// on arrival instead of being cancelled.
pub struct CommentThreadController {
    api: Arc<dyn RemoteApi>,
    state: SharedState,
    session: Arc<Session>,
    next_ticket: AtomicU64,
}

impl CommentThreadController {
    #[must_use]
    pub fn new(api: Arc<dyn RemoteApi>, state: SharedState, session: Arc<Session>) -> Self {
        Self {
            api,
            state,
            session,
            next_ticket: AtomicU64::new(0),
        }
    }

    pub async fn expand(&self, post_id: &Id<PostMarker>) -> Result<(), SyncError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        let started = self.state.modify(|state| -> Result<bool, UsageError> {
            if state.post(post_id).is_none() {
                return Err(UsageError::PostNotFound(post_id.clone()));
            }
            if state.active_thread.post_id() == Some(post_id) {
                return Ok(false);
            }
            if let Some(previous) = state.active_thread.post_id() {
                debug!(%previous, "Abandoning previous thread");
            }
            state.active_thread = ThreadState::Loading {
                post_id: post_id.clone(),
                ticket,
            };
            Ok(true)
        })?;

        if !started {
            debug!(%post_id, "Thread already open");
            return Ok(());
        }

        debug!(%post_id, ticket, "Loading comments");
        self.fetch(post_id.clone(), ticket).await
    }

    async fn fetch(&self, post_id: Id<PostMarker>, ticket: u64) -> Result<(), SyncError> {
        match self.api.list_comments(&post_id).await {
            Ok(comments) => {
                let count = comments.len();
                let applied = self.state.modify(|state| {
                    if !state.active_thread.is_loading(&post_id, ticket) {
                        return false;
                    }
                    state.active_thread = ThreadState::Loaded {
                        post_id: post_id.clone(),
                        comments,
                    };
                    true
                });

                if applied {
                    debug!(%post_id, count, "Comments loaded");
                } else {
                    debug!(%post_id, ticket, "Discarding comments for abandoned thread");
                }
                Ok(())
            }
            Err(err) => {
                let applied = self.state.modify(|state| {
                    if !state.active_thread.is_loading(&post_id, ticket) {
                        return false;
                    }
                    state.active_thread = ThreadState::Collapsed;
                    state.report(StatusMessage::error(format!(
                        "Could not load comments: {err}"
                    )));
                    true
                });

                if applied {
                    warn!(%post_id, error = %err, "Loading comments failed");
                    Err(err.into())
                } else {
                    debug!(%post_id, ticket, error = %err, "Ignoring failure for abandoned thread");
                    Ok(())
                }
            }
        }
    }

    pub fn collapse(&self) {
        let previous = self
            .state
            .modify(|state| std::mem::take(&mut state.active_thread));

        if let Some(post_id) = previous.post_id() {
            debug!(%post_id, "Thread collapsed");
        }
    }

    /// Opens an empty draft on a loaded thread. Already composing is a no-op.
    pub fn start_compose(&self) -> Result<(), UsageError> {
        self.state.modify(|state| -> Result<(), UsageError> {
            match std::mem::take(&mut state.active_thread) {
                ThreadState::Loaded { post_id, comments } => {
                    state.active_thread = ThreadState::Composing {
                        post_id,
                        comments,
                        draft: String::new(),
                        submitting: false,
                    };
                    Ok(())
                }
                composing @ ThreadState::Composing { .. } => {
                    state.active_thread = composing;
                    Ok(())
                }
                other => {
                    let phase = other.phase();
                    state.active_thread = other;
                    Err(InvalidState::WrongPhase {
                        operation: "start composing",
                        phase,
                    }
                    .into())
                }
            }
        })
    }

    pub fn update_draft(&self, text: impl Into<String>) -> Result<(), UsageError> {
        let text = text.into();

        self.state.modify(|state| -> Result<(), UsageError> {
            match &mut state.active_thread {
                ThreadState::Composing {
                    submitting: true, ..
                } => Err(InvalidState::SubmitInFlight.into()),
                ThreadState::Composing { draft, .. } => {
                    *draft = text;
                    Ok(())
                }
                other => Err(InvalidState::WrongPhase {
                    operation: "edit the draft",
                    phase: other.phase(),
                }
                .into()),
            }
        })
    }

    /// Posts the draft, then reloads the thread from the server.
    ///
    /// The new comment only shows up through that reload. On failure the
    /// thread keeps composing with the draft intact.
    pub async fn submit(&self) -> Result<(), SyncError> {
        let owner = self
            .session
            .user()
            .map(|user| user.id.clone())
            .ok_or(InvalidState::SelfUnresolved)?;

        let request = self.state.modify(|state| -> Result<CreateComment, UsageError> {
            match &mut state.active_thread {
                ThreadState::Composing {
                    submitting: true, ..
                } => Err(InvalidState::SubmitInFlight.into()),
                ThreadState::Composing {
                    post_id,
                    draft,
                    submitting,
                    ..
                } => {
                    let message = CommentMessage::new(draft).map_err(InvalidState::Draft)?;
                    *submitting = true;
                    Ok(CreateComment {
                        message,
                        owner,
                        post: post_id.clone(),
                    })
                }
                other => Err(InvalidState::WrongPhase {
                    operation: "submit",
                    phase: other.phase(),
                }
                .into()),
            }
        })?;

        let post_id = request.post.clone();
        debug!(%post_id, "Submitting comment");

        if let Err(err) = self.api.create_comment(&request).await {
            self.state.modify(|state| {
                if let ThreadState::Composing {
                    post_id: current,
                    submitting,
                    ..
                } = &mut state.active_thread
                    && *current == post_id
                {
                    *submitting = false;
                }
                state.report(StatusMessage::error(format!("Could not post comment: {err}")));
            });

            warn!(%post_id, error = %err, "Submitting comment failed");
            return Err(err.into());
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let refresh = self.state.modify(|state| {
            let still_composing = matches!(
                &state.active_thread,
                ThreadState::Composing {
                    post_id: current,
                    submitting: true,
                    ..
                } if *current == post_id
            );
            if still_composing {
                state.active_thread = ThreadState::Loading {
                    post_id: post_id.clone(),
                    ticket,
                };
                state.report(StatusMessage::info("Comment posted"));
            }
            still_composing
        });

        if !refresh {
            debug!(%post_id, "Thread changed during submit, skipping refresh");
            return Ok(());
        }

        self.fetch(post_id, ticket).await
    }
}
