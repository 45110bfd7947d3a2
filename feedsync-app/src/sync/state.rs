use crate::sync::{feed::LikeLedger, thread::ThreadState};
use feedsync_common::model::{
    Id,
    post::{Post, PostMarker},
    user::User,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Severity {
    Info,
    Error,
}

/// Short-lived, non-fatal notice for the rendering layer.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct StatusMessage {
    pub severity: Severity,
    pub text: String,
}

impl StatusMessage {
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            text: text.into(),
        }
    }
}

/// Everything the rendering layer needs to draw a frame.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct SyncState {
    pub posts: Vec<Post>,
    pub active_thread: ThreadState,
    pub session_self: Option<User>,
    pub transient_message: Option<StatusMessage>,
    /// Bumped whenever `posts` is replaced by a reload.
    pub(crate) feed_generation: u64,
    /// Likes of this generation whose persistence has not settled yet.
    pub(crate) like_ledgers: HashMap<Id<PostMarker>, LikeLedger>,
}

impl SyncState {
    #[must_use]
    pub fn post(&self, post_id: &Id<PostMarker>) -> Option<&Post> {
        self.posts.iter().find(|post| &post.id == post_id)
    }

    pub(crate) fn post_mut(&mut self, post_id: &Id<PostMarker>) -> Option<&mut Post> {
        self.posts.iter_mut().find(|post| &post.id == post_id)
    }

    pub(crate) fn report(&mut self, message: StatusMessage) {
        self.transient_message = Some(message);
    }
}

/// Observable cell holding the [`SyncState`].
///
/// All writers go through [`SharedState::modify`], which runs one mutation at
/// a time and wakes every subscriber afterwards.
#[derive(Clone, Debug)]
pub struct SharedState(Arc<watch::Sender<SyncState>>);

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SyncState::default());
        Self(Arc::new(sender))
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.0.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SyncState {
        self.0.borrow().clone()
    }

    pub(crate) fn modify<R>(&self, mutation: impl FnOnce(&mut SyncState) -> R) -> R {
        let mut output = None;
        self.0.send_modify(|state| output = Some(mutation(state)));

        output.expect("send_modify runs the mutation exactly once")
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
