use crate::sync::{
    SyncError, UsageError,
    state::{SharedState, StatusMessage},
    thread::ThreadState,
};
use feedsync_client::RemoteApi;
use feedsync_common::model::{
    Id,
    post::{Post, PostMarker},
};
use std::{
    collections::{BTreeSet, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, info, warn};

const RETRIEVING_POSTS: &str = "Retrieving posts";

pub struct FeedStore {
    api: Arc<dyn RemoteApi>,
    state: SharedState,
    /// Ticket of the most recently issued load.
    issued_load: AtomicU64,
    /// Ticket of the newest load whose posts were applied.
    applied_load: AtomicU64,
}

impl FeedStore {
    #[must_use]
    pub fn new(api: Arc<dyn RemoteApi>, state: SharedState) -> Self {
        Self {
            api,
            state,
            issued_load: AtomicU64::new(0),
            applied_load: AtomicU64::new(0),
        }
    }

    fn is_latest_load(&self, ticket: u64) -> bool {
        self.issued_load.load(Ordering::Relaxed) == ticket
    }

    /// Replaces the whole feed with the server's current list.
    ///
    /// On failure the previous posts stay untouched. A response older than
    /// one already applied is dropped.
    pub async fn load(&self) -> Result<usize, SyncError> {
        let ticket = self.issued_load.fetch_add(1, Ordering::Relaxed) + 1;
        self.state
            .modify(|state| state.report(StatusMessage::info(RETRIEVING_POSTS)));

        let mut posts = match self.api.list_posts().await {
            Ok(posts) => posts,
            Err(err) => {
                let reported = self.state.modify(|state| {
                    let latest = self.is_latest_load(ticket);
                    if latest {
                        state.report(StatusMessage::error(format!("Could not load posts: {err}")));
                    }
                    latest
                });
                if reported {
                    warn!(error = %err, "Loading posts failed");
                } else {
                    debug!(ticket, error = %err, "Ignoring failure of superseded feed load");
                }
                return Err(err.into());
            }
        };

        let received = posts.len();
        let mut seen = HashSet::new();
        posts.retain(|post| seen.insert(post.id.clone()));
        if posts.len() < received {
            warn!(
                duplicates = received - posts.len(),
                "Dropped posts with repeated ids"
            );
        }

        let count = posts.len();
        let applied = self.state.modify(|state| {
            if self.applied_load.fetch_max(ticket, Ordering::Relaxed) > ticket {
                return None;
            }

            state.posts = posts;
            state.feed_generation += 1;
            state.like_ledgers.clear();
            if self.is_latest_load(ticket)
                && state.transient_message == Some(StatusMessage::info(RETRIEVING_POSTS))
            {
                state.transient_message = None;
            }

            let orphaned = state
                .active_thread
                .post_id()
                .is_some_and(|post_id| state.post(post_id).is_none());
            if orphaned {
                state.active_thread = ThreadState::Collapsed;
            }
            Some(orphaned)
        });

        match applied {
            None => debug!(ticket, "Discarding posts of superseded feed load"),
            Some(orphaned_thread) => {
                if orphaned_thread {
                    debug!("Open thread's post disappeared, collapsed it");
                }
                info!(count, "Feed loaded");
            }
        }
        Ok(count)
    }

    /// Counts a like locally right away.
    ///
    /// The returned [`PendingLike`] sends the new state to the server. Likes
    /// on the same post apply in call order even while earlier ones are still
    /// being persisted.
    pub fn like(&self, post_id: &Id<PostMarker>) -> Result<PendingLike, UsageError> {
        let (post, generation) = self.state.modify(|state| -> Result<_, UsageError> {
            let generation = state.feed_generation;
            let post = state
                .post_mut(post_id)
                .ok_or_else(|| UsageError::PostNotFound(post_id.clone()))?;
            let baseline = post.likes;
            post.likes = post.likes.saturating_add(1);
            let post = post.clone();

            state
                .like_ledgers
                .entry(post_id.clone())
                .or_insert_with(|| LikeLedger::new(baseline))
                .in_flight
                .insert(post.likes);

            Ok((post, generation))
        })?;

        debug!(%post_id, likes = post.likes, "Liked post locally");

        Ok(PendingLike {
            api: Arc::clone(&self.api),
            state: self.state.clone(),
            post,
            generation,
        })
    }
}

/// Persistence bookkeeping for the unsettled likes on one post.
///
/// Every update carries the full post, so a later like's count includes all
/// earlier ones on the same post.
#[derive(Clone, Eq, PartialEq, Debug)]
pub(crate) struct LikeLedger {
    /// Count before the first unsettled like.
    baseline: u32,
    /// Highest count the server accepted.
    confirmed: Option<u32>,
    /// Counts sent and not answered yet.
    in_flight: BTreeSet<u32>,
}

impl LikeLedger {
    fn new(baseline: u32) -> Self {
        Self {
            baseline,
            confirmed: None,
            in_flight: BTreeSet::new(),
        }
    }

    /// Whether an accepted or pending later update already carries `likes`.
    fn covers(&self, likes: u32) -> bool {
        self.confirmed.is_some_and(|confirmed| confirmed >= likes)
            || self.in_flight.last().is_some_and(|&pending| pending > likes)
    }

    /// The count the server holds once the pending updates land.
    fn settled(&self) -> u32 {
        let confirmed = self.confirmed.unwrap_or(self.baseline);
        let pending = self.in_flight.last().copied().unwrap_or(self.baseline);
        self.baseline.max(confirmed).max(pending)
    }
}

/// A like already counted locally but not yet confirmed by the server.
#[must_use = "the like only reaches the server once `persist` is awaited"]
pub struct PendingLike {
    api: Arc<dyn RemoteApi>,
    state: SharedState,
    post: Post,
    generation: u64,
}

impl PendingLike {
    #[must_use]
    pub fn post(&self) -> &Post {
        &self.post
    }

    /// Sends the post with its incremented count.
    ///
    /// If the server rejects it and no later like on the post carries the
    /// increment, the local count falls back to what the server will hold
    /// and an error status is shown. A feed reload in between makes the
    /// server's count authoritative, so nothing is taken back then.
    pub async fn persist(self) -> Result<(), SyncError> {
        let Self {
            api,
            state,
            post,
            generation,
        } = self;

        let result = api.update_post(&post).await;

        let reconciled = state.modify(|state| -> Option<u32> {
            if let Err(err) = &result {
                state.report(StatusMessage::error(format!("Could not like post: {err}")));
            }
            if state.feed_generation != generation {
                return None;
            }

            let ledger = state.like_ledgers.get_mut(&post.id)?;
            ledger.in_flight.remove(&post.likes);
            let target = match &result {
                Ok(()) => {
                    let confirmed = ledger.confirmed.map_or(post.likes, |c| c.max(post.likes));
                    ledger.confirmed = Some(confirmed);
                    None
                }
                Err(_) => (!ledger.covers(post.likes)).then(|| ledger.settled()),
            };
            if ledger.in_flight.is_empty() {
                state.like_ledgers.remove(&post.id);
            }

            let target = target?;
            state.post_mut(&post.id)?.likes = target;
            Some(target)
        });

        match result {
            Ok(()) => {
                debug!(post_id = %post.id, likes = post.likes, "Like persisted");
                Ok(())
            }
            Err(err) => {
                warn!(
                    post_id = %post.id,
                    likes = post.likes,
                    reconciled,
                    error = %err,
                    "Persisting like failed"
                );
                Err(err.into())
            }
        }
    }
}
