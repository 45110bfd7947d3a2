//! In-memory stand-in for the remote API, plus fixtures.

use async_trait::async_trait;
use feedsync_client::{ApiError, RemoteApi, StatusCode};
use feedsync_common::model::{
    Id,
    comment::{Comment, CreateComment},
    post::{Post, PostMarker},
    user::User,
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::macros::datetime;
use tokio::sync::oneshot;
use url::Url;

#[derive(Clone, Eq, PartialEq, Debug)]
pub(crate) enum Call {
    ListPosts,
    UpdatePost(Post),
    ListComments(Id<PostMarker>),
    CreateComment(CreateComment),
    ListUsers,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub(crate) enum Op {
    ListPosts,
    UpdatePost,
    ListComments,
    CreateComment,
    ListUsers,
}

impl Call {
    fn op(&self) -> Op {
        match self {
            Call::ListPosts => Op::ListPosts,
            Call::UpdatePost(_) => Op::UpdatePost,
            Call::ListComments(_) => Op::ListComments,
            Call::CreateComment(_) => Op::CreateComment,
            Call::ListUsers => Op::ListUsers,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeApi {
    posts: Mutex<Vec<Post>>,
    comments: Mutex<HashMap<Id<PostMarker>, Vec<Comment>>>,
    users: Mutex<Vec<User>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<Op>>,
    rejected_likes: Mutex<HashSet<u32>>,
    held: Mutex<HashMap<Op, VecDeque<oneshot::Receiver<()>>>>,
    held_comments: Mutex<HashMap<Id<PostMarker>, VecDeque<oneshot::Receiver<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable() -> ApiError {
    ApiError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "unavailable".to_owned(),
    }
}

impl FakeApi {
    pub(crate) fn set_posts(&self, posts: Vec<Post>) {
        *lock(&self.posts) = posts;
    }

    pub(crate) fn set_comments(&self, post_id: &str, comments: Vec<Comment>) {
        lock(&self.comments).insert(Id::new(post_id), comments);
    }

    pub(crate) fn set_users(&self, users: Vec<User>) {
        *lock(&self.users) = users;
    }

    pub(crate) fn fail(&self, op: Op) {
        lock(&self.failing).insert(op);
    }

    pub(crate) fn recover(&self, op: Op) {
        lock(&self.failing).remove(&op);
    }

    /// Fails only the post updates that carry exactly `likes`.
    pub(crate) fn reject_likes(&self, likes: u32) {
        lock(&self.rejected_likes).insert(likes);
    }

    /// Makes the next not yet held call of `op` wait until the sender fires.
    pub(crate) fn hold(&self, op: Op) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        lock(&self.held).entry(op).or_default().push_back(receiver);
        sender
    }

    /// Like [`FakeApi::hold`], for the comment fetches of one post.
    pub(crate) fn hold_comments(&self, post_id: &str) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        lock(&self.held_comments)
            .entry(Id::new(post_id))
            .or_default()
            .push_back(receiver);
        sender
    }

    pub(crate) fn stored_likes(&self, post_id: &str) -> Option<u32> {
        lock(&self.posts)
            .iter()
            .find(|post| post.id.as_str() == post_id)
            .map(|post| post.likes)
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub(crate) fn count(&self, op: Op) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    /// Logs the call, then waits on its gate if one is queued.
    async fn record(&self, call: Call) {
        let op = call.op();
        let gate = match &call {
            Call::ListComments(post_id) => lock(&self.held_comments)
                .get_mut(post_id)
                .and_then(VecDeque::pop_front),
            _ => lock(&self.held).get_mut(&op).and_then(VecDeque::pop_front),
        };
        lock(&self.calls).push(call);

        if let Some(release) = gate {
            let _ = release.await;
        }
    }

    fn check(&self, op: Op) -> Result<(), ApiError> {
        if lock(&self.failing).contains(&op) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn list_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.record(Call::ListPosts).await;
        self.check(Op::ListPosts)?;
        Ok(lock(&self.posts).clone())
    }

    async fn update_post(&self, post: &Post) -> Result<(), ApiError> {
        self.record(Call::UpdatePost(post.clone())).await;
        self.check(Op::UpdatePost)?;
        if lock(&self.rejected_likes).contains(&post.likes) {
            return Err(unavailable());
        }
        if let Some(stored) = lock(&self.posts).iter_mut().find(|stored| stored.id == post.id) {
            *stored = post.clone();
        }
        Ok(())
    }

    async fn list_comments(&self, post_id: &Id<PostMarker>) -> Result<Vec<Comment>, ApiError> {
        self.record(Call::ListComments(post_id.clone())).await;
        self.check(Op::ListComments)?;
        Ok(lock(&self.comments)
            .get(post_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_comment(&self, comment: &CreateComment) -> Result<(), ApiError> {
        self.record(Call::CreateComment(comment.clone())).await;
        self.check(Op::CreateComment)?;
        let owner = lock(&self.users)
            .iter()
            .find(|user| user.id == comment.owner)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: StatusCode::BAD_REQUEST,
                body: "owner not found".to_owned(),
            })?;

        let mut comments = lock(&self.comments);
        let thread = comments.entry(comment.post.clone()).or_default();
        let id = format!("created-{}", thread.len() + 1);
        thread.push(Comment {
            id: Id::new(id),
            message: comment.message.get().to_owned(),
            owner,
            post_id: comment.post.clone(),
            publish_date: None,
        });
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.record(Call::ListUsers).await;
        self.check(Op::ListUsers)?;
        Ok(lock(&self.users).clone())
    }
}

/// Yields to spawned tasks until `done` holds.
pub(crate) async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was not reached");
}

pub(crate) fn user(id: &str) -> User {
    User {
        id: Id::new(id),
        title: None,
        first_name: "Sara".to_owned(),
        last_name: format!("Andersen-{id}"),
        picture: Url::parse("https://randomuser.me/api/portraits/women/58.jpg").unwrap(),
    }
}

pub(crate) fn post(id: &str, likes: u32) -> Post {
    Post {
        id: Id::new(id),
        text: format!("Post {id}"),
        image: Url::parse("https://img.dummyapi.io/photo-1564694202779-bc908c327862.jpg")
            .unwrap(),
        likes,
        tags: vec!["dog".to_owned()],
        link: None,
        publish_date: datetime!(2020-05-24 14:53:17 UTC),
        owner: user("owner"),
    }
}

pub(crate) fn comment(id: &str, message: &str, post_id: &str) -> Comment {
    Comment {
        id: Id::new(id),
        message: message.to_owned(),
        owner: user("commenter"),
        post_id: Id::new(post_id),
        publish_date: None,
    }
}
