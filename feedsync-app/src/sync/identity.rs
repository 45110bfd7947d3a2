use crate::sync::{
    SyncError,
    state::{SharedState, StatusMessage},
};
use feedsync_client::RemoteApi;
use feedsync_common::model::user::User;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Process-scoped holder of the acting user. Set at most once.
#[derive(Debug, Default)]
pub struct Session {
    self_user: OnceCell<User>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn resolved(user: User) -> Self {
        Self {
            self_user: OnceCell::from(user),
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.self_user.get()
    }
}

pub struct IdentityProvider {
    api: Arc<dyn RemoteApi>,
    session: Arc<Session>,
    state: SharedState,
}

impl IdentityProvider {
    #[must_use]
    pub fn new(api: Arc<dyn RemoteApi>, session: Arc<Session>, state: SharedState) -> Self {
        Self {
            api,
            session,
            state,
        }
    }

    /// Picks the acting user on first call and returns the cached one after.
    ///
    /// Concurrent first calls share a single request.
    pub async fn resolve_self(&self) -> Result<User, SyncError> {
        let resolved = self
            .session
            .self_user
            .get_or_try_init(|| self.api.pick_random_user())
            .await;

        match resolved {
            Ok(user) => {
                let user = user.clone();
                self.state
                    .modify(|state| state.session_self = Some(user.clone()));
                info!(user_id = %user.id, name = %user.display_name(), "Acting as user");
                Ok(user)
            }
            Err(err) => {
                self.state.modify(|state| {
                    state.report(StatusMessage::error(format!(
                        "Could not pick a user to comment as: {err}"
                    )));
                });
                warn!(error = %err, "Resolving self failed");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sync::{
        SyncError,
        fake::{FakeApi, Op, user},
        identity::{IdentityProvider, Session},
        state::SharedState,
    };
    use feedsync_client::ApiError;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolves_once_per_session() {
        let api = Arc::new(FakeApi::default());
        api.set_users(vec![user("me")]);
        let session = Arc::new(Session::new());
        let state = SharedState::new();
        let identity = IdentityProvider::new(api.clone(), session.clone(), state.clone());

        let first = identity.resolve_self().await.unwrap();
        api.set_users(vec![user("someone-else")]);
        let second = identity.resolve_self().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.id.as_str(), "me");
        assert_eq!(api.count(Op::ListUsers), 1);
        assert_eq!(session.user(), Some(&first));
        assert_eq!(state.snapshot().session_self, Some(first));
    }

    #[tokio::test]
    async fn empty_user_set_leaves_self_unset() {
        let api = Arc::new(FakeApi::default());
        let session = Arc::new(Session::new());
        let state = SharedState::new();
        let identity = IdentityProvider::new(api.clone(), session.clone(), state.clone());

        let err = identity.resolve_self().await.unwrap_err();

        assert!(matches!(err, SyncError::Remote(ApiError::EmptyUserSet)));
        assert_eq!(session.user(), None);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.session_self, None);
        assert!(snapshot.transient_message.is_some());

        api.set_users(vec![user("me")]);
        assert_eq!(identity.resolve_self().await.unwrap().id.as_str(), "me");
    }

    #[tokio::test]
    async fn network_failure_is_reported() {
        let api = Arc::new(FakeApi::default());
        api.set_users(vec![user("me")]);
        api.fail(Op::ListUsers);
        let state = SharedState::new();
        let identity = IdentityProvider::new(api.clone(), Arc::new(Session::new()), state.clone());

        assert!(matches!(
            identity.resolve_self().await,
            Err(SyncError::Remote(ApiError::Status { .. }))
        ));
        assert!(state.snapshot().transient_message.is_some());
    }
}
