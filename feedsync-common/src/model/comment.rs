use crate::model::{
    Id,
    post::PostMarker,
    user::{User, UserMarker},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

pub const COMMENT_MESSAGE_MAX_LEN: usize = 500;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub message: String,
    pub owner: User,
    #[serde(rename = "post")]
    pub post_id: Id<PostMarker>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub publish_date: Option<OffsetDateTime>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct CreateComment {
    pub message: CommentMessage,
    pub owner: Id<UserMarker>,
    pub post: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentMessage(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidCommentMessageError {
    #[error("The comment is empty")]
    Blank,
    #[error("The comment is longer than {} characters", COMMENT_MESSAGE_MAX_LEN)]
    TooLong(String),
}

impl CommentMessage {
    /// Validates a draft. Surrounding whitespace is trimmed.
    pub fn new(message: &str) -> Result<Self, InvalidCommentMessageError> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            Err(InvalidCommentMessageError::Blank)
        } else if trimmed.chars().count() > COMMENT_MESSAGE_MAX_LEN {
            Err(InvalidCommentMessageError::TooLong(trimmed.to_owned()))
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for CommentMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        CommentMessage::new(&inner)
            .map_err(|_| Error::invalid_value(Unexpected::Str(&inner), &"CommentMessage"))
    }
}
