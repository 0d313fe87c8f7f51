use crate::{
    model::{
        Id, PREVIEW_LEN,
        group::{Group, GroupMarker},
        user::{User, UserMarker},
    },
    util::{serialize_timestamp, truncate_chars},
};
use serde::Serialize;
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub pub_date: UtcDateTime,
    pub author: User,
    pub group: Option<Group>,
    /// Path of the attached image, relative to the media root.
    pub image: Option<String>,
}

impl Post {
    #[must_use]
    pub fn preview(&self) -> &str {
        truncate_chars(&self.text, PREVIEW_LEN)
    }

    #[must_use]
    pub fn is_authored_by(&self, user: Id<UserMarker>) -> bool {
        self.author.id == user
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub text: String,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}

/// The author-editable part of a post.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct EditPost {
    pub text: String,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}
