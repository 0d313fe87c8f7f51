use crate::model::{Id, user::UserMarker};
use thiserror::Error;

/// A directed subscription of `user` to the posts of `author`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Follow {
    user: Id<UserMarker>,
    author: Id<UserMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("User {0} cannot follow themselves")]
pub struct SelfFollowError(Id<UserMarker>);

impl Follow {
    pub fn new(user: Id<UserMarker>, author: Id<UserMarker>) -> Result<Self, SelfFollowError> {
        if user == author {
            return Err(SelfFollowError(user));
        }

        Ok(Self { user, author })
    }

    #[must_use]
    pub fn user(self) -> Id<UserMarker> {
        self.user
    }

    #[must_use]
    pub fn author(self) -> Id<UserMarker> {
        self.author
    }
}
