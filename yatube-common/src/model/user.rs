use crate::model::{Id, auth::HashedPassword};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const USERNAME_MAX_LEN: usize = 150;
pub const NAME_MAX_LEN: usize = 150;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    /// The full name if one is set, the username otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full_name = format!("{} {}", self.first_name, self.last_name);
        let full_name = full_name.trim();
        if full_name.is_empty() {
            self.username.to_string()
        } else {
            full_name.to_owned()
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateUser {
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub password: HashedPassword,
}

impl CreateUser {
    pub fn new(
        username: Username,
        first_name: String,
        last_name: String,
        email: Option<String>,
        password: HashedPassword,
    ) -> Result<Self, NameTooLongError> {
        for name in [&first_name, &last_name] {
            if name.chars().count() > NAME_MAX_LEN {
                return Err(NameTooLongError(name.clone()));
            }
        }

        Ok(Self {
            username,
            first_name,
            last_name,
            email,
            password,
        })
    }
}

/// A login name: letters, digits and `@ . + - _`, at most [`USERNAME_MAX_LEN`] characters.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0}")]
pub struct InvalidUsernameError(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The name is longer than {NAME_MAX_LEN} characters: {0}")]
pub struct NameTooLongError(String);

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let valid_chars = username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));

        if !username.is_empty() && valid_chars && username.chars().count() <= USERNAME_MAX_LEN {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
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

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}
