use crate::model::Id;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const GROUP_SLUG_MAX_LEN: usize = 50;
pub const GROUP_TITLE_MAX_LEN: usize = 200;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GroupMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Group {
    pub id: Id<GroupMarker>,
    pub title: String,
    pub slug: GroupSlug,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateGroup {
    pub title: String,
    pub slug: GroupSlug,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group title is longer than {GROUP_TITLE_MAX_LEN} characters")]
pub struct GroupTitleTooLongError;

impl CreateGroup {
    pub fn new(
        title: String,
        slug: GroupSlug,
        description: String,
    ) -> Result<Self, GroupTitleTooLongError> {
        if title.chars().count() > GROUP_TITLE_MAX_LEN {
            return Err(GroupTitleTooLongError);
        }

        Ok(Self {
            title,
            slug,
            description,
        })
    }
}

/// The unique address part of a group: ASCII letters, digits, `-` and `_`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupSlug(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group slug is invalid: {0}")]
pub struct InvalidGroupSlugError(String);

impl GroupSlug {
    pub fn new(slug: String) -> Result<Self, InvalidGroupSlugError> {
        let valid_chars = slug
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if !slug.is_empty() && valid_chars && slug.len() <= GROUP_SLUG_MAX_LEN {
            Ok(Self(slug))
        } else {
            Err(InvalidGroupSlugError(slug))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for GroupSlug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::group::{
        CreateGroup, GROUP_SLUG_MAX_LEN, GROUP_TITLE_MAX_LEN, GroupSlug,
    };

    #[test]
    fn slug_validation() {
        for valid in ["cats", "test-slug-page", "under_score", "x"] {
            assert!(GroupSlug::new(valid.to_owned()).is_ok(), "{valid}");
        }

        let too_long = "s".repeat(GROUP_SLUG_MAX_LEN + 1);
        for invalid in ["", "with space", "кошки", "dot.ted", too_long.as_str()] {
            assert!(GroupSlug::new(invalid.to_owned()).is_err(), "{invalid}");
        }
    }

    #[test]
    fn title_length_is_limited() {
        let slug = GroupSlug::new("slug".to_owned()).unwrap();

        assert!(CreateGroup::new("t".repeat(GROUP_TITLE_MAX_LEN), slug.clone(), String::new()).is_ok());
        assert!(CreateGroup::new("t".repeat(GROUP_TITLE_MAX_LEN + 1), slug, String::new()).is_err());
    }
}
