use sqlx::FromRow;
use time::{PrimitiveDateTime, UtcDateTime};
use yatube_common::{
    model::{
        ModelValidationError,
        auth::{HashedPassword, Session},
        comment::Comment,
        group::{Group, GroupSlug},
        post::Post,
        user::{User, Username},
    },
    util::PositiveDuration,
};

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct SessionRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct GroupRecord {
    pub group_id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub text: String,
    pub pub_date: PrimitiveDateTime,
    pub image: Option<String>,
    #[sqlx(flatten)]
    pub author: UserRecord,
    pub group_id: Option<i64>,
    pub group_title: Option<String>,
    pub group_slug: Option<String>,
    pub group_description: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_id: i64,
    pub post_id: i64,
    pub text: String,
    pub created: PrimitiveDateTime,
    #[sqlx(flatten)]
    pub author: UserRecord,
}

/// SQLite has no timezone-aware type, so every timestamp is stored as naive UTC.
pub(crate) fn to_primitive(value: UtcDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(value.date(), value.time())
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.cast_unsigned().into(),
            username: Username::new(value.username)?,
            first_name: value.first_name,
            last_name: value.last_name,
        })
    }
}

impl TryFrom<CredentialsRecord> for (User, HashedPassword) {
    type Error = ModelValidationError;

    fn try_from(value: CredentialsRecord) -> Result<Self, Self::Error> {
        Ok((
            value.user.try_into()?,
            HashedPassword::from_phc(value.password_hash),
        ))
    }
}

impl TryFrom<SessionRecord> for (Session, User) {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        let user = User::try_from(value.user)?;
        let session = Session {
            user: user.id,
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(PositiveDuration::from_seconds)
                .transpose()?,
        };

        Ok((session, user))
    }
}

impl TryFrom<GroupRecord> for Group {
    type Error = ModelValidationError;

    fn try_from(value: GroupRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.group_id.cast_unsigned().into(),
            title: value.title,
            slug: GroupSlug::new(value.slug)?,
            description: value.description,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        let group = match (
            value.group_id,
            value.group_title,
            value.group_slug,
            value.group_description,
        ) {
            (Some(group_id), Some(title), Some(slug), Some(description)) => Some(
                GroupRecord {
                    group_id,
                    title,
                    slug,
                    description,
                }
                .try_into()?,
            ),
            _ => None,
        };

        Ok(Self {
            id: value.post_id.cast_unsigned().into(),
            text: value.text,
            pub_date: value.pub_date.as_utc(),
            author: value.author.try_into()?,
            group,
            image: value.image,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.comment_id.cast_unsigned().into(),
            post: value.post_id.cast_unsigned().into(),
            author: value.author.try_into()?,
            text: value.text,
            created: value.created.as_utc(),
        })
    }
}
