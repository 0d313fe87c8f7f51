use crate::record::{
    CommentRecord, CredentialsRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
    to_primitive,
};
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    migrate::MigrateError,
    query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use thiserror::Error;
use time::UtcDateTime;
use tracing::debug;
use yatube_common::{
    model::{
        Id, ModelValidationError,
        auth::{HashedPassword, Session, SessionTokenHash},
        comment::{Comment, CommentMarker, CreateComment},
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker},
        post::{CreatePost, EditPost, Post, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    pagination::{Page, Paginator},
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A row with the same {0} already exists")]
    UniqueViolation(&'static str),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Which posts a listing shows. Every listing is ordered newest first.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    /// Posts by every author the given user follows.
    FollowedBy(Id<UserMarker>),
}

const POST_SELECT: &str = "
    SELECT
        posts.post_id,
        posts.text,
        posts.pub_date,
        posts.image,
        users.user_id,
        users.username,
        users.first_name,
        users.last_name,
        post_groups.group_id,
        post_groups.title AS group_title,
        post_groups.slug AS group_slug,
        post_groups.description AS group_description
    FROM
        posts
        JOIN users ON users.user_id = posts.author_id
        LEFT JOIN post_groups ON post_groups.group_id = posts.group_id
    ";

const NEWEST_POSTS_FIRST: &str = " ORDER BY posts.pub_date DESC, posts.post_id DESC";

impl PostFilter {
    fn push_condition(self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            PostFilter::All => {
                builder.push(" WHERE TRUE");
            }
            PostFilter::Group(group) => {
                builder
                    .push(" WHERE posts.group_id = ")
                    .push_bind(group.get().cast_signed());
            }
            PostFilter::Author(author) => {
                builder
                    .push(" WHERE posts.author_id = ")
                    .push_bind(author.get().cast_signed());
            }
            PostFilter::FollowedBy(user) => {
                builder
                    .push(
                        " WHERE posts.author_id IN \
                        (SELECT follows.author_id FROM follows WHERE follows.user_id = ",
                    )
                    .push_bind(user.get().cast_signed())
                    .push(")");
            }
        }
    }
}

fn unique_violation(err: sqlx::Error, what: &'static str) -> DbError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::UniqueViolation(what)
        }
        err => err.into(),
    }
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Clone, Debug)]
pub struct DbClient {
    pub(crate) pool: SqlitePool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Ok(Self::new(pool))
    }

    /// A private database that lives as long as the client; every connection
    /// to `:memory:` would otherwise see its own empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<Id<UserMarker>> {
        let result = query(
            "
            INSERT INTO users (username, first_name, last_name, email, password_hash, date_joined)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(user.username.get())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.email.as_deref())
        .bind(user.password.as_phc())
        .bind(to_primitive(UtcDateTime::now()))
        .execute(&self.pool)
        .await
        .map_err(|err| unique_violation(err, "username"))?;

        let user_id = result.last_insert_rowid().cast_unsigned().into();
        debug!(%user_id, username = %user.username, "Created user");
        Ok(user_id)
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_id, username, first_name, last_name
            FROM users
            WHERE user_id = ?
            ",
        )
        .bind(user_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_id, username, first_name, last_name
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(User, HashedPassword)>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT user_id, username, first_name, last_name, password_hash
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(<(User, HashedPassword)>::try_from).transpose()?;
        Ok(credentials)
    }

    /// Also removes everything the user authored, their follows and their sessions.
    pub async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id.get().cast_signed())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_session(&self, session: &Session) -> Result<()> {
        query(
            "
            INSERT INTO sessions (token_hash, user_id, created_at, expires_after_seconds)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(session.token_hash.as_bytes())
        .bind(session.user.get().cast_signed())
        .bind(to_primitive(session.created_at))
        .bind(
            session
                .expires_after
                .map(|lifetime| lifetime.get().whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        debug!(user_id = %session.user, "Created session");
        Ok(())
    }

    pub async fn fetch_session(
        &self,
        token_hash: &SessionTokenHash,
    ) -> Result<Option<(Session, User)>> {
        let record = query_as::<_, SessionRecord>(
            "
            SELECT
                sessions.token_hash,
                sessions.created_at,
                sessions.expires_after_seconds,
                users.user_id,
                users.username,
                users.first_name,
                users.last_name
            FROM
                sessions JOIN users ON users.user_id = sessions.user_id
            WHERE
                sessions.token_hash = ?
            ",
        )
        .bind(token_hash.as_bytes())
        .fetch_optional(&self.pool)
        .await?;

        let session = record.map(<(Session, User)>::try_from).transpose()?;
        Ok(session)
    }

    pub async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<bool> {
        let result = query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash.as_bytes())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_group(&self, group: &CreateGroup) -> Result<Id<GroupMarker>> {
        let result = query(
            "
            INSERT INTO post_groups (title, slug, description)
            VALUES (?, ?, ?)
            ",
        )
        .bind(&group.title)
        .bind(group.slug.get())
        .bind(&group.description)
        .execute(&self.pool)
        .await
        .map_err(|err| unique_violation(err, "slug"))?;

        let group_id = result.last_insert_rowid().cast_unsigned().into();
        debug!(%group_id, slug = %group.slug, "Created group");
        Ok(group_id)
    }

    pub async fn fetch_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM post_groups
            WHERE slug = ?
            ",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM post_groups
            ORDER BY title, group_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }

    /// Posts of the deleted group stay, without a group.
    pub async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool> {
        let result = query("DELETE FROM post_groups WHERE group_id = ?")
            .bind(group_id.get().cast_signed())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        self.create_post_at(post, UtcDateTime::now()).await
    }

    pub async fn create_post_at(
        &self,
        post: &CreatePost,
        pub_date: UtcDateTime,
    ) -> Result<Id<PostMarker>> {
        let result = query(
            "
            INSERT INTO posts (text, pub_date, author_id, group_id, image)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(&post.text)
        .bind(to_primitive(pub_date))
        .bind(post.author.get().cast_signed())
        .bind(post.group.map(|group| group.get().cast_signed()))
        .bind(post.image.as_deref())
        .execute(&self.pool)
        .await?;

        let post_id = result.last_insert_rowid().cast_unsigned().into();
        debug!(%post_id, author_id = %post.author, "Created post");
        Ok(post_id)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut builder = QueryBuilder::<Sqlite>::new(POST_SELECT);
        builder
            .push(" WHERE posts.post_id = ")
            .push_bind(post_id.get().cast_signed());

        let record = builder
            .build_query_as::<PostRecord>()
            .fetch_optional(&self.pool)
            .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts");
        filter.push_condition(&mut builder);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn fetch_posts(
        &self,
        filter: PostFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Post>> {
        let mut builder = QueryBuilder::<Sqlite>::new(POST_SELECT);
        filter.push_condition(&mut builder);
        builder
            .push(NEWEST_POSTS_FIRST)
            .push(" LIMIT ")
            .push_bind(to_sql_count(limit))
            .push(" OFFSET ")
            .push_bind(to_sql_count(offset));

        let records = builder
            .build_query_as::<PostRecord>()
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    /// Fetches the page `requested` names, following the paginator's fallback rules.
    pub async fn fetch_posts_page(
        &self,
        filter: PostFilter,
        paginator: Paginator,
        requested: Option<&str>,
    ) -> Result<Page<Post>> {
        let count = self.count_posts(filter).await?;
        let location = paginator.locate(count, requested);
        let posts = self
            .fetch_posts(filter, location.limit(), location.offset())
            .await?;

        Ok(location.into_page(posts))
    }

    /// Returns whether the post existed.
    pub async fn update_post(&self, post_id: Id<PostMarker>, post: &EditPost) -> Result<bool> {
        let result = query(
            "
            UPDATE posts
            SET text = ?, group_id = ?, image = ?
            WHERE post_id = ?
            ",
        )
        .bind(&post.text)
        .bind(post.group.map(|group| group.get().cast_signed()))
        .bind(post.image.as_deref())
        .bind(post_id.get().cast_signed())
        .execute(&self.pool)
        .await?;

        debug!(%post_id, "Updated post");
        Ok(result.rows_affected() > 0)
    }

    /// Also removes the post's comments.
    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts WHERE post_id = ?")
            .bind(post_id.get().cast_signed())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_comment(&self, comment: &CreateComment) -> Result<Id<CommentMarker>> {
        let result = query(
            "
            INSERT INTO comments (post_id, author_id, text, created)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(comment.post.get().cast_signed())
        .bind(comment.author.get().cast_signed())
        .bind(&comment.text)
        .bind(to_primitive(UtcDateTime::now()))
        .execute(&self.pool)
        .await?;

        let comment_id = result.last_insert_rowid().cast_unsigned().into();
        debug!(%comment_id, post_id = %comment.post, "Created comment");
        Ok(comment_id)
    }

    pub async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_id,
                comments.post_id,
                comments.text,
                comments.created,
                users.user_id,
                users.username,
                users.first_name,
                users.last_name
            FROM
                comments JOIN users ON users.user_id = comments.author_id
            WHERE
                comments.post_id = ?
            ORDER BY
                comments.created DESC, comments.comment_id DESC
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    /// Returns whether a new follow was recorded; following twice is a no-op.
    pub async fn follow(&self, follow: Follow) -> Result<bool> {
        let result = query(
            "
            INSERT INTO follows (user_id, author_id)
            VALUES (?, ?)
            ON CONFLICT (user_id, author_id) DO NOTHING
            ",
        )
        .bind(follow.user().get().cast_signed())
        .bind(follow.author().get().cast_signed())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns whether there was a follow to remove.
    pub async fn unfollow(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user.get().cast_signed())
            .bind(author.get().cast_signed())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, user: Id<UserMarker>, author: Id<UserMarker>) -> Result<bool> {
        let following = query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = ? AND author_id = ?)",
        )
        .bind(user.get().cast_signed())
        .bind(author.get().cast_signed())
        .fetch_one(&self.pool)
        .await?;

        Ok(following)
    }

    pub async fn count_followers(&self, author: Id<UserMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE author_id = ?")
            .bind(author.get().cast_signed())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }
}
