use crate::{
    config::Settings,
    server::{
        Result, ServerError, ServerRouter,
        auth::{AuthenticatedUser, Viewer},
        extract::{PageQuery, Query},
        redirect::Found,
        render::Json,
    },
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use yatube_common::{
    model::{follow::Follow, post::Post, user::User},
    pagination::Page,
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(profile)
}

pub fn login_required_routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(follow_index)
        .typed_get(profile_follow)
        .typed_get(profile_unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
pub struct ProfilePath {
    pub username: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
pub struct ProfileFollowPath {
    pub username: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
pub struct ProfileUnfollowPath {
    pub username: String,
}

#[derive(TypedPath)]
#[typed_path("/follow/")]
pub struct FollowIndexPath;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct ProfilePage {
    pub author: User,
    pub display_name: String,
    pub post_count: u64,
    pub follower_count: u64,
    /// Whether the viewer follows the author. Always false for anonymous viewers.
    pub following: bool,
    pub posts: Page<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct FollowIndexPage {
    pub posts: Page<Post>,
}

async fn author_by_username(db: &DbClient, username: String) -> Result<User> {
    db.fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    Query(PageQuery { page }): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    viewer: Viewer,
) -> Result<Json<ProfilePage>> {
    let author = author_by_username(&db, username).await?;
    let posts = db
        .fetch_posts_page(PostFilter::Author(author.id), settings.paginator, page.as_deref())
        .await?;
    let follower_count = db.count_followers(author.id).await?;
    let following = match viewer.id() {
        Some(viewer) => db.is_following(viewer, author.id).await?,
        None => false,
    };

    Ok(Json(ProfilePage {
        display_name: author.display_name(),
        author,
        post_count: posts.count,
        follower_count,
        following,
        posts,
    }))
}

async fn follow_index(
    FollowIndexPath: FollowIndexPath,
    Query(PageQuery { page }): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    user: AuthenticatedUser,
) -> Result<Json<FollowIndexPage>> {
    let posts = db
        .fetch_posts_page(PostFilter::FollowedBy(user.id()), settings.paginator, page.as_deref())
        .await?;

    Ok(Json(FollowIndexPage { posts }))
}

async fn profile_follow(
    ProfileFollowPath { username }: ProfileFollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Found> {
    let author = author_by_username(&db, username).await?;

    // Following yourself is quietly skipped.
    if let Ok(follow) = Follow::new(user.id(), author.id)
        && db.follow(follow).await?
    {
        info!(user_id = %user.id(), author_id = %author.id, "Started following");
    }

    Ok(Found::to(FollowIndexPath))
}

async fn profile_unfollow(
    ProfileUnfollowPath { username }: ProfileUnfollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Found> {
    let author = author_by_username(&db, username).await?;

    if !db.unfollow(user.id(), author.id).await? {
        return Err(ServerError::FollowNotFound(author.username.into_inner()));
    }
    info!(user_id = %user.id(), author_id = %author.id, "Stopped following");

    Ok(Found::to(FollowIndexPath))
}
