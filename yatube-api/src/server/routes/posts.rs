use crate::{
    config::Settings,
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        cache::PageCache,
        extract::{PageQuery, Query},
        forms::{CommentFormView, CommentSubmission, FieldErrors, PostFormView, PostSubmission},
        media::store_post_image,
        redirect::Found,
        render::{Json, Submitted},
        routes::profiles::ProfilePath,
    },
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use yatube_common::{
    model::{
        Id,
        comment::{Comment, CreateComment},
        group::Group,
        post::{CreatePost, EditPost, Post, PostMarker},
    },
    pagination::Page,
};
use yatube_db::client::{DbClient, PostFilter};

pub fn cached_routes() -> ServerRouter {
    ServerRouter::new().typed_get(index)
}

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(post_detail)
}

pub fn login_required_routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(post_create_form)
        .typed_post(post_create)
        .typed_get(post_edit_form)
        .typed_post(post_edit)
        .typed_post(add_comment)
}

#[derive(TypedPath)]
#[typed_path("/")]
pub struct IndexPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/", rejection(ServerError))]
pub struct PostDetailPath {
    pub id: Id<PostMarker>,
}

#[derive(TypedPath)]
#[typed_path("/create/")]
pub struct PostCreatePath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit/", rejection(ServerError))]
pub struct PostEditPath {
    pub id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comment/", rejection(ServerError))]
pub struct AddCommentPath {
    pub id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct IndexPage {
    pub posts: Page<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct PostDetailPage {
    pub post: Post,
    pub author_post_count: u64,
    pub comments: Vec<Comment>,
    pub comment_form: CommentFormView,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct PostFormPage {
    pub form: PostFormView,
    pub errors: FieldErrors,
    /// Valid choices for the group field.
    pub groups: Vec<Group>,
    pub is_edit: bool,
}

async fn index(
    IndexPath: IndexPath,
    Query(PageQuery { page }): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
) -> Result<Json<IndexPage>> {
    let posts = db
        .fetch_posts_page(PostFilter::All, settings.paginator, page.as_deref())
        .await?;

    Ok(Json(IndexPage { posts }))
}

async fn post_detail(
    PostDetailPath { id }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostDetailPage>> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    let author_post_count = db.count_posts(PostFilter::Author(post.author.id)).await?;
    let comments = db.fetch_comments(id).await?;

    Ok(Json(PostDetailPage {
        post,
        author_post_count,
        comments,
        comment_form: CommentFormView::default(),
    }))
}

async fn post_create_form(
    PostCreatePath: PostCreatePath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<PostFormPage>> {
    let groups = db.fetch_groups().await?;

    Ok(Json(PostFormPage {
        form: PostFormView::default(),
        errors: FieldErrors::default(),
        groups,
        is_edit: false,
    }))
}

async fn post_create(
    PostCreatePath: PostCreatePath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    State(page_cache): State<Arc<PageCache>>,
    user: AuthenticatedUser,
    submission: PostSubmission,
) -> Result<Submitted<PostFormPage>> {
    let groups = db.fetch_groups().await?;
    let post = match submission.clean(&groups) {
        Ok(post) => post,
        Err(errors) => {
            return Ok(Submitted::Form(PostFormPage {
                form: submission.view(),
                errors,
                groups,
                is_edit: false,
            }));
        }
    };

    // The file goes first, an orphan is harmless if the insert fails.
    let image = match &post.image {
        Some(image) => Some(store_post_image(&settings.media_root, image).await?),
        None => None,
    };

    let post_id = db
        .create_post(&CreatePost {
            author: user.id(),
            text: post.text,
            group: post.group,
            image,
        })
        .await?;
    page_cache.clear();

    info!(%post_id, author = %user.user().username, "Post published");
    Ok(Submitted::Redirect(Found::to(ProfilePath {
        username: user.user().username.to_string(),
    })))
}

/// Fetches the post to edit, or the redirect a non-author gets instead.
async fn editable_post(
    db: &DbClient,
    id: Id<PostMarker>,
    user: &AuthenticatedUser,
) -> Result<Result<Post, Found>> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    if post.is_authored_by(user.id()) {
        Ok(Ok(post))
    } else {
        debug!(post_id = %id, user_id = %user.id(), "Refusing to edit a foreign post");
        Ok(Err(Found::to(PostDetailPath { id })))
    }
}

async fn post_edit_form(
    PostEditPath { id }: PostEditPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Submitted<PostFormPage>> {
    let post = match editable_post(&db, id, &user).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(Submitted::Redirect(redirect)),
    };
    let groups = db.fetch_groups().await?;

    Ok(Submitted::Form(PostFormPage {
        form: PostFormView::from(&post),
        errors: FieldErrors::default(),
        groups,
        is_edit: true,
    }))
}

async fn post_edit(
    PostEditPath { id }: PostEditPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    State(page_cache): State<Arc<PageCache>>,
    user: AuthenticatedUser,
    submission: PostSubmission,
) -> Result<Submitted<PostFormPage>> {
    let current = match editable_post(&db, id, &user).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(Submitted::Redirect(redirect)),
    };

    let groups = db.fetch_groups().await?;
    let post = match submission.clean(&groups) {
        Ok(post) => post,
        Err(errors) => {
            let form = PostFormView {
                image: current.image,
                ..submission.view()
            };
            return Ok(Submitted::Form(PostFormPage {
                form,
                errors,
                groups,
                is_edit: true,
            }));
        }
    };

    let image = match &post.image {
        Some(image) => Some(store_post_image(&settings.media_root, image).await?),
        None => current.image,
    };

    let edit = EditPost {
        text: post.text,
        group: post.group,
        image,
    };
    if !db.update_post(id, &edit).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }
    page_cache.clear();

    info!(post_id = %id, "Post edited");
    Ok(Submitted::Redirect(Found::to(PostDetailPath { id })))
}

async fn add_comment(
    AddCommentPath { id }: AddCommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    submission: CommentSubmission,
) -> Result<Found> {
    if db.fetch_post(id).await?.is_none() {
        return Err(ServerError::PostByIdNotFound(id));
    }

    match submission.clean() {
        Ok(text) => {
            let comment_id = db
                .create_comment(&CreateComment {
                    post: id,
                    author: user.id(),
                    text,
                })
                .await?;
            debug!(%comment_id, post_id = %id, "Comment added");
        }
        Err(errors) => debug!(?errors, post_id = %id, "Dropping invalid comment"),
    }

    Ok(Found::to(PostDetailPath { id }))
}
