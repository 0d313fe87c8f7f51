use crate::{
    config::Settings,
    server::{
        Result, ServerError, ServerRouter,
        extract::{PageQuery, Query},
        render::Json,
    },
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use yatube_common::{
    model::{group::Group, post::Post},
    pagination::Page,
};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
pub struct GroupPath {
    pub slug: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct GroupPage {
    pub group: Group,
    pub posts: Page<Post>,
}

async fn group_posts(
    GroupPath { slug }: GroupPath,
    Query(PageQuery { page }): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
) -> Result<Json<GroupPage>> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;
    let posts = db
        .fetch_posts_page(PostFilter::Group(group.id), settings.paginator, page.as_deref())
        .await?;

    Ok(Json(GroupPage { group, posts }))
}
