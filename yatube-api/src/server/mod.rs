use crate::config::Settings;
use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use cache::PageCache;
use render::Json;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;
use yatube_common::model::{Id, ModelValidationError, auth::CredentialError, post::PostMarker};
use yatube_db::client::{DbClient, DbError};

mod auth;
mod cache;
mod extract;
mod forms;
mod media;
mod redirect;
mod render;
mod routes;
#[cfg(test)]
mod tests;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub settings: Arc<Settings>,
    pub page_cache: Arc<PageCache>,
}

impl ServerState {
    #[must_use]
    pub fn new(db_client: DbClient, settings: Settings) -> Self {
        let page_cache = PageCache::new(settings.index_cache_ttl);

        Self {
            db_client: Arc::new(db_client),
            settings: Arc::new(settings),
            page_cache: Arc::new(page_cache),
        }
    }
}

/// The complete application: every route, uploaded media, the 404 fallback and request tracing.
pub fn app(state: ServerState) -> Router {
    let media = ServeDir::new(&state.settings.media_root);

    routes::routes(&state)
        .nest_service(media::MEDIA_URL, media)
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Form rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("Multipart form rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart form could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Response body could not be buffered: {0}")]
    ResponseBody(axum::Error),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Model(#[from] ModelValidationError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Storing uploaded media failed: {0}")]
    Media(#[from] std::io::Error),
    #[error("The login guard did not run for this route")]
    MissingLoginGuard,
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User with username {0} was not found.")]
    UserByUsernameNotFound(String),
    #[error("Group with slug {0} was not found.")]
    GroupBySlugNotFound(String),
    #[error("No follow of {0} to remove.")]
    FollowNotFound(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByUsernameNotFound(_)
            | ServerError::GroupBySlugNotFound(_)
            | ServerError::FollowNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::QueryRejection(_)
            | ServerError::FormRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::ResponseBody(_)
            | ServerError::Credential(_)
            | ServerError::Model(_)
            | ServerError::Database(_)
            | ServerError::Media(_)
            | ServerError::MissingLoginGuard => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let path = match &self {
            ServerError::UnknownRoute(uri) => Some(uri.path().to_owned()),
            _ => None,
        };
        let error_response = ErrorResponse {
            status: status.as_u16(),
            path,
        };
        (status, Json(error_response)).into_response()
    }
}
