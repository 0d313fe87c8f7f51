use crate::server::{Result, ServerError, redirect::Found, routes::accounts::LoginPath};
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts, uri::PathAndQuery},
    middleware::Next,
    response::{IntoResponse, Response},
};
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;
use yatube_common::model::{
    Id,
    auth::{SessionToken, SessionTokenHash},
    user::{User, UserMarker},
};
use yatube_db::client::DbClient;

/// The user behind a valid session token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
    token_hash: SessionTokenHash,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn id(&self) -> Id<UserMarker> {
        self.user.id
    }

    #[must_use]
    pub fn token_hash(&self) -> &SessionTokenHash {
        &self.token_hash
    }
}

/// Resolves the bearer token of a request.
///
/// Missing, malformed, unknown and expired tokens all mean "anonymous".
pub async fn authenticate(headers: &HeaderMap, db: &DbClient) -> Result<Option<AuthenticatedUser>> {
    let Some(authorization) = headers.typed_get::<Authorization<Bearer>>() else {
        return Ok(None);
    };
    let token: SessionToken = match authorization.token().parse() {
        Ok(token) => token,
        Err(err) => {
            debug!(error = %err, "Ignoring malformed session token");
            return Ok(None);
        }
    };

    let token_hash = token.hash()?;
    let Some((session, user)) = db.fetch_session(&token_hash).await? else {
        return Ok(None);
    };

    if session.user != token.user_id {
        return Ok(None);
    }
    if session.is_expired_at(UtcDateTime::now()) {
        debug!(user_id = %session.user, "Removing expired session");
        db.delete_session(&token_hash).await?;
        return Ok(None);
    }

    Ok(Some(AuthenticatedUser { user, token_hash }))
}

/// Guards every login-required route: anonymous requests are sent to the
/// login page, with the original target preserved in `next`.
pub async fn require_login(
    State(db): State<Arc<DbClient>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    if let Some(user) = authenticate(request.headers(), &db).await? {
        request.extensions_mut().insert(user);
        return Ok(next.run(request).await);
    }

    let uri = request.uri();
    let next_path = uri
        .path_and_query()
        .map_or_else(|| uri.path(), PathAndQuery::as_str);
    debug!(next_path, "Redirecting anonymous request to login");

    let location = format!("{}?next={}", LoginPath, urlencoding::encode(next_path));
    Ok(Found::to(location).into_response())
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(ServerError::MissingLoginGuard)
    }
}

/// Whoever is looking at a public page, if they identified themselves.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Viewer(pub Option<AuthenticatedUser>);

impl Viewer {
    #[must_use]
    pub fn id(&self) -> Option<Id<UserMarker>> {
        self.0.as_ref().map(AuthenticatedUser::id)
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Self(Some(user.clone())));
        }

        let db = Arc::<DbClient>::from_ref(state);
        Ok(Self(authenticate(&parts.headers, &db).await?))
    }
}
