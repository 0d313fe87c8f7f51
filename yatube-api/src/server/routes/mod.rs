use crate::server::{ServerRouter, ServerState, auth::require_login, cache::cache_page};
use axum::middleware::from_fn_with_state;

pub mod accounts;
pub mod groups;
pub mod posts;
pub mod profiles;

/// Every page route. Login-required routes sit behind the login guard and the
/// index behind the page cache.
pub fn routes(state: &ServerState) -> ServerRouter {
    let cached = posts::cached_routes()
        .route_layer(from_fn_with_state(state.page_cache.clone(), cache_page));

    let login_required = ServerRouter::new()
        .merge(posts::login_required_routes())
        .merge(profiles::login_required_routes())
        .merge(accounts::login_required_routes())
        .route_layer(from_fn_with_state(state.db_client.clone(), require_login));

    ServerRouter::new()
        .merge(cached)
        .merge(posts::routes())
        .merge(groups::routes())
        .merge(profiles::routes())
        .merge(accounts::routes())
        .merge(login_required)
}
