use crate::server::ServerError;
use axum::{
    Form as AxumForm,
    extract::{FromRequest, FromRequestParts, Query as AxumQuery},
};
use serde::Deserialize;

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumForm), rejection(ServerError))]
pub struct Form<T>(pub T);

#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);

/// The `page` parameter of paginated listings, kept raw so that malformed
/// numbers fall back to the first page instead of being rejected.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

/// Where to send the user after logging in.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}
