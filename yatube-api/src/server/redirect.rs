use axum::{
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use std::fmt::Display;

/// A `302 Found` redirect.
///
/// Locations built from typed paths are already percent-encoded.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Found(String);

impl Found {
    pub fn to(location: impl Display) -> Self {
        Self(location.to_string())
    }
}

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(LOCATION, self.0)]).into_response()
    }
}
