use crate::server::{ServerError, redirect::Found};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(json) => (TypedHeader(ContentType::json()), json).into_response(),
            Err(err) => ServerError::JsonResponse(err).into_response(),
        }
    }
}

/// What a form submission ends in: the form again, with errors, or a redirect.
#[derive(Debug, Clone)]
pub enum Submitted<T> {
    Form(T),
    Redirect(Found),
}

impl<T: Serialize> IntoResponse for Submitted<T> {
    fn into_response(self) -> Response {
        match self {
            Submitted::Form(page) => Json(page).into_response(),
            Submitted::Redirect(redirect) => redirect.into_response(),
        }
    }
}
