//! Form submissions and their validation.
//!
//! A submission holds the raw values as sent. Cleaning it either yields the
//! validated values or per-field error messages to render next to the input.

use crate::server::ServerError;
use axum::{
    Form,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use bytes::Bytes;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, convert::Infallible};
use tracing::debug;
use yatube_common::model::{
    Id,
    group::{Group, GroupMarker},
    post::Post,
    user::{NAME_MAX_LEN, USERNAME_MAX_LEN, Username},
};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const EMPTY_FILE: &str = "The submitted file is empty.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn’t match.";
pub const PASSWORD_TOO_SHORT: &str =
    "This password is too short. It must contain at least 8 characters.";
pub const PASSWORD_NUMERIC: &str = "This password is entirely numeric.";
pub const INVALID_LOGIN: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";

/// Errors that belong to the form as a whole rather than one field.
pub const NON_FIELD_ERRORS: &str = "__all__";

const PASSWORD_MIN_LEN: usize = 8;
const ACCEPTED_IMAGE_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Gif,
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

fn max_length_message(max: usize, actual: usize) -> String {
    format!("Ensure this value has at most {max} characters (it has {actual}).")
}

fn required_text(value: &str, field: &'static str, errors: &mut FieldErrors) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, REQUIRED);
    }
    value.to_owned()
}

/// A file part of a multipart submission.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

/// An upload that decodes as one of the accepted image formats.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ImageUpload {
    file_name: String,
    bytes: Bytes,
    format: ImageFormat,
}

impl ImageUpload {
    #[must_use]
    pub fn new(file_name: String, bytes: Bytes, format: ImageFormat) -> Self {
        Self {
            file_name,
            bytes,
            format,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

fn clean_image(upload: &Upload, errors: &mut FieldErrors) -> Option<ImageUpload> {
    // Browsers send an empty, unnamed part when no file was chosen.
    if upload.file_name.is_empty() && upload.bytes.is_empty() {
        return None;
    }
    if upload.bytes.is_empty() {
        errors.add("image", EMPTY_FILE);
        return None;
    }

    let format = image::guess_format(&upload.bytes)
        .ok()
        .filter(|format| ACCEPTED_IMAGE_FORMATS.contains(format))
        .filter(|&format| image::load_from_memory_with_format(&upload.bytes, format).is_ok());

    match format {
        Some(format) => Some(ImageUpload::new(
            upload.file_name.clone(),
            upload.bytes.clone(),
            format,
        )),
        None => {
            debug!(file_name = upload.file_name, "Rejecting upload that is not an image");
            errors.add("image", INVALID_IMAGE);
            None
        }
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

/// The post form as submitted, either urlencoded or as `multipart/form-data`.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PostSubmission {
    pub text: String,
    pub group: String,
    pub image: Option<Upload>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
struct PostFields {
    #[serde(default)]
    text: String,
    #[serde(default)]
    group: String,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanPost {
    pub text: String,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<ImageUpload>,
}

impl PostSubmission {
    /// `groups` are the valid choices for the group field.
    pub fn clean(&self, groups: &[Group]) -> Result<CleanPost, FieldErrors> {
        let mut errors = FieldErrors::default();

        let text = required_text(&self.text, "text", &mut errors);

        let group = match self.group.trim() {
            "" => None,
            raw => {
                let group = raw
                    .parse::<u64>()
                    .ok()
                    .map(Id::new)
                    .filter(|id| groups.iter().any(|group| group.id == *id));
                if group.is_none() {
                    errors.add("group", INVALID_CHOICE);
                }
                group
            }
        };

        let image = self
            .image
            .as_ref()
            .and_then(|upload| clean_image(upload, &mut errors));

        if errors.is_empty() {
            Ok(CleanPost { text, group, image })
        } else {
            Err(errors)
        }
    }

    /// The values to show again when the submission is rejected.
    #[must_use]
    pub fn view(&self) -> PostFormView {
        PostFormView {
            text: self.text.clone(),
            group: self.group.clone(),
            image: None,
        }
    }
}

impl<S> FromRequest<S> for PostSubmission
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&request) {
            let Form(fields) = Form::<PostFields>::from_request(request, state).await?;
            return Ok(Self {
                text: fields.text,
                group: fields.group,
                image: None,
            });
        }

        let mut multipart = Multipart::from_request(request, state).await?;
        let mut submission = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("text") => submission.text = field.text().await?,
                Some("group") => submission.group = field.text().await?,
                Some("image") => {
                    let file_name = field.file_name().unwrap_or_default().to_owned();
                    let bytes = field.bytes().await?;
                    submission.image = Some(Upload { file_name, bytes });
                }
                _ => debug!(?name, "Ignoring unknown post form field"),
            }
        }

        Ok(submission)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct PostFormView {
    pub text: String,
    pub group: String,
    /// The image currently attached, relative to the media root.
    pub image: Option<String>,
}

impl From<&Post> for PostFormView {
    fn from(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post
                .group
                .as_ref()
                .map(|group| group.id.to_string())
                .unwrap_or_default(),
            image: post.image.clone(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct CommentSubmission {
    #[serde(default)]
    pub text: String,
}

impl CommentSubmission {
    pub fn clean(&self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::default();
        let text = required_text(&self.text, "text", &mut errors);

        if errors.is_empty() {
            Ok(text)
        } else {
            Err(errors)
        }
    }

    async fn read<S>(request: Request, state: &S) -> Result<Self, ServerError>
    where
        S: Send + Sync,
    {
        if !is_multipart(&request) {
            let Form(submission) = Form::<Self>::from_request(request, state).await?;
            return Ok(submission);
        }

        let mut multipart = Multipart::from_request(request, state).await?;
        let mut submission = Self::default();
        while let Some(field) = multipart.next_field().await? {
            if field.name() == Some("text") {
                submission.text = field.text().await?;
            }
        }

        Ok(submission)
    }
}

/// Accepts either encoding. An unreadable body counts as a blank comment.
impl<S> FromRequest<S> for CommentSubmission
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::read(request, state).await.unwrap_or_else(|err| {
            debug!(error = %err, "Treating unreadable comment body as blank");
            Self::default()
        }))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct CommentFormView {
    pub text: String,
}

#[derive(Clone, Eq, PartialEq, Default, Deserialize)]
pub struct SignupSubmission {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CleanSignup {
    pub username: Username,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub password: String,
}

impl SignupSubmission {
    /// Checks everything except whether the username is taken.
    pub fn clean(&self) -> Result<CleanSignup, FieldErrors> {
        let mut errors = FieldErrors::default();

        let username = clean_username(&self.username, &mut errors);
        let first_name = clean_name(&self.first_name, "first_name", &mut errors);
        let last_name = clean_name(&self.last_name, "last_name", &mut errors);
        let email = clean_email(&self.email, &mut errors);

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED);
        }
        if self.password2.is_empty() {
            errors.add("password2", REQUIRED);
        } else if !self.password1.is_empty() {
            if self.password1 == self.password2 {
                validate_password(&self.password2, &mut errors);
            } else {
                errors.add("password2", PASSWORD_MISMATCH);
            }
        }

        match username {
            Some(username) if errors.is_empty() => Ok(CleanSignup {
                username,
                first_name,
                last_name,
                email,
                password: self.password1.clone(),
            }),
            _ => Err(errors),
        }
    }

    /// Everything but the passwords, which are never echoed.
    #[must_use]
    pub fn view(&self) -> SignupFormView {
        SignupFormView {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }
}

fn clean_username(raw: &str, errors: &mut FieldErrors) -> Option<Username> {
    let raw = raw.trim();
    if raw.is_empty() {
        errors.add("username", REQUIRED);
        return None;
    }

    let len = raw.chars().count();
    if len > USERNAME_MAX_LEN {
        errors.add("username", max_length_message(USERNAME_MAX_LEN, len));
        return None;
    }

    match Username::new(raw.to_owned()) {
        Ok(username) => Some(username),
        Err(_) => {
            errors.add("username", INVALID_USERNAME);
            None
        }
    }
}

fn clean_name(raw: &str, field: &'static str, errors: &mut FieldErrors) -> String {
    let name = raw.trim();
    let len = name.chars().count();
    if len > NAME_MAX_LEN {
        errors.add(field, max_length_message(NAME_MAX_LEN, len));
    }
    name.to_owned()
}

fn clean_email(raw: &str, errors: &mut FieldErrors) -> Option<String> {
    let email = raw.trim();
    if email.is_empty() {
        return None;
    }

    let plausible = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && domain.split('.').all(|label| {
                !label.is_empty() && label.chars().all(|c| c.is_alphanumeric() || c == '-')
            })
    }) && !email.chars().any(char::is_whitespace);

    if plausible {
        Some(email.to_owned())
    } else {
        errors.add("email", INVALID_EMAIL);
        None
    }
}

fn validate_password(password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < PASSWORD_MIN_LEN {
        errors.add("password2", PASSWORD_TOO_SHORT);
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        errors.add("password2", PASSWORD_NUMERIC);
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct SignupFormView {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Default, Deserialize)]
pub struct LoginSubmission {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

impl LoginSubmission {
    /// Only checks presence, the credentials themselves are checked against storage.
    pub fn clean(&self) -> Result<(&str, &str), FieldErrors> {
        let mut errors = FieldErrors::default();
        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }

        if errors.is_empty() {
            Ok((username, &self.password))
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn view(&self) -> LoginFormView {
        LoginFormView {
            username: self.username.clone(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct LoginFormView {
    pub username: String,
}
