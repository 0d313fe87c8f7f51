use crate::{
    config::Settings,
    server::{
        Result, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Form, NextQuery, Query},
        forms::{
            FieldErrors, INVALID_LOGIN, LoginFormView, LoginSubmission, NON_FIELD_ERRORS,
            SignupFormView, SignupSubmission, USERNAME_TAKEN,
        },
        redirect::Found,
        render::{Json, Submitted},
        routes::posts::IndexPath,
    },
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use yatube_common::model::{
    ModelValidationError,
    auth::{HashedPassword, Session, SessionToken},
    user::{CreateUser, User, Username},
};
use yatube_db::client::{DbClient, DbError};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(signup_form)
        .typed_post(signup)
        .typed_get(login_form)
        .typed_post(login)
}

pub fn login_required_routes() -> ServerRouter {
    ServerRouter::new().typed_post(logout)
}

#[derive(TypedPath)]
#[typed_path("/auth/signup/")]
pub struct SignupPath;

#[derive(TypedPath)]
#[typed_path("/auth/login/")]
pub struct LoginPath;

#[derive(TypedPath)]
#[typed_path("/auth/logout/")]
pub struct LogoutPath;

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct SignupPage {
    pub form: SignupFormView,
    pub errors: FieldErrors,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct LoginPage {
    pub form: LoginFormView,
    pub errors: FieldErrors,
    pub next: Option<String>,
}

/// The bearer token to present on every later request.
#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct LoggedInPage {
    pub token: String,
    pub user: User,
    /// Where to continue: the requested `next` path if it is local, else the index.
    pub next: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct LoggedOutPage {
    pub username: Username,
}

/// Only same-site paths are followed after login.
fn local_path(next: Option<&str>) -> Option<&str> {
    next.filter(|next| {
        next.starts_with('/') && !next.starts_with("//") && !next.starts_with("/\\")
    })
}

async fn signup_form(SignupPath: SignupPath) -> Json<SignupPage> {
    Json(SignupPage {
        form: SignupFormView::default(),
        errors: FieldErrors::default(),
    })
}

async fn signup(
    SignupPath: SignupPath,
    State(db): State<Arc<DbClient>>,
    Form(submission): Form<SignupSubmission>,
) -> Result<Submitted<SignupPage>> {
    let rejected = |errors| {
        Ok(Submitted::Form(SignupPage {
            form: submission.view(),
            errors,
        }))
    };

    let signup = match submission.clean() {
        Ok(signup) => signup,
        Err(errors) => return rejected(errors),
    };

    let password = HashedPassword::hash(&signup.password)?;
    let user = CreateUser::new(
        signup.username,
        signup.first_name,
        signup.last_name,
        signup.email,
        password,
    )
    .map_err(ModelValidationError::from)?;

    match db.create_user(&user).await {
        Ok(user_id) => {
            info!(%user_id, username = %user.username, "User signed up");
            Ok(Submitted::Redirect(Found::to(IndexPath)))
        }
        Err(DbError::UniqueViolation(_)) => {
            let mut errors = FieldErrors::default();
            errors.add("username", USERNAME_TAKEN);
            rejected(errors)
        }
        Err(err) => Err(err.into()),
    }
}

async fn login_form(
    LoginPath: LoginPath,
    Query(NextQuery { next }): Query<NextQuery>,
) -> Json<LoginPage> {
    Json(LoginPage {
        form: LoginFormView::default(),
        errors: FieldErrors::default(),
        next,
    })
}

async fn login(
    LoginPath: LoginPath,
    Query(query): Query<NextQuery>,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    Form(submission): Form<LoginSubmission>,
) -> Result<Json<LoginPageOutcome>> {
    let next = submission.next.clone().or(query.next);
    let rejected = |errors| {
        Ok(Json(LoginPageOutcome::Form(LoginPage {
            form: submission.view(),
            errors,
            next: next.clone(),
        })))
    };

    let (username, password) = match submission.clean() {
        Ok(credentials) => credentials,
        Err(errors) => return rejected(errors),
    };

    let user = match db.fetch_credentials(username).await? {
        Some((user, hash)) if hash.verify(password)? => user,
        _ => {
            debug!(username, "Rejecting login with wrong credentials");
            let mut errors = FieldErrors::default();
            errors.add(NON_FIELD_ERRORS, INVALID_LOGIN);
            return rejected(errors);
        }
    };

    let token = SessionToken::generate(user.id);
    let session = Session::new(&token, token.hash()?, settings.session_lifetime);
    db.create_session(&session).await?;
    info!(user_id = %user.id, "User logged in");

    let next = local_path(next.as_deref()).map_or_else(|| IndexPath.to_string(), str::to_owned);
    Ok(Json(LoginPageOutcome::LoggedIn(LoggedInPage {
        token: token.to_string(),
        user,
        next,
    })))
}

/// A login attempt shows either the form again or the issued token.
#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
#[serde(untagged)]
pub enum LoginPageOutcome {
    Form(LoginPage),
    LoggedIn(LoggedInPage),
}

async fn logout(
    LogoutPath: LogoutPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<LoggedOutPage>> {
    db.delete_session(user.token_hash()).await?;
    info!(user_id = %user.id(), "User logged out");

    Ok(Json(LoggedOutPage {
        username: user.user().username.clone(),
    }))
}
