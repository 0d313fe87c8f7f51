use crate::{
    config::Settings,
    server::{self, ServerState},
};
use axum::{
    Router,
    body::Body,
    http::{
        Method, Request, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, LOCATION},
    },
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::{io::Cursor, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;
use yatube_common::model::{
    Id,
    auth::{HashedPassword, Session, SessionToken},
    group::{CreateGroup, GroupMarker, GroupSlug},
    post::{CreatePost, PostMarker},
    user::{CreateUser, UserMarker, Username},
};
use yatube_db::client::DbClient;


const BOUNDARY: &str = "yatube-test-boundary";

struct TestApp {
    app: Router,
    db: Arc<DbClient>,
    media: TempDir,
}

/// A registered user and the bearer token of one of their sessions.
struct TestUser {
    id: Id<UserMarker>,
    token: String,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    async fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let media = tempfile::tempdir().unwrap();
        let mut settings = Settings::new(media.path().to_owned());
        configure(&mut settings);

        let db = DbClient::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let state = ServerState::new(db, settings);
        let db = state.db_client.clone();
        let app = server::app(state);

        Self { app, db, media }
    }

    async fn user(&self, username: &str) -> TestUser {
        let user = CreateUser::new(
            Username::new(username.to_owned()).unwrap(),
            String::new(),
            String::new(),
            None,
            HashedPassword::from_phc("$argon2id$unused".to_owned()),
        )
        .unwrap();
        let id = self.db.create_user(&user).await.unwrap();

        let token = SessionToken::generate(id);
        let session = Session::new(&token, token.hash().unwrap(), None);
        self.db.create_session(&session).await.unwrap();

        TestUser {
            id,
            token: token.to_string(),
        }
    }

    async fn group(&self, slug: &str) -> Id<GroupMarker> {
        let group = CreateGroup::new(
            format!("Group {slug}"),
            GroupSlug::new(slug.to_owned()).unwrap(),
            String::new(),
        )
        .unwrap();

        self.db.create_group(&group).await.unwrap()
    }

    async fn post(
        &self,
        author: &TestUser,
        text: &str,
        group: Option<Id<GroupMarker>>,
    ) -> Id<PostMarker> {
        let post = CreatePost {
            author: author.id,
            text: text.to_owned(),
            group,
            image: None,
        };

        self.db.create_post(&post).await.unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, user: Option<&TestUser>) -> Response<Body> {
        self.send(request(Method::GET, uri, user).body(Body::empty()).unwrap())
            .await
    }

    async fn post_form(&self, uri: &str, user: Option<&TestUser>, form: &str) -> Response<Body> {
        let request = request(Method::POST, uri, user)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_owned()))
            .unwrap();

        self.send(request).await
    }

    async fn post_multipart(
        &self,
        uri: &str,
        user: Option<&TestUser>,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> Response<Body> {
        let request = request(Method::POST, uri, user)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();

        self.send(request).await
    }
}

fn request(method: Method, uri: &str, user: Option<&TestUser>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match user {
        Some(user) => builder.header(AUTHORIZATION, format!("Bearer {}", user.token)),
        None => builder,
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn small_gif() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbaImage::new(2, 2)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Gif)
        .unwrap();
    bytes
}

async fn json(response: Response<Body>) -> Value {
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn redirect_location(response: &Response<Body>) -> &str {
    assert_eq!(response.status(), StatusCode::FOUND);
    response.headers()[LOCATION].to_str().unwrap()
}

fn post_texts(page: &Value) -> Vec<&str> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["text"].as_str().unwrap())
        .collect()
}
