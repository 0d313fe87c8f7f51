use crate::client::{DbClient, DbError, PostFilter};
use std::num::NonZeroU64;
use time::{Duration, UtcDateTime, macros::utc_datetime};
use yatube_common::{
    model::{
        Id,
        auth::{HashedPassword, Session, SessionToken},
        comment::CreateComment,
        follow::Follow,
        group::{CreateGroup, GroupMarker, GroupSlug},
        post::{CreatePost, EditPost, Post, PostMarker},
        user::{CreateUser, UserMarker, Username},
    },
    pagination::Paginator,
    util::PositiveDuration,
};

async fn db() -> DbClient {
    let db = DbClient::connect_in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db
}

async fn user(db: &DbClient, username: &str) -> Id<UserMarker> {
    let user = CreateUser::new(
        Username::new(username.to_owned()).unwrap(),
        String::new(),
        String::new(),
        None,
        HashedPassword::from_phc("$argon2id$unused".to_owned()),
    )
    .unwrap();

    db.create_user(&user).await.unwrap()
}

async fn group(db: &DbClient, slug: &str) -> Id<GroupMarker> {
    let group = CreateGroup::new(
        format!("Group {slug}"),
        GroupSlug::new(slug.to_owned()).unwrap(),
        "A test group".to_owned(),
    )
    .unwrap();

    db.create_group(&group).await.unwrap()
}

async fn post(
    db: &DbClient,
    author: Id<UserMarker>,
    text: &str,
    group: Option<Id<GroupMarker>>,
) -> Id<PostMarker> {
    let post = CreatePost {
        author,
        text: text.to_owned(),
        group,
        image: None,
    };

    db.create_post(&post).await.unwrap()
}

async fn texts(db: &DbClient, filter: PostFilter) -> Vec<String> {
    db.fetch_posts(filter, 100, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|post| post.text)
        .collect()
}

#[tokio::test]
async fn users_are_looked_up_by_id_and_username() {
    let db = db().await;
    let leo = user(&db, "leo").await;

    let by_id = db.fetch_user(leo).await.unwrap().unwrap();
    let by_name = db.fetch_user_by_username("leo").await.unwrap().unwrap();
    assert_eq!(by_id, by_name);
    assert_eq!(by_id.username.get(), "leo");

    assert!(db.fetch_user_by_username("nobody").await.unwrap().is_none());
    assert!(db.fetch_user(Id::new(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn usernames_are_unique() {
    let db = db().await;
    user(&db, "twin").await;

    let duplicate = CreateUser::new(
        Username::new("twin".to_owned()).unwrap(),
        String::new(),
        String::new(),
        None,
        HashedPassword::from_phc("$argon2id$unused".to_owned()),
    )
    .unwrap();

    assert!(matches!(
        db.create_user(&duplicate).await,
        Err(DbError::UniqueViolation("username"))
    ));
}

#[tokio::test]
async fn credentials_keep_the_stored_hash() {
    let db = db().await;
    let password = HashedPassword::hash("s3cret-pass").unwrap();
    let create = CreateUser::new(
        Username::new("writer".to_owned()).unwrap(),
        "Anna".to_owned(),
        "Karenina".to_owned(),
        Some("anna@example.com".to_owned()),
        password.clone(),
    )
    .unwrap();
    db.create_user(&create).await.unwrap();

    let (user, stored) = db.fetch_credentials("writer").await.unwrap().unwrap();
    assert_eq!(user.first_name, "Anna");
    assert_eq!(stored, password);
    assert!(stored.verify("s3cret-pass").unwrap());
}

#[tokio::test]
async fn sessions_are_found_by_token_hash() {
    let db = db().await;
    let leo = user(&db, "leo").await;

    let token = SessionToken::generate(leo);
    let hash = token.hash().unwrap();
    let lifetime = PositiveDuration::from_seconds(3600).unwrap();
    db.create_session(&Session::new(&token, hash.clone(), Some(lifetime)))
        .await
        .unwrap();

    let (session, owner) = db.fetch_session(&hash).await.unwrap().unwrap();
    assert_eq!(session.user, leo);
    assert_eq!(owner.id, leo);
    assert_eq!(session.expires_after, Some(lifetime));

    assert!(db.delete_session(&hash).await.unwrap());
    assert!(db.fetch_session(&hash).await.unwrap().is_none());
    assert!(!db.delete_session(&hash).await.unwrap());
}

#[tokio::test]
async fn every_post_appears_in_all_its_listings() {
    let db = db().await;
    let leo = user(&db, "leo").await;
    let anna = user(&db, "anna").await;
    let cats = group(&db, "cats").await;

    post(&db, leo, "with group", Some(cats)).await;
    post(&db, anna, "without group", None).await;

    assert_eq!(texts(&db, PostFilter::All).await, ["without group", "with group"]);
    assert_eq!(texts(&db, PostFilter::Group(cats)).await, ["with group"]);
    assert_eq!(texts(&db, PostFilter::Author(leo)).await, ["with group"]);
    assert_eq!(texts(&db, PostFilter::Author(anna)).await, ["without group"]);
}

#[tokio::test]
async fn listings_are_newest_first_with_id_tie_break() {
    let db = db().await;
    let leo = user(&db, "leo").await;
    let at = utc_datetime!(2025-03-01 12:00);

    for (text, pub_date) in [
        ("oldest", at - Duration::hours(1)),
        ("tied first", at),
        ("tied second", at),
    ] {
        let post = CreatePost {
            author: leo,
            text: text.to_owned(),
            group: None,
            image: None,
        };
        db.create_post_at(&post, pub_date).await.unwrap();
    }

    assert_eq!(
        texts(&db, PostFilter::All).await,
        ["tied second", "tied first", "oldest"]
    );
}

#[tokio::test]
async fn posts_round_trip_with_author_and_group() {
    let db = db().await;
    let leo = user(&db, "leo").await;
    let cats = group(&db, "cats").await;
    let before = UtcDateTime::now() - Duration::seconds(1);

    let post_id = db
        .create_post(&CreatePost {
            author: leo,
            text: "Hello".to_owned(),
            group: Some(cats),
            image: Some("posts/cat.gif".to_owned()),
        })
        .await
        .unwrap();

    let post: Post = db.fetch_post(post_id).await.unwrap().unwrap();
    assert_eq!(post.text, "Hello");
    assert_eq!(post.author.id, leo);
    assert_eq!(post.group.as_ref().map(|group| group.id), Some(cats));
    assert_eq!(post.image.as_deref(), Some("posts/cat.gif"));
    assert!(post.pub_date > before);

    assert!(db.fetch_post(Id::new(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn posts_are_edited_in_place() {
    let db = db().await;
    let leo = user(&db, "leo").await;
    let post_id = post(&db, leo, "draft", None).await;
    let original = db.fetch_post(post_id).await.unwrap().unwrap();

    let edit = EditPost {
        text: "final".to_owned(),
        group: None,
        image: None,
    };
    assert!(db.update_post(post_id, &edit).await.unwrap());
    assert!(!db.update_post(Id::new(999), &edit).await.unwrap());

    let edited = db.fetch_post(post_id).await.unwrap().unwrap();
    assert_eq!(edited.text, "final");
    assert_eq!(edited.pub_date, original.pub_date);
}

#[tokio::test]
async fn deleting_a_post_deletes_its_comments() {
    let db = db().await;
    let leo = user(&db, "leo").await;
    let post_id = post(&db, leo, "commented", None).await;

    for text in ["first", "second"] {
        db.create_comment(&CreateComment {
            post: post_id,
            author: leo,
            text: text.to_owned(),
        })
        .await
        .unwrap();
    }

    let comments = db.fetch_comments(post_id).await.unwrap();
    let comment_texts: Vec<_> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(comment_texts, ["second", "first"]);

    assert!(db.delete_post(post_id).await.unwrap());
    assert!(db.fetch_comments(post_id).await.unwrap().is_empty());

    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
async fn deleting_a_group_keeps_its_posts() {
    let db = db().await;
    let leo = user(&db, "leo").await;
    let cats = group(&db, "cats").await;
    let post_id = post(&db, leo, "about cats", Some(cats)).await;

    assert!(db.delete_group(cats).await.unwrap());

    let post = db.fetch_post(post_id).await.unwrap().unwrap();
    assert!(post.group.is_none());
    assert!(db.fetch_group_by_slug("cats").await.unwrap().is_none());
}

#[tokio::test]
async fn group_slugs_are_unique() {
    let db = db().await;
    group(&db, "cats").await;

    let duplicate = CreateGroup::new(
        "Other cats".to_owned(),
        GroupSlug::new("cats".to_owned()).unwrap(),
        String::new(),
    )
    .unwrap();
    assert!(matches!(
        db.create_group(&duplicate).await,
        Err(DbError::UniqueViolation("slug"))
    ));

    let groups = db.fetch_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].slug.get(), "cats");
}

#[tokio::test]
async fn follow_state_transitions() {
    let db = db().await;
    let reader = user(&db, "reader").await;
    let writer = user(&db, "writer").await;
    let follow = Follow::new(reader, writer).unwrap();

    assert!(!db.is_following(reader, writer).await.unwrap());

    assert!(db.follow(follow).await.unwrap());
    assert!(!db.follow(follow).await.unwrap());
    assert!(db.is_following(reader, writer).await.unwrap());
    assert!(!db.is_following(writer, reader).await.unwrap());
    assert_eq!(db.count_followers(writer).await.unwrap(), 1);

    assert!(db.unfollow(reader, writer).await.unwrap());
    assert!(!db.is_following(reader, writer).await.unwrap());
    assert!(!db.unfollow(reader, writer).await.unwrap());
    assert_eq!(db.count_followers(writer).await.unwrap(), 0);
}

#[tokio::test]
async fn schema_rejects_self_follow() {
    let db = db().await;
    let narcissus = user(&db, "narcissus").await;

    let result = sqlx::query("INSERT INTO follows (user_id, author_id) VALUES (?, ?)")
        .bind(narcissus.get().cast_signed())
        .bind(narcissus.get().cast_signed())
        .execute(&db.pool)
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn follow_feed_only_shows_followed_authors() {
    let db = db().await;
    let reader = user(&db, "reader").await;
    let followed = user(&db, "followed").await;
    let ignored = user(&db, "ignored").await;

    post(&db, followed, "visible", None).await;
    post(&db, ignored, "hidden", None).await;
    db.follow(Follow::new(reader, followed).unwrap())
        .await
        .unwrap();

    assert_eq!(texts(&db, PostFilter::FollowedBy(reader)).await, ["visible"]);
    assert!(texts(&db, PostFilter::FollowedBy(ignored)).await.is_empty());
}

#[tokio::test]
async fn deleting_a_user_cascades() {
    let db = db().await;
    let leo = user(&db, "leo").await;
    let anna = user(&db, "anna").await;
    let post_id = post(&db, leo, "soon gone", None).await;
    db.follow(Follow::new(anna, leo).unwrap()).await.unwrap();

    assert!(db.delete_user(leo).await.unwrap());

    assert!(db.fetch_post(post_id).await.unwrap().is_none());
    assert!(!db.is_following(anna, leo).await.unwrap());
    assert!(db.fetch_user(anna).await.unwrap().is_some());
}

#[tokio::test]
async fn pages_are_cut_from_the_listing() {
    let db = db().await;
    let kir = user(&db, "kir").await;
    for n in 0..13 {
        post(&db, kir, &format!("post {n}"), None).await;
    }
    let paginator = Paginator::new(NonZeroU64::new(10).unwrap());

    let first = db
        .fetch_posts_page(PostFilter::All, paginator, None)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.items[0].text, "post 12");
    assert!(first.has_next);

    let second = db
        .fetch_posts_page(PostFilter::Author(kir), paginator, Some("2"))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 3);
    assert_eq!(second.items[2].text, "post 0");
    assert_eq!(second.count, 13);

    let beyond = db
        .fetch_posts_page(PostFilter::All, paginator, Some("7"))
        .await
        .unwrap();
    assert_eq!(beyond.number, 2);
}
