mod support;

use anyhow::Result;
use axum::http::{header::WWW_AUTHENTICATE, Method, StatusCode};
use serde_json::{json, Value};
use support::TestApp;
use uuid::Uuid;

async fn create_post(app: &TestApp, token: &str, title: &str) -> Result<Value> {
    let response = app
        .send(
            Method::POST,
            "/posts",
            Some(token),
            Some(json!({ "title": title, "content": "body", "tags": ["Rust"] })),
        )
        .await?;
    anyhow::ensure!(response.status == StatusCode::CREATED, "create failed: {}", response.status);
    Ok(response.body)
}

#[tokio::test]
async fn author_may_only_delete_own_posts() -> Result<()> {
    let app = TestApp::new().await?;
    let u1 = app.user_token("u1@blog.test", "author").await?;
    let u2 = app.user_token("u2@blog.test", "author").await?;

    let post = create_post(&app, &u2, "Belongs to u2").await?;
    let uri = format!("/posts/{}", post["id"].as_str().unwrap());

    let denied = app.send(Method::DELETE, &uri, Some(&u1), None).await?;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert!(denied.headers.get(WWW_AUTHENTICATE).is_none());

    let own = create_post(&app, &u1, "Belongs to u1").await?;
    let own_uri = format!("/posts/{}", own["id"].as_str().unwrap());
    let deleted = app.send(Method::DELETE, &own_uri, Some(&u1), None).await?;
    assert_eq!(deleted.status, StatusCode::OK);

    let gone = app.send(Method::GET, &own_uri, Some(&u1), None).await?;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let still_there = app.send(Method::GET, &uri, Some(&u1), None).await?;
    assert_eq!(still_there.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn author_may_update_own_post_only() -> Result<()> {
    let app = TestApp::new().await?;
    let owner = app.user_token("owner@blog.test", "author").await?;
    let other = app.user_token("other@blog.test", "author").await?;
    let post = create_post(&app, &owner, "Draft").await?;
    let uri = format!("/posts/{}", post["id"].as_str().unwrap());

    let update = json!({ "title": "Final" });
    let denied = app.send(Method::PUT, &uri, Some(&other), Some(update.clone())).await?;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let updated = app.send(Method::PUT, &uri, Some(&owner), Some(update)).await?;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["title"], "Final");
    assert_eq!(updated.body["content"], "body");
    Ok(())
}

#[tokio::test]
async fn reader_is_read_only() -> Result<()> {
    let app = TestApp::new().await?;
    let author = app.user_token("author@blog.test", "author").await?;
    let reader = app.user_token("reader@blog.test", "reader").await?;
    let post = create_post(&app, &author, "Public").await?;
    let post_id = post["id"].as_str().unwrap();

    let create = app
        .send(
            Method::POST,
            "/posts",
            Some(&reader),
            Some(json!({ "title": "nope", "content": "nope" })),
        )
        .await?;
    assert_eq!(create.status, StatusCode::FORBIDDEN);

    let comment = app
        .send(
            Method::POST,
            &format!("/posts/{post_id}/comments"),
            Some(&reader),
            Some(json!({ "content": "hi" })),
        )
        .await?;
    assert_eq!(comment.status, StatusCode::FORBIDDEN);

    let list = app.send(Method::GET, "/posts?tag=rust", Some(&reader), None).await?;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body.as_array().map(Vec::len), Some(1));

    // Forbidden even for an id that does not exist.
    let missing = app
        .send(
            Method::DELETE,
            "/posts/00000000-0000-0000-0000-000000000000",
            Some(&reader),
            None,
        )
        .await?;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn comments_follow_ownership() -> Result<()> {
    let app = TestApp::new().await?;
    let alice = app.user_token("alice@blog.test", "author").await?;
    let bob = app.user_token("bob@blog.test", "author").await?;
    let post = create_post(&app, &alice, "Talk").await?;
    let post_id = post["id"].as_str().unwrap();

    let comment = app
        .send(
            Method::POST,
            &format!("/posts/{post_id}/comments"),
            Some(&bob),
            Some(json!({ "content": "first" })),
        )
        .await?;
    assert_eq!(comment.status, StatusCode::CREATED);
    let comment_uri = format!("/comments/{}", comment.body["id"].as_str().unwrap());

    let edit = json!({ "content": "edited" });
    let denied = app.send(Method::PUT, &comment_uri, Some(&alice), Some(edit.clone())).await?;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    let edited = app.send(Method::PUT, &comment_uri, Some(&bob), Some(edit)).await?;
    assert_eq!(edited.body["content"], "edited");

    let listed = app
        .send(Method::GET, &format!("/posts/{post_id}/comments"), Some(&alice), None)
        .await?;
    assert_eq!(listed.body.as_array().map(Vec::len), Some(1));

    let deleted = app.send(Method::DELETE, &comment_uri, Some(&bob), None).await?;
    assert_eq!(deleted.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn single_comment_reads_and_comment_pages() -> Result<()> {
    let app = TestApp::new().await?;
    let author = app.user_token("host@blog.test", "author").await?;
    let reader = app.user_token("guest@blog.test", "reader").await?;
    let post = create_post(&app, &author, "Thread").await?;
    let comments_uri = format!("/posts/{}/comments", post["id"].as_str().unwrap());

    let mut ids = Vec::new();
    for n in 0..12 {
        let created = app
            .send(
                Method::POST,
                &comments_uri,
                Some(&author),
                Some(json!({ "content": format!("reply {n}") })),
            )
            .await?;
        assert_eq!(created.status, StatusCode::CREATED);
        ids.push(created.body["id"].as_str().unwrap().to_owned());
    }

    let single = app
        .send(Method::GET, &format!("/comments/{}", ids[3]), Some(&reader), None)
        .await?;
    assert_eq!(single.status, StatusCode::OK);
    assert_eq!(single.body["content"], "reply 3");

    let missing = app
        .send(Method::GET, &format!("/comments/{}", Uuid::new_v4()), Some(&reader), None)
        .await?;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["code"], "comment_not_found");

    let unauthenticated = app.send(Method::GET, &format!("/comments/{}", ids[0]), None, None).await?;
    assert_eq!(unauthenticated.status, StatusCode::UNAUTHORIZED);

    let default_page = app.send(Method::GET, &comments_uri, Some(&reader), None).await?;
    assert_eq!(default_page.body.as_array().map(Vec::len), Some(10));

    let tail = app
        .send(Method::GET, &format!("{comments_uri}?skip=10&limit=5"), Some(&reader), None)
        .await?;
    assert_eq!(tail.status, StatusCode::OK);
    assert_eq!(tail.body.as_array().map(Vec::len), Some(2));

    let capped = app
        .send(Method::GET, &format!("{comments_uri}?limit=1000"), Some(&reader), None)
        .await?;
    assert_eq!(capped.body.as_array().map(Vec::len), Some(12));
    Ok(())
}

#[tokio::test]
async fn admin_manages_users_and_any_content() -> Result<()> {
    let app = TestApp::new().await?;
    let admin = app.admin_token().await?;
    let author = app.user_token("writer@blog.test", "author").await?;
    let post = create_post(&app, &author, "Moderated").await?;

    let users = app.send(Method::GET, "/users", Some(&admin), None).await?;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body.as_array().map(Vec::len), Some(2));

    let as_author = app.send(Method::GET, "/users", Some(&author), None).await?;
    assert_eq!(as_author.status, StatusCode::FORBIDDEN);

    let uri = format!("/posts/{}", post["id"].as_str().unwrap());
    let deleted = app.send(Method::DELETE, &uri, Some(&admin), None).await?;
    assert_eq!(deleted.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn role_change_applies_to_new_tokens_only() -> Result<()> {
    let app = TestApp::new().await?;
    let admin = app.admin_token().await?;
    let user = app.register("promoted@blog.test", "pa55word!", "reader").await?;
    let old_token = app.login("promoted@blog.test", "pa55word!").await?;

    let uri = format!("/users/{}/role", user["id"].as_str().unwrap());
    let changed = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "role": "author" })))
        .await?;
    assert_eq!(changed.status, StatusCode::OK);
    assert_eq!(changed.body["role"], "author");

    let body = json!({ "title": "Hello", "content": "world" });
    let with_old = app.send(Method::POST, "/posts", Some(&old_token), Some(body.clone())).await?;
    assert_eq!(with_old.status, StatusCode::FORBIDDEN);

    let new_token = app.login("promoted@blog.test", "pa55word!").await?;
    let with_new = app.send(Method::POST, "/posts", Some(&new_token), Some(body)).await?;
    assert_eq!(with_new.status, StatusCode::CREATED);

    let invalid = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "role": "owner" })))
        .await?;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    Ok(())
}
