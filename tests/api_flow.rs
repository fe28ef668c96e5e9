//! End-to-end flows through the full middleware stack.

use axum::http::{Method, StatusCode};
use serde_json::json;

mod common;

use common::TestApp;

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new().await;
    let (token, user_id) = app.register("alice").await;

    let (status, body) = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], user_id);
    assert!(body["data"].get("password_hash").is_none());

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "identifier": "ALICE@example.com", "password": "correct horse battery" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].as_str().is_some());

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "identifier": "alice", "password": "wrong password!" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "invalid credentials");
}

#[tokio::test]
async fn test_register_conflicts_and_validation() {
    let app = TestApp::new().await;
    app.register("bob").await;

    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "username": "BOB", "email": "other@example.com", "password": "long enough pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "username already taken");

    let (status, _) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "username": "bobby", "email": "bob@example.com", "password": "long enough pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "username": "carol", "email": "carol@example.com", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_routes_need_a_token() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "missing bearer token");

    let (status, _) = app.get("/api/chat/rooms", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new().await;
    let (token, _) = app.register("dave").await;

    let (status, _) = app
        .request(
            Method::PUT,
            "/api/auth/password",
            Some(&token),
            Some(json!({ "current_password": "correct horse battery", "new_password": "new secret pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "identifier": "dave", "password": "new secret pass" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_chat_room_membership_rules() {
    let app = TestApp::new().await;
    let (owner, _) = app.register("owner").await;
    let (guest, _) = app.register("guest").await;

    let (status, body) = app
        .post("/api/chat/rooms", Some(&owner), json!({ "name": "general" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = body["data"]["id"].as_str().unwrap().to_string();

    // Not a member yet.
    let (status, _) = app
        .post(
            &format!("/api/chat/rooms/{}/messages", room_id),
            Some(&guest),
            json!({ "content": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(Method::POST, &format!("/api/chat/rooms/{}/join", room_id), Some(&guest), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            &format!("/api/chat/rooms/{}/messages", room_id),
            Some(&guest),
            json!({ "content": "  hello there  " }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["content"], "hello there");
    assert_eq!(body["data"]["username"], "guest");
    let message_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .get(&format!("/api/chat/rooms/{}/messages", room_id), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = app.get(&format!("/api/chat/rooms/{}", room_id), Some(&guest)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["is_member"], true);

    // The room owner moderates.
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/chat/messages/{}", message_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The owner cannot leave; a member can.
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/chat/rooms/{}/members/me", room_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/chat/rooms/{}/members/me", room_id), Some(&guest), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Only the owner deletes the room.
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/chat/rooms/{}", room_id), Some(&guest), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/chat/rooms/{}", room_id), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/api/chat/rooms/{}", room_id), Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_private_room_is_invite_only() {
    let app = TestApp::new().await;
    let (owner, _) = app.register("host").await;
    let (friend, friend_id) = app.register("friend").await;
    let (stranger, _) = app.register("stranger").await;

    let (_, body) = app
        .post("/api/chat/rooms", Some(&owner), json!({ "name": "secret", "is_private": true }))
        .await;
    let room_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(Method::POST, &format!("/api/chat/rooms/{}/join", room_id), Some(&stranger), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.get("/api/chat/rooms", Some(&stranger)).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    // Members cannot invite; the owner can.
    let (status, _) = app
        .post(
            &format!("/api/chat/rooms/{}/members", room_id),
            Some(&stranger),
            json!({ "user_id": friend_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .post(
            &format!("/api/chat/rooms/{}/members", room_id),
            Some(&owner),
            json!({ "user_id": friend_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/chat/rooms", Some(&friend)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["member_count"], 2);
}

#[tokio::test]
async fn test_posts_comments_and_likes() {
    let app = TestApp::new().await;
    let (author, _) = app.register("writer").await;
    let (reader, _) = app.register("reader").await;

    let (status, body) = app
        .post(
            "/api/posts",
            Some(&author),
            json!({ "content": "first post", "image_url": "https://img.example.com/cat.png" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post("/api/posts", Some(&author), json!({ "content": "x", "image_url": "ftp://nope" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Likes are idempotent per user.
    for _ in 0..2 {
        let (status, body) = app
            .request(Method::POST, &format!("/api/posts/{}/like", post_id), Some(&reader), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["like_count"], 1);
    }

    let (status, body) = app
        .post(
            &format!("/api/posts/{}/comments", post_id),
            Some(&reader),
            json!({ "content": "nice" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = app.get(&format!("/api/posts/{}", post_id), Some(&reader)).await;
    assert_eq!(body["data"]["like_count"], 1);
    assert_eq!(body["data"]["comment_count"], 1);
    assert_eq!(body["data"]["liked_by_me"], true);

    // Anonymous readers see the feed.
    let (status, body) = app.get("/api/posts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["liked_by_me"], false);

    let (_, body) = app.get("/api/users/writer/posts", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (status, _) = app.get("/api/users/nobody/posts", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Only the author edits.
    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/api/posts/{}", post_id),
            Some(&reader),
            Some(json!({ "content": "hijacked" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/api/posts/{}", post_id),
            Some(&author),
            Some(json!({ "image_url": null })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["image_url"].is_null());
    assert_eq!(body["data"]["content"], "first post");

    let (status, _) = app
        .request(Method::PATCH, &format!("/api/posts/{}", post_id), Some(&author), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The post author may remove comments on their post.
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/comments/{}", comment_id), Some(&author), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/posts/{}", post_id), Some(&author), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/api/posts/{}", post_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_image_routes_when_disabled() {
    let app = TestApp::new().await;
    let (token, _) = app.register("painter").await;

    let (status, body) = app
        .post("/api/images/cache", Some(&token), json!({ "url": "https://img.example.com/a.png" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "image cache disabled");
}

#[tokio::test]
async fn test_health_and_bad_input() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], true);

    let (status, body) = app.get("/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], true);

    let (status, body) = app.get("/api/posts/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = app.get("/api/upstream/unknown/anything", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refresh_issues_a_working_token() {
    let app = TestApp::new().await;
    let (token, user_id) = app.register("erin").await;

    let (status, _) = app.request(Method::POST, "/api/auth/refresh", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.request(Method::POST, "/api/auth/refresh", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["id"], user_id);
    assert!(body["data"]["expires_at"].as_str().is_some());
    let refreshed = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = app.get("/api/auth/me", Some(&refreshed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "erin");
}

#[tokio::test]
async fn test_chat_history_pages_with_before() {
    let app = TestApp::new().await;
    let (owner, _) = app.register("host").await;

    let (_, body) = app
        .post("/api/chat/rooms", Some(&owner), json!({ "name": "backlog" }))
        .await;
    let room_id = body["data"]["id"].as_str().unwrap().to_string();
    let messages = format!("/api/chat/rooms/{}/messages", room_id);

    for i in 0..5 {
        let (status, _) = app
            .post(&messages, Some(&owner), json!({ "content": format!("m{}", i) }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let mut seen = Vec::new();
    let mut uri = format!("{}?limit=2", messages);
    loop {
        let (status, body) = app.get(&uri, Some(&owner)).await;
        assert_eq!(status, StatusCode::OK);
        let page = body["data"].as_array().unwrap().clone();
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= 2);
        for message in &page {
            seen.push(message["content"].as_str().unwrap().to_string());
        }
        let oldest = page.last().unwrap()["created_at"].as_str().unwrap().to_string();
        uri = format!("{}?limit=2&before={}", messages, oldest);
    }

    assert_eq!(seen, vec!["m4", "m3", "m2", "m1", "m0"]);
}

#[tokio::test]
async fn test_feed_pages_with_before() {
    let app = TestApp::new().await;
    let (author, _) = app.register("poster").await;

    for i in 0..4 {
        let (status, _) = app
            .post("/api/posts", Some(&author), json!({ "content": format!("p{}", i) }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = app.get("/api/posts?limit=3", None).await;
    let first: Vec<_> = body["data"].as_array().unwrap().iter().map(|p| p["content"].clone()).collect();
    assert_eq!(first, vec![json!("p3"), json!("p2"), json!("p1")]);

    let oldest = body["data"][2]["created_at"].as_str().unwrap().to_string();
    let (status, body) = app.get(&format!("/api/posts?limit=3&before={}", oldest), None).await;
    assert_eq!(status, StatusCode::OK);
    let rest: Vec<_> = body["data"].as_array().unwrap().iter().map(|p| p["content"].clone()).collect();
    assert_eq!(rest, vec![json!("p0")]);
}

#[tokio::test]
async fn test_comment_removal_rights() {
    let app = TestApp::new().await;
    let (author, _) = app.register("blogger").await;
    let (commenter, _) = app.register("commenter").await;
    let (stranger, _) = app.register("stranger").await;

    let (_, body) = app
        .post("/api/posts", Some(&author), json!({ "content": "thoughts?" }))
        .await;
    let post_id = body["data"]["id"].as_str().unwrap().to_string();

    let mut comment_ids = Vec::new();
    for text in ["first", "second"] {
        let (status, body) = app
            .post(
                &format!("/api/posts/{}/comments", post_id),
                Some(&commenter),
                json!({ "content": text }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        comment_ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/comments/{}", comment_ids[0]), Some(&stranger), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Post author removes someone else's comment.
    let (status, _) = app
        .request(Method::DELETE, &format!("/api/comments/{}", comment_ids[0]), Some(&author), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/comments/{}", comment_ids[1]), Some(&commenter), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/comments/{}", comment_ids[0]), Some(&author), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get(&format!("/api/posts/{}", post_id), None).await;
    assert_eq!(body["data"]["comment_count"], 0);
}
