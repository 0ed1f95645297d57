mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE}, Request, StatusCode},
};
use futures_util::future::AbortHandle;
use serde_json::json;
use tower::ServiceExt;
use turboform::{
    chat::{ChatClient, ChatError, Phase, ReplyMode, Role},
    session::SessionContext,
};

use common::{body_json, dead_url, fake_backend, spawn, test_app};

const TOKEN: &str = "Bearer secret-token";

fn signed_in() -> SessionContext {
    SessionContext::registered("google.com:42", Some("secret-token".to_owned()))
}

fn chat_turn() -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri("/api/chat/form-responses")
        .header(CONTENT_TYPE, "application/json")
}

#[tokio::test]
async fn missing_bearer_is_rejected_before_forwarding() {
    let backend = fake_backend().await;
    let (app, _pool) = test_app(&backend.url).await;

    let request = chat_turn()
        .body(Body::from(json!({ "formId": "f1", "message": "hi" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for uri in ["/api/chat/conversations/f1", "/api/chat/conversation/c1/messages"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::UNAUTHORIZED);
    }
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/chat/conversation/c1")
        .header(AUTHORIZATION, "Bearer ")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn blank_fields_are_rejected_before_forwarding() {
    let backend = fake_backend().await;
    let (app, _pool) = test_app(&backend.url).await;

    for body in [json!({ "formId": "", "message": "hi" }), json!({ "formId": "f1", "message": "  " })] {
        let request = chat_turn()
            .header(AUTHORIZATION, TOKEN)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn streaming_turn_is_piped_through() {
    let backend = fake_backend().await;
    let (app, _pool) = test_app(&backend.url).await;

    let request = chat_turn()
        .header(AUTHORIZATION, TOKEN)
        .header(ACCEPT, "text/event-stream")
        .body(Body::from(json!({ "formId": "f1", "message": "hi", "conversationId": "" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(std::str::from_utf8(&bytes).unwrap().ends_with("{\"isComplete\":true,\"conversationId\":\"c1\"}\n\n"));

    let seen = backend.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].authorization.as_deref(), Some(TOKEN));
    assert_eq!(seen[0].accept.as_deref(), Some("text/event-stream"));
    // a blank conversation id is not forwarded
    assert_eq!(seen[0].body, Some(json!({ "formId": "f1", "message": "hi" })));
}

#[tokio::test]
async fn buffered_turn_is_relayed_verbatim() {
    let backend = fake_backend().await;
    let (app, _pool) = test_app(&backend.url).await;

    let request = chat_turn()
        .header(AUTHORIZATION, TOKEN)
        .body(Body::from(json!({ "formId": "f1", "message": "hi", "conversationId": "c7" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "response": "echo: hi", "conversationId": "c7" }));
}

#[tokio::test]
async fn conversation_routes_relay_status_and_body() {
    let backend = fake_backend().await;
    let (app, _pool) = test_app(&backend.url).await;

    let get = |uri: &str| {
        Request::builder().uri(uri).header(AUTHORIZATION, TOKEN).body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(get("/api/chat/conversations/f1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await[0]["id"], json!("c1"));

    let response = app.clone().oneshot(get("/api/chat/conversations/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({ "error": "form not found" }));

    let response = app.clone().oneshot(get("/api/chat/conversation/c1/messages")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await[1]["content"], json!("Hello"));

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/chat/conversation/c1")
        .header(AUTHORIZATION, TOKEN)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());

    let paths: Vec<String> = backend.requests().into_iter().map(|seen| seen.path).collect();
    assert_eq!(
        paths,
        vec![
            "/chat/conversations/f1",
            "/chat/conversations/missing",
            "/chat/conversation/c1/messages",
            "/chat/conversation/c1",
        ]
    );
    assert!(backend.requests().iter().all(|seen| seen.authorization.as_deref() == Some(TOKEN)));
}

#[tokio::test]
async fn unreachable_backend_is_a_server_error() {
    let (app, _pool) = test_app(&dead_url().await).await;

    let request = Request::builder()
        .uri("/api/chat/conversations/f1")
        .header(AUTHORIZATION, TOKEN)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].is_string());
}

async fn relay() -> (String, common::FakeBackend) {
    let backend = fake_backend().await;
    let (app, _pool) = test_app(&backend.url).await;
    (spawn(app).await, backend)
}

#[tokio::test]
async fn client_streams_a_reply_into_one_message() {
    let (relay_url, backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    client.send("hi", ReplyMode::Streaming, None).await.unwrap();

    let state = client.state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[1].role, Role::Assistant);
    assert_eq!(state.messages[1].content, "Hello");
    assert_eq!(state.conversation_id.as_deref(), Some("c1"));
    assert_eq!(state.notice, None);

    // the adopted id is passed on the next turn
    client.send("more", ReplyMode::Buffered, None).await.unwrap();
    assert_eq!(client.state().messages[3].content, "echo: more");
    let seen = backend.requests();
    assert_eq!(seen[1].body.as_ref().unwrap()["conversationId"], json!("c1"));
}

#[tokio::test]
async fn client_reassembles_frames_split_across_chunks() {
    let (relay_url, _backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    client.send("split", ReplyMode::Streaming, None).await.unwrap();
    assert_eq!(client.state().messages[1].content, "Hello");
    assert_eq!(client.state().conversation_id.as_deref(), Some("c3"));
}

#[tokio::test]
async fn client_reads_frames_separated_by_single_newlines() {
    let (relay_url, _backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    client.send("compact", ReplyMode::Streaming, None).await.unwrap();
    assert_eq!(client.state().messages.len(), 2);
    assert_eq!(client.state().messages[1].content, "Hello");
    assert_eq!(client.state().conversation_id.as_deref(), Some("c4"));
}

#[tokio::test]
async fn client_skips_malformed_frames() {
    let (relay_url, _backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    client.send("garbled", ReplyMode::Streaming, None).await.unwrap();
    assert_eq!(client.state().messages[1].content, "Hello");
    assert_eq!(client.state().conversation_id.as_deref(), Some("c2"));
}

#[tokio::test]
async fn dropped_stream_rolls_the_turn_back() {
    let (relay_url, _backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    let err = client.send("drop", ReplyMode::Streaming, None).await.unwrap_err();
    assert!(matches!(err, ChatError::Incomplete));

    let state = client.state();
    assert_eq!(state.phase, Phase::Idle);
    assert!(state.messages.is_empty());
    assert_eq!(state.conversation_id, None);
    assert_eq!(state.draft, "drop");
    assert!(state.notice.is_some());
}

#[tokio::test]
async fn error_frame_fails_the_turn() {
    let (relay_url, _backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    let err = client.send("fail", ReplyMode::Streaming, None).await.unwrap_err();
    assert!(matches!(err, ChatError::Remote(ref msg) if msg == "model overloaded"));
    assert!(client.state().messages.is_empty());
}

#[tokio::test]
async fn network_failure_restores_the_input() {
    let mut client = ChatClient::new(&dead_url().await, "f1", signed_in()).unwrap();
    client.set_draft("what do people dislike?");

    let err = client
        .send("what do people dislike?", ReplyMode::Streaming, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Network(_)));

    let state = client.state();
    assert_eq!(state.phase, Phase::Idle);
    assert!(state.messages.is_empty());
    assert_eq!(state.draft, "what do people dislike?");
    assert!(state.notice.is_some());
}

#[tokio::test]
async fn client_without_token_never_calls_out() {
    let (relay_url, backend) = relay().await;
    let anonymous = SessionContext::anonymous();
    let mut client = ChatClient::new(&relay_url, "f1", anonymous).unwrap();

    let err = client.send("hi", ReplyMode::Streaming, None).await.unwrap_err();
    assert!(matches!(err, ChatError::Unauthorized));
    assert_eq!(client.state().draft, "hi");
    assert!(backend.requests().is_empty());

    assert!(matches!(client.send("  ", ReplyMode::Streaming, None).await, Err(ChatError::EmptyMessage)));
}

#[tokio::test]
async fn aborting_discards_the_partial_reply() {
    let (relay_url, _backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    let (handle, registration) = AbortHandle::new_pair();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();
    });

    let err = client.send("hang", ReplyMode::Streaming, Some(registration)).await.unwrap_err();
    assert!(matches!(err, ChatError::Aborted));

    let state = client.state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].role, Role::User);
    assert_eq!(state.notice, None);
}

#[tokio::test]
async fn deleting_the_open_conversation_clears_it() {
    let (relay_url, _backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    let conversations = client.list_conversations().await.unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].title.as_deref(), Some("Response trends"));
    assert_eq!(conversations[0].extra["formId"], json!("f1"));

    client.load_conversation("c1").await.unwrap();
    assert_eq!(client.state().conversation_id.as_deref(), Some("c1"));
    assert_eq!(client.state().messages.len(), 2);

    client.delete_conversation("c9").await.unwrap();
    assert_eq!(client.state().messages.len(), 2);

    client.delete_conversation("c1").await.unwrap();
    assert!(client.state().messages.is_empty());
    assert_eq!(client.state().conversation_id, None);
}

#[tokio::test]
async fn new_chat_starts_a_fresh_conversation() {
    let (relay_url, backend) = relay().await;
    let mut client = ChatClient::new(&relay_url, "f1", signed_in()).unwrap();

    client.send("hi", ReplyMode::Streaming, None).await.unwrap();
    client.new_chat();
    assert!(client.state().messages.is_empty());

    client.send("again", ReplyMode::Buffered, None).await.unwrap();
    let seen = backend.requests();
    assert!(seen[1].body.as_ref().unwrap().get("conversationId").is_none());
    assert_eq!(client.state().conversation_id.as_deref(), Some("c-buffered"));
}
