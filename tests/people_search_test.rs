use httpmock::prelude::*;
use people_search::{config::AppConfig, people_search, user::NO_RESULTS_ANSWER};
use serde_json::{Value, json};
use std::fs;
use tempfile::TempDir;

fn chat_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
            "logprobs": null
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn config(server: &MockServer) -> AppConfig {
    AppConfig {
        api_key: "test-key".into(),
        api_base: server.base_url(),
        ..Default::default()
    }
}

fn profiles() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ada.txt"),
        "Ada Lovelace, Rust engineer in London. ada@example.com",
    )
    .unwrap();
    fs::write(dir.path().join("notes.csv"), "not,a,profile").unwrap();
    dir
}

/// Mocks embeddings and profile extraction; every text embeds to the same vector.
async fn mock_ingest(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "object": "list",
                    "data": [{"object": "embedding", "index": 0, "embedding": [0.6, 0.8]}],
                    "model": "text-embedding-3-large",
                    "usage": {"prompt_tokens": 4, "total_tokens": 4}
                }));
        })
        .await;

    let extracted = json!({
        "id": null,
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "role": "Rust Engineer",
        "location": "London",
        "skills": ["Rust"],
        "previousCompanies": null,
        "interests": null,
        "experience": null
    });
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_includes("\"name\":\"user\"");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(chat_body(&extracted.to_string()));
        })
        .await
}

async fn mock_relevancy<'a>(server: &'a MockServer, verdict: &str) -> httpmock::Mock<'a> {
    let content = json!({ "relevancy": verdict }).to_string();
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_includes("user_relevancy");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(chat_body(&content));
        })
        .await
}

#[tokio::test]
async fn ingest_then_search_end_to_end() {
    let server = MockServer::start_async().await;
    let extraction = mock_ingest(&server).await;
    let relevancy = mock_relevancy(&server, "HIGH").await;
    let explanation = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_includes("In one or two sentences");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(chat_body("Ada writes Rust in London."));
        })
        .await;
    let answer = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_includes("Your response:");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(chat_body("Ada Lovelace is your best match."));
        })
        .await;

    let dir = profiles();
    let ps = people_search(&config(&server)).unwrap();

    let synced = ps.sync_plain_text(dir.path()).await.unwrap();
    assert_eq!(synced.plain_text, 1);
    assert_eq!(synced.total, 1);
    assert_eq!(synced.failed, 0);
    extraction.assert_async().await;

    let outcome = ps.search("Rust engineers in London").await.unwrap();
    relevancy.assert_async().await;
    explanation.assert_async().await;
    answer.assert_async().await;

    assert_eq!(outcome.total_found, 1);
    assert_eq!(outcome.final_answer, "Ada Lovelace is your best match.");
    let hit = &outcome.results[0];
    assert_eq!(hit.name, "Ada Lovelace");
    assert_eq!(hit.email.as_deref(), Some("ada@example.com"));
    assert_eq!(hit.skills, vec!["Rust"]);
    assert_eq!(hit.match_score, 100);
    assert_eq!(hit.match_reason, "Ada writes Rust in London.");
    assert!(hit.description.contains("Description: Ada Lovelace, Rust engineer"));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["totalFound"], 1);
    assert_eq!(json["results"][0]["matchScore"], 100);
}

#[tokio::test]
async fn low_relevancy_hits_are_dropped() {
    let server = MockServer::start_async().await;
    mock_ingest(&server).await;
    mock_relevancy(&server, "LOW").await;
    let answer = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_includes("Your response:");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(chat_body("unused"));
        })
        .await;

    let dir = profiles();
    let ps = people_search(&config(&server)).unwrap();
    ps.sync_plain_text(dir.path()).await.unwrap();

    let outcome = ps.search("pastry chefs").await.unwrap();
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.final_answer, NO_RESULTS_ANSWER);
    answer.assert_hits_async(0).await;
}

#[tokio::test]
async fn api_failure_during_extraction_is_counted() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(400)
                .header("content-type", "application/json")
                .json_body(json!({
                    "error": {"message": "bad request", "type": "invalid_request_error", "param": null, "code": null}
                }));
        })
        .await;

    let dir = profiles();
    let ps = people_search(&config(&server)).unwrap();
    let synced = ps.sync_plain_text(dir.path()).await.unwrap();
    assert_eq!(synced.plain_text, 0);
    assert_eq!(synced.failed, 1);
    assert!(ps.users().all_users().await.is_empty());
}
