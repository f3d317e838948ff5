mod common;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{script, spawn_app, test_state, LlmMode};

const EIFFEL: &str = "The Eiffel Tower stands in Paris.";

async fn new_session(client: &reqwest::Client, base: &str) -> String {
    let res = client.post(format!("{base}/sessions")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

fn pdf_form(name: &str, contents: &str) -> Form {
    Form::new().part(
        "file",
        Part::bytes(contents.as_bytes().to_vec()).file_name(name.to_string()),
    )
}

async fn session_view(client: &reqwest::Client, base: &str, id: &str) -> Value {
    client
        .get(format!("{base}/sessions/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn upload_ask_and_reset() {
    let (state, _) = test_state(script(&["Par", "is is", " the capital."]));
    let base = spawn_app(state).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let res = client
        .post(format!("{base}/sessions/{id}/documents"))
        .header("x-api-key", "user-key")
        .multipart(pdf_form("tower.pdf", EIFFEL))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let results: Value = res.json().await.unwrap();
    assert_eq!(results[0]["status"], "ready");
    assert_eq!(results[0]["outcome"]["reused"], false);

    let preview = client
        .get(format!("{base}/sessions/{id}/preview"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(preview.contains("data:application/pdf;base64,"));

    let answer = client
        .post(format!("{base}/sessions/{id}/prompt"))
        .json(&json!({ "prompt": "What is the capital?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(answer.status(), StatusCode::OK);
    assert_eq!(answer.text().await.unwrap(), "Paris is the capital.");

    let view = session_view(&client, &base, &id).await;
    assert_eq!(view["state"], "ready");
    assert_eq!(view["active_file"], "tower.pdf");
    assert_eq!(
        view["transcript"],
        json!([
            { "role": "user", "content": "What is the capital?" },
            { "role": "assistant", "content": "Paris is the capital." },
        ])
    );

    let res = client
        .post(format!("{base}/sessions/{id}/reset"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let view = session_view(&client, &base, &id).await;
    assert_eq!(view["transcript"], json!([]));
    assert_eq!(view["cached_engines"], 1);
    assert_eq!(view["state"], "ready");
}

#[tokio::test]
async fn unsupported_upload_is_rejected_without_caching() {
    let (state, _) = test_state(LlmMode::Echo);
    let base = spawn_app(state).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let res = client
        .post(format!("{base}/sessions/{id}/documents"))
        .multipart(pdf_form("notes.txt", EIFFEL))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unsupported_file_type");

    let view = session_view(&client, &base, &id).await;
    assert_eq!(view["cached_engines"], 0);
    assert_eq!(view["state"], "idle");
}

#[tokio::test]
async fn mixed_uploads_report_each_file() {
    let (state, _) = test_state(LlmMode::Echo);
    let base = spawn_app(state).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let form = pdf_form("tower.pdf", EIFFEL).part(
        "file",
        Part::bytes(b"hello".to_vec()).file_name("notes.txt"),
    );
    let res = client
        .post(format!("{base}/sessions/{id}/documents"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let results: Value = res.json().await.unwrap();
    assert_eq!(results[0]["status"], "ready");
    assert_eq!(results[1]["status"], "failed");
    assert_eq!(results[1]["error_kind"], "unsupported_file_type");
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let (state, _) = test_state(LlmMode::Echo);
    let base = spawn_app(state).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let res = client
        .post(format!("{base}/sessions/{id}/documents"))
        .multipart(Form::new().text("api_key", "user-key"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "no_file");
}

#[tokio::test]
async fn prompt_errors_are_reported() {
    let (state, _) = test_state(LlmMode::Echo);
    let base = spawn_app(state).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let res = client
        .post(format!("{base}/sessions/{id}/prompt"))
        .json(&json!({ "prompt": "Anything?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_ready");

    client
        .post(format!("{base}/sessions/{id}/documents"))
        .multipart(pdf_form("tower.pdf", EIFFEL))
        .send()
        .await
        .unwrap();

    let res = client
        .post(format!("{base}/sessions/{id}/prompt"))
        .json(&json!({ "prompt": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "empty_question");

    let view = session_view(&client, &base, &id).await;
    assert_eq!(view["transcript"], json!([]));
}

#[tokio::test]
async fn deleted_and_unknown_sessions_are_not_found() {
    let (state, _) = test_state(LlmMode::Echo);
    let base = spawn_app(state).await;
    let client = reqwest::Client::new();
    let id = new_session(&client, &base).await;

    let res = client
        .delete(format!("{base}/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(format!("{base}/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{base}/sessions/{}/reset", uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
