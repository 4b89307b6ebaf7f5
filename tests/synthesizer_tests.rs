use axum::{Json, Router, http::StatusCode, routing::post};
use parking_lot::Mutex;
use schema_mock::GenerationError;
use schema_mock::config::LlmConfig;
use schema_mock::extract::Strategy;
use schema_mock::llm::OllamaClient;
use schema_mock::schema::EndpointSchema;
use schema_mock::synthesizer::ResponseSynthesizer;
use serde_json::{Value, json};
use std::sync::Arc;

use test_utils::{StubGenerator, unreachable_client, user_schema};

#[tokio::test]
async fn test_well_formed_json_is_returned_unchanged() {
    let reply = r#"{"name": "Ada Lovelace", "age": 36, "active": false, "role": "admin"}"#;
    let synthesizer = ResponseSynthesizer::new(StubGenerator::replying(reply));

    let value = synthesizer.generate(&user_schema(), &json!({ "id": "1" })).await;
    assert_eq!(
        value,
        json!({ "name": "Ada Lovelace", "age": 36, "active": false, "role": "admin" })
    );
}

#[tokio::test]
async fn test_json_wrapped_in_prose() {
    let synthesizer =
        ResponseSynthesizer::new(StubGenerator::replying("Sure! Here is the JSON: {\"x\":1}"));
    let value = synthesizer.generate(&user_schema(), &json!({})).await;
    assert_eq!(value, json!({ "x": 1 }));
}

#[tokio::test]
async fn test_bare_array_reply() {
    let synthesizer = ResponseSynthesizer::new(StubGenerator::replying("[1,2,3]"));
    let value = synthesizer.generate(&user_schema(), &json!({})).await;
    assert_eq!(value, json!([1, 2, 3]));
}

#[tokio::test]
async fn test_service_failure_uses_fallback() {
    let synthesizer = ResponseSynthesizer::new(StubGenerator::failing());
    let schema = EndpointSchema::new("GET", "/things").with_response_schema(json!({
        "a": "string",
        "b": "number",
        "c": { "enum": ["X", "Y"] }
    }));

    let value = synthesizer.generate(&schema, &json!({})).await;
    assert_eq!(value, json!({ "a": "sample_a", "b": 123, "c": "X" }));
}

#[tokio::test]
async fn test_reply_without_json_uses_fallback() {
    let synthesizer =
        ResponseSynthesizer::new(StubGenerator::replying("I'm sorry, I can't do that."));
    let schema =
        EndpointSchema::new("GET", "/items").with_response_schema(json!({ "properties": { "id": "number" } }));

    let value = synthesizer.generate(&schema, &json!({})).await;
    assert_eq!(value, json!({ "id": 123 }));
}

#[tokio::test]
async fn test_unparseable_candidate_uses_fallback() {
    let synthesizer = ResponseSynthesizer::new(StubGenerator::replying("{name: Ada, age: }"));
    let value = synthesizer.generate(&user_schema(), &json!({})).await;
    assert_eq!(
        value,
        json!({ "name": "sample_name", "age": 123, "active": true, "role": "admin" })
    );
}

#[tokio::test]
async fn test_missing_response_schema_yields_error_payload() {
    let synthesizer = ResponseSynthesizer::new(StubGenerator::failing());
    let value = synthesizer
        .generate(&EndpointSchema::new("DELETE", "/sessions"), &json!({}))
        .await;
    assert_eq!(
        value,
        json!({ "error": "Failed to generate mock response from LLM." })
    );
}

#[tokio::test]
async fn test_unreachable_service_uses_fallback() {
    let synthesizer = ResponseSynthesizer::new(Arc::new(unreachable_client()));
    let value = synthesizer.generate(&user_schema(), &json!({ "id": "1" })).await;
    assert_eq!(
        value,
        json!({ "name": "sample_name", "age": 123, "active": true, "role": "admin" })
    );
}

#[tokio::test]
async fn test_prompt_reaches_generator() {
    let generator = StubGenerator::replying("{}");
    let synthesizer = ResponseSynthesizer::new(generator.clone());
    synthesizer
        .generate(&user_schema(), &json!({ "id": "42" }))
        .await;

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("A single user profile"));
    assert!(prompts[0].contains("\"id\": \"42\""));
    assert!(prompts[0].contains("\"role\""));
}

#[tokio::test]
async fn test_custom_strategy_order() {
    // Only the line strategy is active, so the leading prose is skipped line-wise
    let synthesizer = ResponseSynthesizer::new(StubGenerator::replying(
        "Here it is:\n{\"ok\": true}",
    ))
    .with_strategies(vec![Strategy::LeadingLine]);
    assert_eq!(synthesizer.extractor().strategies(), &[Strategy::LeadingLine]);

    let value = synthesizer.generate(&user_schema(), &json!({})).await;
    assert_eq!(value, json!({ "ok": true }));
}

#[tokio::test]
async fn test_try_generate_reports_failure() {
    let synthesizer = ResponseSynthesizer::new(StubGenerator::replying("no json here"));
    let result = synthesizer.try_generate(&user_schema(), &json!({})).await;
    assert!(matches!(
        result,
        Err(schema_mock::GenerationError::NoJsonFound)
    ));
}

#[tokio::test]
async fn test_array_of_objects_reply_is_kept_whole() {
    let synthesizer = ResponseSynthesizer::new(StubGenerator::replying(
        "Here are two users:\n[{\"id\": 1}, {\"id\": 2}]",
    ));
    let value = synthesizer.generate(&user_schema(), &json!({})).await;
    assert_eq!(value, json!([{ "id": 1 }, { "id": 2 }]));

    let bare = ResponseSynthesizer::new(StubGenerator::replying(r#"[{"id":1},{"id":2}]"#));
    let value = bare.generate(&user_schema(), &json!({})).await;
    assert_eq!(value, json!([{ "id": 1 }, { "id": 2 }]));
}

/// Serve a canned `/api/generate` reply on a free local port, recording request bodies
async fn spawn_llm(status: StatusCode, reply: Value) -> (OllamaClient, Arc<Mutex<Vec<Value>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let router = Router::new().route(
        "/api/generate",
        post(move |Json(body): Json<Value>| {
            let recorded = recorded.clone();
            let reply = reply.clone();
            async move {
                recorded.lock().push(body);
                (status, Json(reply))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let client = OllamaClient::new(&LlmConfig {
        host: format!("http://{addr}"),
        model: "llama3".to_string(),
        timeout_secs: Some(5),
    })
    .expect("Failed to build client");
    (client, requests)
}

#[tokio::test]
async fn test_ollama_request_and_response_field() {
    let (client, requests) = spawn_llm(
        StatusCode::OK,
        json!({
            "model": "llama3",
            "response": "Here you go: {\"name\": \"Ada\", \"age\": 36}",
            "done": true
        }),
    )
    .await;
    let synthesizer = ResponseSynthesizer::new(Arc::new(client));

    let value = synthesizer
        .generate(&user_schema(), &json!({ "id": "7" }))
        .await;
    assert_eq!(value, json!({ "name": "Ada", "age": 36 }));

    let requests = requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["model"], "llama3");
    assert_eq!(requests[0]["stream"], false);
    let prompt = requests[0]["prompt"].as_str().expect("prompt should be a string");
    assert!(prompt.contains("GET /users/:id"));
    assert!(prompt.contains("\"id\": \"7\""));
}

#[tokio::test]
async fn test_ollama_error_status_uses_fallback() {
    let (client, _) = spawn_llm(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({ "error": "model not loaded" }),
    )
    .await;
    let synthesizer = ResponseSynthesizer::new(Arc::new(client));

    match synthesizer.try_generate(&user_schema(), &json!({})).await {
        Err(GenerationError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 503);
            assert!(body.contains("model not loaded"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }

    let value = synthesizer.generate(&user_schema(), &json!({})).await;
    assert_eq!(
        value,
        json!({ "name": "sample_name", "age": 123, "active": true, "role": "admin" })
    );
}

#[tokio::test]
async fn test_ollama_body_without_response_uses_fallback() {
    let (client, _) = spawn_llm(StatusCode::OK, json!({ "done": true })).await;
    let synthesizer = ResponseSynthesizer::new(Arc::new(client));

    assert!(matches!(
        synthesizer.try_generate(&user_schema(), &json!({})).await,
        Err(GenerationError::MalformedBody(_))
    ));

    let value = synthesizer.generate(&user_schema(), &json!({})).await;
    assert_eq!(
        value,
        json!({ "name": "sample_name", "age": 123, "active": true, "role": "admin" })
    );
}
