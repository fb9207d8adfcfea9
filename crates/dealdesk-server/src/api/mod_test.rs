use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use dealdesk_ai::RetryPolicy;
use dealdesk_store::MemoryStore;
use futures::StreamExt;
use rust_decimal::Decimal;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

const GENERATE_PATH: &str = "/v1beta/models/test-model:generateContent";

fn test_state(ai_base_url: &str) -> AppState {
    let ai = GenerativeClient::with_base_url("test-key", "test-model", 10, ai_base_url)
        .expect("client")
        .with_retry_policy(RetryPolicy::new(1, Duration::ZERO));
    AppState::new(Arc::new(MemoryStore::new()), ai, "test-app", None)
}

fn test_app(ai_base_url: &str) -> Router {
    build_app(
        test_state(ai_base_url),
        AuthState::disabled(),
        default_rate_limit_state(),
    )
}

fn text_envelope(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [ { "content": { "parts": [ { "text": text } ] } } ]
    })
}

fn analysis_text() -> String {
    serde_json::json!({
        "summary": "Good flip",
        "offerRange": "$150k-$170k",
        "buyerProfiles": ["Flipper"],
        "sellerOutreachAngles": ["Fast close"],
        "dueDiligenceChecklist": ["Roof", "Title"]
    })
    .to_string()
}

fn request(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(req).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("json parse")
    };
    (status, json)
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("conflict", StatusCode::CONFLICT),
        ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
        ("malformed_response", StatusCode::BAD_GATEWAY),
        ("upstream_unavailable", StatusCode::SERVICE_UNAVAILABLE),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, expected) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), expected, "code {code}");
    }
}

#[test]
fn exhausted_rate_limits_map_to_rate_limited() {
    let error = AiError::ExhaustedRetries {
        attempts: 5,
        last: Box::new(AiError::RateLimited),
    };
    assert_eq!(map_ai_error("r".into(), &error).error.code, "rate_limited");

    let error = AiError::ExhaustedRetries {
        attempts: 5,
        last: Box::new(AiError::Transient("HTTP 503".into())),
    };
    assert_eq!(
        map_ai_error("r".into(), &error).error.code,
        "upstream_unavailable"
    );
}

#[test]
fn store_errors_map_to_client_codes() {
    let not_found = StoreError::NotFound {
        collection: dealdesk_store::Collection::Ideas,
        id: "x".into(),
    };
    assert_eq!(map_store_error("r".into(), &not_found).error.code, "not_found");
    assert_eq!(
        map_store_error("r".into(), &StoreError::Validation("bad".into()))
            .error
            .code,
        "validation_error"
    );
    assert_eq!(
        map_store_error("r".into(), &StoreError::NotAuthenticated)
            .error
            .code,
        "unauthorized"
    );
}

#[tokio::test]
async fn health_reports_memory_store() {
    let app = test_app("http://127.0.0.1:9");
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "req-health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("req-health")
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["data"]["store"], "memory");
    assert_eq!(json["meta"]["request_id"], "req-health");
}

#[tokio::test]
async fn protected_routes_require_a_configured_token() {
    let auth = AuthState::from_keys(["secret".to_owned()], false).expect("auth");
    let app = build_app(
        test_state("http://127.0.0.1:9"),
        auth,
        default_rate_limit_state(),
    );

    let (status, json) = send(&app, request("GET", "/api/v1/leads", "wrong", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");

    let (status, _) = send(&app, request("GET", "/api/v1/leads", "secret", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn roi_calculator_returns_exact_profit() {
    let app = test_app("http://127.0.0.1:9");
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/calculator/roi",
            "alice",
            Some(serde_json::json!({
                "purchase_price": "100000",
                "sale_price": "150000",
                "closing_costs": "5000",
                "rehab_costs": "10000",
                "holding_costs": "2000"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let profit: Decimal = json["data"]["profit"]
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal");
    assert_eq!(profit, Decimal::from(33_000));
    let roi: Decimal = json["data"]["roi_percent"]
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal");
    assert_eq!(roi.round_dp(2), Decimal::new(2821, 2));
}

#[tokio::test]
async fn roi_calculator_rejects_out_of_range_figures() {
    let app = test_app("http://127.0.0.1:9");
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/calculator/roi",
            "alice",
            Some(serde_json::json!({
                "purchase_price": "0.0000000000000000000000000001",
                "sale_price": "79228162514264337593543950335"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
    assert!(json["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("out of range")));
}

#[tokio::test]
async fn import_update_and_delete_round_trip() {
    let app = test_app("http://127.0.0.1:9");

    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/leads/import-county",
            "alice",
            Some(serde_json::json!({
                "records": [
                    { "address": "12 Elm St", "taxAmount": "1843.20", "propertyType": "SFR",
                      "latitude": 33.4, "longitude": -112.0 },
                    { "address": "9 Oak Ave", "taxAmount": "920", "propertyType": "Duplex" }
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["imported"], 2);
    let id = json["data"]["lead_ids"][0]
        .as_str()
        .expect("lead id")
        .to_owned();

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/leads/{id}/status"),
            "alice",
            Some(serde_json::json!({ "status": "Offer Made" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(
        &app,
        request("GET", "/api/v1/leads?status=offer%20made", "alice", None),
    )
    .await;
    let leads = json["data"].as_array().expect("leads");
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["source"], "county");
    assert_eq!(leads[0]["status"], "Offer Made");

    let (_, json) = send(&app, request("GET", "/api/v1/dashboard", "alice", None)).await;
    assert_eq!(json["data"]["total_leads"], 2);
    assert_eq!(json["data"]["county_leads"], 2);
    assert_eq!(json["data"]["pins"].as_array().map(Vec::len), Some(1));

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/v1/leads/{id}"), "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/v1/leads/{id}"), "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "delete is idempotent");

    let (_, json) = send(&app, request("GET", "/api/v1/leads", "alice", None)).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn leads_are_scoped_to_the_bearer_identity() {
    let app = test_app("http://127.0.0.1:9");
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/v1/leads/import-county",
            "alice",
            Some(serde_json::json!({
                "records": [ { "address": "1 Main St", "taxAmount": "100", "propertyType": "SFR" } ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = send(&app, request("GET", "/api/v1/leads", "bob", None)).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let app = test_app("http://127.0.0.1:9");

    let (status, json) = send(
        &app,
        request(
            "PATCH",
            "/api/v1/leads/missing/status",
            "alice",
            Some(serde_json::json!({ "status": "Sold" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");

    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/contacts",
            "alice",
            Some(serde_json::json!({ "seller_name": "  " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/v1/analysis",
            "alice",
            Some(serde_json::json!({ "property_details": "1 Main St", "latitude": 1.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            "GET",
            "/api/v1/leads?status=archived",
            "alice",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/v1/leads/import-county",
            "alice",
            Some(serde_json::json!({ "records": [] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn contacts_create_list_and_delete() {
    let app = test_app("http://127.0.0.1:9");
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/contacts",
            "alice",
            Some(serde_json::json!({
                "seller_name": "Pat Seller",
                "seller_phone": "555-0100",
                "seller_email": " "
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = json["data"]["id"].as_str().expect("id").to_owned();

    let (_, json) = send(&app, request("GET", "/api/v1/contacts", "alice", None)).await;
    let contacts = json["data"].as_array().expect("contacts");
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0]["sellerName"], "Pat Seller");
    assert!(contacts[0]["sellerEmail"].is_null());

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/v1/contacts/{id}"), "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = send(&app, request("GET", "/api/v1/contacts", "alice", None)).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn analysis_with_save_persists_a_lead() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(text_envelope(&format!("```json\n{}\n```", analysis_text()))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/analysis",
            "alice",
            Some(serde_json::json!({
                "property_details": "3bd/2ba ranch, needs roof",
                "latitude": 33.45,
                "longitude": -112.07,
                "save": true
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["analysis"]["offerRange"], "$150k-$170k");
    let lead_id = json["data"]["lead_id"].as_str().expect("lead id").to_owned();

    let (_, json) = send(&app, request("GET", "/api/v1/leads", "alice", None)).await;
    let leads = json["data"].as_array().expect("leads");
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["id"], lead_id.as_str());
    assert_eq!(leads[0]["status"], "New");
    assert_eq!(leads[0]["source"], "ai");
    let stored: serde_json::Value =
        serde_json::from_str(leads[0]["generatedResults"].as_str().expect("results"))
            .expect("stored analysis json");
    assert_eq!(stored["summary"], "Good flip");
}

#[tokio::test]
async fn generate_saves_every_returned_lead() {
    let server = MockServer::start().await;
    let batch = serde_json::json!([
        {
            "propertyDetails": "Lead one",
            "latitude": 30.1,
            "longitude": -97.7,
            "generatedResults": serde_json::from_str::<serde_json::Value>(&analysis_text()).expect("json")
        },
        {
            "propertyDetails": "Lead two",
            "latitude": 30.2,
            "longitude": -97.8,
            "generatedResults": serde_json::from_str::<serde_json::Value>(&analysis_text()).expect("json")
        }
    ]);
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_envelope(&batch.to_string())))
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let (status, json) = send(
        &app,
        request("POST", "/api/v1/leads/generate?count=2", "alice", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["requested"], 2);
    assert_eq!(json["data"]["lead_ids"].as_array().map(Vec::len), Some(2));

    let (_, json) = send(&app, request("GET", "/api/v1/dashboard", "alice", None)).await;
    assert_eq!(json["data"]["analyzed_leads"], 2);
    assert_eq!(json["data"]["pins"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn generated_batch_with_a_blank_lead_saves_nothing() {
    let server = MockServer::start().await;
    let analysis = serde_json::from_str::<serde_json::Value>(&analysis_text()).expect("json");
    let batch = serde_json::json!([
        {
            "propertyDetails": "Lead one",
            "latitude": 30.1,
            "longitude": -97.7,
            "generatedResults": analysis.clone()
        },
        {
            "propertyDetails": "   ",
            "latitude": 30.2,
            "longitude": -97.8,
            "generatedResults": analysis
        }
    ]);
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_envelope(&batch.to_string())))
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let (status, json) = send(
        &app,
        request("POST", "/api/v1/leads/generate?count=2", "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["code"], "malformed_response");

    let (_, json) = send(&app, request("GET", "/api/v1/leads", "alice", None)).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn upstream_failures_surface_distinct_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/offer-letter",
            "alice",
            Some(serde_json::json!({
                "property_details": "1 Main St",
                "offer_range": "$100k-$120k"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "rate_limited");

    let malformed = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })))
        .mount(&malformed)
        .await;

    let app = test_app(&malformed.uri());
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/api/v1/market-analysis",
            "alice",
            Some(serde_json::json!({
                "sales": [ { "price": "250000", "date": "2024-03-01" } ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["code"], "malformed_response");
}

#[tokio::test]
async fn concurrent_generation_of_the_same_kind_conflicts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(text_envelope("Dear [Seller Name], ..."))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let body = serde_json::json!({
        "property_details": "1 Main St",
        "offer_range": "$100k-$120k"
    });
    let (first, second) = tokio::join!(
        send(
            &app,
            request("POST", "/api/v1/offer-letter", "alice", Some(body.clone()))
        ),
        send(
            &app,
            request("POST", "/api/v1/offer-letter", "alice", Some(body.clone()))
        ),
    );

    let mut statuses = [first.0, second.0];
    statuses.sort_by_key(StatusCode::as_u16);
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    // The slot is free again once the first request finished.
    let (status, json) = send(
        &app,
        request("POST", "/api/v1/offer-letter", "alice", Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["letter"], "Dear [Seller Name], ...");
}

#[tokio::test]
async fn lead_stream_starts_with_the_current_snapshot() {
    let app = test_app("http://127.0.0.1:9");
    let response = app
        .oneshot(request("GET", "/api/v1/leads/stream", "alice", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), frames.next())
        .await
        .expect("first frame in time")
        .expect("stream open")
        .expect("frame bytes");
    let text = String::from_utf8(first.to_vec()).expect("utf8");
    assert!(text.contains("event: snapshot"), "got {text}");
    assert!(text.contains("data: []"), "got {text}");
}

#[tokio::test]
async fn snapshot_stream_ends_when_shutdown_begins() {
    let state = test_state("http://127.0.0.1:9");
    let app = build_app(
        state.clone(),
        AuthState::disabled(),
        default_rate_limit_state(),
    );
    let response = app
        .oneshot(request("GET", "/api/v1/contacts/stream", "alice", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let mut frames = response.into_body().into_data_stream();

    state.begin_shutdown();

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = frames.next().await {
            frame.expect("frame bytes");
        }
    })
    .await;
    assert!(drained.is_ok(), "stream stayed open after shutdown");
}

#[tokio::test]
async fn idle_guards_are_pruned() {
    let registry = GuardRegistry::default();
    let alice = UserId::from_raw("alice");
    let bob = UserId::from_raw("bob");

    let ticket = registry
        .begin(&alice, GenerationKind::Analysis)
        .await
        .expect("slot free");
    assert_eq!(registry.len().await, 1);
    drop(ticket);

    let _bob = registry
        .begin(&bob, GenerationKind::OfferLetter)
        .await
        .expect("slot free");
    assert_eq!(registry.len().await, 1, "alice's idle guard is gone");
    assert!(!registry.supersede(&alice, GenerationKind::Analysis).await);
}

#[tokio::test]
async fn cancelled_generation_is_reported_as_superseded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(text_envelope("Dear [Seller Name], ..."))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let app = test_app(&server.uri());
    let body = serde_json::json!({
        "property_details": "1 Main St",
        "offer_range": "$100k-$120k"
    });

    let (pending, cancel) = tokio::join!(
        send(
            &app,
            request("POST", "/api/v1/offer-letter", "alice", Some(body.clone()))
        ),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            send(
                &app,
                request("DELETE", "/api/v1/generations/offer-letter", "alice", None),
            )
            .await
        },
    );

    assert_eq!(cancel.0, StatusCode::OK);
    assert_eq!(cancel.1["data"]["cancelled"], true);
    assert_eq!(pending.0, StatusCode::CONFLICT);
    assert!(pending.1["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("superseded")));

    let (status, json) = send(
        &app,
        request("DELETE", "/api/v1/generations/offer-letter", "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cancelled"], false);

    let (status, _) = send(
        &app,
        request("DELETE", "/api/v1/generations/poems", "alice", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
