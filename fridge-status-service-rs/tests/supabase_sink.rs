mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use config_rs::SupabaseConfig;
use fridge_status::classifier::ClassProbabilities;
use fridge_status::sink::{PersistenceRecord, PersistenceSink, SinkError, SupabaseSink};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use common::{fixture_pipeline, router, sample_request};

#[derive(Debug, Clone)]
struct Captured {
    table: String,
    apikey: Option<String>,
    authorization: Option<String>,
    prefer: Option<String>,
    body: Value,
}

/// How the fake datastore answers inserts
#[derive(Clone, Copy)]
enum Reply {
    Representation,
    EmptyArray,
    Unauthorized,
}

#[derive(Clone)]
struct FakeDatastore {
    reply: Reply,
    rows: Arc<Mutex<Vec<Captured>>>,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn insert(
    State(store): State<FakeDatastore>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    store.rows.lock().unwrap().push(Captured {
        table,
        apikey: header_string(&headers, "apikey"),
        authorization: header_string(&headers, "authorization"),
        prefer: header_string(&headers, "prefer"),
        body: body.clone(),
    });

    match store.reply {
        Reply::Representation => (StatusCode::CREATED, Json(json!([body]))),
        Reply::EmptyArray => (StatusCode::CREATED, Json(json!([]))),
        Reply::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid API key"})),
        ),
    }
}

/// Start a PostgREST lookalike and return its base URL.
async fn spawn_datastore(reply: Reply) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let rows = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/rest/v1/:table", post(insert))
        .with_state(FakeDatastore {
            reply,
            rows: Arc::clone(&rows),
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), rows)
}

fn sink_for(url: &str) -> SupabaseSink {
    SupabaseSink::new(&SupabaseConfig {
        url: url.to_string(),
        key: "service-key".to_string(),
        table: "fridge_status_predictions".to_string(),
    })
    .unwrap()
}

fn record() -> PersistenceRecord {
    PersistenceRecord {
        predicted_status: "Fonctionnel".into(),
        probabilities: ClassProbabilities::new(vec![
            ("A surveiller".into(), 0.1),
            ("En panne".into(), 0.1),
            ("Fonctionnel".into(), 0.8),
        ]),
        intensite_avant: 3.1,
        temperature: 4.2,
        type_frigo: "Vertical".into(),
    }
}

#[tokio::test]
async fn test_append_posts_row_with_credentials() {
    let (url, rows) = spawn_datastore(Reply::Representation).await;
    let sink = sink_for(&url);

    sink.append(&record()).await.unwrap();

    let rows = rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.table, "fridge_status_predictions");
    assert_eq!(row.apikey.as_deref(), Some("service-key"));
    assert_eq!(row.authorization.as_deref(), Some("Bearer service-key"));
    assert_eq!(row.prefer.as_deref(), Some("return=representation"));
    assert_eq!(row.body["predicted_status"], "Fonctionnel");
    assert_eq!(row.body["type_frigo"], "Vertical");
    assert_eq!(row.body["probabilities"]["Fonctionnel"], 0.8);
}

#[tokio::test]
async fn test_rejected_insert_surfaces_status() {
    let (url, _) = spawn_datastore(Reply::Unauthorized).await;

    let err = sink_for(&url).append(&record()).await.unwrap_err();
    match err {
        SinkError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid API key"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_empty_representation_is_a_failure() {
    let (url, _) = spawn_datastore(Reply::EmptyArray).await;

    let err = sink_for(&url).append(&record()).await.unwrap_err();
    assert!(matches!(err, SinkError::EmptyResponse));
}

#[tokio::test]
async fn test_served_prediction_reaches_datastore() {
    let (url, rows) = spawn_datastore(Reply::Representation).await;
    let app = router(Some(fixture_pipeline()), Some(Arc::new(sink_for(&url))));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(sample_request().to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let served: Value = serde_json::from_slice(&bytes).unwrap();

    // the write is detached from the response, poll for it
    let mut persisted = None;
    for _ in 0..100 {
        if let Some(row) = rows.lock().unwrap().first().cloned() {
            persisted = Some(row);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let row = persisted.expect("prediction persisted");

    assert_eq!(row.body["predicted_status"], served["predicted_status"]);
    assert_eq!(row.body["probabilities"], served["probabilities"]);
    assert_eq!(row.body["intensite_avant"], 3.1);
    assert_eq!(row.body["temperature"], 4.2);
    assert_eq!(row.body["type_frigo"], "Vertical");
}
