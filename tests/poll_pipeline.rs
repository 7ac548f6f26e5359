mod common;

use common::{init_tracing, mock_config, statistics_body, temp_config};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wp_cli::build_orchestrator;
use wp_store::DuckStore;

const SOAP_PATH: &str = "/wssupervisor/v14/SupervisorWebService";
const TABLE_PATH: &str = "/rest/v1/five9_agent_snapshots";

fn three_agents() -> String {
    statistics_body(&[
        ("alice", "Ready", "2024-01-15 10:00:00"),
        ("bob", "Logged Out", "2024-01-15 08:00:00"),
        ("carol", "Not Ready", "2024-01-15 09:15:00"),
    ])
}

async fn mount_five9(server: &MockServer, session_status: u16, statistics: Option<String>) {
    Mock::given(method("POST"))
        .and(path(SOAP_PATH))
        .and(body_string_contains("<ser:setSessionParameters>"))
        .respond_with(ResponseTemplate::new(session_status).set_body_string("<ok/>"))
        .expect(1)
        .mount(server)
        .await;

    let fetch = Mock::given(method("POST"))
        .and(path(SOAP_PATH))
        .and(body_string_contains("<ser:getStatistics>"));
    match statistics {
        Some(body) => {
            fetch
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .expect(1)
                .mount(server)
                .await;
        }
        None => {
            fetch
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(server)
                .await;
        }
    }
}

#[tokio::test]
async fn test_poll_writes_to_supabase_and_purges() {
    init_tracing();
    let five9 = MockServer::start().await;
    let supabase = MockServer::start().await;
    mount_five9(&five9, 200, Some(three_agents())).await;

    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .and(header("apikey", "service-key"))
        .and(header("prefer", "return=minimal"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&supabase)
        .await;

    Mock::given(method("DELETE"))
        .and(path(TABLE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"username": "old"}])),
        )
        .expect(1)
        .mount(&supabase)
        .await;

    let config = mock_config(&five9.uri(), &supabase.uri());
    let outcome = build_orchestrator(&config).unwrap().run_poll().await;

    assert!(outcome.ok, "{outcome:?}");
    assert_eq!(outcome.agents_total, 3);
    assert_eq!(outcome.agents_written, 2);
    assert_eq!(outcome.purged, 1);

    let inserts: Vec<_> = supabase
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect();
    let rows: Vec<serde_json::Value> = serde_json::from_slice(&inserts[0].body).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["username"], "alice");
    assert_eq!(rows[0]["state_since"], "2024-01-15 10:00:00");
    assert_eq!(rows[0]["state_since_utc"], "2024-01-15 18:00:00");
    assert_eq!(rows[0]["full_name"], "");
    assert_eq!(rows[0]["snapshot_ts"], rows[1]["snapshot_ts"]);
    assert_eq!(rows[0]["snapshot_ts"].as_str(), Some(outcome.snapshot_ts.as_str()));
    assert_eq!(rows[1]["username"], "carol");
}

#[tokio::test]
async fn test_session_failure_stops_before_fetch_and_store() {
    init_tracing();
    let five9 = MockServer::start().await;
    let supabase = MockServer::start().await;
    mount_five9(&five9, 500, None).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&supabase)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(&supabase)
        .await;

    let config = mock_config(&five9.uri(), &supabase.uri());
    let outcome = build_orchestrator(&config).unwrap().run_poll().await;

    assert!(!outcome.ok);
    assert!(
        outcome
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Failed to set Five9 session"))
    );
}

#[tokio::test]
async fn test_store_rejection_fails_poll_without_purge() {
    init_tracing();
    let five9 = MockServer::start().await;
    let supabase = MockServer::start().await;
    mount_five9(&five9, 200, Some(three_agents())).await;

    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
        .mount(&supabase)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(0)
        .mount(&supabase)
        .await;

    let config = mock_config(&five9.uri(), &supabase.uri());
    let outcome = build_orchestrator(&config).unwrap().run_poll().await;

    assert!(!outcome.ok);
    assert_eq!(outcome.agents_total, 3);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Supabase error 401: Invalid API key")
    );
}

#[tokio::test]
async fn test_purge_failure_keeps_poll_ok() {
    init_tracing();
    let five9 = MockServer::start().await;
    let supabase = MockServer::start().await;
    mount_five9(&five9, 200, Some(three_agents())).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&supabase)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500).set_body_string("timeout"))
        .mount(&supabase)
        .await;

    let config = mock_config(&five9.uri(), &supabase.uri());
    let outcome = build_orchestrator(&config).unwrap().run_poll().await;

    assert!(outcome.ok);
    assert_eq!(outcome.agents_written, 2);
    assert_eq!(outcome.purged, 0);
    assert!(outcome.purge_error.is_some());
}

#[tokio::test]
async fn test_poll_into_duckdb() {
    init_tracing();
    let five9 = MockServer::start().await;
    mount_five9(&five9, 200, Some(three_agents())).await;

    let mut config = temp_config("poll_into_duckdb");
    let mocked = mock_config(&five9.uri(), "");
    config.five9 = mocked.five9;

    let poller = build_orchestrator(&config).unwrap();
    let outcome = poller.run_poll().await;
    assert!(outcome.ok, "{outcome:?}");
    assert_eq!(outcome.agents_written, 2);
    drop(poller);

    let store = DuckStore::open(&config.store.db_path).unwrap();
    assert_eq!(store.row_count().unwrap(), 2);
    let _ = std::fs::remove_file(&config.store.db_path);
}
