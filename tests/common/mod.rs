#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Initialize tracing once for integration tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(filter)
            .init();
    });
}

/// Generate a unique temporary DuckDB path for a test.
pub fn temp_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("wp_{test_name}_{nanos}.duckdb"))
}

/// Build a default config with a test-scoped DuckDB store.
pub fn temp_config(test_name: &str) -> wp_config::WpConfig {
    let mut config = wp_config::WpConfig::default();
    config.store.backend = wp_config::StoreBackend::Duckdb;
    config.store.db_path = temp_db_path(test_name);
    config
}

/// Point a config at mock Five9 and Supabase servers.
pub fn mock_config(five9_uri: &str, supabase_uri: &str) -> wp_config::WpConfig {
    let mut config = wp_config::WpConfig::default();
    config.five9.username = "supervisor".to_string();
    config.five9.password = "secret".to_string();
    config.five9.soap_url = format!("{five9_uri}/wssupervisor/v14/SupervisorWebService");
    config.five9.timeout_secs = 5;
    config.store.url = supabase_uri.to_string();
    config.store.api_key = "service-key".to_string();
    config.store.timeout_secs = 5;
    config
}

/// `getStatisticsResponse` body with `Username`, `State`, `State Since` columns.
pub fn statistics_body(rows: &[(&str, &str, &str)]) -> String {
    let rows_xml: String = rows
        .iter()
        .map(|(user, state, since)| {
            format!(
                "<rows><values><data>{user}</data><data>{state}</data><data>{since}</data></values></rows>"
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">
  <env:Body>
    <ns2:getStatisticsResponse xmlns:ns2="http://service.supervisor.ws.five9.com/">
      <return>
        <columns><values><data>Username</data><data>State</data><data>State Since</data></values></columns>
        {rows_xml}
        <type>AgentState</type>
      </return>
    </ns2:getStatisticsResponse>
  </env:Body>
</env:Envelope>"#
    )
}
