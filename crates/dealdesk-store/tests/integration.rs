//! Offline tests for dealdesk-store pool configuration.
//! These tests do not require a live database connection.

use dealdesk_core::{AiSettings, AppConfig, Environment};
use dealdesk_store::PoolConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        app_id: "default-app-id".to_string(),
        database_url: Some("postgres://example".to_string()),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        api_keys: Vec::new(),
        ai: AiSettings {
            api_key: String::new(),
            base_url: "http://localhost".to_string(),
            model: "test-model".to_string(),
            timeout_secs: 30,
            max_attempts: 5,
            backoff_base_ms: 1000,
        },
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}
