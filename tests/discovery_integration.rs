//! Integration tests for the lantern discovery subsystem
//!
//! These tests exercise the complete flow against live HTTP endpoints:
//! - Health probe semantics (status code plus payload marker)
//! - Instance degradation, circuit opening, and timed recovery
//! - Beacon announcement through to weighted selection
//! - The cold-start acquisition ladder and URL cache

use lantern::transport::{MulticastDiscovery, StaticDiscovery};
use lantern::{
    Advertisement, CircuitState, DiscoveryConfig, DiscoveryError, HttpHealthChecker,
    ServiceDiscovery, UrlCache,
};
use serde_json::json;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> DiscoveryConfig {
    DiscoveryConfig {
        discovery_interval: Duration::from_millis(200),
        discovery_retry_interval: Duration::from_millis(100),
        discovery_timeout: Duration::from_millis(100),
        probe_interval: Duration::from_millis(200),
        probe_retry_interval: Duration::from_millis(100),
        probe_timeout: Duration::from_millis(150),
        recovery_timeout: Duration::from_millis(80),
        fallback_discovery_timeout: Duration::from_millis(100),
        fallback_probe_timeout: Duration::from_millis(150),
        ..Default::default()
    }
}

fn advertisement_for(server: &MockServer, name: &str) -> Advertisement {
    let addr = server.address();
    Advertisement::new(name, addr.ip().to_string(), addr.port())
}

fn instance_id_for(server: &MockServer) -> String {
    let addr = server.address();
    format!("{}:{}", addr.ip(), addr.port())
}

async fn healthy_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("healthy"))
        .mount(&server)
        .await;
    server
}

fn discovery_over(
    config: DiscoveryConfig,
    advertisements: Vec<Advertisement>,
) -> ServiceDiscovery {
    let checker = HttpHealthChecker::new(config.probe_timeout, config.health_path.clone());
    ServiceDiscovery::with_components(
        config,
        Arc::new(StaticDiscovery::new(advertisements)),
        Arc::new(checker),
    )
    .expect("valid test configuration")
}

#[tokio::test]
async fn test_health_probe_semantics() {
    let plain = healthy_server().await;

    let json_marker = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
        .mount(&json_marker)
        .await;

    let no_marker = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&no_marker)
        .await;

    let server_error = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500).set_body_string("healthy"))
        .mount(&server_error)
        .await;

    // A listener that is bound and immediately dropped leaves a port
    // that refuses connections.
    let refused_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let ads = vec![
        advertisement_for(&plain, "plain"),
        advertisement_for(&json_marker, "json-marker"),
        advertisement_for(&no_marker, "no-marker"),
        advertisement_for(&server_error, "server-error"),
        Advertisement::new("refused", "127.0.0.1", refused_port),
    ];
    let discovery = discovery_over(fast_config(), ads);

    let summary = discovery.force_refresh().await.unwrap();
    assert_eq!(summary.added, 5);

    let probe = discovery.force_probe().await.unwrap();
    assert_eq!(probe.probed, 5);

    let healthy: Vec<String> = discovery
        .healthy_instances()
        .await
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(healthy.len(), 2);
    assert!(healthy.contains(&instance_id_for(&plain)));
    assert!(healthy.contains(&instance_id_for(&json_marker)));

    let all = discovery.all_instances().await;
    let failing: Vec<&str> = all
        .iter()
        .filter(|i| !i.is_healthy)
        .map(|i| i.id.as_str())
        .collect();
    assert_eq!(failing.len(), 3);
    assert!(failing.contains(&instance_id_for(&no_marker).as_str()));
    assert!(failing.contains(&instance_id_for(&server_error).as_str()));

    // One failed probe degrades but never deletes.
    assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn test_instance_degradation_and_recovery() {
    let steady = healthy_server().await;

    let flaky = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("healthy"))
        .up_to_n_times(1)
        .mount(&flaky)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&flaky)
        .await;

    let steady_id = instance_id_for(&steady);
    let flaky_id = instance_id_for(&flaky);

    let discovery = discovery_over(
        fast_config(),
        vec![
            advertisement_for(&steady, "steady"),
            advertisement_for(&flaky, "flaky"),
        ],
    );
    discovery.force_refresh().await.unwrap();

    // First cycle sees both instances healthy.
    discovery.force_probe().await.unwrap();
    assert_eq!(discovery.healthy_instances().await.len(), 2);

    // Three failing cycles open the flaky instance's circuit.
    for _ in 0..3 {
        discovery.force_probe().await.unwrap();
    }
    let flaky_instance = discovery
        .all_instances()
        .await
        .into_iter()
        .find(|i| i.id == flaky_id)
        .unwrap();
    assert_eq!(flaky_instance.circuit_state, CircuitState::Open);
    assert_eq!(flaky_instance.failure_count, 3);
    assert!(!flaky_instance.is_healthy);
    assert!(flaky_instance.weight < 1.0);

    for _ in 0..60 {
        let picked = discovery.pick_instance().await.unwrap();
        assert_eq!(picked.id, steady_id);
    }

    // The endpoint comes back and the recovery timeout elapses.
    flaky.reset().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("healthy"))
        .mount(&flaky)
        .await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    let recovery = discovery.force_probe().await.unwrap();
    assert!(recovery.promoted.contains(&flaky_id));

    let recovered = discovery
        .all_instances()
        .await
        .into_iter()
        .find(|i| i.id == flaky_id)
        .unwrap();
    assert_eq!(recovered.circuit_state, CircuitState::Closed);
    assert_eq!(recovered.failure_count, 0);
    assert!(recovered.is_selectable());

    let mut saw_recovered = false;
    for _ in 0..200 {
        if discovery.pick_instance().await.unwrap().id == flaky_id {
            saw_recovered = true;
            break;
        }
    }
    assert!(saw_recovered, "recovered instance was never selected");
}

#[tokio::test]
async fn test_beacon_to_selection_end_to_end() {
    let backend = healthy_server().await;
    let backend_port = backend.address().port();
    let backend_id = instance_id_for(&backend);

    // A loopback "group" turns multicast sends into plain localhost
    // datagrams, which every CI network can route.
    let beacon_port = 41931;
    let transport = Arc::new(MulticastDiscovery::new(
        Ipv4Addr::LOCALHOST,
        beacon_port,
        "lantern-e2e",
    ));

    let announcer = transport.clone();
    let announce_task = tokio::spawn(async move {
        loop {
            let _ = announcer
                .announce("kitchen", backend_port, Some("127.0.0.1"))
                .await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let config = DiscoveryConfig {
        discovery_timeout: Duration::from_millis(300),
        multicast_group: Ipv4Addr::LOCALHOST,
        multicast_port: beacon_port,
        service_label: "lantern-e2e".to_string(),
        ..fast_config()
    };
    let checker = HttpHealthChecker::new(config.probe_timeout, config.health_path.clone());
    let discovery =
        ServiceDiscovery::with_components(config, transport, Arc::new(checker)).unwrap();

    let summary = discovery.force_refresh().await.unwrap();
    announce_task.abort();
    assert_eq!(summary.added, 1);

    let instance = discovery.all_instances().await.pop().unwrap();
    assert_eq!(instance.id, backend_id);
    assert_eq!(
        instance.metadata.get("name").map(String::as_str),
        Some("kitchen")
    );
    assert_eq!(
        instance.metadata.get("discovery_method").map(String::as_str),
        Some("multicast")
    );

    discovery.force_probe().await.unwrap();
    let picked = discovery.pick_instance().await.unwrap();
    assert_eq!(picked.id, backend_id);
    assert!(picked.is_healthy);
}

#[tokio::test]
async fn test_acquisition_uses_live_cached_url() {
    let good = healthy_server().await;
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("server.json");

    let config = DiscoveryConfig {
        cache_path: Some(cache_path.clone()),
        ..fast_config()
    };
    let discovery = discovery_over(config, Vec::new());

    discovery.cache().set(&good.uri()).await.unwrap();
    let acquired = discovery.acquire_base_url().await.unwrap();
    assert_eq!(acquired, good.uri());
}

#[tokio::test]
async fn test_acquisition_clears_dead_cache_and_falls_back() {
    let good = healthy_server().await;
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("server.json");

    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let dead_url = format!("http://127.0.0.1:{}", dead_port);

    let config = DiscoveryConfig {
        cache_path: Some(cache_path.clone()),
        fallback_urls: vec![good.uri()],
        ..fast_config()
    };
    let discovery = discovery_over(config, Vec::new());

    discovery.cache().set(&dead_url).await.unwrap();
    let acquired = discovery.acquire_base_url().await.unwrap();
    assert_eq!(acquired, good.uri());

    // The dead entry was replaced by the winning URL.
    let cache = UrlCache::new(&cache_path);
    assert_eq!(cache.get().await, Some(good.uri()));
}

#[tokio::test]
async fn test_acquisition_exhaustion_surfaces_unavailability() {
    let dir = tempdir().unwrap();

    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = DiscoveryConfig {
        cache_path: Some(dir.path().join("server.json")),
        fallback_urls: vec![format!("http://127.0.0.1:{}", dead_port)],
        fallback_probe_timeout: Duration::from_millis(100),
        ..fast_config()
    };
    let discovery = discovery_over(config, Vec::new());

    let err = discovery.acquire_base_url().await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NoInstanceAvailable { .. }));
}
