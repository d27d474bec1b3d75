mod common;

use common::{config_with_free_countries, UNREACHABLE_URL};
use licensing_core::{
    ConfigStore, FixedRegion, Freshness, LicenseConfig, LicenseConfigSource, LicenseTypeInfo,
    MemoizedConfig, MemoryConfigStore, OverrideEngine, RegionCode, RemoteLicenseConfig,
    StaticLicenseConfig, TrialState,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CACHE_ENTRY: &str = "License.config";

fn remote(url: Option<String>, store: Arc<MemoryConfigStore>) -> RemoteLicenseConfig {
    RemoteLicenseConfig::new(url, Duration::from_secs(2), store, CACHE_ENTRY).unwrap()
}

// ── LicenseConfig ───────────────────────────────────────────────

#[test]
fn config_parses_camel_case_document() {
    let config: LicenseConfig = serde_json::from_value(json!({
        "maxActivations": 10,
        "trialDays": 14,
        "freeCountries": ["cn", "RU"]
    }))
    .unwrap();
    assert_eq!(config.max_activations, 10);
    assert_eq!(config.trial_days, 14);
    assert!(config.is_free_country(&RegionCode::parse("CN").unwrap()));
    assert!(config.is_free_country(&RegionCode::parse("RU").unwrap()));
}

#[test]
fn config_skips_invalid_free_countries() {
    let config: LicenseConfig = serde_json::from_value(json!({
        "maxActivations": 4,
        "trialDays": 30,
        "freeCountries": ["CN", "RUS", 7, "by"]
    }))
    .unwrap();
    let codes: Vec<_> = config.free_countries.iter().map(RegionCode::as_str).collect();
    assert_eq!(codes, vec!["BY", "CN"]);
}

#[test]
fn config_defaults() {
    let config = LicenseConfig::default();
    assert_eq!(config.max_activations, 4);
    assert_eq!(config.trial_days, 30);
    assert!(config.free_countries.is_empty());
}

// ── RemoteLicenseConfig ─────────────────────────────────────────

#[tokio::test]
async fn remote_config_fetches_and_caches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "maxActivations": 6,
            "trialDays": 21,
            "freeCountries": ["CN"]
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryConfigStore::new());
    let source = remote(Some(format!("{}/config.json", server.uri())), store.clone());
    let (config, freshness) = source.fetch().await;

    assert_eq!(freshness, Freshness::Fresh);
    assert_eq!(config.max_activations, 6);
    assert!(store.committed(CACHE_ENTRY).is_some());
}

#[tokio::test]
async fn remote_config_falls_back_to_cache_when_offline() {
    let store = Arc::new(MemoryConfigStore::new());
    let cached = config_with_free_countries(&["RU"]);
    store.set(CACHE_ENTRY, serde_json::to_vec(&cached).unwrap());

    let source = remote(Some(format!("{UNREACHABLE_URL}/config.json")), store);
    let (config, freshness) = source.fetch().await;
    assert_eq!(freshness, Freshness::Cached);
    assert_eq!(config, cached);
}

#[tokio::test]
async fn remote_config_falls_back_to_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = remote(Some(server.uri()), Arc::new(MemoryConfigStore::new()));
    let (config, freshness) = source.fetch().await;
    assert_eq!(freshness, Freshness::Fallback);
    assert_eq!(config, LicenseConfig::default());
}

#[tokio::test]
async fn remote_config_without_url_never_fetches() {
    let source = remote(None, Arc::new(MemoryConfigStore::new()));
    assert_eq!(source.license_config().await, LicenseConfig::default());
}

#[tokio::test]
async fn remote_config_rejects_malformed_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"trialDays": "thirty"})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryConfigStore::new());
    let source = remote(Some(server.uri()), store.clone());
    let (_, freshness) = source.fetch().await;
    assert_eq!(freshness, Freshness::Fallback);
    assert!(store.get(CACHE_ENTRY).is_none());
}

// ── MemoizedConfig / OverrideEngine ─────────────────────────────

#[tokio::test]
async fn force_switch_skips_config_fetch() {
    let source = StaticLicenseConfig::default();
    let config = MemoizedConfig::new(&source);
    let engine = OverrideEngine::new(true, Arc::new(FixedRegion(RegionCode::parse("CN"))));

    let state = engine.resolve(&config).await.unwrap();
    assert_eq!(state.license_type_info(), &LicenseTypeInfo::Forced);
    assert!(!config.is_fetched());
}

#[tokio::test]
async fn unknown_region_skips_config_fetch() {
    let source = StaticLicenseConfig(config_with_free_countries(&["CN"]));
    let config = MemoizedConfig::new(&source);
    let engine = OverrideEngine::new(false, Arc::new(FixedRegion(None)));

    assert!(engine.resolve(&config).await.is_none());
    assert!(!config.is_fetched());
}

#[tokio::test]
async fn free_country_override() {
    let source = StaticLicenseConfig(config_with_free_countries(&["CN"]));
    let config = MemoizedConfig::new(&source);
    let engine = OverrideEngine::new(false, Arc::new(FixedRegion(RegionCode::parse("cn"))));

    let state = engine.resolve(&config).await.unwrap();
    assert!(state.is_licensed());
    assert_eq!(state.freshness(), Freshness::Fresh);
    assert!(config.is_fetched());
}

// ── TrialState ──────────────────────────────────────────────────

#[test]
fn trial_state_clamps_ui_days() {
    let trial = TrialState::new(45, 30);
    assert_eq!(trial.days_of_use_ui, 30);
    assert!(!trial.trial_is_active);
    assert_eq!(trial.days_remaining(), 0);
}

#[test]
fn trial_last_day_is_active() {
    assert!(TrialState::new(30, 30).trial_is_active);
    assert!(!TrialState::new(31, 30).trial_is_active);
}

#[test]
fn trial_state_ignores_garbage_counter() {
    let store = MemoryConfigStore::new();
    store.set("days", b"lots".to_vec());
    let trial = TrialState::load(&store, "days", 30);
    assert_eq!(trial.days_of_use, 0);
    assert!(trial.trial_is_active);
}
