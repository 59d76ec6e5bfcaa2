use bulkflow_core::config::{ConfigManager, LogFormat};
use bulkflow_core::import::ImportOptions;
use bulkflow_core::SessionManager;
use bulkflow_core::orchestration::{processor_fn, ItemOutcome};
use std::path::PathBuf;
use std::time::Duration;

fn shipped_config_dir() -> Option<PathBuf> {
    Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config"))
}

#[test]
fn test_shipped_defaults_match_built_in_defaults() {
    let manager = ConfigManager::load_from_directory_with_env(shipped_config_dir(), "development")
        .expect("shipped configuration should load");

    assert_eq!(manager.environment(), "development");
    assert_eq!(manager.config(), &bulkflow_core::BulkflowConfig::default());
}

#[test]
fn test_production_overrides() {
    let manager = ConfigManager::load_from_directory_with_env(shipped_config_dir(), "production")
        .expect("production configuration should load");
    let config = manager.config();

    assert_eq!(config.session.concurrency, 4);
    assert_eq!(config.session.item_timeout(), Some(Duration::from_secs(60)));
    assert_eq!(config.logging.format, LogFormat::Json);
    // untouched sections keep the base values
    assert!(config.import.skip_invalid);
    assert_eq!(config.events.channel_capacity, 1000);
}

#[tokio::test]
async fn test_manager_uses_configured_session_defaults() {
    let loaded = ConfigManager::load_from_directory_with_env(shipped_config_dir(), "production")
        .expect("production configuration should load");
    let manager = SessionManager::with_config(
        processor_fn("noop", |_: u8| async { Ok(ItemOutcome::success()) }),
        loaded.config(),
    );

    assert_eq!(manager.default_config().concurrency, 4);
    let session = manager.create_session_with_defaults(vec![]).unwrap();
    assert_eq!(manager.session(session).unwrap().config().concurrency, 4);

    let options = ImportOptions::from_config(loaded.config());
    assert_eq!(options.session.concurrency, 4);
}
