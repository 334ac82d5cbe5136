use super::data::Config;
use super::io::ConfigError;
use crate::store::Store;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.audio.buffer_ms, 200);
    assert_eq!(config.transcode.max_concurrent, 20);
    assert_eq!(config.transcode.ffmpeg_path, PathBuf::from("ffmpeg"));
}

#[test]
fn test_partial_sections_fill_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "log_filter = \"reconcord=debug\"\n\n[transcode]\nmax_concurrent = 4\n",
    )
    .expect("write");

    let config = Config::load_from_path(&config_path).expect("load");
    assert_eq!(config.log_filter.as_deref(), Some("reconcord=debug"));
    assert_eq!(config.transcode.max_concurrent, 4);
    assert_eq!(config.transcode.ffmpeg_path, PathBuf::from("ffmpeg"));
    assert_eq!(config.audio.buffer_ms, 200);
    assert_eq!(config.transcoder().available(), 4);
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.audio.buffer_ms = 60;
    config.store.path = Some(temp_dir.path().join("store.json"));
    config.save_to_path(&config_path).expect("save");

    let loaded = Config::load_from_path(&config_path).expect("load");
    assert_eq!(loaded, config);
    assert_eq!(loaded.mixer_config().buffer_ms, 60);

    config.store.path = None;
    config.save_to_path(&config_path).expect("resave");
    let loaded = Config::load_from_path(&config_path).expect("reload");
    assert_eq!(loaded.store.path, None);
}

#[test]
fn test_parse_errors_name_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "[audio\nbuffer_ms = ").expect("write");

    let err = Config::load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("config.toml"));
}

#[tokio::test]
async fn test_open_store_follows_the_store_section() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = Config::default();
    config.store.path = Some(temp_dir.path().join("store.json"));

    let store = config.open_store();
    store
        .set("k", serde_json::json!(1))
        .await
        .expect("set");
    assert!(temp_dir.path().join("store.json").exists());

    let memory = Config::default().open_store();
    memory.set("k", serde_json::json!(1)).await.expect("set");
    assert_eq!(
        memory.get("k", serde_json::json!(0)).await.expect("get"),
        serde_json::json!(1)
    );
}
