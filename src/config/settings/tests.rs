use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::with_base_dir("/tmp/kb");
    assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
    assert_eq!(config.provider.model, "text-embedding-3-small");
    assert_eq!(config.provider.embedding_dimension, 1536);
    assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
    assert_eq!(config.backfill.delay_ms, 100);
    assert_eq!(config.backfill.max_tokens, 8000);
    assert_eq!(config.search.default_limit, 10);
    assert!((config.search.default_threshold - 0.5).abs() < f32::EPSILON);
    assert_eq!(config.database_path(), PathBuf::from("/tmp/kb/records.db"));
}

#[test]
fn config_validation() {
    let config = Config::with_base_dir("/tmp/kb");
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.provider.base_url = "ftp://example.com".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.base_url = "not a url".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.embedding_dimension = 8;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.provider.timeout_seconds = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.backfill.max_tokens = 9000;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.search.default_limit = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.search.default_threshold = 1.5;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn embeddings_url_generation() {
    let mut provider = ProviderConfig::default();
    let url = provider
        .embeddings_url()
        .expect("should generate embeddings url successfully");
    assert_eq!(url.as_str(), "https://api.openai.com/v1/embeddings");

    provider.base_url = "http://localhost:1234/v1/".to_string();
    let url = provider
        .embeddings_url()
        .expect("trailing slash is tolerated");
    assert_eq!(url.as_str(), "http://localhost:1234/v1/embeddings");
}

#[test]
fn toml_serialization() {
    let config = Config::with_base_dir("/tmp/kb");
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config.provider, parsed_config.provider);
    assert_eq!(config.backfill, parsed_config.backfill);
    assert_eq!(config.search, parsed_config.search);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial_toml = r#"
        [provider]
        model = "text-embedding-3-large"
        embedding_dimension = 3072
    "#;

    let config: Config = toml::from_str(partial_toml).expect("partial config is valid toml");
    assert_eq!(config.provider.model, "text-embedding-3-large");
    assert_eq!(config.provider.embedding_dimension, 3072);
    assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
    assert_eq!(config.backfill, BackfillConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("missing config falls back to defaults");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.provider, ProviderConfig::default());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_dir = temp_dir.path().join("nested");

    let mut config = Config::with_base_dir(&config_dir);
    config.provider.base_url = "http://localhost:8080/v1".to_string();
    config.backfill.delay_ms = 250;
    config.save().expect("valid config saves");

    assert!(config.config_file_path().exists());

    let loaded = Config::load(&config_dir).expect("saved config loads");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[backfill]\nmax_tokens = 0\n",
    )
    .expect("can write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn setter_validation() {
    let mut provider = ProviderConfig::default();

    assert!(provider.set_base_url("http://localhost:11434/v1".to_string()).is_ok());
    assert!(provider.set_model("nomic-embed-text".to_string()).is_ok());
    assert!(provider.set_embedding_dimension(768).is_ok());
    assert!(provider.set_api_key_env("LOCAL_KEY".to_string()).is_ok());

    assert!(provider.set_base_url("ftp://nope".to_string()).is_err());
    assert!(provider.set_model("  ".to_string()).is_err());
    assert!(provider.set_embedding_dimension(5000).is_err());
    assert!(provider.set_api_key_env(String::new()).is_err());
    assert_eq!(provider.base_url, "http://localhost:11434/v1");

    let mut backfill = BackfillConfig::default();
    assert!(backfill.set_delay_ms(0).is_ok());
    assert!(backfill.set_delay_ms(120_000).is_err());
    assert_eq!(backfill.delay_ms, 0);
}

#[test]
#[serial]
fn api_key_from_environment() {
    let provider = ProviderConfig {
        api_key_env: "KB_EMBEDDINGS_TEST_KEY".to_string(),
        ..ProviderConfig::default()
    };

    // SAFETY: serialized with every other test that touches the environment
    unsafe { std::env::remove_var("KB_EMBEDDINGS_TEST_KEY") };
    assert!(matches!(
        provider.api_key(),
        Err(ConfigError::MissingApiKey(name)) if name == "KB_EMBEDDINGS_TEST_KEY"
    ));

    // SAFETY: serialized with every other test that touches the environment
    unsafe { std::env::set_var("KB_EMBEDDINGS_TEST_KEY", "sk-test") };
    assert_eq!(provider.api_key().expect("key is set"), "sk-test");

    // SAFETY: serialized with every other test that touches the environment
    unsafe { std::env::remove_var("KB_EMBEDDINGS_TEST_KEY") };
}
