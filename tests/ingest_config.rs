// tests/ingest_config.rs
use fuchupo_news::config::{IngestConfig, DEFAULT_FEED_URL, ENV_CONFIG_PATH};
use std::path::PathBuf;
use std::{env, fs};

const TOUCHED: &[&str] = &[
    ENV_CONFIG_PATH,
    "RSS_FEED_URL",
    "RSS_FEEDS",
    "NEWS_STORE_PATH",
    "NEWS_MAX_ITEMS",
    "FETCH_RETRIES",
    "ENRICH_ENABLED",
    "ENRICH_CONCURRENCY",
    "ENRICH_TIMEOUT_SECS",
    "OPENAI_MODEL",
    "OPENAI_BASE_URL",
    "OPENAI_API_KEY",
    "AI_TEST_MODE",
];

fn clear_env() {
    for k in TOUCHED {
        env::remove_var(k);
    }
}

#[test]
fn load_from_reads_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("ingest.toml");
    fs::write(
        &p,
        r#"
feed_url = "https://example.test/rss"
store_path = "out/news.json"
fetch_retries = 0

[ai]
enabled = false
"#,
    )
    .unwrap();
    let cfg = IngestConfig::load_from(&p).unwrap();
    assert_eq!(cfg.feed_url, "https://example.test/rss");
    assert_eq!(cfg.store_path, PathBuf::from("out/news.json"));
    assert_eq!(cfg.fetch_retries, 0);
    assert!(!cfg.ai.enabled);
}

#[test]
fn load_from_reports_bad_toml() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("ingest.toml");
    fs::write(&p, "max_items = \"lots\"").unwrap();
    let err = IngestConfig::load_from(&p).unwrap_err();
    assert!(format!("{err:#}").contains("parsing ingest config"));
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing at all -> defaults
    let cfg = IngestConfig::load(None).unwrap();
    assert_eq!(cfg.feed_url, DEFAULT_FEED_URL);
    assert_eq!(cfg.max_items, 1000);
    assert!(cfg.ai.api_key.is_none());

    // 2) Fallback TOML in ./config/
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/ingest.toml"),
        "max_items = 300\n[ai]\nconcurrency = 3\n",
    )
    .unwrap();
    let cfg = IngestConfig::load(None).unwrap();
    assert_eq!(cfg.max_items, 300);
    assert_eq!(cfg.ai.concurrency, 3);

    // 3) Env wins over the file
    env::set_var("NEWS_MAX_ITEMS", "20");
    env::set_var("RSS_FEED_URL", "https://env.test/rss");
    env::set_var("OPENAI_API_KEY", "sk-env");
    let cfg = IngestConfig::load(None).unwrap();
    assert_eq!(cfg.max_items, 20);
    assert_eq!(cfg.feed_url, "https://env.test/rss");
    assert_eq!(cfg.ai.api_key.as_deref(), Some("sk-env"));

    // 4) INGEST_CONFIG_PATH pointing nowhere is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
    assert!(IngestConfig::load(None).is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn explicit_path_beats_env_path() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let explicit = tmp.path().join("explicit.toml");
    fs::write(&explicit, "max_items = 7\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));

    let cfg = IngestConfig::load(Some(&explicit)).unwrap();
    assert_eq!(cfg.max_items, 7);
    clear_env();
}
