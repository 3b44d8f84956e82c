use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};

use medwarehouse::config::{ChannelRule, ConfigLoader};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    for key in [
        "MEDWH_PROFILE",
        "MEDWH_API_BIND_ADDR",
        "MEDWH_LOG_LEVEL",
        "MEDWH_CHANNELS",
        "MEDWH_CHANNEL_DELAY_SECONDS",
        "MEDWH_CONFIDENCE_FLOOR",
        "MEDWH_VERIFIED_THRESHOLD",
        "MEDWH_CHANNEL_RULES",
        "MEDWH_DATE_DIM_START",
    ] {
        unsafe {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.scraper.channels.len(), 3);
    assert_eq!(cfg.detector.confidence_floor, 0.40);
    assert_eq!(cfg.detector.verified_threshold, 0.70);
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "MEDWH_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.local",
        "MEDWH_PROFILE=test\nMEDWH_API_BIND_ADDR=127.0.0.1:4000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test",
        "MEDWH_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "MEDWH_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("layered config loads");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
}

#[test]
fn process_env_overrides_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "MEDWH_LOG_LEVEL=warn\n");

    unsafe {
        env::set_var("MEDWH_LOG_LEVEL", "trace");
    }
    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("config loads");
    clear_env();

    assert_eq!(cfg.log_level, "trace");
}

#[test]
fn channel_list_and_rules_parse_from_env() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "MEDWH_CHANNELS=https://t.me/CheMed123, @tikvahpharma\n\
         MEDWH_CHANNEL_RULES=vet:Veterinary,pharma:Pharmaceutical\n",
    );

    let cfg = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf())
        .load()
        .expect("config loads");

    assert_eq!(
        cfg.scraper.channels,
        vec!["https://t.me/CheMed123".to_string(), "@tikvahpharma".to_string()]
    );
    assert_eq!(
        cfg.warehouse.channel_rules,
        vec![
            ChannelRule::new("vet", "Veterinary"),
            ChannelRule::new("pharma", "Pharmaceutical"),
        ]
    );
}

#[test]
fn out_of_bounds_threshold_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "MEDWH_CONFIDENCE_FLOOR=1.7\n");

    let result = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf()).load();
    assert!(result.is_err());
}

#[test]
fn malformed_date_bound_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "MEDWH_DATE_DIM_START=01-01-2023\n");

    let result = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf()).load();
    assert!(result.is_err());
}
