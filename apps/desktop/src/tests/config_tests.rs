use std::collections::HashMap;

use super::*;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    let dir = tempfile::tempdir().expect("tempdir");

    let settings = load_settings_from(&dir.path().join(SETTINGS_FILE), env_from(&[]));

    assert_eq!(settings, Settings::default());
    assert_eq!(settings.server_url, "http://127.0.0.1:8000");
    assert_eq!(settings.request_timeout(), Duration::from_secs(120));
    settings.validate().expect("defaults are valid");
}

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(SETTINGS_FILE);
    fs::write(
        &path,
        "server_url = \"https://gen.example.com\"\ndownload_dir = \"/tmp/monkee\"\nrequest_timeout_secs = 30\n",
    )
    .expect("write settings");

    let settings = load_settings_from(&path, env_from(&[]));

    assert_eq!(settings.server_url, "https://gen.example.com");
    assert_eq!(settings.download_dir, PathBuf::from("/tmp/monkee"));
    assert_eq!(settings.request_timeout_secs, 30);
}

#[test]
fn env_overrides_file_and_app_prefix_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(SETTINGS_FILE);
    fs::write(&path, "server_url = \"http://from-file:1\"\n").expect("write settings");

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("MONKEE_SERVER_URL", "http://from-env:2"),
            ("APP__SERVER_URL", "http://from-app-env:3"),
            ("MONKEE_DOWNLOAD_DIR", "/downloads"),
            ("APP__REQUEST_TIMEOUT_SECS", "45"),
        ]),
    );

    assert_eq!(settings.server_url, "http://from-app-env:3");
    assert_eq!(settings.download_dir, PathBuf::from("/downloads"));
    assert_eq!(settings.request_timeout_secs, 45);
}

#[test]
fn malformed_inputs_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(SETTINGS_FILE);
    fs::write(&path, "server_url = [not toml").expect("write settings");

    let settings = load_settings_from(&path, env_from(&[("APP__REQUEST_TIMEOUT_SECS", "soon")]));

    assert_eq!(settings, Settings::default());
}

#[test]
fn validate_rejects_bad_urls_and_zero_timeout() {
    let mut settings = Settings {
        server_url: "localhost:8000".into(),
        ..Settings::default()
    };
    assert!(settings.validate().is_err());

    settings.server_url = "ftp://files.example.com".into();
    assert!(settings.validate().is_err());

    settings.server_url = "http://127.0.0.1:8000".into();
    settings.request_timeout_secs = 0;
    assert!(settings.validate().is_err());
}
