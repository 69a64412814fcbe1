use super::*;

fn env_from(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key: &str| {
        pairs
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.to_string())
    }
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = resolve_settings(None, env_from(&[]));
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.api_url, "http://localhost:8000");
}

#[test]
fn file_values_override_defaults() {
    let file = r#"
api_url = "https://api.example.com"
database_url = "./state/client.db"
"#;
    let settings = resolve_settings(Some(file), env_from(&[]));
    assert_eq!(settings.api_url, "https://api.example.com");
    assert_eq!(settings.database_url, "./state/client.db");
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn environment_overrides_file_and_prefixed_wins() {
    let file = r#"api_url = "https://file.example.com""#;
    let settings = resolve_settings(
        Some(file),
        env_from(&[
            ("API_URL", "https://bare.example.com"),
            ("APP__API_URL", "https://prefixed.example.com"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("APP__LOG_FILTER", "client_core=debug"),
        ]),
    );
    assert_eq!(settings.api_url, "https://prefixed.example.com");
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.log_filter, "client_core=debug");
}

#[test]
fn unreadable_file_is_ignored() {
    let settings = resolve_settings(Some("api_url = [not toml"), env_from(&[]));
    assert_eq!(settings, Settings::default());
}

#[test]
fn blank_database_url_falls_back_to_default() {
    assert_eq!(prepare_database_url("  "), "sqlite://./data/client.db");
    assert_eq!(prepare_database_url("data/x.db"), "sqlite://data/x.db");
}
