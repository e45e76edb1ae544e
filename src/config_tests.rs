//! Unit tests for configuration structures and parsing.

#[cfg(test)]
mod config_tests {
    use crate::config::*;
    use crate::error::EngineError;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_yaml_str("").unwrap();

        assert!(config.asset.is_none());
        assert_eq!(config.context.trade_capacity, 20);
        assert_eq!(config.context.chat_capacity, 10);
        assert_eq!(config.triggers.large_trade_threshold, 0.5);
        assert_eq!(config.speech.max_pending, 3);
        assert_eq!(config.speech.min_duration_ms, 3_000);
        assert_eq!(config.gateway.min_interval_ms, 8_000);
        assert_eq!(config.feed.max_reconnect_attempts, 5);
        assert_eq!(config.feed.reconnect_base_delay_ms, 2_000);
        assert_eq!(config.server.bind, "0.0.0.0:3456");
        assert_eq!(config.server.max_audio_clips, 50);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let yaml = r#"
asset: "DapsZMWnySYgexnmF75yq4XKaH8RBF2YeWtRvtD8pump"
triggers:
  large_trade_threshold: 2.0
  chat_probability: 0.5
speech:
  max_pending: 5
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.watched_asset(), Some("DapsZMWnySYgexnmF75yq4XKaH8RBF2YeWtRvtD8pump"));
        assert_eq!(config.triggers.large_trade_threshold, 2.0);
        assert_eq!(config.triggers.chat_probability, 0.5);
        assert_eq!(config.triggers.periodic_probability, 0.2);
        assert_eq!(config.speech.max_pending, 5);
        assert_eq!(config.speech.per_word_ms, 200);
    }

    #[test]
    fn test_bom_is_stripped() {
        let yaml = "\u{feff}asset: abc\n";
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.watched_asset(), Some("abc"));
    }

    #[test]
    fn test_blank_asset_is_not_watched() {
        let config = AppConfig::from_yaml_str("asset: \"   \"\n").unwrap();
        assert_eq!(config.watched_asset(), None);
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let yaml = r#"
triggers:
  chat_probability: 1.5
"#;
        let err = AppConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("chat_probability")));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let yaml = r#"
context:
  trade_capacity: 0
"#;
        assert!(matches!(AppConfig::from_yaml_str(yaml), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_zero_audio_clips_rejected() {
        let yaml = r#"
server:
  max_audio_clips: 0
"#;
        let err = AppConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("max_audio_clips")));
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        assert!(matches!(AppConfig::from_yaml_str("triggers: [1, 2"), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::load("./definitely/not/here/config.yaml").unwrap();
        assert_eq!(config.context.trade_capacity, 20);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_BASE_URL", "https://api.groq.com/openai/v1"),
            ("ELEVENLABS_API_KEY", "xi-test"),
            ("WATCH_ASSET", "mint123"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.base_url.as_deref(), Some("https://api.groq.com/openai/v1"));
        assert_eq!(config.voice.api_key.as_deref(), Some("xi-test"));
        assert_eq!(config.watched_asset(), Some("mint123"));
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("from-file".to_string());
        config.apply_overrides(|k| if k == "LLM_API_KEY" { Some("  ".to_string()) } else { None });
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_persona_override() {
        let yaml = r#"
persona:
  name: "Rex"
  catchphrases: ["send it"]
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.persona.name, "Rex");
        assert_eq!(config.persona.catchphrases, vec!["send it".to_string()]);
        // untouched persona fields keep their defaults
        assert!(!config.persona.reactions.big_buy.is_empty());
    }
}
