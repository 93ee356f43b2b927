pub mod schema;

pub use schema::{
    resolve_config_dir, Config, GatewayConfig, ProviderConfig, SessionsConfig, CONFIG_DIR_ENV,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert!(!config.provider.model.is_empty());
        assert!(config.provider.temperature > 0.0);
        assert!(config.sessions.max_history > 0);
    }

    #[test]
    fn config_json_schema_lists_sections() {
        let schema = schemars::schema_for!(Config);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("gateway"));
        assert!(json.contains("provider"));
        assert!(json.contains("sessions"));
        assert!(!json.contains("config_path"));
    }
}
