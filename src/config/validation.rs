use rustc_hash::FxHashSet;

use super::{AppConfig, ConfigError};

/// Semantic validation of a loaded configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] describing the first problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(validation("server.port must be non-zero"));
    }
    if config.server.timeout == 0 {
        return Err(validation("server.timeout must be non-zero"));
    }

    let notion = &config.notion;
    if notion.base_url.trim().is_empty() {
        return Err(validation("notion.base_url must not be empty"));
    }
    if notion.token_v2.trim().is_empty() {
        return Err(validation(
            "notion.token_v2 is missing; supply the session cookie in config.yaml or the credential overlay",
        ));
    }
    if notion.space_id.trim().is_empty() {
        return Err(validation("notion.space_id must not be empty"));
    }
    if notion.user_id.trim().is_empty() {
        return Err(validation("notion.user_id must not be empty"));
    }

    let mut seen_aliases = FxHashSet::default();
    for alias in &config.models.aliases {
        if alias.id.trim().is_empty() {
            return Err(validation("models.aliases entries must have a non-empty id"));
        }
        if alias.upstream.trim().is_empty() {
            return Err(validation(format!(
                "models.aliases entry '{}' must have a non-empty upstream code",
                alias.id
            )));
        }
        if !seen_aliases.insert(alias.id.as_str()) {
            return Err(validation(format!(
                "models.aliases contains duplicate id '{}'",
                alias.id
            )));
        }
    }

    if !config.models.aliases.is_empty()
        && !config
            .models
            .aliases
            .iter()
            .any(|alias| alias.id == config.models.default_model)
    {
        return Err(validation(format!(
            "models.default '{}' is not present in models.aliases",
            config.models.default_model
        )));
    }

    if config
        .client_authentication
        .allowed_keys
        .iter()
        .any(|key| key.trim().is_empty())
    {
        return Err(validation(
            "client_authentication.allowed_keys must not contain empty keys",
        ));
    }

    Ok(())
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelAlias;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.notion.token_v2 = "v02:token".into();
        config.notion.space_id = "space-uuid".into();
        config.notion.user_id = "user-uuid".into();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_cookie_rejected() {
        let mut config = valid_config();
        config.notion.token_v2 = String::new();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("token_v2"));
    }

    #[test]
    fn test_missing_space_id_rejected() {
        let mut config = valid_config();
        config.notion.space_id = "  ".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut config = valid_config();
        config.models.aliases.push(ModelAlias {
            id: "claude-opus-4.5".into(),
            upstream: "other".into(),
        });
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unresolvable_default_rejected() {
        let mut config = valid_config();
        config.models.default_model = "ghost-model".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("ghost-model"));
    }

    #[test]
    fn test_empty_client_key_rejected() {
        let mut config = valid_config();
        config.client_authentication.allowed_keys = vec![String::new()];
        assert!(validate_config(&config).is_err());
    }
}
