//! Engine configuration. Defaults can be overwritten by environment variables prefixed with
//! `SPRINGTIME_BIND_` or the `springtime-bind.json` file.

use crate::descriptor::StaticUpdatePolicy;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_ENV_PREFIX: &str = "SPRINGTIME_BIND";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "springtime-bind.json";

/// Configuration shared by all instances of a component type.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct BindingConfig {
    /// What an `updated` event does to a static dependency which doesn't choose its own policy.
    pub static_update: StaticUpdatePolicy,
    /// Resolve all field and callback targets when a component type is built and reject the
    /// type on the first failure, instead of ignoring broken targets at runtime.
    pub strict_targets: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            static_update: StaticUpdatePolicy::Reactivate,
            strict_targets: false,
        }
    }
}

impl From<OptionalBindingConfig> for BindingConfig {
    fn from(value: OptionalBindingConfig) -> Self {
        let default = Self::default();
        Self {
            static_update: value.static_update.unwrap_or(default.static_update),
            strict_targets: value.strict_targets.unwrap_or(default.strict_targets),
        }
    }
}

impl BindingConfig {
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Self::init_from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX)),
        )
    }

    fn init_from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .build()
            .and_then(|config| config.try_deserialize::<OptionalBindingConfig>())
            .map(|config| config.into())
    }
}

#[derive(Deserialize)]
struct OptionalBindingConfig {
    static_update: Option<StaticUpdatePolicy>,
    strict_targets: Option<bool>,
}

#[cfg(test)]
mod tests {
    use crate::config::BindingConfig;
    use crate::descriptor::StaticUpdatePolicy;
    use config::{Config, File, FileFormat};

    fn load(json: &str) -> BindingConfig {
        BindingConfig::init_from_builder(
            Config::builder().add_source(File::from_str(json, FileFormat::Json)),
        )
        .unwrap()
    }

    #[test]
    fn should_use_defaults_for_missing_values() {
        let config = load("{}");

        assert_eq!(config.static_update, StaticUpdatePolicy::Reactivate);
        assert!(!config.strict_targets);
    }

    #[test]
    fn should_read_values() {
        let config = load(r#"{ "static_update": "in-place", "strict_targets": true }"#);

        assert_eq!(config.static_update, StaticUpdatePolicy::InPlace);
        assert!(config.strict_targets);
    }

    #[test]
    fn should_reject_unknown_policy() {
        assert!(BindingConfig::init_from_builder(Config::builder().add_source(
            File::from_str(r#"{ "static_update": "sometimes" }"#, FileFormat::Json)
        ))
        .is_err());
    }
}
