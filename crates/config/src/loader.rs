//! Configuration loader implementation

use crate::communicator::{CommunicatorPreparer, StandardCommunicator};
use crate::interpolate::InterpolateContext;
use crate::schema::{self, Config};
use crate::validation::ConfigValidator;
use anyhow::Context;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};
use types::{utils, BuilderError, DecodeError, Result};

/// Loads raw build settings into a validated [`Config`].
///
/// Decoding fails fast with a [`DecodeError`]. Every later check is collected
/// and reported together as [`BuilderError::Validation`].
pub struct ConfigLoader {
    communicator: Box<dyn CommunicatorPreparer>,
    user_variables: BTreeMap<String, String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader using the standard communicator
    pub fn new() -> Self {
        Self {
            communicator: Box::new(StandardCommunicator),
            user_variables: BTreeMap::new(),
        }
    }

    /// Replace the communicator preparer
    pub fn with_communicator(mut self, communicator: impl CommunicatorPreparer + 'static) -> Self {
        self.communicator = Box::new(communicator);
        self
    }

    /// Add user variables. Values given in `packer_user_variables` win.
    pub fn with_user_variables(mut self, variables: impl IntoIterator<Item = (String, String)>) -> Self {
        self.user_variables.extend(variables);
        self
    }

    /// Load configuration from raw key/value maps, later maps taking
    /// precedence
    pub fn load(&self, raws: &[Value]) -> Result<Config> {
        let (mut config, ctx) = self.decode(raws)?;

        config.apply_defaults();

        let report = ConfigValidator::validate(&mut config, self.communicator.as_ref(), &ctx);
        debug!(communicator = self.communicator.name(), "{}", report.summary());

        let warnings = report.into_result()?;
        for warning in &warnings {
            warn!(field = %warning.field, "{}", warning.message);
        }

        info!(
            username = %utils::sanitize_for_logging(&config.username),
            zone = %config.zone,
            storage_uuid = %config.storage_uuid,
            storage_size = config.storage_size,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Load a YAML build definition, with `UPCLOUD_USERNAME` and
    /// `UPCLOUD_PASSWORD` overriding the file
    pub fn load_file<P: AsRef<Path>>(&self, config_path: P) -> Result<Config> {
        self.load_file_with(config_path, &[])
    }

    /// Like [`ConfigLoader::load_file`], with extra maps merged on top
    pub fn load_file_with<P: AsRef<Path>>(&self, config_path: P, overrides: &[Value]) -> Result<Config> {
        let config_path = config_path.as_ref();

        // Check if config file exists
        if !config_path.exists() {
            return Err(BuilderError::ConfigFileNotFound {
                path: config_path.display().to_string(),
            });
        }

        let raw: Value = Figment::new()
            .merge(Yaml::file(config_path))
            .merge(Serialized::defaults(credential_overrides()))
            .extract()
            .map_err(|e| DecodeError::Merge(e.to_string()))?;

        debug!(path = %config_path.display(), overrides = overrides.len(), "Read build definition");

        let mut raws = Vec::with_capacity(overrides.len() + 1);
        raws.push(raw);
        raws.extend_from_slice(overrides);
        self.load(&raws)
    }

    /// Load configuration from a YAML string
    pub fn load_from_str(&self, yaml_content: &str) -> Result<Config> {
        let raw: Value = Figment::new()
            .merge(Yaml::string(yaml_content))
            .extract()
            .map_err(|e| DecodeError::Merge(e.to_string()))?;

        self.load(&[raw])
    }

    /// Create example build definition file
    pub fn create_example<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
        let yaml_content = serde_yaml::to_string(&Config::example())
            .context("Failed to serialize example configuration")?;

        std::fs::write(path.as_ref(), yaml_content)
            .context("Failed to write example configuration file")?;

        Ok(())
    }

    /// Merge, interpolate and deserialize the raw inputs
    fn decode(&self, raws: &[Value]) -> std::result::Result<(Config, InterpolateContext), DecodeError> {
        let mut figment = Figment::new();
        for raw in raws {
            if !raw.is_object() {
                return Err(DecodeError::NotAMap {
                    found: value_kind(raw).to_string(),
                });
            }
            figment = figment.merge(Serialized::defaults(raw.clone()));
        }

        let mut merged: Map<String, Value> = figment
            .extract()
            .map_err(|e| DecodeError::Merge(e.to_string()))?;

        if let Some(key) = merged.keys().find(|key| !schema::is_known_key(key)) {
            return Err(DecodeError::UnknownKey { key: key.clone() });
        }

        let ctx = self.context_for(&merged)?;

        for (key, value) in merged.iter_mut() {
            // Host-provided values arrive already rendered
            if schema::PACKER_KEYS.contains(&key.as_str()) {
                continue;
            }
            ctx.render_value(key, value)
                .map_err(|(field, e)| DecodeError::Interpolation {
                    field,
                    message: e.to_string(),
                })?;
        }

        let config: Config = serde_json::from_value(Value::Object(merged))
            .map_err(|e| DecodeError::Type(e.to_string()))?;

        Ok((config, ctx))
    }

    /// Interpolation context seeded from the loader and the host keys
    fn context_for(&self, merged: &Map<String, Value>) -> std::result::Result<InterpolateContext, DecodeError> {
        let mut ctx = InterpolateContext::new();
        ctx.user_variables = self.user_variables.clone();

        if let Some(variables) = merged.get("packer_user_variables") {
            let variables: BTreeMap<String, String> = serde_json::from_value(variables.clone())
                .map_err(|e| DecodeError::Type(format!("packer_user_variables: {}", e)))?;
            ctx.user_variables.extend(variables);
        }

        if let Some(Value::String(name)) = merged.get("packer_build_name") {
            ctx.build_name = name.clone();
        }

        if let Some(Value::String(kind)) = merged.get("packer_builder_type") {
            ctx.build_type = kind.clone();
        }

        Ok(ctx)
    }
}

/// `UPCLOUD_USERNAME` and `UPCLOUD_PASSWORD`, kept verbatim so a password
/// such as `007` is not read as a number
fn credential_overrides() -> Map<String, Value> {
    Env::prefixed("UPCLOUD_")
        .only(&["username", "password"])
        .iter()
        .map(|(key, value)| (key.as_str().to_ascii_lowercase(), Value::String(value)))
        .collect()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::InterpolateContext;
    use crate::schema::CommunicatorConfig;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use types::ValidationError;

    fn minimal() -> Value {
        json!({
            "username": "api-user",
            "password": "secret",
            "zone": "fi-hel1",
            "storage_uuid": "01000000-0000-4000-8000-000030080200",
            "template_prefix": "ubuntu",
        })
    }

    fn validation_errors(result: Result<Config>) -> types::ValidationErrors {
        match result {
            Err(BuilderError::Validation(errors)) => errors,
            Err(other) => panic!("expected validation errors, got {}", other),
            Ok(_) => panic!("expected validation errors, got a config"),
        }
    }

    /// Preparer that records nothing and reports nothing
    struct NoopCommunicator;

    impl CommunicatorPreparer for NoopCommunicator {
        fn prepare(&self, _comm: &mut CommunicatorConfig, _ctx: &InterpolateContext) -> Vec<ValidationError> {
            Vec::new()
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    /// Preparer that always fails
    struct RejectingCommunicator;

    impl CommunicatorPreparer for RejectingCommunicator {
        fn prepare(&self, _comm: &mut CommunicatorConfig, _ctx: &InterpolateContext) -> Vec<ValidationError> {
            vec![ValidationError::invalid("ssh_host", "unreachable")]
        }

        fn name(&self) -> &str {
            "rejecting"
        }
    }

    #[test]
    fn test_load_applies_defaults() {
        let config = ConfigLoader::new().load(&[minimal()]).unwrap();

        assert_eq!(config.storage_size, 30);
        assert_eq!(config.comm.ssh_username, "root");
        assert_eq!(config.state_timeout_duration, "5m");
        assert_eq!(config.state_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_load_explicit_values() {
        let mut raw = minimal();
        raw["storage_size"] = json!(100);
        raw["state_timeout_duration"] = json!("10m");

        let config = ConfigLoader::new().load(&[raw]).unwrap();
        assert_eq!(config.storage_size, 100);
        assert_eq!(config.state_timeout_duration, "10m");
        assert_eq!(config.state_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_each_missing_required_field() {
        for field in ["username", "password", "zone", "storage_uuid"] {
            let mut raw = minimal();
            raw[field] = json!("");

            let errors = validation_errors(ConfigLoader::new().load(&[raw]));
            assert_eq!(errors.len(), 1, "{}", errors);
            assert_eq!(errors.for_field(field).count(), 1);
            assert_eq!(
                errors.iter().next().unwrap().to_string(),
                format!("\"{}\" must be specified", field)
            );
        }
    }

    #[test]
    fn test_empty_input_reports_everything() {
        let errors = validation_errors(ConfigLoader::new().load(&[]));
        let fields: Vec<_> = errors.iter().map(|e| e.field()).collect();
        assert_eq!(fields, vec!["username", "password", "zone", "storage_uuid"]);
    }

    #[test]
    fn test_empty_template_prefix_is_not_an_error() {
        let mut raw = minimal();
        raw["template_prefix"] = json!("");
        assert!(ConfigLoader::new().load(&[raw]).is_ok());
    }

    #[test]
    fn test_keyfile_check_needs_both_paths() {
        let mut raw = minimal();
        raw["ssh_private_keyfile"] = json!("/nonexistent/id_rsa");

        assert!(ConfigLoader::new().load(&[raw]).is_ok());
    }

    #[test]
    fn test_missing_keyfiles_reported_separately() {
        let mut raw = minimal();
        raw["ssh_private_keyfile"] = json!("/nonexistent/id_rsa");
        raw["ssh_public_keyfile"] = json!("/nonexistent/id_rsa.pub");

        let errors = validation_errors(ConfigLoader::new().load(&[raw]));
        let messages: Vec<_> = errors.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "ssh_private_keyfile does not exist",
                "ssh_public_keyfile does not exist"
            ]
        );
    }

    #[test]
    fn test_existing_keyfiles() {
        let private_key = NamedTempFile::new().unwrap();
        let public_key = NamedTempFile::new().unwrap();

        let mut raw = minimal();
        raw["ssh_private_keyfile"] = json!(private_key.path().display().to_string());
        raw["ssh_public_keyfile"] = json!(public_key.path().display().to_string());

        let config = ConfigLoader::new().load(&[raw]).unwrap();
        assert!(config.has_ssh_keypair());
    }

    #[test]
    fn test_bad_timeout_does_not_hide_other_errors() {
        let mut raw = minimal();
        raw["state_timeout_duration"] = json!("notaduration");
        raw["zone"] = json!("");

        let errors = validation_errors(ConfigLoader::new().load(&[raw]));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.for_field("zone").count(), 1);

        let timeout_error = errors.for_field("state_timeout_duration").next().unwrap();
        assert_eq!(
            timeout_error.to_string(),
            "Failed to parse state_timeout_duration: invalid duration \"notaduration\""
        );
    }

    #[test]
    fn test_later_maps_take_precedence() {
        let overrides = json!({ "zone": "de-fra1", "storage_size": 50 });

        let config = ConfigLoader::new().load(&[minimal(), overrides]).unwrap();
        assert_eq!(config.zone, "de-fra1");
        assert_eq!(config.storage_size, 50);
        assert_eq!(config.username, "api-user");
    }

    #[test]
    fn test_interpolation_before_decoding() {
        let mut raw = minimal();
        raw["password"] = json!("{{user `upcloud_password`}}");
        raw["storage_size"] = json!("{{user `size`}}");
        raw["template_prefix"] = json!("{{build_name}}-image");
        raw["packer_build_name"] = json!("upcloud");
        raw["packer_user_variables"] = json!({ "size": "64" });

        let config = ConfigLoader::new()
            .with_user_variables([("upcloud_password".to_string(), "hunter2".to_string())])
            .load(&[raw])
            .unwrap();

        assert_eq!(config.password, "hunter2");
        assert_eq!(config.storage_size, 64);
        assert_eq!(config.template_prefix, "upcloud-image");
        assert_eq!(config.packer.build_name, "upcloud");
    }

    #[test]
    fn test_decode_errors_fail_fast() {
        let loader = ConfigLoader::new();

        let result = loader.load(&[json!({ "flavour": "1xCPU-1GB" })]);
        assert!(matches!(
            result,
            Err(BuilderError::Decode(DecodeError::UnknownKey { ref key })) if key == "flavour"
        ));

        let result = loader.load(&[json!(["not", "a", "map"])]);
        assert!(matches!(result, Err(BuilderError::Decode(DecodeError::NotAMap { .. }))));

        // Type mismatch is reported even though required fields are missing too
        let result = loader.load(&[json!({ "storage_size": "large" })]);
        assert!(matches!(result, Err(BuilderError::Decode(DecodeError::Type(_)))));

        let result = loader.load(&[json!({ "zone": "{{user `zone`}}" })]);
        assert!(matches!(
            result,
            Err(BuilderError::Decode(DecodeError::Interpolation { ref field, .. })) if field == "zone"
        ));
    }

    #[test]
    fn test_injected_communicator() {
        let mut raw = minimal();
        raw["communicator"] = json!("carrier-pigeon");

        let config = ConfigLoader::new()
            .with_communicator(NoopCommunicator)
            .load(&[raw.clone()])
            .unwrap();
        assert_eq!(config.comm.kind, "carrier-pigeon");

        let errors = validation_errors(
            ConfigLoader::new()
                .with_communicator(RejectingCommunicator)
                .load(&[raw]),
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.iter().next().unwrap().field(), "ssh_host");
    }

    #[test]
    fn test_explicit_ssh_username_kept() {
        let mut raw = minimal();
        raw["ssh_username"] = json!("ubuntu");

        let config = ConfigLoader::new().load(&[raw]).unwrap();
        assert_eq!(config.comm.ssh_username, "ubuntu");
        assert_eq!(config.comm.ssh_port, 22);
    }

    #[test]
    fn test_load_from_string() {
        let yaml_content = r#"
username: "api-user"
password: "secret"
zone: "nl-ams1"
storage_uuid: "01000000-0000-4000-8000-000030080200"
template_prefix: "debian"
storage_size: 25
ssh_timeout: "2m"
"#;

        let config = ConfigLoader::new().load_from_str(yaml_content).unwrap();
        assert_eq!(config.zone, "nl-ams1");
        assert_eq!(config.storage_size, 25);
        assert_eq!(config.comm.ssh_timeout_duration, Duration::from_secs(120));
    }

    #[test]
    fn test_load_file_not_found() {
        let result = ConfigLoader::new().load_file("/nonexistent/build.yaml");
        assert!(matches!(result, Err(BuilderError::ConfigFileNotFound { .. })));
    }

    #[test]
    fn test_load_file_with_overrides() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "username: api-user\npassword: secret\nzone: fi-hel1\nstorage_uuid: 01000000-0000-4000-8000-000030080200\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .load_file_with(temp_file.path(), &[json!({ "zone": "uk-lon1", "storage_size": "40" })])
            .unwrap();
        assert_eq!(config.zone, "uk-lon1");
        assert_eq!(config.storage_size, 40);
    }

    fn write_definition(content: &str) -> NamedTempFile {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), content).unwrap();
        temp_file
    }

    #[test]
    fn test_env_credentials_override_file() {
        let temp_file = write_definition(
            "username: api-user\npassword: secret\nzone: fi-hel1\nstorage_uuid: 01000000-0000-4000-8000-000030080200\n",
        );

        let config = temp_env::with_vars(
            [("UPCLOUD_USERNAME", Some("ci-user")), ("UPCLOUD_PASSWORD", Some("20240309"))],
            || ConfigLoader::new().load_file(temp_file.path()),
        )
        .unwrap();

        assert_eq!(config.username, "ci-user");
        assert_eq!(config.password, "20240309");
        assert_eq!(config.zone, "fi-hel1");
    }

    #[test]
    fn test_env_password_keeps_leading_zeros() {
        let temp_file = write_definition(
            "username: api-user\nzone: fi-hel1\nstorage_uuid: 01000000-0000-4000-8000-000030080200\n",
        );

        let config = temp_env::with_var("UPCLOUD_PASSWORD", Some("0042"), || {
            ConfigLoader::new().load_file(temp_file.path())
        })
        .unwrap();

        assert_eq!(config.password, "0042");
    }

    #[test]
    fn test_numeric_password_in_yaml_and_json() {
        let yaml_content = r#"
username: api-user
password: 12345
zone: fi-hel1
storage_uuid: 01000000-0000-4000-8000-000030080200
"#;
        let config = ConfigLoader::new().load_from_str(yaml_content).unwrap();
        assert_eq!(config.password, "12345");

        let mut raw = minimal();
        raw["password"] = json!(12345);
        let config = ConfigLoader::new().load(&[raw]).unwrap();
        assert_eq!(config.password, "12345");
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let yaml_content = r#"
username: api-user
password: secret
zone: fi-hel1
storage_uuid: 01000000-0000-4000-8000-000030080200
storage_size:
state_timeout_duration:
"#;
        let config = ConfigLoader::new().load_from_str(yaml_content).unwrap();
        assert_eq!(config.storage_size, 30);
        assert_eq!(config.state_timeout, Duration::from_secs(300));

        let mut raw = minimal();
        raw["template_prefix"] = json!(null);
        let config = ConfigLoader::new().load(&[raw]).unwrap();
        assert!(config.template_prefix.is_empty());
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let mut raw = minimal();
        raw["state_timeout_duration"] = json!("-5m");

        let errors = validation_errors(ConfigLoader::new().load(&[raw]));
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.iter().next().unwrap().to_string(),
            "Failed to parse state_timeout_duration: negative duration \"-5m\""
        );
    }

    #[test]
    fn test_create_example_round_trips() {
        let temp_file = NamedTempFile::new().unwrap();
        ConfigLoader::create_example(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("zone:"));
        assert!(content.contains("storage_uuid:"));

        let config = ConfigLoader::new()
            .with_user_variables([
                ("upcloud_username".to_string(), "api-user".to_string()),
                ("upcloud_password".to_string(), "secret".to_string()),
            ])
            .load_from_str(&content)
            .unwrap();
        assert_eq!(config.username, "api-user");
        assert_eq!(config.template_prefix, "ubuntu-server");
    }

    #[test]
    fn test_client_factory_is_idempotent() {
        let config = ConfigLoader::new().load(&[minimal()]).unwrap();

        let first = config.build_client().unwrap();
        let second = config.build_client().unwrap();

        assert_eq!(first.client().username(), second.client().username());
        assert_eq!(first.client().username(), "api-user");
        assert_eq!(first.client().base_url(), second.client().base_url());
    }
}
