//! Configuration schema definitions

use api_client::{Client, Service};
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Storage size in GB used when none is given
pub const DEFAULT_STORAGE_SIZE: u32 = 30;
/// How long to wait for server and storage state changes
pub const DEFAULT_STATE_TIMEOUT: &str = "5m";
/// Login user on UpCloud public templates
pub const DEFAULT_SSH_USERNAME: &str = "root";

/// Top-level keys consumed directly by [`Config`]
pub const CONFIG_KEYS: &[&str] = &[
    "username",
    "password",
    "zone",
    "storage_uuid",
    "template_prefix",
    "storage_size",
    "state_timeout_duration",
    "ssh_private_keyfile",
    "ssh_public_keyfile",
];

/// Keys consumed by [`CommunicatorConfig`]
pub const COMMUNICATOR_KEYS: &[&str] = &[
    "communicator",
    "ssh_host",
    "ssh_port",
    "ssh_username",
    "ssh_password",
    "ssh_private_key_file",
    "ssh_timeout",
    "ssh_handshake_attempts",
    "ssh_pty",
    "winrm_host",
    "winrm_port",
    "winrm_username",
    "winrm_password",
    "winrm_timeout",
    "winrm_use_ssl",
    "winrm_insecure",
];

/// Keys set by the host that runs the builder
pub const PACKER_KEYS: &[&str] = &[
    "packer_build_name",
    "packer_builder_type",
    "packer_debug",
    "packer_force",
    "packer_on_error",
    "packer_user_variables",
    "packer_sensitive_variables",
];

/// Whether any part of the configuration consumes `key`
pub fn is_known_key(key: &str) -> bool {
    CONFIG_KEYS.contains(&key) || COMMUNICATOR_KEYS.contains(&key) || PACKER_KEYS.contains(&key)
}

/// UpCloud builder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings passed in by the host
    #[serde(flatten)]
    pub packer: PackerConfig,
    /// How the build connects into the provisioned server
    #[serde(flatten)]
    pub comm: CommunicatorConfig,

    /// API username
    #[serde(default, deserialize_with = "lenient_string")]
    pub username: String,
    /// API password
    #[serde(default, deserialize_with = "lenient_string")]
    pub password: String,
    /// Zone the server is created in, e.g. `fi-hel1`
    #[serde(default, deserialize_with = "lenient_string")]
    pub zone: String,
    /// UUID of the storage (public template) the server boots from
    #[serde(default, deserialize_with = "lenient_string")]
    pub storage_uuid: String,
    /// Prefix for the name of the resulting template
    #[serde(default, deserialize_with = "lenient_string")]
    pub template_prefix: String,

    /// Storage size in GB
    #[serde(default, deserialize_with = "lenient")]
    pub storage_size: u32,
    /// Raw state timeout, e.g. `5m`
    #[serde(default, deserialize_with = "lenient_string")]
    pub state_timeout_duration: String,
    /// Private half of a key pair to install on the server
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub ssh_private_keyfile: String,
    /// Public half of a key pair to install on the server
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub ssh_public_keyfile: String,

    /// Parsed `state_timeout_duration`
    #[serde(skip)]
    pub state_timeout: Duration,
}

/// Settings the host passes to every builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackerConfig {
    #[serde(rename = "packer_build_name", default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub build_name: String,
    #[serde(rename = "packer_builder_type", default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub builder_type: String,
    #[serde(rename = "packer_debug", default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub debug: bool,
    #[serde(rename = "packer_force", default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub force: bool,
    #[serde(rename = "packer_on_error", default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub on_error: String,
    #[serde(rename = "packer_user_variables", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_variables: BTreeMap<String, String>,
    #[serde(rename = "packer_sensitive_variables", default, skip_serializing_if = "Vec::is_empty")]
    pub sensitive_variables: Vec<String>,
}

/// Communicator (remote access) configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunicatorConfig {
    /// `ssh`, `winrm` or `none`
    #[serde(rename = "communicator", default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub ssh_host: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero_u16")]
    pub ssh_port: u16,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub ssh_username: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub ssh_password: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub ssh_private_key_file: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub ssh_timeout: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero_u32")]
    pub ssh_handshake_attempts: u32,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub ssh_pty: bool,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub winrm_host: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_zero_u16")]
    pub winrm_port: u16,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub winrm_username: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub winrm_password: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "String::is_empty")]
    pub winrm_timeout: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub winrm_use_ssl: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub winrm_insecure: bool,

    /// Parsed `ssh_timeout`
    #[serde(skip)]
    pub ssh_timeout_duration: Duration,
    /// Parsed `winrm_timeout`
    #[serde(skip)]
    pub winrm_timeout_duration: Duration,
}

/// Accept either the native type or its string form. Interpolated values are
/// always strings, so `storage_size: "{{user `size`}}"` must still decode.
/// Null and the empty string both mean the zero value.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr + Default,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Native(T),
        Text(String),
    }

    match Option::<Raw<T>>::deserialize(deserializer)? {
        None => Ok(T::default()),
        Some(Raw::Native(value)) => Ok(value),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(T::default()),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map_err(|e| de::Error::custom(format!("invalid value {:?}: {}", text, e))),
    }
}

/// Accept any scalar for a string field. YAML and environment sources turn
/// `password: 12345` into a number before it gets here.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => String::new(),
        Some(Scalar::Text(text)) => text,
        Some(Scalar::Unsigned(n)) => n.to_string(),
        Some(Scalar::Signed(n)) => n.to_string(),
        Some(Scalar::Float(n)) => n.to_string(),
        Some(Scalar::Bool(b)) => b.to_string(),
    })
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero_u16(value: &u16) -> bool {
    *value == 0
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

impl Config {
    /// Fill in defaults for optional fields left at their zero value
    pub fn apply_defaults(&mut self) {
        if self.comm.ssh_username.is_empty() {
            self.comm.ssh_username = DEFAULT_SSH_USERNAME.to_string();
        }

        if self.storage_size == 0 {
            self.storage_size = DEFAULT_STORAGE_SIZE;
        }

        if self.state_timeout_duration.is_empty() {
            self.state_timeout_duration = DEFAULT_STATE_TIMEOUT.to_string();
        }
    }

    /// Whether a key pair should be installed on the server
    pub fn has_ssh_keypair(&self) -> bool {
        !self.ssh_private_keyfile.is_empty() && !self.ssh_public_keyfile.is_empty()
    }

    /// Construct an API service handle authenticated with the configured
    /// credentials. No request is made.
    pub fn build_client(&self) -> types::Result<Service> {
        let client = Client::new(self.username.clone(), self.password.clone())?;
        Ok(Service::new(client))
    }

    /// Name for the template produced by a build started at `at`
    pub fn template_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", self.template_prefix, at.format("%Y%m%d-%H%M%S"))
    }

    /// Example build definition used by `create_example`
    pub fn example() -> Self {
        Self {
            username: "{{user `upcloud_username`}}".to_string(),
            password: "{{user `upcloud_password`}}".to_string(),
            zone: "fi-hel1".to_string(),
            storage_uuid: "01000000-0000-4000-8000-000030080200".to_string(),
            template_prefix: "ubuntu-server".to_string(),
            storage_size: DEFAULT_STORAGE_SIZE,
            state_timeout_duration: DEFAULT_STATE_TIMEOUT.to_string(),
            comm: CommunicatorConfig {
                ssh_username: DEFAULT_SSH_USERNAME.to_string(),
                ..CommunicatorConfig::default()
            },
            ..Self::default()
        }
    }
}
