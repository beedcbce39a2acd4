//! Communicator (remote access) preparation
//!
//! The communicator settings describe how later build steps connect into the
//! provisioned server. They are defaulted and checked by a
//! [`CommunicatorPreparer`], which the loader receives as a collaborator so it
//! can be swapped out in tests.

use crate::interpolate::InterpolateContext;
use crate::schema::CommunicatorConfig;
use std::str::FromStr;
use types::{parse_duration, utils, ValidationError};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_TIMEOUT: &str = "5m";
pub const DEFAULT_SSH_HANDSHAKE_ATTEMPTS: u32 = 10;
pub const DEFAULT_WINRM_PORT: u16 = 5985;
pub const DEFAULT_WINRM_TIMEOUT: &str = "30m";

/// Supported ways of connecting into a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommunicatorType {
    #[default]
    Ssh,
    WinRm,
    None,
}

impl FromStr for CommunicatorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "ssh" => Ok(CommunicatorType::Ssh),
            "winrm" => Ok(CommunicatorType::WinRm),
            "none" => Ok(CommunicatorType::None),
            other => Err(format!("unknown communicator type {:?}", other)),
        }
    }
}

impl CommunicatorConfig {
    /// Parsed communicator type
    pub fn communicator_type(&self) -> Result<CommunicatorType, String> {
        self.kind.parse()
    }
}

/// Defaults and validates communicator settings
pub trait CommunicatorPreparer: Send + Sync {
    /// Apply defaults to `comm` and return every problem found
    fn prepare(&self, comm: &mut CommunicatorConfig, ctx: &InterpolateContext) -> Vec<ValidationError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Preparer covering the `ssh`, `winrm` and `none` communicators
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCommunicator;

impl CommunicatorPreparer for StandardCommunicator {
    fn prepare(&self, comm: &mut CommunicatorConfig, ctx: &InterpolateContext) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if comm.kind.is_empty() {
            comm.kind = "ssh".to_string();
        }

        match comm.communicator_type() {
            Ok(CommunicatorType::Ssh) => Self::prepare_ssh(comm, &mut errors),
            Ok(CommunicatorType::WinRm) => Self::prepare_winrm(comm, &mut errors),
            Ok(CommunicatorType::None) => {}
            Err(message) => errors.push(ValidationError::invalid("communicator", message)),
        }

        tracing::debug!(
            build = %ctx.build_name,
            communicator = %comm.kind,
            errors = errors.len(),
            "Prepared communicator"
        );

        errors
    }

    fn name(&self) -> &str {
        "standard"
    }
}

impl StandardCommunicator {
    fn prepare_ssh(comm: &mut CommunicatorConfig, errors: &mut Vec<ValidationError>) {
        if comm.ssh_port == 0 {
            comm.ssh_port = DEFAULT_SSH_PORT;
        }

        if comm.ssh_handshake_attempts == 0 {
            comm.ssh_handshake_attempts = DEFAULT_SSH_HANDSHAKE_ATTEMPTS;
        }

        if comm.ssh_timeout.is_empty() {
            comm.ssh_timeout = DEFAULT_SSH_TIMEOUT.to_string();
        }

        match parse_duration(&comm.ssh_timeout) {
            Ok(timeout) => comm.ssh_timeout_duration = timeout,
            Err(source) => errors.push(ValidationError::InvalidDuration {
                field: "ssh_timeout".to_string(),
                source,
            }),
        }

        if comm.ssh_username.is_empty() {
            errors.push(ValidationError::missing("ssh_username"));
        }

        if !comm.ssh_private_key_file.is_empty() && utils::is_missing_file(&comm.ssh_private_key_file) {
            errors.push(ValidationError::invalid(
                "ssh_private_key_file",
                format!("file {:?} does not exist", comm.ssh_private_key_file),
            ));
        }
    }

    fn prepare_winrm(comm: &mut CommunicatorConfig, errors: &mut Vec<ValidationError>) {
        if comm.winrm_port == 0 {
            comm.winrm_port = DEFAULT_WINRM_PORT;
        }

        if comm.winrm_timeout.is_empty() {
            comm.winrm_timeout = DEFAULT_WINRM_TIMEOUT.to_string();
        }

        match parse_duration(&comm.winrm_timeout) {
            Ok(timeout) => comm.winrm_timeout_duration = timeout,
            Err(source) => errors.push(ValidationError::InvalidDuration {
                field: "winrm_timeout".to_string(),
                source,
            }),
        }

        if comm.winrm_username.is_empty() {
            errors.push(ValidationError::missing("winrm_username"));
        }
    }
}
