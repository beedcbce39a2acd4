//! Configuration validation utilities

use crate::communicator::CommunicatorPreparer;
use crate::interpolate::InterpolateContext;
use crate::schema::Config;
use types::{parse_duration, utils, ValidationError, ValidationErrors};

/// Storage sizes UpCloud accepts, in GB
const STORAGE_SIZE_RANGE: std::ops::RangeInclusive<u32> = 10..=2048;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a decoded configuration that already has its defaults
    /// applied. Fills in derived fields as a side effect.
    pub fn validate(
        config: &mut Config,
        communicator: &dyn CommunicatorPreparer,
        ctx: &InterpolateContext,
    ) -> ValidationReport {
        let mut report = ValidationReport::new();

        // Communicator settings
        report.add_errors(communicator.prepare(&mut config.comm, ctx));

        // Key pair files
        Self::validate_key_files(config, &mut report);

        // Required settings
        Self::validate_required(config, &mut report);

        // State timeout
        Self::validate_state_timeout(config, &mut report);

        // Non-fatal checks
        Self::validate_template_prefix(config, &mut report);
        Self::validate_storage(config, &mut report);
        Self::validate_zone(config, &mut report);

        report
    }

    fn validate_key_files(config: &Config, report: &mut ValidationReport) {
        if !config.has_ssh_keypair() {
            return;
        }

        if utils::is_missing_file(&config.ssh_private_keyfile) {
            report.add_error(ValidationError::file_not_found("ssh_private_keyfile"));
        }

        if utils::is_missing_file(&config.ssh_public_keyfile) {
            report.add_error(ValidationError::file_not_found("ssh_public_keyfile"));
        }
    }

    fn validate_required(config: &Config, report: &mut ValidationReport) {
        let required = [
            ("username", &config.username),
            ("password", &config.password),
            ("zone", &config.zone),
            ("storage_uuid", &config.storage_uuid),
        ];

        for (field, value) in required {
            if value.is_empty() {
                report.add_error(ValidationError::missing(field));
            }
        }
    }

    fn validate_state_timeout(config: &mut Config, report: &mut ValidationReport) {
        match parse_duration(&config.state_timeout_duration) {
            Ok(timeout) => config.state_timeout = timeout,
            Err(source) => report.add_error(ValidationError::InvalidDuration {
                field: "state_timeout_duration".to_string(),
                source,
            }),
        }
    }

    fn validate_template_prefix(config: &Config, report: &mut ValidationReport) {
        if config.template_prefix.is_empty() {
            report.add_warning(
                "template_prefix",
                "No template prefix set, templates will be named by timestamp only",
            );
        }
    }

    fn validate_storage(config: &Config, report: &mut ValidationReport) {
        if !config.storage_uuid.is_empty() && !utils::is_valid_uuid(&config.storage_uuid) {
            report.add_warning(
                "storage_uuid",
                &format!("{:?} does not look like a storage UUID", config.storage_uuid),
            );
        }

        if !STORAGE_SIZE_RANGE.contains(&config.storage_size) {
            report.add_warning(
                "storage_size",
                &format!(
                    "Storage size {}GB is outside the supported range {}-{}GB",
                    config.storage_size,
                    STORAGE_SIZE_RANGE.start(),
                    STORAGE_SIZE_RANGE.end()
                ),
            );
        }
    }

    fn validate_zone(config: &Config, report: &mut ValidationReport) {
        if !config.zone.is_empty() && !utils::is_valid_zone(&config.zone) {
            report.add_warning(
                "zone",
                &format!("Unknown zone format {:?}, expected something like \"fi-hel1\"", config.zone),
            );
        }
    }
}

/// Validation report containing errors and warnings
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: ValidationErrors,
    pub warnings: Vec<ValidationIssue>,
}

/// A non-fatal validation finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: ValidationErrors::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_errors(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        self.errors.extend(errors);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn summary(&self) -> String {
        format!("Validation: {} errors, {} warnings", self.errors.len(), self.warnings.len())
    }

    /// Warnings when valid, otherwise every error
    pub fn into_result(self) -> Result<Vec<ValidationIssue>, ValidationErrors> {
        if self.has_errors() {
            Err(self.errors)
        } else {
            Ok(self.warnings)
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}
