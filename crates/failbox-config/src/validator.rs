//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, StoreBackend};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_store(config, &mut result);
        Self::validate_ledger(config, &mut result);
        Self::validate_submit(config, &mut result);

        result
    }

    fn validate_store(config: &Config, result: &mut ValidationResult) {
        if config.store.backend == StoreBackend::File && config.store.path.is_none() {
            result.add_warning(ValidationWarning::new(
                "store.path",
                "File store path not set, will use default location",
            ));
        }

        if config.store.backend == StoreBackend::Memory {
            result.add_warning(ValidationWarning::new(
                "store.backend",
                "Memory store does not persist failures across runs",
            ));
        }
    }

    fn validate_ledger(config: &Config, result: &mut ValidationResult) {
        let ledger = &config.ledger;

        if ledger.default_queue.is_empty() {
            result.add_error(ValidationError::new(
                "ledger.default_queue",
                "Default failure queue cannot be empty",
            ));
        }

        if ledger.registry_key.is_empty() {
            result.add_error(ValidationError::new(
                "ledger.registry_key",
                "Registry key cannot be empty",
            ));
        }

        // An empty suffix would make every failure queue alias its source queue.
        if ledger.failure_suffix.is_empty() {
            result.add_error(ValidationError::new(
                "ledger.failure_suffix",
                "Failure suffix cannot be empty",
            ));
        }

        if ledger.registry_key == ledger.default_queue {
            result.add_error(ValidationError::new(
                "ledger.registry_key",
                "Registry key must differ from the default failure queue",
            ));
        }

        if ledger.backtrace_boundary.is_empty() {
            result.add_warning(ValidationWarning::new(
                "ledger.backtrace_boundary",
                "Empty backtrace boundary matches every frame, backtraces will be dropped",
            ));
        }
    }

    fn validate_submit(config: &Config, result: &mut ValidationResult) {
        if config.submit.queues_key.is_empty() {
            result.add_error(ValidationError::new(
                "submit.queues_key",
                "Queues key cannot be empty",
            ));
        }

        if config.submit.queue_prefix.is_empty() {
            result.add_warning(ValidationWarning::new(
                "submit.queue_prefix",
                "Empty queue prefix stores job queues next to failure queues",
            ));
        }
    }
}
