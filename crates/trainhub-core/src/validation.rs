use thiserror::Error;

use crate::model::{CreateTrainingCmd, KeyValue};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("compute type, version and flavor are required")]
    IncompleteCompute,
    #[error("empty key in {0}")]
    EmptyKey(&'static str),
    #[error("invalid input at index {0}")]
    InvalidInput(usize),
}

impl CreateTrainingCmd {
    /// Checks the command carries everything submission needs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("user", &self.user),
            ("project_repo_id", &self.project_repo_id),
            ("project_name", &self.project_name),
            ("name", &self.name),
            ("code_dir", &self.code_dir),
            ("boot_file", &self.boot_file),
            ("project_id", &self.project_id),
            ("training_id", &self.training_id),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }

        let c = &self.compute;
        if c.kind.is_empty() || c.version.is_empty() || c.flavor.is_empty() {
            return Err(ValidationError::IncompleteCompute);
        }

        check_keys("hyperparameters", &self.hyperparameters)?;
        check_keys("env", &self.env)?;

        for (i, input) in self.inputs.iter().enumerate() {
            if input.key.is_empty() || input.value.owner.is_empty() || input.value.repo_id.is_empty() {
                return Err(ValidationError::InvalidInput(i));
            }
        }

        Ok(())
    }
}

fn check_keys(what: &'static str, kv: &[KeyValue]) -> Result<(), ValidationError> {
    if kv.iter().any(|kv| kv.key.is_empty()) {
        return Err(ValidationError::EmptyKey(what));
    }
    Ok(())
}
