//! Built-in attribute validators

use crate::schema::{Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{Diagnostic, Dynamic};

/// Rejects numbers below a lower bound. Null and unknown values pass.
pub struct NumberAtLeast {
    min: f64,
}

impl NumberAtLeast {
    pub fn create(min: f64) -> Box<dyn Validator> {
        Box::new(Self { min })
    }
}

impl Validator for NumberAtLeast {
    fn description(&self) -> String {
        format!("value must be at least {}", self.min)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Vec::new();
        if let Dynamic::Number(n) = request.config_value.value {
            if n < self.min {
                diagnostics.push(
                    Diagnostic::error(
                        "Invalid Attribute Value",
                        format!(
                            "Attribute {} {}, got: {}",
                            request.path,
                            self.description(),
                            n
                        ),
                    )
                    .with_attribute(request.path),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}

/// Requires a known string to be non-blank
pub struct StringNotBlank;

impl StringNotBlank {
    pub fn create() -> Box<dyn Validator> {
        Box::new(Self)
    }
}

impl Validator for StringNotBlank {
    fn description(&self) -> String {
        "value must not be empty".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let mut diagnostics = Vec::new();
        if let Dynamic::String(s) = &request.config_value.value {
            if s.trim().is_empty() {
                diagnostics.push(
                    Diagnostic::error(
                        "Invalid Attribute Value",
                        format!("Attribute {} {}", request.path, self.description()),
                    )
                    .with_attribute(request.path),
                );
            }
        }
        ValidatorResponse { diagnostics }
    }
}
