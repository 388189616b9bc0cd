//! Default value providers for attributes
//!
//! Defaults are evaluated during planning when an attribute's configuration
//! value is null. They only apply to optional attributes; the builder marks
//! such attributes computed so Terraform accepts a planned value that differs
//! from configuration.
//!
//! ```no_run
//! use tfplug::schema::AttributeBuilder;
//! use tfplug::defaults::StaticDefault;
//!
//! let timeout = AttributeBuilder::number("timeout_seconds")
//!     .optional()
//!     .default(StaticDefault::number(600.0))
//!     .build();
//! ```

use crate::schema::{Default, DefaultRequest, DefaultResponse};
use crate::types::{Dynamic, DynamicValue};

/// StaticDefault provides a static default value
pub struct StaticDefault {
    value: Dynamic,
}

impl StaticDefault {
    pub fn create(value: Dynamic) -> Box<dyn Default> {
        Box::new(Self { value })
    }

    pub fn string(value: &str) -> Box<dyn Default> {
        Self::create(Dynamic::String(value.to_string()))
    }

    pub fn number(value: f64) -> Box<dyn Default> {
        Self::create(Dynamic::Number(value))
    }

    pub fn bool(value: bool) -> Box<dyn Default> {
        Self::create(Dynamic::Bool(value))
    }

    /// Null default, for computed attributes that should plan as null rather
    /// than unknown when omitted
    pub fn null() -> Box<dyn Default> {
        Self::create(Dynamic::Null)
    }
}

impl Default for StaticDefault {
    fn description(&self) -> String {
        format!("static default value: {:?}", self.value)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        DefaultResponse {
            value: DynamicValue::new(self.value.clone()),
        }
    }
}
