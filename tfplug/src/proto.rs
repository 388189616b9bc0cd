//! Protocol buffer types for Terraform Plugin Protocol v6
//!
//! The generated code is included from the build output directory. Several
//! protobuf messages share names with framework types (`DynamicValue`,
//! `Diagnostic`, `Schema`), so refer to these through the `proto::` prefix.
//!
//! - RPC request and response types live in snake_case modules, e.g.
//!   `proto::read_resource::Request`.
//! - Nested enums live beside their message, e.g. `proto::diagnostic::Severity`.

include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

pub use provider_server::{Provider as ProviderService, ProviderServer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_types_accessible() {
        let _ = diagnostic::Severity::Warning;
        let _ = attribute_path::step::Selector::AttributeName("id".to_string());
        let _ = schema::nested_block::NestingMode::List;
        let _ = schema::object::NestingMode::Single;
        let _ = import_resource_state::ImportedResource::default();
    }

    #[test]
    fn stop_provider_response_carries_error_text() {
        let response = stop_provider::Response {
            error: "still running".to_string(),
        };
        assert_eq!(response.error, "still running");
    }
}
