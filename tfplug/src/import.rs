//! Import helpers for simplifying resource import implementations

use crate::context::Context;
use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, DynamicValue};

/// Sets the import ID to a specific attribute in state
///
/// This is useful for simple resources where the import ID maps directly to
/// a single attribute in the resource state. The framework fills the remaining
/// attributes with null, and the following read populates them.
///
/// Example: ID "chk-123" -> state.id = "chk-123"
pub fn import_state_passthrough_id(
    _ctx: &Context,
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let mut state = DynamicValue::object();

    if let Err(e) = state.set_string(&attr_path, request.id.clone()) {
        response.diagnostics.push(
            Diagnostic::error(
                format!("Failed to set import ID: {}", e),
                format!(
                    "Could not set attribute '{}' to value '{}'",
                    attr_path, request.id
                ),
            )
            .with_attribute(attr_path),
        );
        return;
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
        private: Vec::new(),
    });
}

/// Splits an import ID of the form `a/b/...` into exactly `parts` non-empty
/// segments. Returns None when the shape does not match.
pub fn split_import_id(id: &str, parts: usize) -> Option<Vec<String>> {
    let segments: Vec<String> = id.split('/').map(|s| s.trim().to_string()).collect();
    if segments.len() != parts || segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientCapabilities;

    #[test]
    fn passthrough_sets_attribute() {
        let request = ImportResourceStateRequest {
            type_name: "forward_intent_check".to_string(),
            id: "chk-42".to_string(),
            client_capabilities: ClientCapabilities::default(),
        };
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        import_state_passthrough_id(
            &Context::new(),
            AttributePath::new("id"),
            &request,
            &mut response,
        );

        assert!(response.diagnostics.is_empty());
        assert_eq!(response.imported_resources.len(), 1);
        assert_eq!(
            response.imported_resources[0]
                .state
                .get_string(&AttributePath::new("id"))
                .unwrap(),
            "chk-42"
        );
    }

    #[test]
    fn split_import_id_requires_exact_shape() {
        assert_eq!(
            split_import_id("net-1/snap-2", 2),
            Some(vec!["net-1".to_string(), "snap-2".to_string()])
        );
        assert_eq!(split_import_id("snap-2", 2), None);
        assert_eq!(split_import_id("net-1/", 2), None);
        assert_eq!(split_import_id("a/b/c", 2), None);
    }
}
