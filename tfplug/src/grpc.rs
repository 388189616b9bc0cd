//! gRPC service implementation for the factory-based Provider
//!
//! Resources and data sources are created on demand through the provider's
//! factories for every RPC and configured with the data returned from
//! `ConfigureProvider`. The service also owns the framework side of planning:
//! defaults, unknown computed values, plan modifiers and requires-replace.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::error::{Result, TfplugError};
use crate::plan_modifier::values_equal;
use crate::proto;
use crate::provider::{
    ConfigureProviderRequest, Provider, ProviderSchemaRequest, ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceSchemaRequest,
    ResourceWithConfigure, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{
    Attribute, AttributeType, DefaultRequest, PlanModifierRequest, Schema, StringKind,
    ValidatorRequest,
};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, ClientCapabilities, Diagnostic,
    DiagnosticSeverity, Dynamic, DynamicValue,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;
type RpcResult<T> = std::result::Result<Response<T>, Status>;

pub struct GrpcProviderServer<P: Provider> {
    provider: Arc<RwLock<P>>,
    provider_data: Arc<RwLock<ProviderData>>,
    stop: Context,
}

impl<P: Provider + 'static> GrpcProviderServer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(RwLock::new(provider)),
            provider_data: Arc::new(RwLock::new(None)),
            stop: Context::new(),
        }
    }

    /// Context shared by all requests; cancelled by StopProvider
    pub fn context(&self) -> Context {
        self.stop.clone()
    }

    async fn resource(
        &self,
        type_name: &str,
    ) -> Result<(Box<dyn ResourceWithConfigure>, Vec<Diagnostic>)> {
        let factory = self
            .provider
            .read()
            .await
            .resources()
            .get(type_name)
            .copied()
            .ok_or_else(|| TfplugError::ResourceNotFound(type_name.to_string()))?;

        let mut resource = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(self.context(), ConfigureResourceRequest { provider_data })
            .await;
        Ok((resource, response.diagnostics))
    }

    async fn data_source(
        &self,
        type_name: &str,
    ) -> Result<(Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>)> {
        let factory = self
            .provider
            .read()
            .await
            .data_sources()
            .get(type_name)
            .copied()
            .ok_or_else(|| TfplugError::DataSourceNotFound(type_name.to_string()))?;

        let mut data_source = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = data_source
            .configure(self.context(), ConfigureDataSourceRequest { provider_data })
            .await;
        Ok((data_source, response.diagnostics))
    }

    async fn resource_schema(
        &self,
        resource: &dyn ResourceWithConfigure,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Schema {
        let response = resource
            .schema(self.context(), ResourceSchemaRequest)
            .await;
        diagnostics.extend(response.diagnostics);
        response.schema
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::ProviderService for GrpcProviderServer<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> RpcResult<proto::get_metadata::Response> {
        let provider = self.provider.read().await;

        let mut resources: Vec<String> = provider.resources().into_keys().collect();
        let mut data_sources: Vec<String> = provider.data_sources().into_keys().collect();
        resources.sort();
        data_sources.sort();

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: vec![],
            data_sources: data_sources
                .into_iter()
                .map(|type_name| proto::get_metadata::DataSourceMetadata { type_name })
                .collect(),
            resources: resources
                .into_iter()
                .map(|type_name| proto::get_metadata::ResourceMetadata { type_name })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> RpcResult<proto::get_provider_schema::Response> {
        let mut diagnostics = Vec::new();

        let (provider_schema, resource_factories, data_source_factories) = {
            let provider = self.provider.read().await;
            let response = provider
                .schema(self.context(), ProviderSchemaRequest)
                .await;
            diagnostics.extend(response.diagnostics);
            (
                schema_to_proto(&response.schema)?,
                provider.resources(),
                provider.data_sources(),
            )
        };

        let mut resource_schemas = HashMap::new();
        for (type_name, factory) in resource_factories {
            let response = factory()
                .schema(self.context(), ResourceSchemaRequest)
                .await;
            diagnostics.extend(response.diagnostics);
            resource_schemas.insert(type_name, schema_to_proto(&response.schema)?);
        }

        let mut data_source_schemas = HashMap::new();
        for (type_name, factory) in data_source_factories {
            let response = factory()
                .schema(self.context(), DataSourceSchemaRequest)
                .await;
            diagnostics.extend(response.diagnostics);
            data_source_schemas.insert(type_name, schema_to_proto(&response.schema)?);
        }

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(provider_schema),
            resource_schemas,
            data_source_schemas,
            diagnostics: diagnostics_to_proto(diagnostics),
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> RpcResult<proto::validate_provider_config::Response> {
        let req = request.into_inner();
        let config = decode_value(req.config.as_ref())?;

        let provider = self.provider.read().await;
        let schema = provider
            .schema(self.context(), ProviderSchemaRequest)
            .await
            .schema;
        let mut diagnostics = validate_against_schema(&config, &schema);
        if !has_errors(&diagnostics) {
            let response = provider
                .validate(self.context(), ValidateProviderConfigRequest { config })
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> RpcResult<proto::validate_resource_config::Response> {
        let req = request.into_inner();
        let (resource, _) = self.resource(&req.type_name).await?;
        let config = decode_value(req.config.as_ref())?;

        let mut diagnostics = Vec::new();
        let schema = self.resource_schema(resource.as_ref(), &mut diagnostics).await;
        diagnostics.extend(validate_against_schema(&config, &schema));

        if !has_errors(&diagnostics) {
            let response = resource
                .validate(
                    self.context(),
                    ValidateResourceConfigRequest {
                        type_name: req.type_name,
                        config,
                        client_capabilities: client_capabilities(req.client_capabilities),
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> RpcResult<proto::validate_data_resource_config::Response> {
        let req = request.into_inner();
        let (data_source, _) = self.data_source(&req.type_name).await?;
        let config = decode_value(req.config.as_ref())?;

        let schema_response = data_source
            .schema(self.context(), DataSourceSchemaRequest)
            .await;
        let mut diagnostics = schema_response.diagnostics;
        diagnostics.extend(validate_against_schema(&config, &schema_response.schema));

        if !has_errors(&diagnostics) {
            let response = data_source
                .validate(
                    self.context(),
                    ValidateDataSourceConfigRequest {
                        type_name: req.type_name,
                        config,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> RpcResult<proto::upgrade_resource_state::Response> {
        let req = request.into_inner();
        let (resource, _) = self.resource(&req.type_name).await?;

        let mut diagnostics = Vec::new();
        let schema = self.resource_schema(resource.as_ref(), &mut diagnostics).await;

        let raw_json = req.raw_state.map(|raw| raw.json).unwrap_or_default();
        if raw_json.is_empty() {
            diagnostics.push(Diagnostic::error(
                "Unable to Upgrade Resource State",
                format!(
                    "State for {} was stored in the legacy flatmap format, which this provider does not read.",
                    req.type_name
                ),
            ));
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(diagnostics),
            }));
        }

        tracing::debug!(
            type_name = %req.type_name,
            stored_version = req.version,
            schema_version = schema.version,
            "upgrading resource state"
        );

        let stored = DynamicValue::decode_json(&raw_json)?;
        let upgraded = conform_to_schema(stored, &schema);

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode_value(&upgraded)?),
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn get_resource_identity_schemas(
        &self,
        _request: Request<proto::get_resource_identity_schemas::Request>,
    ) -> RpcResult<proto::get_resource_identity_schemas::Response> {
        Ok(Response::new(
            proto::get_resource_identity_schemas::Response {
                diagnostics: vec![],
            },
        ))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> RpcResult<proto::configure_provider::Response> {
        let req = request.into_inner();
        let config = decode_value(req.config.as_ref())?;

        tracing::debug!(terraform_version = %req.terraform_version, "configuring provider");

        let response = self
            .provider
            .write()
            .await
            .configure(
                self.context(),
                ConfigureProviderRequest {
                    terraform_version: req.terraform_version,
                    config,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> RpcResult<proto::read_resource::Response> {
        let req = request.into_inner();
        let (resource, mut diagnostics) = self.resource(&req.type_name).await?;
        let current_state = decode_value(req.current_state.as_ref())?;

        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::read_resource::Response {
                new_state: Some(encode_value(&current_state)?),
                diagnostics: diagnostics_to_proto(diagnostics),
                private: req.private,
            }));
        }

        let schema = self.resource_schema(resource.as_ref(), &mut diagnostics).await;
        let response = resource
            .read(
                self.context(),
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state,
                    private: req.private,
                    provider_meta: optional_value(req.provider_meta.as_ref())?,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let new_state = match response.new_state {
            Some(state) => conform_to_schema(state, &schema),
            None => {
                tracing::info!(type_name = %req.type_name, "resource no longer exists, removing from state");
                DynamicValue::null()
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_value(&new_state)?),
            diagnostics: diagnostics_to_proto(diagnostics),
            private: response.private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> RpcResult<proto::plan_resource_change::Response> {
        let req = request.into_inner();
        let (resource, mut diagnostics) = self.resource(&req.type_name).await?;

        let prior_state = decode_value(req.prior_state.as_ref())?;
        let proposed_new_state = decode_value(req.proposed_new_state.as_ref())?;
        let config = decode_value(req.config.as_ref())?;

        if proposed_new_state.is_null() {
            return Ok(Response::new(proto::plan_resource_change::Response {
                planned_state: Some(encode_value(&DynamicValue::null())?),
                requires_replace: vec![],
                planned_private: req.prior_private,
                diagnostics: diagnostics_to_proto(diagnostics),
                legacy_type_system: false,
            }));
        }

        let schema = self.resource_schema(resource.as_ref(), &mut diagnostics).await;
        let plan = plan_change(&schema, &prior_state, &proposed_new_state, &config);
        diagnostics.extend(plan.diagnostics);

        let planned_state = conform_to_schema(plan.planned_state, &schema);

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_value(&planned_state)?),
            requires_replace: plan.requires_replace.iter().map(path_to_proto).collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> RpcResult<proto::apply_resource_change::Response> {
        let req = request.into_inner();
        let (resource, mut diagnostics) = self.resource(&req.type_name).await?;

        let prior_state = decode_value(req.prior_state.as_ref())?;
        let planned_state = decode_value(req.planned_state.as_ref())?;
        let config = decode_value(req.config.as_ref())?;
        let provider_meta = optional_value(req.provider_meta.as_ref())?;

        let schema = self.resource_schema(resource.as_ref(), &mut diagnostics).await;
        let ctx = self.context();

        let (new_state, private) = if planned_state.is_null() {
            tracing::debug!(type_name = %req.type_name, "deleting resource");
            let response = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_private: req.planned_private.clone(),
                        provider_meta,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            if has_errors(&diagnostics) {
                (prior_state, req.planned_private)
            } else {
                (DynamicValue::null(), Vec::new())
            }
        } else if prior_state.is_null() {
            tracing::debug!(type_name = %req.type_name, "creating resource");
            let response = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name: req.type_name.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                        provider_meta,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            let mut state = response.new_state;
            resolve_unknowns(&mut state.value, &Dynamic::Null);
            (state, response.private)
        } else {
            tracing::debug!(type_name = %req.type_name, "updating resource");
            let response = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior_state.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private.clone(),
                        provider_meta,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
            if has_errors(&diagnostics) {
                (prior_state, req.planned_private)
            } else {
                let mut state = response.new_state;
                resolve_unknowns(&mut state.value, &prior_state.value);
                (state, response.private)
            }
        };

        let new_state = if new_state.is_null() {
            new_state
        } else {
            conform_to_schema(new_state, &schema)
        };

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_value(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> RpcResult<proto::import_resource_state::Response> {
        let req = request.into_inner();
        let (resource, mut diagnostics) = self.resource(&req.type_name).await?;

        let Some(importer) = resource.as_import_state() else {
            diagnostics.push(Diagnostic::error(
                "Resource Import Not Implemented",
                format!(
                    "This resource does not support import. Please contact the provider developer for additional information. Resource type: {}",
                    req.type_name
                ),
            ));
            return Ok(Response::new(proto::import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: diagnostics_to_proto(diagnostics),
            }));
        };

        let schema = self.resource_schema(resource.as_ref(), &mut diagnostics).await;
        let response = importer
            .import_state(
                self.context(),
                ImportResourceStateRequest {
                    type_name: req.type_name,
                    id: req.id,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let mut imported_resources = Vec::with_capacity(response.imported_resources.len());
        for imported in response.imported_resources {
            let state = conform_to_schema(imported.state, &schema);
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_value(&state)?),
                private: imported.private,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> RpcResult<proto::read_data_source::Response> {
        let req = request.into_inner();
        let (data_source, mut diagnostics) = self.data_source(&req.type_name).await?;
        let config = decode_value(req.config.as_ref())?;

        if has_errors(&diagnostics) {
            return Ok(Response::new(proto::read_data_source::Response {
                state: None,
                diagnostics: diagnostics_to_proto(diagnostics),
            }));
        }

        let schema_response = data_source
            .schema(self.context(), DataSourceSchemaRequest)
            .await;
        diagnostics.extend(schema_response.diagnostics);

        tracing::debug!(type_name = %req.type_name, "reading data source");

        let response = data_source
            .read(
                self.context(),
                ReadDataSourceRequest {
                    type_name: req.type_name,
                    config,
                    provider_meta: optional_value(req.provider_meta.as_ref())?,
                    client_capabilities: client_capabilities(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let state = if has_errors(&diagnostics) && response.state.is_null() {
            None
        } else {
            let mut state = conform_to_schema(response.state, &schema_response.schema);
            resolve_unknowns(&mut state.value, &Dynamic::Null);
            Some(encode_value(&state)?)
        };

        Ok(Response::new(proto::read_data_source::Response {
            state,
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn get_functions(
        &self,
        _request: Request<proto::get_functions::Request>,
    ) -> RpcResult<proto::get_functions::Response> {
        Ok(Response::new(proto::get_functions::Response {
            diagnostics: vec![],
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> RpcResult<proto::stop_provider::Response> {
        tracing::info!("stop requested, cancelling in-flight operations");
        self.stop.cancel();
        Ok(Response::new(proto::stop_provider::Response {
            error: String::new(),
        }))
    }
}

/// Outcome of the framework's planning pass over one resource
pub(crate) struct PlannedChange {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Plan a create or update:
/// 1. defaults fill attributes whose configuration is null
/// 2. computed attributes without configuration become unknown when creating
///    or when anything else changed
/// 3. plan modifiers run per attribute, collecting requires-replace paths
pub(crate) fn plan_change(
    schema: &Schema,
    prior_state: &DynamicValue,
    proposed_new_state: &DynamicValue,
    config: &DynamicValue,
) -> PlannedChange {
    let mut planned = proposed_new_state.clone();
    let mut diagnostics = Vec::new();
    let is_create = prior_state.is_null();

    for attr in &schema.block.attributes {
        let path = AttributePath::new(&attr.name);
        let Some(default) = &attr.default else {
            continue;
        };
        if attribute_value(config, &path).is_null() {
            let response = default.default_value(DefaultRequest { path: path.clone() });
            set_planned(&mut planned, &path, response.value.value, &mut diagnostics);
        }
    }

    if is_create || !values_equal(&planned.value, &prior_state.value) {
        for attr in schema
            .block
            .attributes
            .iter()
            .filter(|attr| attr.computed && attr.default.is_none())
        {
            let path = AttributePath::new(&attr.name);
            if attribute_value(config, &path).is_null() {
                set_planned(&mut planned, &path, Dynamic::Unknown, &mut diagnostics);
            }
        }
    }

    let mut requires_replace = Vec::new();
    for attr in schema
        .block
        .attributes
        .iter()
        .filter(|attr| !attr.plan_modifiers.is_empty())
    {
        let path = AttributePath::new(&attr.name);
        let mut plan_value = DynamicValue::new(attribute_value(&planned, &path));
        let mut replace = false;

        for modifier in &attr.plan_modifiers {
            let response = modifier.modify(PlanModifierRequest {
                config_value: DynamicValue::new(attribute_value(config, &path)),
                state_value: DynamicValue::new(attribute_value(prior_state, &path)),
                plan_value,
                path: path.clone(),
            });
            plan_value = response.plan_value;
            replace |= response.requires_replace;
            diagnostics.extend(response.diagnostics);
        }

        set_planned(&mut planned, &path, plan_value.value, &mut diagnostics);
        if replace && !is_create {
            requires_replace.push(path);
        }
    }

    PlannedChange {
        planned_state: planned,
        requires_replace,
        diagnostics,
    }
}

fn attribute_value(value: &DynamicValue, path: &AttributePath) -> Dynamic {
    value.get(path).cloned().unwrap_or(Dynamic::Null)
}

fn set_planned(
    planned: &mut DynamicValue,
    path: &AttributePath,
    value: Dynamic,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Err(e) = planned.set(path, value) {
        diagnostics.push(
            Diagnostic::error("Unable to plan attribute", e.to_string())
                .with_attribute(path.clone()),
        );
    }
}

/// Replace unknown values left in an applied state with the matching prior
/// value, or null where there is none
pub(crate) fn resolve_unknowns(value: &mut Dynamic, prior: &Dynamic) {
    match value {
        Dynamic::Unknown => *value = prior.clone(),
        Dynamic::Map(entries) => {
            for (key, entry) in entries.iter_mut() {
                let prior_entry = match prior {
                    Dynamic::Map(prior_entries) => prior_entries.get(key).unwrap_or(&Dynamic::Null),
                    _ => &Dynamic::Null,
                };
                resolve_unknowns(entry, prior_entry);
            }
        }
        Dynamic::List(items) => {
            for (idx, item) in items.iter_mut().enumerate() {
                let prior_item = match prior {
                    Dynamic::List(prior_items) => prior_items.get(idx).unwrap_or(&Dynamic::Null),
                    _ => &Dynamic::Null,
                };
                resolve_unknowns(item, prior_item);
            }
        }
        _ => {}
    }
}

/// Terraform decodes objects strictly: every schema attribute must be
/// present and nothing else. Missing attributes become null.
pub(crate) fn conform_to_schema(value: DynamicValue, schema: &Schema) -> DynamicValue {
    let Dynamic::Map(mut entries) = value.value else {
        return value;
    };

    let conformed = schema
        .block
        .attributes
        .iter()
        .map(|attr| {
            let entry = entries.remove(&attr.name).unwrap_or(Dynamic::Null);
            (attr.name.clone(), conform_value(entry, &attr.r#type))
        })
        .collect();

    DynamicValue::new(Dynamic::Map(conformed))
}

fn conform_value(value: Dynamic, ty: &AttributeType) -> Dynamic {
    match (value, ty) {
        (Dynamic::Map(mut entries), AttributeType::Object(fields)) => Dynamic::Map(
            fields
                .iter()
                .map(|(name, field_type)| {
                    let entry = entries.remove(name).unwrap_or(Dynamic::Null);
                    (name.clone(), conform_value(entry, field_type))
                })
                .collect(),
        ),
        (Dynamic::Map(entries), AttributeType::Map(elem)) => Dynamic::Map(
            entries
                .into_iter()
                .map(|(key, entry)| (key, conform_value(entry, elem)))
                .collect(),
        ),
        (Dynamic::List(items), AttributeType::List(elem) | AttributeType::Set(elem)) => {
            Dynamic::List(
                items
                    .into_iter()
                    .map(|item| conform_value(item, elem))
                    .collect(),
            )
        }
        (value, _) => value,
    }
}

/// Checks shared by every validation RPC: required attributes, value types,
/// attributes the schema does not know, and per-attribute validators
pub(crate) fn validate_against_schema(config: &DynamicValue, schema: &Schema) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let values = match &config.value {
        Dynamic::Map(values) => values,
        Dynamic::Null | Dynamic::Unknown => return diagnostics,
        other => {
            diagnostics.push(Diagnostic::error(
                "Invalid configuration",
                format!("Expected an object, got {}", other.type_name()),
            ));
            return diagnostics;
        }
    };

    for attr in &schema.block.attributes {
        let path = AttributePath::new(&attr.name);
        let value = values.get(&attr.name).unwrap_or(&Dynamic::Null);

        if value.is_null() {
            if attr.required {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!("The argument \"{}\" is required, but no definition was found.", attr.name),
                    )
                    .with_attribute(path),
                );
            }
            continue;
        }

        if !attr.r#type.accepts(value) {
            diagnostics.push(
                Diagnostic::error(
                    "Incorrect attribute value type",
                    format!(
                        "Attribute \"{}\" expects {}, got {}",
                        attr.name,
                        attr.r#type.to_json(),
                        value.type_name()
                    ),
                )
                .with_attribute(path),
            );
            continue;
        }

        if is_read_only(attr) && !value.is_unknown() {
            diagnostics.push(
                Diagnostic::error(
                    "Invalid Configuration for Read-Only Attribute",
                    format!(
                        "Cannot set value for attribute \"{}\" because it is computed by the provider.",
                        attr.name
                    ),
                )
                .with_attribute(path),
            );
            continue;
        }

        if value.is_unknown() {
            continue;
        }

        for validator in &attr.validators {
            let response = validator.validate(ValidatorRequest {
                config_value: DynamicValue::new(value.clone()),
                path: path.clone(),
            });
            diagnostics.extend(response.diagnostics);
        }
    }

    let mut unknown: Vec<&String> = values
        .keys()
        .filter(|name| schema.block.attribute(name).is_none())
        .collect();
    unknown.sort();
    for name in unknown {
        diagnostics.push(
            Diagnostic::error(
                "Unsupported argument",
                format!("An argument named \"{}\" is not expected here.", name),
            )
            .with_attribute(AttributePath::new(name)),
        );
    }

    diagnostics
}

fn is_read_only(attr: &Attribute) -> bool {
    attr.computed && !attr.optional && !attr.required
}

fn server_capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

fn client_capabilities(capabilities: Option<proto::ClientCapabilities>) -> ClientCapabilities {
    capabilities
        .map(|c| ClientCapabilities {
            deferral_allowed: c.deferral_allowed,
            write_only_attributes_allowed: c.write_only_attributes_allowed,
        })
        .unwrap_or_default()
}

pub(crate) fn decode_value(value: Option<&proto::DynamicValue>) -> Result<DynamicValue> {
    match value {
        Some(v) if !v.msgpack.is_empty() => DynamicValue::decode_msgpack(&v.msgpack),
        Some(v) if !v.json.is_empty() => DynamicValue::decode_json(&v.json),
        _ => Ok(DynamicValue::null()),
    }
}

fn optional_value(value: Option<&proto::DynamicValue>) -> Result<Option<DynamicValue>> {
    let decoded = decode_value(value)?;
    Ok((!decoded.is_null()).then_some(decoded))
}

pub(crate) fn encode_value(value: &DynamicValue) -> Result<proto::DynamicValue> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack()?,
        json: vec![],
    })
}

fn schema_to_proto(schema: &Schema) -> Result<proto::Schema> {
    let attributes = schema
        .block
        .attributes
        .iter()
        .map(attribute_to_proto)
        .collect::<Result<Vec<_>>>()?;

    Ok(proto::Schema {
        version: schema.version,
        block: Some(proto::schema::Block {
            version: schema.block.version,
            attributes,
            block_types: vec![],
            description: schema.block.description.clone(),
            description_kind: string_kind_to_proto(schema.block.description_kind) as i32,
            deprecated: schema.block.deprecated,
        }),
    })
}

fn attribute_to_proto(attr: &Attribute) -> Result<proto::schema::Attribute> {
    let r#type = serde_json::to_vec(&attr.r#type.to_json()).map_err(|e| {
        TfplugError::EncodingError(format!("attribute {} type: {}", attr.name, e))
    })?;

    Ok(proto::schema::Attribute {
        name: attr.name.clone(),
        r#type,
        nested_type: None,
        description: attr.description.clone(),
        required: attr.required,
        optional: attr.optional,
        computed: attr.computed,
        sensitive: attr.sensitive,
        description_kind: proto::StringKind::Plain as i32,
        deprecated: attr.deprecated,
        write_only: false,
    })
}

fn string_kind_to_proto(kind: StringKind) -> proto::StringKind {
    match kind {
        StringKind::Plain => proto::StringKind::Plain,
        StringKind::Markdown => proto::StringKind::Markdown,
    }
}

fn path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|diag| {
            let severity = match diag.severity {
                DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            };
            proto::Diagnostic {
                severity: severity as i32,
                summary: diag.summary,
                detail: diag.detail,
                attribute: diag.attribute.as_ref().map(path_to_proto),
            }
        })
        .collect()
}
