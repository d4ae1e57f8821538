//! Endpoint generators: request handlers and workflows for HTTP and TChannel
//! endpoints.
//!
//! The instance `config` names the endpoint IDL and, optionally, a `handlers`
//! map from `Service::method` to the client call that serves it:
//!
//! ```json
//! {
//!   "idlFile": "endpoints/bounce/bounce.thrift",
//!   "handlers": {
//!     "Bounce::bounce": {
//!       "clientId": "echo",
//!       "clientMethod": "EchoEcho",
//!       "middlewares": [{"name": "auth", "options": {"scope": "read"}}]
//!     }
//!   }
//! }
//! ```
//!
//! Without `handlers` every unary function gets a clientless workflow that
//! returns an empty response. Output per handled method:
//!
//! - `<service>_<method>.go`: handler and route registration
//! - `workflow/<service>_<method>.go`: workflow calling the client, with
//!   field-by-field request and response converters when the wire types differ
//!
//! plus `endpoint.go` and `module/dependencies.go`.

use super::client::exposed_methods;
use super::deps;
use super::gotypes::{
    assignments, converter, empty_value, go_imports, go_raw_string, http_route, is_pointer,
    nil_value, request_fields, type_fields, GoSignature,
};
use super::templates::{Converter, EndpointTemplate, HandlerTemplate, MiddlewareUse, WorkflowTemplate};
use super::{finish_file, FileSet, GenerationContext, Generator};
use crate::error::GenError;
use crate::fingerprint::canonical_json;
use crate::idl::{Function, IdlModule, ImportRef, Service};
use crate::module::{Instance, ResolvedInstance};
use crate::naming::{camel_case, pascal_case, snake_case};
use anyhow::Context;
use askama::Template;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointOptions {
    #[serde(default)]
    handlers: BTreeMap<String, HandlerOptions>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandlerOptions {
    client_id: Option<String>,
    client_method: Option<String>,
    #[serde(default)]
    middlewares: Vec<MiddlewareRef>,
    qps_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MiddlewareRef {
    name: String,
    #[serde(default)]
    options: Value,
}

/// One endpoint method with its settings.
struct Handled<'m> {
    service: &'m Service,
    function: &'m Function,
    options: HandlerOptions,
}

/// Names derived from `Service::method`.
struct HandlerNames {
    handler: String,
    workflow: String,
    workflow_impl: String,
    file: String,
}

impl HandlerNames {
    fn new(service: &Service, function: &Function) -> Self {
        let stem = format!("{}{}", pascal_case(&service.name), pascal_case(&function.name));
        Self {
            handler: format!("{stem}Handler"),
            workflow: format!("{stem}Workflow"),
            workflow_impl: camel_case(&format!("{stem}Workflow")),
            file: format!("{}_{}.go", snake_case(&service.name), snake_case(&function.name)),
        }
    }
}

/// Generates HTTP or TChannel endpoints.
pub struct EndpointGenerator {
    is_http: bool,
}

impl EndpointGenerator {
    pub fn new(is_http: bool) -> Self {
        Self { is_http }
    }

    fn handled<'m>(
        &self,
        instance: &Instance,
        module: &'m IdlModule,
        options: EndpointOptions,
    ) -> Result<Vec<Handled<'m>>, GenError> {
        if options.handlers.is_empty() {
            return Ok(module
                .services
                .iter()
                .flat_map(|service| {
                    service
                        .functions
                        .iter()
                        .filter(|f| !f.client_streaming && !f.server_streaming)
                        .map(move |function| Handled {
                            service,
                            function,
                            options: HandlerOptions::default(),
                        })
                })
                .collect());
        }
        options
            .handlers
            .into_iter()
            .map(|(qualified, options)| {
                let (service, function) = module.find_function(&qualified).ok_or_else(|| {
                    invalid(
                        instance,
                        format!("handlers names {qualified} which is not in {}", module.path.display()),
                    )
                })?;
                Ok(Handled {
                    service,
                    function,
                    options,
                })
            })
            .collect()
    }

    fn middlewares(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
        defaults: &[MiddlewareRef],
        options: &HandlerOptions,
    ) -> Result<Vec<MiddlewareUse>, GenError> {
        let own: BTreeSet<&str> = options.middlewares.iter().map(|m| m.name.as_str()).collect();
        defaults
            .iter()
            .filter(|m| !own.contains(m.name.as_str()))
            .chain(&options.middlewares)
            .map(|m| {
                let dep = ctx.dependency(resolved, "middleware", &m.name)?;
                let options = if m.options.is_null() {
                    json!({})
                } else {
                    m.options.clone()
                };
                Ok(MiddlewareUse {
                    field: dep.instance.package.qualified_instance_name.clone(),
                    options: go_raw_string(&String::from_utf8_lossy(&canonical_json(&options))),
                })
            })
            .collect()
    }

    fn handler_file(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
        module: &IdlModule,
        handled: &Handled<'_>,
        middlewares: Vec<MiddlewareUse>,
    ) -> anyhow::Result<Vec<u8>> {
        let instance = &resolved.instance;
        let names = HandlerNames::new(handled.service, handled.function);
        let sig = GoSignature::of(module, handled.service, handled.function);
        let (http_method, http_path) = http_route(ctx.helper.annotation_prefix(), handled.service, handled.function);
        let request = sig.request.clone().unwrap_or_default();
        let qps_level = if ctx.helper.qps_levels_enabled() {
            handled
                .options
                .qps_level
                .clone()
                .unwrap_or_else(|| "default".to_string())
        } else {
            String::new()
        };
        let text = HandlerTemplate {
            package_name: instance.package.package_name.clone(),
            module_import: instance.package.module_package_path.clone(),
            workflow_import: format!("{}/workflow", instance.package.generated_package_path),
            imports: go_imports(&sig.request_packages),
            struct_name: names.handler,
            qualified: format!("{}::{}", handled.service.name, handled.function.name),
            endpoint_id: instance.name().to_string(),
            handler_id: handled.function.name.clone(),
            is_http: self.is_http,
            http_method,
            http_path,
            service_name: handled.service.name.clone(),
            method_name: handled.function.name.clone(),
            middlewares,
            qps_level,
            trace_key: ctx.helper.trace_key().to_string(),
            has_request: sig.request.is_some(),
            request_decl: request.trim_start_matches('*').to_string(),
            request_pass: match &sig.request {
                Some(ty) if is_pointer(ty) => ", &requestBody".to_string(),
                Some(_) => ", requestBody".to_string(),
                None => String::new(),
            },
            workflow_name: names.workflow,
            results_lhs: if sig.response.is_some() {
                "response, resHeaders, err".to_string()
            } else {
                "resHeaders, err".to_string()
            },
            has_response: sig.response.is_some(),
        }
        .render()?;
        Ok(finish_file(text))
    }

    fn workflow_file(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
        module: &Arc<IdlModule>,
        handled: &Handled<'_>,
    ) -> anyhow::Result<Vec<u8>> {
        let instance = &resolved.instance;
        let names = HandlerNames::new(handled.service, handled.function);
        let sig = GoSignature::of(module, handled.service, handled.function);
        let mut packages: BTreeSet<ImportRef> = sig.packages();

        let mut view = WorkflowTemplate {
            module_import: instance.package.module_package_path.clone(),
            imports: Vec::new(),
            name: names.workflow,
            impl_name: names.workflow_impl.clone(),
            qualified: format!("{}::{}", handled.service.name, handled.function.name),
            request_param: sig
                .request
                .as_ref()
                .map(|t| format!(", r {t}"))
                .unwrap_or_default(),
            results: match &sig.response {
                Some(t) => format!("({t}, zanzibar.Header, error)"),
                None => "(zanzibar.Header, error)".to_string(),
            },
            propagated_headers: propagated_headers(ctx),
            has_client: false,
            client_field: String::new(),
            client_method: String::new(),
            client_args: String::new(),
            call_lhs: String::new(),
            error_return: String::new(),
            success_return: match &sig.response {
                Some(t) => format!("{}, nil, nil", empty_value(t)),
                None => "nil, nil".to_string(),
            },
            converters: Vec::new(),
        };

        match (&handled.options.client_id, &handled.options.client_method) {
            (None, None) => {}
            (Some(client_id), Some(client_method)) => {
                let call = ClientCall {
                    resolved,
                    ctx,
                    module,
                    handled,
                    sig: &sig,
                    impl_name: &names.workflow_impl,
                };
                call.wire(client_id, client_method, &mut view, &mut packages)?;
            }
            _ => {
                return Err(invalid(
                    instance,
                    format!(
                        "handler {} must set both clientId and clientMethod",
                        view.qualified
                    ),
                )
                .into())
            }
        }

        view.imports = go_imports(&packages);
        Ok(finish_file(view.render()?))
    }
}

/// Headers forwarded from endpoint requests to client calls, in order and
/// without duplicates.
fn propagated_headers(ctx: &GenerationContext<'_>) -> Vec<String> {
    let helper = ctx.helper;
    let mut seen = BTreeSet::new();
    [helper.trace_key(), helper.staging_req_header(), helper.deputy_req_header()]
        .into_iter()
        .chain(helper.default_headers().iter().map(String::as_str))
        .filter(|h| !h.is_empty() && seen.insert(h.to_ascii_lowercase()))
        .map(str::to_string)
        .collect()
}

fn invalid(instance: &Instance, reason: String) -> GenError {
    GenError::invalid(instance.base_dir.join(&instance.relative_dir), reason)
}

/// Wiring of one workflow to a client method.
struct ClientCall<'a, 'm> {
    resolved: &'a ResolvedInstance,
    ctx: &'a GenerationContext<'a>,
    module: &'a Arc<IdlModule>,
    handled: &'a Handled<'m>,
    sig: &'a GoSignature,
    impl_name: &'a str,
}

impl ClientCall<'_, '_> {
    fn wire(
        &self,
        client_id: &str,
        client_method: &str,
        view: &mut WorkflowTemplate,
        packages: &mut BTreeSet<ImportRef>,
    ) -> anyhow::Result<()> {
        let instance = &self.resolved.instance;
        let client = self.ctx.dependency(self.resolved, "client", client_id)?;
        let client_idl = client.instance.idl_file.as_deref().ok_or_else(|| {
            invalid(
                instance,
                format!("client `{client_id}` has no IDL file, its methods cannot be mapped"),
            )
        })?;
        let client_module = self
            .ctx
            .idl
            .load(client_idl)
            .with_context(|| format!("loading the IDL of client `{client_id}`"))?;
        let methods = exposed_methods(&client.instance, &client_module)?;
        let method = methods
            .iter()
            .find(|m| m.name == client_method)
            .ok_or_else(|| {
                invalid(
                    instance,
                    format!("client `{client_id}` has no method {client_method}"),
                )
            })?;
        let csig = GoSignature::of(&client_module, method.service, method.function);

        view.has_client = true;
        view.client_field = client.instance.package.qualified_instance_name.clone();
        view.client_method = client_method.to_string();

        // Request
        view.client_args = match &csig.request {
            None => String::new(),
            Some(client_type) if self.sig.request.as_ref() == Some(client_type) => ", r".to_string(),
            Some(client_type) => {
                let name = format!("{}ClientRequest", self.impl_name);
                let from = request_fields(self.ctx.idl, self.module, self.handled.function)?;
                let fields = match request_fields(self.ctx.idl, &client_module, method.function)? {
                    Some(to) => assignments(from.as_ref(), &to),
                    None => (Vec::new(), Vec::new()),
                };
                view.converters
                    .push(converter(name.clone(), self.sig.request.as_deref(), client_type, fields));
                packages.extend(csig.request_packages.iter().cloned());
                if self.sig.request.is_some() {
                    format!(", {name}(r)")
                } else {
                    format!(", {name}()")
                }
            }
        };

        // Response
        match &self.sig.response {
            Some(endpoint_type) => {
                view.error_return = format!("{}, nil, err", nil_value(endpoint_type));
                match &csig.response {
                    Some(client_type) if client_type == endpoint_type => {
                        view.call_lhs = "clientResponse, err :=".to_string();
                        view.success_return = "clientResponse, nil, nil".to_string();
                    }
                    Some(client_type) => {
                        let name = format!("{}Response", self.impl_name);
                        view.converters.push(self.response_converter(
                            &name,
                            &client_module,
                            method.function,
                            Some(client_type),
                            endpoint_type,
                        )?);
                        packages.extend(csig.response_packages.iter().cloned());
                        view.call_lhs = "clientResponse, err :=".to_string();
                        view.success_return = format!("{name}(clientResponse), nil, nil");
                    }
                    None => {
                        let name = format!("{}Response", self.impl_name);
                        view.converters.push(converter(
                            name.clone(),
                            None,
                            endpoint_type,
                            (Vec::new(), Vec::new()),
                        ));
                        view.call_lhs = "err :=".to_string();
                        view.success_return = format!("{name}(), nil, nil");
                    }
                }
            }
            None => {
                view.error_return = "nil, err".to_string();
                view.success_return = "nil, nil".to_string();
                view.call_lhs = if csig.response.is_some() {
                    "_, err :=".to_string()
                } else {
                    "err :=".to_string()
                };
            }
        }
        Ok(())
    }

    fn response_converter(
        &self,
        name: &str,
        client_module: &Arc<IdlModule>,
        client_function: &Function,
        client_type: Option<&String>,
        endpoint_type: &str,
    ) -> anyhow::Result<Converter> {
        let from = match &client_function.return_type {
            Some(ty) => type_fields(self.ctx.idl, client_module, ty)?,
            None => None,
        };
        let to = match &self.handled.function.return_type {
            Some(ty) => type_fields(self.ctx.idl, self.module, ty)?,
            None => None,
        };
        let fields = match to {
            Some(to) => assignments(from.as_ref(), &to),
            None => (Vec::new(), Vec::new()),
        };
        Ok(converter(
            name.to_string(),
            client_type.map(String::as_str),
            endpoint_type,
            fields,
        ))
    }
}

impl Generator for EndpointGenerator {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "anyOf": [
                {"required": ["idlFile"]},
                {"required": ["thriftFile"]},
                {"required": ["protoFile"]}
            ],
            "properties": {
                "idlFile": {"type": "string"},
                "thriftFile": {"type": "string"},
                "protoFile": {"type": "string"},
                "handlers": {
                    "type": "object",
                    "additionalProperties": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "clientId": {"type": "string"},
                            "clientMethod": {"type": "string"},
                            "qpsLevel": {"type": "string"},
                            "middlewares": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["name"],
                                    "properties": {
                                        "name": {"type": "string"},
                                        "options": {"type": "object"}
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }))
    }

    fn generate(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
    ) -> anyhow::Result<Option<FileSet>> {
        let instance = &resolved.instance;
        let idl_path = instance
            .idl_file
            .as_deref()
            .ok_or_else(|| invalid(instance, "endpoint has no IDL file".to_string()))?;
        let module = ctx.idl.load(idl_path)?;
        let options: EndpointOptions = if instance.config.is_null() {
            EndpointOptions::default()
        } else {
            serde_json::from_value(instance.config.clone())
                .map_err(|e| invalid(instance, format!("bad endpoint config: {e}")))?
        };
        let defaults: Vec<MiddlewareRef> = match ctx.helper.default_middleware_config()? {
            Some(value) => serde_json::from_value(value)
                .context("defaultMiddlewareConfig must be a list of {name, options} objects")?,
            None => Vec::new(),
        };
        let handled = self.handled(instance, &module, options)?;

        let mut files = FileSet::new();
        files.insert("module/dependencies.go", deps::render(resolved, ctx)?)?;
        let mut constructors = Vec::new();
        for entry in &handled {
            let names = HandlerNames::new(entry.service, entry.function);
            let middlewares = self.middlewares(resolved, ctx, &defaults, &entry.options)?;
            files.insert(
                &names.file,
                self.handler_file(resolved, ctx, &module, entry, middlewares)?,
            )?;
            files.insert(
                format!("workflow/{}", names.file),
                self.workflow_file(resolved, ctx, &module, entry)?,
            )?;
            constructors.push(format!("New{}", names.handler));
        }

        let package = &instance.package;
        if package.is_export_generated {
            let text = EndpointTemplate {
                package_name: package.package_name.clone(),
                instance_name: instance.name().to_string(),
                impl_name: package.package_name.clone(),
                export_name: package.export_name.clone(),
                module_import: package.module_package_path.clone(),
                handlers: constructors,
            }
            .render()?;
            files.insert("endpoint.go", finish_file(text))?;
        }
        Ok(Some(files))
    }
}
