//! Client generators: a typed Go client per IDL-backed client instance.
//!
//! Output, relative to the instance directory:
//!
//! - `<name>.go`: `Client` interface, transport-backed implementation and
//!   constructor (skipped when the instance opts out of export generation)
//! - `module/dependencies.go`
//! - `types_i64.go`: JSON codecs for i64 typedefs carrying a `js.type` hint
//! - `mock-client/mock_client.go`: when mocks are enabled
//!
//! Custom clients only get `module/dependencies.go`; their code is hand-written.

use super::deps;
use super::gotypes::{go_imports, http_route, GoSignature};
use super::templates::{ClientMethod, ClientTemplate, I64Hint, I64Template, MockClientTemplate};
use super::{finish_file, FileSet, GenerationContext, Generator};
use crate::error::GenError;
use crate::idl::{Function, IdlModule, ImportRef, Service};
use crate::module::{Instance, ResolvedInstance};
use crate::naming::pascal_case;
use askama::Template;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Request timeout when the instance sets none.
const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Wire transport of a client instance; one per registered client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Grpc,
    Http,
    TChannel,
    Custom,
}

impl Transport {
    /// The instance `type` this transport is registered under.
    pub fn type_name(self) -> &'static str {
        match self {
            Transport::Grpc => "grpc",
            Transport::Http => "http",
            Transport::TChannel => "tchannel",
            Transport::Custom => "custom",
        }
    }

    fn go_name(self) -> &'static str {
        match self {
            Transport::Grpc => "GRPC",
            Transport::Http => "HTTP",
            Transport::TChannel => "TChannel",
            Transport::Custom => "Custom",
        }
    }
}

/// A client method as exposed by the generated interface.
pub(crate) struct ExposedMethod<'m> {
    pub name: String,
    pub service: &'m Service,
    pub function: &'m Function,
}

impl ExposedMethod<'_> {
    pub fn qualified(&self) -> String {
        format!("{}::{}", self.service.name, self.function.name)
    }
}

/// Methods exposed by a client: the `exposedMethods` map when present,
/// otherwise every unary function as `<Service><Method>`.
pub(crate) fn exposed_methods<'m>(
    instance: &Instance,
    module: &'m IdlModule,
) -> Result<Vec<ExposedMethod<'m>>, GenError> {
    let invalid = |reason: String| GenError::invalid(instance.base_dir.join(&instance.relative_dir), reason);
    match instance.config.get("exposedMethods").and_then(Value::as_object) {
        Some(exposed) => exposed
            .iter()
            .map(|(name, target)| {
                let target = target
                    .as_str()
                    .ok_or_else(|| invalid(format!("exposedMethods.{name} must be a string")))?;
                let (service, function) = module.find_function(target).ok_or_else(|| {
                    invalid(format!(
                        "exposedMethods.{name} names {target} which is not in {}",
                        module.path.display()
                    ))
                })?;
                if function.client_streaming || function.server_streaming {
                    return Err(invalid(format!("exposedMethods.{name}: {target} is a streaming method")));
                }
                Ok(ExposedMethod {
                    name: name.clone(),
                    service,
                    function,
                })
            })
            .collect(),
        None => Ok(module
            .services
            .iter()
            .flat_map(|service| {
                service.functions.iter().filter_map(move |function| {
                    if function.client_streaming || function.server_streaming {
                        debug!(method = %function.name, "skipping streaming method");
                        return None;
                    }
                    Some(ExposedMethod {
                        name: format!("{}{}", pascal_case(&service.name), pascal_case(&function.name)),
                        service,
                        function,
                    })
                })
            })
            .collect()),
    }
}

/// Generates Go clients for one transport.
pub struct ClientGenerator {
    transport: Transport,
}

impl ClientGenerator {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    fn method_view(&self, prefix: &str, module: &IdlModule, method: &ExposedMethod<'_>) -> ClientMethod {
        let sig = GoSignature::of(module, method.service, method.function);
        let qualified = method.qualified();
        let request = if sig.request.is_some() { "request" } else { "nil" };
        let call_args = match self.transport {
            Transport::Http => {
                let (verb, path) = http_route(prefix, method.service, method.function);
                format!(
                    "\"{qualified}\", zanzibar.HTTPRoute{{Method: \"{verb}\", Path: \"{path}\"}}, {request}"
                )
            }
            _ => format!("\"{qualified}\", {request}"),
        };
        ClientMethod {
            name: method.name.clone(),
            qualified,
            params: sig.params(),
            arg_names: sig.arg_names(),
            results: sig.results(),
            has_response: sig.response.is_some(),
            response_type: sig.response.clone().unwrap_or_default(),
            call_args,
        }
    }

    fn i64_codecs(
        &self,
        instance: &Instance,
        modules: &[std::sync::Arc<IdlModule>],
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let mut packages = BTreeSet::new();
        let mut hints = Vec::new();
        for module in modules {
            for (name, js) in module.i64_hints() {
                packages.insert(module.package.clone());
                hints.push(I64Hint {
                    func_suffix: format!("{}{}", pascal_case(&module.package.package_name), pascal_case(name)),
                    go_type: format!("{}.{}", module.package.package_name, name),
                    codec: js.as_str().to_string(),
                });
            }
        }
        if hints.is_empty() {
            return Ok(None);
        }
        let text = I64Template {
            package_name: instance.package.package_name.clone(),
            imports: go_imports(&packages),
            hints,
        }
        .render()?;
        Ok(Some(finish_file(text)))
    }
}

impl Generator for ClientGenerator {
    fn options_schema(&self) -> Option<Value> {
        let schema = match self.transport {
            Transport::Custom => json!({
                "type": "object",
                "required": ["customImportPath"],
                "properties": {
                    "customImportPath": {"type": "string", "minLength": 1}
                }
            }),
            _ => json!({
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
                    "serviceName": {"type": "string"},
                    "timeout": {"type": "integer", "minimum": 1},
                    "exposedMethods": {
                        "type": "object",
                        "additionalProperties": {"type": "string", "pattern": "^[^:]+::[^:]+$"}
                    }
                }
            }),
        };
        Some(schema)
    }

    fn generate(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
    ) -> anyhow::Result<Option<FileSet>> {
        let instance = &resolved.instance;
        let mut files = FileSet::new();
        files.insert("module/dependencies.go", deps::render(resolved, ctx)?)?;
        if self.transport == Transport::Custom {
            return Ok(Some(files));
        }

        let idl_path = instance.idl_file.as_deref().ok_or_else(|| {
            GenError::invalid(
                instance.base_dir.join(&instance.relative_dir),
                "client has no IDL file",
            )
        })?;
        let module = ctx.idl.load(idl_path)?;
        let methods = exposed_methods(instance, &module)?;
        let prefix = ctx.helper.annotation_prefix();
        let views: Vec<ClientMethod> = methods
            .iter()
            .map(|m| self.method_view(prefix, &module, m))
            .collect();
        let packages: BTreeSet<ImportRef> = methods
            .iter()
            .flat_map(|m| GoSignature::of(&module, m.service, m.function).packages())
            .collect();
        let imports = go_imports(&packages);
        let package = &instance.package;

        if package.is_export_generated {
            let service_name = instance
                .config_str("serviceName")
                .map(str::to_string)
                .or_else(|| methods.first().map(|m| m.service.name.clone()))
                .unwrap_or_else(|| instance.name().to_string());
            let text = ClientTemplate {
                package_name: package.package_name.clone(),
                instance_name: instance.name().to_string(),
                impl_name: package.package_name.clone(),
                transport: self.transport.go_name().to_string(),
                transport_label: self.transport.type_name().to_string(),
                service_name,
                export_name: package.export_name.clone(),
                timeout_ms: instance
                    .config
                    .get("timeout")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
                module_import: package.module_package_path.clone(),
                imports: imports.clone(),
                methods: views.clone(),
            }
            .render()?;
            files.insert(format!("{}.go", instance.name()), finish_file(text))?;
        }

        if let Some(codecs) = self.i64_codecs(instance, &ctx.idl.closure(idl_path)?)? {
            files.insert("types_i64.go", codecs)?;
        }

        if ctx.helper.gen_mock() {
            let text = MockClientTemplate {
                instance_name: instance.name().to_string(),
                client_alias: package.package_alias.clone(),
                client_import: deps::export_import_path(instance),
                imports,
                methods: views,
            }
            .render()?;
            files.insert("mock-client/mock_client.go", finish_file(text))?;
        }
        Ok(Some(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_names() {
        assert_eq!(Transport::Grpc.type_name(), "grpc");
        assert_eq!(Transport::TChannel.go_name(), "TChannel");
    }

    #[test]
    fn test_custom_schema_requires_import_path() {
        let schema = ClientGenerator::new(Transport::Custom).options_schema().unwrap();
        let validator = jsonschema::validator_for(&schema).unwrap();
        assert!(validator.is_valid(&json!({"customImportPath": "github.com/acme/x"})));
        assert!(!validator.is_valid(&json!({})));
    }

    #[test]
    fn test_idl_schema_accepts_legacy_keys() {
        let schema = ClientGenerator::new(Transport::Http).options_schema().unwrap();
        let validator = jsonschema::validator_for(&schema).unwrap();
        assert!(validator.is_valid(&json!({"thriftFile": "bar/bar.thrift"})));
        assert!(validator.is_valid(&json!({
            "idlFile": "echo/echo.proto",
            "exposedMethods": {"Echo": "Echo::Echo"}
        })));
        assert!(!validator.is_valid(&json!({"idlFile": "x", "exposedMethods": {"Echo": "Echo"}})));
        assert!(!validator.is_valid(&json!({"timeout": 10})));
    }
}
