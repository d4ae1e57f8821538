//! Askama template data for the generated Go files.
//!
//! Every template lives under `templates/go/`. Values are precomputed Go
//! fragments so the templates stay free of logic beyond loops and flags.

use askama::Template;

/// `alias "path"` in an import block
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GoImport {
    pub alias: String,
    pub path: String,
}

impl GoImport {
    pub fn new(alias: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            path: path.into(),
        }
    }
}

/// `out.Target = in.Source`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: String,
    pub source: String,
}

/// A generated conversion function between wire types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converter {
    pub name: String,
    /// `in *pkg.T`, empty when there is no input
    pub param: String,
    pub to_type: String,
    /// First statement, declaring `out`
    pub init: String,
    pub assignments: Vec<Assignment>,
    /// Target fields without a matching source
    pub unmapped: Vec<String>,
}

/// Direct dependencies of one class.
#[derive(Debug, Clone)]
pub struct DependencyGroup {
    pub class_name: String,
    /// Pascal-case class, e.g. `Client`
    pub field: String,
    pub members: Vec<DependencyMember>,
}

#[derive(Debug, Clone)]
pub struct DependencyMember {
    /// Pascal-case instance name
    pub field: String,
    pub alias: String,
    pub export_type: String,
}

/// `module/dependencies.go`, emitted for every instance.
#[derive(Template)]
#[template(path = "go/dependencies.go.txt", escape = "none")]
pub struct DependenciesTemplate {
    pub instance_name: String,
    pub class_name: String,
    pub imports: Vec<GoImport>,
    pub groups: Vec<DependencyGroup>,
}

/// One exposed client method.
#[derive(Debug, Clone)]
pub struct ClientMethod {
    pub name: String,
    /// `Service::method`
    pub qualified: String,
    pub params: String,
    pub arg_names: String,
    pub results: String,
    pub has_response: bool,
    pub response_type: String,
    /// Arguments after `ctx` in the runtime call
    pub call_args: String,
}

/// `<name>.go` of a client.
#[derive(Template)]
#[template(path = "go/client.go.txt", escape = "none")]
pub struct ClientTemplate {
    pub package_name: String,
    pub instance_name: String,
    pub impl_name: String,
    /// `GRPC`, `HTTP` or `TChannel`
    pub transport: String,
    pub transport_label: String,
    pub service_name: String,
    pub export_name: String,
    pub timeout_ms: u64,
    pub module_import: String,
    pub imports: Vec<GoImport>,
    pub methods: Vec<ClientMethod>,
}

/// `mock-client/mock_client.go`
#[derive(Template)]
#[template(path = "go/mock_client.go.txt", escape = "none")]
pub struct MockClientTemplate {
    pub instance_name: String,
    pub client_alias: String,
    pub client_import: String,
    pub imports: Vec<GoImport>,
    pub methods: Vec<ClientMethod>,
}

#[derive(Debug, Clone)]
pub struct I64Hint {
    pub func_suffix: String,
    pub go_type: String,
    /// `Long` or `Date`
    pub codec: String,
}

/// `types_i64.go` of a client whose IDL closure declares i64 JSON hints.
#[derive(Template)]
#[template(path = "go/types_i64.go.txt", escape = "none")]
pub struct I64Template {
    pub package_name: String,
    pub imports: Vec<GoImport>,
    pub hints: Vec<I64Hint>,
}

/// `<name>.go` of a middleware or adapter.
#[derive(Template)]
#[template(path = "go/component.go.txt", escape = "none")]
pub struct ComponentTemplate {
    pub package_name: String,
    pub instance_name: String,
    pub class_name: String,
    pub impl_name: String,
    pub export_name: String,
    pub export_type: String,
    pub module_import: String,
    /// Go raw string literal of the default options
    pub options: String,
    pub is_middleware: bool,
}

/// `endpoint.go`
#[derive(Template)]
#[template(path = "go/endpoint.go.txt", escape = "none")]
pub struct EndpointTemplate {
    pub package_name: String,
    pub instance_name: String,
    pub impl_name: String,
    pub export_name: String,
    pub module_import: String,
    /// Handler constructor names
    pub handlers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MiddlewareUse {
    pub field: String,
    /// Go raw string literal
    pub options: String,
}

/// `<service>_<method>.go` of an endpoint.
#[derive(Template)]
#[template(path = "go/handler.go.txt", escape = "none")]
pub struct HandlerTemplate {
    pub package_name: String,
    pub module_import: String,
    pub workflow_import: String,
    pub imports: Vec<GoImport>,
    pub struct_name: String,
    pub qualified: String,
    pub endpoint_id: String,
    pub handler_id: String,
    pub is_http: bool,
    pub http_method: String,
    pub http_path: String,
    pub service_name: String,
    pub method_name: String,
    pub middlewares: Vec<MiddlewareUse>,
    /// Empty unless QPS levels are enabled
    pub qps_level: String,
    pub trace_key: String,
    pub has_request: bool,
    pub request_decl: String,
    /// `, &requestBody`, `, requestBody` or empty
    pub request_pass: String,
    pub workflow_name: String,
    pub results_lhs: String,
    pub has_response: bool,
}

/// `workflow/<service>_<method>.go` of an endpoint.
#[derive(Template)]
#[template(path = "go/workflow.go.txt", escape = "none")]
pub struct WorkflowTemplate {
    pub module_import: String,
    pub imports: Vec<GoImport>,
    pub name: String,
    pub impl_name: String,
    pub qualified: String,
    /// `, r *pkg.T` or empty
    pub request_param: String,
    pub results: String,
    pub propagated_headers: Vec<String>,
    pub has_client: bool,
    pub client_field: String,
    pub client_method: String,
    pub client_args: String,
    pub call_lhs: String,
    pub error_return: String,
    pub success_return: String,
    pub converters: Vec<Converter>,
}

/// `main/main.go` of a service.
#[derive(Template)]
#[template(path = "go/main.go.txt", escape = "none")]
pub struct ServiceMainTemplate {
    pub service_name: String,
    pub module_import: String,
}

/// Dependencies of one tree node, by class.
#[derive(Debug, Clone)]
pub struct InitDeps {
    pub field: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InitNode {
    pub field: String,
    pub alias: String,
    pub export_type: String,
    /// Qualified constructor, e.g. `echoClientgenerated.NewClient`
    pub constructor: String,
    pub module_alias: String,
    pub deps: Vec<InitDeps>,
    /// Replaces construction when non-empty
    pub mock_expr: String,
}

#[derive(Debug, Clone)]
pub struct InitGroup {
    pub field: String,
    pub class_name: String,
    pub nodes: Vec<InitNode>,
}

#[derive(Debug, Clone)]
pub struct MockClientNode {
    pub field: String,
    pub mock_alias: String,
}

/// `module/init.go` and `mock-service/mock_init.go` of a service.
#[derive(Template)]
#[template(path = "go/init.go.txt", escape = "none")]
pub struct InitTemplate {
    pub package_name: String,
    pub func_name: String,
    /// `module.` in the mock package, empty otherwise
    pub type_prefix: String,
    pub service_name: String,
    pub imports: Vec<GoImport>,
    pub groups: Vec<InitGroup>,
    pub direct: Vec<InitDeps>,
    pub endpoints: Vec<String>,
    pub mock: bool,
    pub mock_clients: Vec<MockClientNode>,
}
