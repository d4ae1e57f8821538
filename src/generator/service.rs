//! Service generator: the gateway binary and its dependency tree.
//!
//! Output:
//!
//! - `main/main.go`
//! - `module/dependencies.go`: the service's direct (endpoint) dependencies
//! - `module/init.go`: builds every instance in the service's dependency
//!   closure, class by class in class order
//! - `mock-service/mock_init.go`: the same tree with generated clients
//!   replaced by mocks, when mocks are enabled

use super::deps::{self, export_import_path};
use super::templates::{GoImport, InitDeps, InitGroup, InitNode, InitTemplate, MockClientNode, ServiceMainTemplate};
use super::{finish_file, FileSet, GenerationContext, Generator};
use crate::module::ResolvedInstance;
use crate::naming::pascal_case;
use askama::Template;
use serde_json::{json, Value};

/// Generates `gateway` services.
pub struct ServiceGenerator;

impl ServiceGenerator {
    fn node_deps(node: &ResolvedInstance, ctx: &GenerationContext<'_>) -> Vec<InitDeps> {
        ctx.graph
            .direct_by_class(node.id())
            .into_iter()
            .map(|(class, members)| InitDeps {
                field: pascal_case(&class),
                members: members
                    .iter()
                    .map(|m| m.instance.package.qualified_instance_name.clone())
                    .collect(),
            })
            .collect()
    }

    /// Whether `node` is initialised by a hand-written function instead of its
    /// generated constructor.
    fn custom_initialised(node: &ResolvedInstance, ctx: &GenerationContext<'_>) -> bool {
        ctx.helper.custom_initialisation_enabled()
            && node
                .instance
                .config
                .get("customInitialisation")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    fn has_mock(node: &ResolvedInstance) -> bool {
        node.instance.class() == "client" && node.instance.type_name != "custom"
    }

    fn render_init(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
        mock: bool,
    ) -> anyhow::Result<Vec<u8>> {
        let instance = &resolved.instance;
        let mut imports = Vec::new();
        let mut mock_clients = Vec::new();
        if mock {
            imports.push(GoImport::new("module", &instance.package.module_package_path));
        }

        let mut groups = Vec::new();
        for (class, members) in ctx.graph.closure_by_class(resolved.id()) {
            let field = pascal_case(&class);
            let mut nodes = Vec::new();
            for node in members {
                let package = &node.instance.package;
                let module_alias = format!("{}module", package.package_name);
                let mocked = mock && Self::has_mock(node);
                let mock_expr = if mocked {
                    let mock_alias = format!("{}mock", package.package_name);
                    imports.push(GoImport::new(
                        &mock_alias,
                        format!("{}/mock-client", package.generated_package_path),
                    ));
                    mock_clients.push(MockClientNode {
                        field: package.qualified_instance_name.clone(),
                        mock_alias,
                    });
                    format!("mockClientNodes.{}", package.qualified_instance_name)
                } else {
                    imports.push(GoImport::new(&module_alias, &package.module_package_path));
                    String::new()
                };
                if !mocked {
                    imports.push(GoImport::new(&package.package_alias, export_import_path(&node.instance)));
                }
                let constructor = if !mock && Self::custom_initialised(node, ctx) {
                    format!("custom{}{}", package.qualified_instance_name, package.export_type)
                } else {
                    format!("{}.{}", package.package_alias, package.export_name)
                };
                nodes.push(InitNode {
                    field: package.qualified_instance_name.clone(),
                    alias: package.package_alias.clone(),
                    export_type: package.export_type.clone(),
                    constructor,
                    module_alias,
                    deps: Self::node_deps(node, ctx),
                    mock_expr,
                });
            }
            groups.push(InitGroup {
                field,
                class_name: class,
                nodes,
            });
        }
        imports.sort();
        imports.dedup();

        let endpoints = ctx
            .graph
            .direct_by_class(resolved.id())
            .into_iter()
            .filter(|(class, _)| class == "endpoint")
            .flat_map(|(_, members)| {
                members
                    .into_iter()
                    .map(|m| m.instance.package.qualified_instance_name.clone())
            })
            .collect();

        let text = InitTemplate {
            package_name: if mock { "mockservice" } else { "module" }.to_string(),
            func_name: if mock {
                "InitializeDependenciesMock"
            } else {
                "InitializeDependencies"
            }
            .to_string(),
            type_prefix: if mock { "module." } else { "" }.to_string(),
            service_name: instance.name().to_string(),
            imports,
            groups,
            direct: Self::node_deps(resolved, ctx),
            endpoints,
            mock,
            mock_clients,
        }
        .render()?;
        Ok(finish_file(text))
    }
}

impl Generator for ServiceGenerator {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({"type": "object"}))
    }

    fn generate(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
    ) -> anyhow::Result<Option<FileSet>> {
        let instance = &resolved.instance;
        let mut files = FileSet::new();
        files.insert("module/dependencies.go", deps::render(resolved, ctx)?)?;
        files.insert("module/init.go", self.render_init(resolved, ctx, false)?)?;

        let main = ServiceMainTemplate {
            service_name: instance.name().to_string(),
            module_import: instance.package.module_package_path.clone(),
        }
        .render()?;
        files.insert("main/main.go", finish_file(main))?;

        if ctx.helper.gen_mock() {
            files.insert("mock-service/mock_init.go", self.render_init(resolved, ctx, true)?)?;
        }
        Ok(Some(files))
    }
}
