//! `module/dependencies.go`: the typed dependency struct every instance's
//! constructor receives.

use super::templates::{DependenciesTemplate, DependencyGroup, DependencyMember, GoImport};
use super::{finish_file, GenerationContext};
use crate::module::{Instance, ResolvedInstance};
use crate::naming::pascal_case;
use askama::Template;

/// Go import path of an instance's exported package. Custom clients live in
/// hand-written packages named by `customImportPath`.
pub(crate) fn export_import_path(instance: &Instance) -> String {
    if instance.type_name == "custom" {
        if let Some(path) = instance.config_str("customImportPath") {
            return path.to_string();
        }
    }
    instance.package.generated_package_path.clone()
}

/// Direct dependencies grouped by class, in class order.
pub(crate) fn dependency_groups(
    resolved: &ResolvedInstance,
    ctx: &GenerationContext<'_>,
) -> (Vec<GoImport>, Vec<DependencyGroup>) {
    let mut imports = Vec::new();
    let groups = ctx
        .graph
        .direct_by_class(resolved.id())
        .into_iter()
        .map(|(class, members)| DependencyGroup {
            field: pascal_case(&class),
            class_name: class,
            members: members
                .into_iter()
                .map(|dep| {
                    let package = &dep.instance.package;
                    imports.push(GoImport::new(
                        &package.package_alias,
                        export_import_path(&dep.instance),
                    ));
                    DependencyMember {
                        field: package.qualified_instance_name.clone(),
                        alias: package.package_alias.clone(),
                        export_type: package.export_type.clone(),
                    }
                })
                .collect(),
        })
        .collect();
    imports.sort();
    imports.dedup();
    (imports, groups)
}

pub(crate) fn render(resolved: &ResolvedInstance, ctx: &GenerationContext<'_>) -> anyhow::Result<Vec<u8>> {
    let (imports, groups) = dependency_groups(resolved, ctx);
    let text = DependenciesTemplate {
        instance_name: resolved.instance.name().to_string(),
        class_name: resolved.instance.class().to_string(),
        imports,
        groups,
    }
    .render()?;
    Ok(finish_file(text))
}
