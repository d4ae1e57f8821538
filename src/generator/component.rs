//! Middleware and adapter generators.
//!
//! Both emit `<name>.go` (interface, implementation and constructor) and
//! `module/dependencies.go`. A middleware's default options are the entry for
//! its name in the build's middleware config, overlaid with the instance's own
//! `options`.

use super::deps;
use super::gotypes::go_raw_string;
use super::templates::ComponentTemplate;
use super::{finish_file, FileSet, GenerationContext, Generator};
use crate::fingerprint::canonical_json;
use crate::module::ResolvedInstance;
use askama::Template;
use serde_json::{json, Map, Value};

/// Generates middlewares or adapters.
pub struct ComponentGenerator {
    is_middleware: bool,
}

impl ComponentGenerator {
    pub fn middleware() -> Self {
        Self {
            is_middleware: true,
        }
    }

    pub fn adapter() -> Self {
        Self {
            is_middleware: false,
        }
    }

    fn default_options(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
    ) -> anyhow::Result<Value> {
        let mut merged = Map::new();
        if self.is_middleware {
            if let Some(Value::Object(shared)) = ctx
                .helper
                .middleware_config()?
                .and_then(|config| config.get(resolved.instance.name()).cloned())
            {
                merged.extend(shared);
            }
        }
        if let Some(Value::Object(own)) = resolved.instance.config.get("options") {
            merged.extend(own.clone());
        }
        Ok(Value::Object(merged))
    }
}

impl Generator for ComponentGenerator {
    fn options_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "options": {"type": "object"}
            }
        }))
    }

    fn generate(
        &self,
        resolved: &ResolvedInstance,
        ctx: &GenerationContext<'_>,
    ) -> anyhow::Result<Option<FileSet>> {
        let instance = &resolved.instance;
        let package = &instance.package;
        let mut files = FileSet::new();
        files.insert("module/dependencies.go", deps::render(resolved, ctx)?)?;

        if package.is_export_generated {
            let options = canonical_json(&self.default_options(resolved, ctx)?);
            let text = ComponentTemplate {
                package_name: package.package_name.clone(),
                instance_name: instance.name().to_string(),
                class_name: instance.class().to_string(),
                impl_name: package.package_name.clone(),
                export_name: package.export_name.clone(),
                export_type: package.export_type.clone(),
                module_import: package.module_package_path.clone(),
                options: go_raw_string(&String::from_utf8_lossy(&options)),
                is_middleware: self.is_middleware,
            }
            .render()?;
            files.insert(format!("{}.go", instance.name()), finish_file(text))?;
        }
        Ok(Some(files))
    }
}
