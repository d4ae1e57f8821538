//! Go spellings of IDL functions shared by the client and endpoint generators.

use super::templates::{Assignment, Converter, GoImport};
use crate::idl::{Field, Function, IdlKind, IdlLoader, IdlModule, ImportRef, Requiredness, Service, TypeKind, TypeRef};
use crate::naming::{pascal_case, snake_case};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Name of the generated argument struct of an unboxed Thrift function.
pub(crate) fn args_struct_name(service: &Service, function: &Function) -> String {
    format!("{}_{}_Args", service.name, pascal_case(&function.name))
}

/// Whether the request travels as the single declared argument rather than
/// wrapped in an args struct.
fn single_argument(module: &IdlModule, function: &Function) -> bool {
    function.arguments.len() == 1 && (module.kind == IdlKind::Proto || function.boxed)
}

/// HTTP method and path from `<prefix>.http.method` / `<prefix>.http.path`,
/// defaulting to `POST /<service>/<method>`.
pub(crate) fn http_route(prefix: &str, service: &Service, function: &Function) -> (String, String) {
    let method = function
        .annotations
        .get(&format!("{prefix}.http.method"))
        .map(|m| m.to_uppercase())
        .unwrap_or_else(|| "POST".to_string());
    let path = function
        .annotations
        .get(&format!("{prefix}.http.path"))
        .cloned()
        .unwrap_or_else(|| {
            format!("/{}/{}", snake_case(&service.name), snake_case(&function.name))
        });
    (method, path)
}

/// Request and response types of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GoSignature {
    /// Go type of the request parameter; `None` when the function takes nothing
    pub request: Option<String>,
    pub response: Option<String>,
    pub request_packages: BTreeSet<ImportRef>,
    pub response_packages: BTreeSet<ImportRef>,
}

impl GoSignature {
    pub fn of(module: &IdlModule, service: &Service, function: &Function) -> Self {
        let (request, request_packages) = if function.arguments.is_empty() {
            (None, BTreeSet::new())
        } else if single_argument(module, function) {
            let ty = &function.arguments[0].ty;
            (Some(module.go_type(ty)), module.packages_of(ty))
        } else {
            (
                Some(format!(
                    "*{}.{}",
                    module.package.package_name,
                    args_struct_name(service, function)
                )),
                BTreeSet::from([module.package.clone()]),
            )
        };
        let (response, response_packages) = match &function.return_type {
            Some(ty) => (Some(module.go_type(ty)), module.packages_of(ty)),
            None => (None, BTreeSet::new()),
        };
        Self {
            request,
            response,
            request_packages,
            response_packages,
        }
    }

    /// `ctx context.Context, request *pkg.T`
    pub fn params(&self) -> String {
        match &self.request {
            Some(ty) => format!("ctx context.Context, request {ty}"),
            None => "ctx context.Context".to_string(),
        }
    }

    /// `ctx, request`
    pub fn arg_names(&self) -> String {
        match &self.request {
            Some(_) => "ctx, request".to_string(),
            None => "ctx".to_string(),
        }
    }

    /// `(*pkg.R, error)` or `error`
    pub fn results(&self) -> String {
        match &self.response {
            Some(ty) => format!("({ty}, error)"),
            None => "error".to_string(),
        }
    }

    pub fn packages(&self) -> BTreeSet<ImportRef> {
        self.request_packages
            .union(&self.response_packages)
            .cloned()
            .collect()
    }
}

/// Go import lines for a set of wire packages, deduplicated by alias.
pub(crate) fn go_imports<'a>(packages: impl IntoIterator<Item = &'a ImportRef>) -> Vec<GoImport> {
    let by_alias: BTreeMap<&str, &str> = packages
        .into_iter()
        .map(|p| (p.package_name.as_str(), p.import_path.as_str()))
        .collect();
    by_alias
        .into_iter()
        .map(|(alias, path)| GoImport::new(alias, path))
        .collect()
}

pub(crate) fn is_pointer(go_type: &str) -> bool {
    go_type.starts_with('*')
}

/// Value returned alongside an error.
pub(crate) fn nil_value(go_type: &str) -> String {
    if is_pointer(go_type) || go_type.starts_with("[]") || go_type.starts_with("map[") {
        "nil".to_string()
    } else {
        format!("*new({go_type})")
    }
}

/// An empty, non-nil value.
pub(crate) fn empty_value(go_type: &str) -> String {
    match go_type.strip_prefix('*') {
        Some(inner) => format!("&{inner}{{}}"),
        None => format!("*new({go_type})"),
    }
}

/// Go raw string literal holding `text`.
pub(crate) fn go_raw_string(text: &str) -> String {
    format!("`{}`", text.replace('`', "` + \"`\" + `"))
}

/// Fields of a struct-like type, with the module that declares it.
pub(crate) fn type_fields(
    loader: &IdlLoader,
    module: &Arc<IdlModule>,
    ty: &TypeRef,
) -> anyhow::Result<Option<(Arc<IdlModule>, Vec<Field>)>> {
    let TypeRef::Named(name) = ty else {
        return Ok(None);
    };
    let (package, local) = module.resolve_named(name);
    let owner = if *package == module.package {
        Some(Arc::clone(module))
    } else {
        loader
            .closure(&module.path)?
            .into_iter()
            .find(|m| m.package == *package && m.type_decl(local).is_some())
    };
    Ok(owner.and_then(|owner| {
        let fields = owner.type_decl(local).and_then(|decl| match decl.kind {
            TypeKind::Struct | TypeKind::Union | TypeKind::Exception | TypeKind::Message => {
                Some(decl.fields.clone())
            }
            TypeKind::Enum | TypeKind::Typedef => None,
        })?;
        Some((owner, fields))
    }))
}

/// Fields carried by a function's request.
pub(crate) fn request_fields(
    loader: &IdlLoader,
    module: &Arc<IdlModule>,
    function: &Function,
) -> anyhow::Result<Option<(Arc<IdlModule>, Vec<Field>)>> {
    if function.arguments.is_empty() {
        Ok(None)
    } else if single_argument(module, function) {
        type_fields(loader, module, &function.arguments[0].ty)
    } else {
        Ok(Some((Arc::clone(module), function.arguments.clone())))
    }
}

fn match_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Pair target fields with source fields of the same name and Go type.
/// Returns the assignments and the target fields left unset.
pub(crate) fn assignments(
    from: Option<&(Arc<IdlModule>, Vec<Field>)>,
    to: &(Arc<IdlModule>, Vec<Field>),
) -> (Vec<Assignment>, Vec<String>) {
    let (to_module, to_fields) = to;
    let sources: BTreeMap<String, (&IdlModule, &Field)> = from
        .map(|(module, fields)| {
            fields
                .iter()
                .map(|f| (match_key(&f.name), (module.as_ref(), f)))
                .collect()
        })
        .unwrap_or_default();

    let mut assigned = Vec::new();
    let mut unmapped = Vec::new();
    for target in to_fields {
        let matched = sources.get(&match_key(&target.name)).filter(|(module, source)| {
            module.go_type(&source.ty) == to_module.go_type(&target.ty)
                && (source.requiredness == Requiredness::Optional)
                    == (target.requiredness == Requiredness::Optional)
        });
        match matched {
            Some((_, source)) => assigned.push(Assignment {
                target: pascal_case(&target.name),
                source: pascal_case(&source.name),
            }),
            None => unmapped.push(pascal_case(&target.name)),
        }
    }
    (assigned, unmapped)
}

/// A conversion function from `from_type` (if any) to `to_type`.
pub(crate) fn converter(
    name: String,
    from_type: Option<&str>,
    to_type: &str,
    fields: (Vec<Assignment>, Vec<String>),
) -> Converter {
    let init = match to_type.strip_prefix('*') {
        Some(inner) => format!("out := &{inner}{{}}"),
        None => format!("var out {to_type}"),
    };
    let (assignments, unmapped) = if is_pointer(to_type) && from_type.is_some() {
        fields
    } else {
        (Vec::new(), Vec::new())
    };
    Converter {
        name,
        param: from_type.map(|t| format!("in {t}")).unwrap_or_default(),
        to_type: to_type.to_string(),
        init,
        assignments,
        unmapped,
    }
}
