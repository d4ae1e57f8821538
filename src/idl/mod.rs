//! IDL loading for Thrift and protobuf service definitions.
//!
//! [`IdlLoader`] parses a file on first request and memoizes the result by
//! path. Includes are followed in the same pass, so a loaded [`IdlModule`]
//! always knows the Go packages of the modules it references.
//!
//! Loading happens in two cached stages per file:
//!
//! 1. *parsed*: the file on its own, with include paths resolved but not read;
//! 2. *resolved*: the parsed module plus the package names of its includes.
//!
//! Before a file is resolved its include graph is walked through the parsed
//! stage only, which reports missing includes and include cycles without ever
//! nesting cache initialisers in a cycle.

mod lexer;
mod proto;
mod thrift;

use crate::error::GenError;
use crate::fingerprint::{Fingerprint, FingerprintBuilder};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Key/value metadata attached to a declaration.
pub type Annotations = BTreeMap<String, String>;

/// Maps IDL files to the Go packages holding their wire types.
pub trait PackageNameResolver: Send + Sync {
    /// Identifier used to import the wire package, e.g. `clientsEchoEcho`.
    fn type_package_name(&self, idl_path: &Path) -> anyhow::Result<String>;
    /// Import path of the wire package.
    fn type_import_path(&self, idl_path: &Path) -> anyhow::Result<String>;
    /// Fallback search root for proto imports.
    fn idl_root(&self) -> &Path;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlKind {
    Thrift,
    Proto,
}

impl IdlKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("proto") => IdlKind::Proto,
            _ => IdlKind::Thrift,
        }
    }
}

/// Reference to a type in a field, argument or return position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Base(String),
    List(Box<TypeRef>),
    Set(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requiredness {
    Required,
    Optional,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: Option<i64>,
    pub name: String,
    pub ty: TypeRef,
    pub requiredness: Requiredness,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Struct,
    Union,
    Exception,
    Message,
    Enum,
    Typedef,
}

/// JSON representation hint for i64 typedefs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JsType {
    Long,
    Date,
}

impl JsType {
    pub fn as_str(self) -> &'static str {
        match self {
            JsType::Long => "Long",
            JsType::Date => "Date",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub fields: Vec<Field>,
    /// Aliased type, for typedefs
    pub target: Option<TypeRef>,
    /// Enum members
    pub values: Vec<(String, Option<i64>)>,
    pub annotations: Annotations,
    pub js_type: Option<JsType>,
}

impl TypeDecl {
    pub(crate) fn new(name: String, kind: TypeKind) -> Self {
        Self {
            name,
            kind,
            fields: Vec::new(),
            target: None,
            values: Vec::new(),
            annotations: Annotations::new(),
            js_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arguments: Vec<Field>,
    /// `None` for `void`
    pub return_type: Option<TypeRef>,
    pub exceptions: Vec<Field>,
    pub annotations: Annotations,
    pub oneway: bool,
    pub client_streaming: bool,
    pub server_streaming: bool,
    /// The single struct argument is unwrapped at the wire boundary
    pub boxed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub name: String,
    pub extends: Option<String>,
    pub functions: Vec<Function>,
    pub annotations: Annotations,
}

/// Go package of an included module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportRef {
    pub package_name: String,
    pub import_path: String,
}

/// Output of a single-file parse.
#[derive(Debug, Default)]
pub(crate) struct ParsedIdl {
    /// `namespace go` for Thrift, `package` for proto
    pub namespace: Option<String>,
    pub includes: Vec<String>,
    pub types: Vec<TypeDecl>,
    pub services: Vec<Service>,
}

/// A parsed IDL file.
#[derive(Debug, Clone)]
pub struct IdlModule {
    pub path: PathBuf,
    pub kind: IdlKind,
    pub namespace: Option<String>,
    /// Go package of the wire types compiled from this file
    pub package: ImportRef,
    pub includes: Vec<PathBuf>,
    /// Include scope (Thrift file stem or proto package) to Go package
    pub imports: BTreeMap<String, ImportRef>,
    pub types: Vec<TypeDecl>,
    pub services: Vec<Service>,
    /// Digest of this file's bytes alone
    pub digest: Fingerprint,
}

impl IdlModule {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Look up `Service::method`.
    pub fn find_function(&self, qualified: &str) -> Option<(&Service, &Function)> {
        let (service, method) = qualified.split_once("::")?;
        let service = self.service(service)?;
        let function = service.functions.iter().find(|f| f.name == method)?;
        Some((service, function))
    }

    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.name == name)
    }

    /// i64 typedefs carrying a JSON representation hint.
    pub fn i64_hints(&self) -> Vec<(&str, JsType)> {
        self.types
            .iter()
            .filter_map(|t| t.js_type.map(|js| (t.name.as_str(), js)))
            .collect()
    }

    /// Split a named type into its owning package and local name.
    pub fn resolve_named<'a>(&'a self, name: &'a str) -> (&'a ImportRef, &'a str) {
        let name = name.strip_prefix('.').unwrap_or(name);
        match self.kind {
            IdlKind::Thrift => {
                if let Some((scope, local)) = name.split_once('.') {
                    if let Some(import) = self.imports.get(scope) {
                        return (import, local);
                    }
                }
                (&self.package, name)
            }
            IdlKind::Proto => {
                if let Some(local) = self
                    .namespace
                    .as_deref()
                    .and_then(|ns| name.strip_prefix(ns))
                    .and_then(|rest| rest.strip_prefix('.'))
                {
                    return (&self.package, local);
                }
                let best = self
                    .imports
                    .iter()
                    .filter(|(scope, _)| {
                        name.strip_prefix(scope.as_str())
                            .is_some_and(|rest| rest.starts_with('.'))
                    })
                    .max_by_key(|(scope, _)| scope.len());
                match best {
                    Some((scope, import)) => (import, &name[scope.len() + 1..]),
                    None => (&self.package, name),
                }
            }
        }
    }

    fn collect_packages(&self, ty: &TypeRef, out: &mut BTreeSet<ImportRef>) {
        match ty {
            TypeRef::Base(_) => {}
            TypeRef::List(inner) | TypeRef::Set(inner) => self.collect_packages(inner, out),
            TypeRef::Map(k, v) => {
                self.collect_packages(k, out);
                self.collect_packages(v, out);
            }
            TypeRef::Named(name) => {
                out.insert(self.resolve_named(name).0.clone());
            }
        }
    }

    /// Go packages a single type refers to.
    pub fn packages_of(&self, ty: &TypeRef) -> BTreeSet<ImportRef> {
        let mut out = BTreeSet::new();
        self.collect_packages(ty, &mut out);
        out
    }

    /// Go packages referenced by a function's signature, for import lists.
    pub fn referenced_packages(&self, function: &Function) -> BTreeSet<ImportRef> {
        let mut out = BTreeSet::new();
        for field in function.arguments.iter().chain(&function.exceptions) {
            self.collect_packages(&field.ty, &mut out);
        }
        if let Some(ret) = &function.return_type {
            self.collect_packages(ret, &mut out);
        }
        out
    }

    /// Go spelling of a type, qualified with its wire package alias.
    ///
    /// Named structs become pointers. Names declared in other files are assumed
    /// to be structs unless they are local enums or typedefs.
    pub fn go_type(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Base(base) => go_base_type(base).to_string(),
            TypeRef::List(inner) => format!("[]{}", self.go_type(inner)),
            TypeRef::Set(inner) => format!("map[{}]struct{{}}", self.go_type(inner)),
            TypeRef::Map(k, v) => format!("map[{}]{}", self.go_type(k), self.go_type(v)),
            TypeRef::Named(name) => {
                let (package, local) = self.resolve_named(name);
                let go_name = local.replace('.', "_");
                let pointer = match self.type_decl(local) {
                    Some(decl) => !matches!(decl.kind, TypeKind::Enum | TypeKind::Typedef),
                    None => true,
                };
                format!(
                    "{}{}.{}",
                    if pointer { "*" } else { "" },
                    package.package_name,
                    go_name
                )
            }
        }
    }
}

fn go_base_type(base: &str) -> &'static str {
    match base {
        "bool" => "bool",
        "byte" | "i8" => "int8",
        "i16" => "int16",
        "i32" | "int32" | "sint32" | "sfixed32" => "int32",
        "i64" | "int64" | "sint64" | "sfixed64" => "int64",
        "uint32" | "fixed32" => "uint32",
        "uint64" | "fixed64" => "uint64",
        "float" => "float32",
        "double" => "float64",
        "binary" | "bytes" => "[]byte",
        _ => "string",
    }
}

pub(crate) fn is_base_type(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "byte"
            | "i8"
            | "i16"
            | "i32"
            | "i64"
            | "double"
            | "string"
            | "binary"
            | "float"
            | "int32"
            | "int64"
            | "uint32"
            | "uint64"
            | "sint32"
            | "sint64"
            | "fixed32"
            | "fixed64"
            | "sfixed32"
            | "sfixed64"
            | "bytes"
    )
}

/// Record an annotation, rejecting a second different value for the same key.
pub(crate) fn insert_annotation(
    path: &Path,
    annotations: &mut Annotations,
    key: String,
    value: String,
) -> Result<(), GenError> {
    match annotations.get(&key) {
        Some(existing) if *existing != value => Err(GenError::IdlAnnotationConflict {
            path: path.to_path_buf(),
            message: format!("annotation `{key}` set to both {existing:?} and {value:?}"),
        }),
        _ => {
            annotations.insert(key, value);
            Ok(())
        }
    }
}

/// Interpret the recognised annotations and reject contradictory ones.
fn apply_annotations(path: &Path, prefix: &str, parsed: &mut ParsedIdl) -> Result<(), GenError> {
    let conflict = |message: String| GenError::IdlAnnotationConflict {
        path: path.to_path_buf(),
        message,
    };
    let js_key = format!("{prefix}.js.type");
    let boxed_key = format!("{prefix}.http.req.def.boxed");

    for decl in &mut parsed.types {
        let Some(value) = decl.annotations.get(&js_key) else {
            continue;
        };
        let js = match value.as_str() {
            "Long" => JsType::Long,
            "Date" => JsType::Date,
            other => {
                return Err(conflict(format!(
                    "{} has {js_key} = {other:?}, expected \"Long\" or \"Date\"",
                    decl.name
                )))
            }
        };
        let is_i64 = decl.kind == TypeKind::Typedef
            && matches!(&decl.target, Some(TypeRef::Base(b)) if b == "i64" || b == "int64");
        if !is_i64 {
            return Err(conflict(format!(
                "{js_key} on {} which is not an i64 typedef",
                decl.name
            )));
        }
        decl.js_type = Some(js);
    }

    for service in &mut parsed.services {
        for function in &mut service.functions {
            let Some(value) = function.annotations.get(&boxed_key) else {
                continue;
            };
            if value != "true" {
                continue;
            }
            let single_struct = function.arguments.len() == 1
                && matches!(function.arguments[0].ty, TypeRef::Named(_));
            if !single_struct {
                return Err(conflict(format!(
                    "{}::{} is marked {boxed_key} but does not take exactly one struct argument",
                    service.name, function.name
                )));
            }
            function.boxed = true;
        }
    }
    Ok(())
}

/// Lexically clean an absolute path so cache keys are stable.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

type Cell = Arc<OnceCell<Arc<IdlModule>>>;

/// Memoizing IDL loader shared by all generator workers.
pub struct IdlLoader {
    resolver: Arc<dyn PackageNameResolver>,
    annotation_prefix: String,
    parsed: DashMap<PathBuf, Cell>,
    resolved: DashMap<PathBuf, Cell>,
    parse_count: AtomicUsize,
}

impl IdlLoader {
    pub fn new(resolver: Arc<dyn PackageNameResolver>, annotation_prefix: &str) -> Self {
        Self {
            resolver,
            annotation_prefix: annotation_prefix.to_string(),
            parsed: DashMap::new(),
            resolved: DashMap::new(),
            parse_count: AtomicUsize::new(0),
        }
    }

    /// Number of files actually read and parsed so far.
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::Relaxed)
    }

    /// Load a file and its transitive includes.
    pub fn load(&self, path: &Path) -> anyhow::Result<Arc<IdlModule>> {
        let key = self.key(path)?;
        self.check_includes(&key, &mut Vec::new(), &mut BTreeSet::new())?;
        Ok(self.resolve(&key)?)
    }

    /// The file and every module it transitively includes, sorted by path.
    pub fn closure(&self, path: &Path) -> anyhow::Result<Vec<Arc<IdlModule>>> {
        let root = self.load(path)?;
        let mut seen = BTreeMap::new();
        let mut stack = vec![root];
        while let Some(module) = stack.pop() {
            if seen.contains_key(&module.path) {
                continue;
            }
            for include in &module.includes {
                stack.push(self.resolve(include)?);
            }
            seen.insert(module.path.clone(), module);
        }
        Ok(seen.into_values().collect())
    }

    /// Digest over the bytes of a file and all of its transitive includes.
    pub fn closure_digest(&self, path: &Path) -> anyhow::Result<Fingerprint> {
        let mut builder = FingerprintBuilder::default();
        for module in self.closure(path)? {
            builder = builder
                .field("path", module.path.to_string_lossy().as_bytes())
                .fingerprint("digest", &module.digest);
        }
        Ok(builder.finish())
    }

    fn key(&self, path: &Path) -> anyhow::Result<PathBuf> {
        Ok(clean_path(&std::path::absolute(path)?))
    }

    fn cell(map: &DashMap<PathBuf, Cell>, key: &Path) -> Cell {
        Arc::clone(map.entry(key.to_path_buf()).or_default().value())
    }

    fn check_includes(
        &self,
        path: &Path,
        stack: &mut Vec<PathBuf>,
        done: &mut BTreeSet<PathBuf>,
    ) -> Result<(), GenError> {
        if done.contains(path) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|p| p == path) {
            let mut cycle: Vec<String> = stack[pos..]
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            cycle.push(path.display().to_string());
            return Err(GenError::IdlParse {
                path: path.to_path_buf(),
                line: 0,
                message: format!("include cycle: {}", cycle.join(" -> ")),
            });
        }
        let module = self.parse(path)?;
        stack.push(path.to_path_buf());
        for include in &module.includes {
            if !include.is_file() {
                return Err(GenError::IdlIncludeNotFound {
                    missing: include.clone(),
                    from: path.to_path_buf(),
                });
            }
            self.check_includes(include, stack, done)?;
        }
        stack.pop();
        done.insert(path.to_path_buf());
        Ok(())
    }

    fn parse(&self, path: &Path) -> Result<Arc<IdlModule>, GenError> {
        let cell = Self::cell(&self.parsed, path);
        cell.get_or_try_init(|| self.parse_file(path)).cloned()
    }

    fn resolve(&self, path: &Path) -> Result<Arc<IdlModule>, GenError> {
        let cell = Self::cell(&self.resolved, path);
        cell.get_or_try_init(|| {
            let parsed = self.parse(path)?;
            let mut module = IdlModule::clone(&parsed);
            for include in &parsed.includes {
                let included = self.resolve(include)?;
                let scope = match module.kind {
                    IdlKind::Thrift => include
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    IdlKind::Proto => match &included.namespace {
                        Some(ns) => ns.clone(),
                        None => continue,
                    },
                };
                module.imports.insert(scope, included.package.clone());
            }
            Ok(Arc::new(module))
        })
        .cloned()
    }

    fn parse_file(&self, path: &Path) -> Result<Arc<IdlModule>, GenError> {
        let parse_error = |message: String| GenError::IdlParse {
            path: path.to_path_buf(),
            line: 0,
            message,
        };
        let bytes = std::fs::read(path).map_err(|e| parse_error(format!("cannot read: {e}")))?;
        let text = std::str::from_utf8(&bytes).map_err(|e| parse_error(e.to_string()))?;
        self.parse_count.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), "parsing IDL");

        let kind = IdlKind::from_path(path);
        let mut parsed = match kind {
            IdlKind::Thrift => thrift::parse(path, text)?,
            IdlKind::Proto => proto::parse(path, text)?,
        };
        apply_annotations(path, &self.annotation_prefix, &mut parsed)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("/"));
        let includes = parsed
            .includes
            .iter()
            .map(|inc| {
                let local = clean_path(&dir.join(inc));
                if kind == IdlKind::Proto && !local.is_file() {
                    clean_path(&self.resolver.idl_root().join(inc))
                } else {
                    local
                }
            })
            .collect();

        let package = ImportRef {
            package_name: self
                .resolver
                .type_package_name(path)
                .map_err(|e| parse_error(format!("{e:#}")))?,
            import_path: self
                .resolver
                .type_import_path(path)
                .map_err(|e| parse_error(format!("{e:#}")))?,
        };

        Ok(Arc::new(IdlModule {
            path: path.to_path_buf(),
            kind,
            namespace: parsed.namespace,
            package,
            includes,
            imports: BTreeMap::new(),
            types: parsed.types,
            services: parsed.services,
            digest: Fingerprint::of(&bytes),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{kind_of, ErrorKind};
    use std::thread;

    struct StemResolver {
        root: PathBuf,
    }

    impl PackageNameResolver for StemResolver {
        fn type_package_name(&self, idl_path: &Path) -> anyhow::Result<String> {
            Ok(idl_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default())
        }

        fn type_import_path(&self, idl_path: &Path) -> anyhow::Result<String> {
            let rel = idl_path.strip_prefix(&self.root)?.with_extension("");
            Ok(format!("example.com/gen/{}", rel.display()))
        }

        fn idl_root(&self) -> &Path {
            &self.root
        }
    }

    fn loader(root: &Path) -> IdlLoader {
        IdlLoader::new(
            Arc::new(StemResolver {
                root: root.to_path_buf(),
            }),
            "zanzibar",
        )
    }

    fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_thrift_includes_and_packages() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "base/base.thrift",
            "typedef i64 (zanzibar.js.type = \"Long\") Timestamp\nstruct Meta { 1: required string id }\n",
        );
        let bar = write(
            root,
            "clients/bar/bar.thrift",
            r#"
include "../../base/base.thrift"

struct BarRequest { 1: required base.Meta meta }
exception BarException { 1: required string message }

service Bar {
    base.Meta normal(1: required BarRequest request) throws (1: BarException barException) (
        zanzibar.http.method = "POST"
        zanzibar.http.path = "/bar"
        zanzibar.http.req.def.boxed = "true"
    )
    void ping()
}
"#,
        );

        let loader = loader(root);
        let module = loader.load(&bar).unwrap();
        assert_eq!(module.package.package_name, "bar");
        assert_eq!(module.imports["base"].import_path, "example.com/gen/base/base");

        let (_, normal) = module.find_function("Bar::normal").unwrap();
        assert!(normal.boxed);
        assert_eq!(normal.annotations["zanzibar.http.method"], "POST");
        let packages: Vec<String> = module
            .referenced_packages(normal)
            .into_iter()
            .map(|p| p.package_name)
            .collect();
        assert_eq!(packages, vec!["bar", "base"]);
        assert_eq!(module.go_type(normal.return_type.as_ref().unwrap()), "*base.Meta");

        let (_, ping) = module.find_function("Bar::ping").unwrap();
        assert!(ping.return_type.is_none());
        assert!(module.referenced_packages(ping).is_empty());

        let base = loader.load(&root.join("base/base.thrift")).unwrap();
        assert_eq!(base.i64_hints(), vec![("Timestamp", JsType::Long)]);
    }

    #[test]
    fn test_memoized_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let echo = write(
            dir.path(),
            "echo.proto",
            "syntax = \"proto3\";\npackage echo;\nmessage Request { string message = 1; }\nmessage Response { string message = 1; }\nservice Echo { rpc Echo(Request) returns (Response); }\n",
        );
        let loader = Arc::new(loader(dir.path()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let echo = echo.clone();
                thread::spawn(move || loader.load(&echo).unwrap())
            })
            .collect();
        let modules: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(loader.parse_count(), 1);
        assert!(modules.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_missing_include_named() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let path = write(root, "a.thrift", "include \"missing.thrift\"\n");
        let err = loader(root).load(&path).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::IdlIncludeNotFound));
        assert!(err.to_string().contains("missing.thrift"));
    }

    #[test]
    fn test_include_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let a = write(root, "a.thrift", "include \"b.thrift\"\n");
        write(root, "b.thrift", "include \"a.thrift\"\n");
        let err = loader(root).load(&a).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::IdlParseError));
        assert!(err.to_string().contains("include cycle"));
    }

    #[test]
    fn test_annotation_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let cases = [
            "typedef string (zanzibar.js.type = \"Long\") NotI64\n",
            "typedef i64 (zanzibar.js.type = \"Huge\") Weird\n",
            "service S { void f(1: i32 a, 2: i32 b) (zanzibar.http.req.def.boxed = \"true\") }\n",
            "service S { void f() (zanzibar.http.method = \"GET\", zanzibar.http.method = \"POST\") }\n",
        ];
        for (i, text) in cases.iter().enumerate() {
            let path = write(root, &format!("c{i}.thrift"), text);
            let err = loader(root).load(&path).unwrap_err();
            assert_eq!(
                kind_of(&err),
                Some(ErrorKind::IdlAnnotationConflict),
                "case {i}: {err:#}"
            );
        }
    }

    #[test]
    fn test_closure_digest_tracks_includes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let a = write(root, "a.thrift", "include \"b.thrift\"\nstruct A { 1: b.B b }\n");
        write(root, "b.thrift", "struct B { 1: string x }\n");

        let before = loader(root).closure_digest(&a).unwrap();
        assert_eq!(before, loader(root).closure_digest(&a).unwrap());

        write(root, "b.thrift", "struct B { 1: string y }\n");
        let after = loader(root).closure_digest(&a).unwrap();
        assert_ne!(before, after);
        assert_eq!(loader(root).closure(&a).unwrap().len(), 2);
    }

    #[test]
    fn test_proto_imports_resolve_packages() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "common/types.proto",
            "syntax = \"proto3\";\npackage acme.common;\nmessage Empty {}\n",
        );
        let svc = write(
            root,
            "clients/mirror/mirror.proto",
            r#"syntax = "proto3";
package mirror;
import "common/types.proto";
message Request { string message = 1; }
service Mirror {
  rpc Mirror(Request) returns (acme.common.Empty) {
    option (zanzibar.http.method) = "GET";
  }
}
"#,
        );
        let module = loader(root).load(&svc).unwrap();
        let (_, rpc) = module.find_function("Mirror::Mirror").unwrap();
        assert_eq!(rpc.annotations["zanzibar.http.method"], "GET");
        assert_eq!(module.go_type(&rpc.arguments[0].ty), "*mirror.Request");
        assert_eq!(
            module.go_type(rpc.return_type.as_ref().unwrap()),
            "*types.Empty"
        );
    }
}
