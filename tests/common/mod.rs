#![allow(dead_code)]

pub mod fixture {
    use gatewaygen::build::{BuildOptions, Builder};
    use gatewaygen::config::BuildConfig;
    use gatewaygen::module::InstanceId;
    use gatewaygen::writer::FormatterPipeline;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use walkdir::WalkDir;

    pub const BUILD_YAML: &str = r#"
packageRoot: github.com/acme/gateway
idlRootDir: idl
targetGenDir: build
moduleSearchPaths:
  client: [clients]
  middleware: [middlewares]
  endpoint: [endpoints]
  service: [services]
"#;

    pub const ECHO_PROTO: &str = r#"syntax = "proto3";
package echo;

message Request {
  string message = 1;
}

message Response {
  string message = 1;
}

service Echo {
  rpc Echo(Request) returns (Response);
}
"#;

    pub const MIRROR_PROTO: &str = r#"syntax = "proto3";
package mirror;

message Request {
  string message = 1;
}

message Response {
  string message = 1;
}

service Mirror {
  rpc Mirror(Request) returns (Response);
}
"#;

    pub const BOUNCE_THRIFT: &str = r#"namespace go bounce

struct BounceRequest {
    1: required string message
}

struct BounceResponse {
    1: required string message
}

service Bounce {
    BounceResponse bounce(1: required BounceRequest request) (
        zanzibar.http.method = "POST"
        zanzibar.http.path = "/bounce"
        zanzibar.http.req.def.boxed = "true"
    )
    BounceResponse reflect(1: required BounceRequest request) (
        zanzibar.http.method = "POST"
        zanzibar.http.path = "/reflect"
    )
}
"#;

    /// A gateway source tree in a temporary directory.
    pub struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        /// Just `build.yaml` and the class directories.
        pub fn new() -> Self {
            let fixture = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            fixture.write("build.yaml", BUILD_YAML);
            for class_dir in ["clients", "middlewares", "endpoints", "services"] {
                fs::create_dir_all(fixture.root().join(class_dir)).unwrap();
            }
            fixture
        }

        /// Clients `echo` and `mirror` and endpoint `bounce` calling both.
        pub fn echo_mirror_bounce() -> Self {
            let fixture = Self::new();
            fixture.write("idl/clients/echo/echo.proto", ECHO_PROTO);
            fixture.write("idl/clients/mirror/mirror.proto", MIRROR_PROTO);
            fixture.write("idl/endpoints/bounce/bounce.thrift", BOUNCE_THRIFT);
            fixture.client("echo", "grpc", "clients/echo/echo.proto", &[]);
            fixture.client("mirror", "grpc", "clients/mirror/mirror.proto", &[]);
            fixture.write(
                "endpoints/bounce/endpoint-config.json",
                r#"{
  "name": "bounce",
  "type": "http",
  "dependencies": {"client": ["echo", "mirror"]},
  "config": {
    "idlFile": "endpoints/bounce/bounce.thrift",
    "handlers": {
      "Bounce::bounce": {"clientId": "echo", "clientMethod": "EchoEcho"},
      "Bounce::reflect": {"clientId": "mirror", "clientMethod": "MirrorMirror"}
    }
  }
}
"#,
            );
            fixture
        }

        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        pub fn write(&self, relative: &str, contents: &str) {
            let path = self.root().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        pub fn remove(&self, relative: &str) {
            fs::remove_dir_all(self.root().join(relative)).unwrap();
        }

        /// `clients/<name>/client-config.json`.
        pub fn client(&self, name: &str, type_name: &str, idl: &str, client_deps: &[&str]) {
            let config = serde_json::json!({
                "name": name,
                "type": type_name,
                "dependencies": {"client": client_deps},
                "config": {"idlFile": idl},
            });
            self.write(
                &format!("clients/{name}/client-config.json"),
                &serde_json::to_string_pretty(&config).unwrap(),
            );
        }

        pub fn config(&self) -> BuildConfig {
            BuildConfig::load(&self.root().join("build.yaml")).unwrap()
        }

        /// Builder without formatters, so tests do not need a Go toolchain.
        pub fn builder(&self) -> Builder {
            Builder::new(self.config())
                .unwrap()
                .with_formatter(FormatterPipeline::empty())
        }

        pub fn gen_dir(&self) -> PathBuf {
            self.root().join("build")
        }

        pub fn read_gen(&self, relative: &str) -> String {
            let path = self.gen_dir().join(relative);
            fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
        }

        /// Every generated file, excluding build state.
        pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
            let root = self.gen_dir();
            if !root.exists() {
                return BTreeMap::new();
            }
            WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| e.file_name() != ".gatewaygen")
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| {
                    let relative = e.path().strip_prefix(&root).unwrap().to_path_buf();
                    (relative, fs::read(e.path()).unwrap())
                })
                .collect()
        }

        /// Files under one instance directory of the snapshot.
        pub fn instance_files(&self, dir: &str) -> BTreeMap<PathBuf, Vec<u8>> {
            self.snapshot()
                .into_iter()
                .filter(|(path, _)| path.starts_with(dir))
                .collect()
        }

        pub fn cache_text(&self) -> String {
            fs::read_to_string(self.gen_dir().join(".gatewaygen/cache.json")).unwrap()
        }
    }

    /// Default options without formatting.
    pub fn options() -> BuildOptions {
        BuildOptions {
            format: false,
            ..BuildOptions::default()
        }
    }

    pub fn selective(ids: &[(&str, &str)]) -> BuildOptions {
        BuildOptions {
            selective: ids.iter().map(|(c, n)| InstanceId::new(c, n)).collect(),
            ..options()
        }
    }

    pub fn id(class: &str, name: &str) -> InstanceId {
        InstanceId::new(class, name)
    }
}
