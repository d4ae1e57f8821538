use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gatewaygen::module::{Instance, InstanceId, PackageInfo, ResolvedGraph};
use serde_json::Value;
use std::hint::black_box;
use std::path::PathBuf;

fn instance(class: &str, name: &str, dependencies: Vec<InstanceId>) -> Instance {
    Instance {
        id: InstanceId::new(class, name),
        type_name: "default".to_string(),
        base_dir: PathBuf::from("/gateway"),
        relative_dir: PathBuf::from(format!("{class}s/{name}")),
        config: Value::Null,
        dependencies,
        raw_config: Vec::new(),
        idl_file: None,
        package: PackageInfo::default(),
    }
}

/// `clients` clients, one endpoint per four clients depending on eight of
/// them, and one service per ten endpoints.
fn synthetic_gateway(clients: usize) -> Vec<Instance> {
    let mut instances: Vec<Instance> = (0..clients)
        .map(|i| instance("client", &format!("c{i:04}"), Vec::new()))
        .collect();
    let endpoints = (clients / 4).max(1);
    for e in 0..endpoints {
        let deps = (0..8)
            .map(|k| InstanceId::new("client", &format!("c{:04}", (e * 3 + k * 7) % clients)))
            .collect();
        instances.push(instance("endpoint", &format!("e{e:04}"), deps));
    }
    for s in 0..(endpoints / 10).max(1) {
        let deps = (0..10)
            .map(|k| InstanceId::new("endpoint", &format!("e{:04}", (s * 10 + k) % endpoints)))
            .collect();
        instances.push(instance("service", &format!("s{s:04}"), deps));
    }
    instances
}

fn bench_resolve(c: &mut Criterion) {
    let class_order: Vec<String> = ["client", "endpoint", "service"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut group = c.benchmark_group("resolve");
    for clients in [100usize, 1_000] {
        let instances = synthetic_gateway(clients);
        group.bench_with_input(BenchmarkId::from_parameter(clients), &instances, |b, instances| {
            b.iter(|| {
                let graph = ResolvedGraph::resolve(black_box(instances.clone()), &class_order).unwrap();
                black_box(graph.levels());
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
