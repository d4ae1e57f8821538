//! Dependency resolution.
//!
//! Kahn's algorithm over `(class, name)` nodes. The ready set is a
//! [`BTreeSet`], so among instances whose dependencies are all placed the
//! lexicographically smallest `(class, name)` goes next and the order is fully
//! deterministic.

use super::instance::{Instance, InstanceId};
use crate::error::GenError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// An instance with its place in the graph.
#[derive(Debug, Clone)]
pub struct ResolvedInstance {
    pub instance: Arc<Instance>,
    /// Index in the global topological order
    pub position: usize,
    /// Direct dependencies, sorted by `(class, name)`
    pub direct: Vec<InstanceId>,
    /// Transitive dependencies ordered by topological position
    pub closure: Vec<InstanceId>,
    /// Dependency wave: 0 for leaves, otherwise one more than the deepest dependency
    pub level: usize,
}

impl ResolvedInstance {
    pub fn id(&self) -> &InstanceId {
        &self.instance.id
    }
}

/// Instances in dependency order, with closures. Lives for one build.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
    order: Vec<InstanceId>,
    nodes: BTreeMap<InstanceId, ResolvedInstance>,
    dependents: BTreeMap<InstanceId, Vec<InstanceId>>,
    class_order: Vec<String>,
}

impl ResolvedGraph {
    /// Order `instances` so every dependency precedes its dependents.
    ///
    /// `class_order` lists class names in class order; it only affects
    /// [`ResolvedGraph::by_class`] and [`ResolvedGraph::closure_by_class`].
    pub fn resolve(instances: Vec<Instance>, class_order: &[String]) -> Result<Self, GenError> {
        let mut by_id: BTreeMap<InstanceId, Arc<Instance>> = BTreeMap::new();
        for instance in instances {
            by_id.insert(instance.id.clone(), Arc::new(instance));
        }

        let mut indegree: BTreeMap<&InstanceId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<InstanceId, Vec<InstanceId>> = BTreeMap::new();
        for (id, instance) in &by_id {
            let deps: BTreeSet<&InstanceId> = instance.dependencies.iter().collect();
            for dep in &deps {
                if !by_id.contains_key(*dep) {
                    return Err(GenError::UnknownDependency {
                        from: id.to_string(),
                        class: dep.class.clone(),
                        instance: dep.name.clone(),
                    });
                }
                dependents
                    .entry((*dep).clone())
                    .or_default()
                    .push(id.clone());
            }
            indegree.insert(id, deps.len());
        }

        let mut ready: BTreeSet<&InstanceId> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order: Vec<InstanceId> = Vec::with_capacity(by_id.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = indegree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        if let Some((key, _)) = by_id.get_key_value(dependent) {
                            ready.insert(key);
                        }
                    }
                }
            }
        }

        if order.len() < by_id.len() {
            let placed: BTreeSet<&InstanceId> = order.iter().collect();
            return Err(find_cycle(&by_id, &placed));
        }

        let position: BTreeMap<&InstanceId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut nodes: BTreeMap<InstanceId, ResolvedInstance> = BTreeMap::new();
        for (pos, id) in order.iter().enumerate() {
            let Some(instance) = by_id.get(id) else {
                continue;
            };
            let mut closure: BTreeSet<usize> = BTreeSet::new();
            let mut level = 0;
            for dep in &instance.dependencies {
                let Some(resolved) = nodes.get(dep) else {
                    continue;
                };
                closure.insert(resolved.position);
                closure.extend(resolved.closure.iter().map(|d| position[d]));
                level = level.max(resolved.level + 1);
            }
            let mut direct = instance.dependencies.clone();
            direct.sort();
            direct.dedup();
            nodes.insert(
                id.clone(),
                ResolvedInstance {
                    instance: Arc::clone(instance),
                    position: pos,
                    direct,
                    closure: closure.into_iter().map(|p| order[p].clone()).collect(),
                    level,
                },
            );
        }

        Ok(Self {
            order,
            nodes,
            dependents,
            class_order: class_order.to_vec(),
        })
    }

    /// Global topological order.
    pub fn order(&self) -> &[InstanceId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &InstanceId) -> Option<&ResolvedInstance> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Resolved instances in topological order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedInstance> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Instances of one class in topological order. Empty for unknown classes.
    pub fn class_instances(&self, class: &str) -> Vec<&ResolvedInstance> {
        self.iter().filter(|r| r.id().class == class).collect()
    }

    /// Classes in class order, each with its instances in topological order.
    pub fn by_class(&self) -> Vec<(&str, Vec<&ResolvedInstance>)> {
        self.class_order
            .iter()
            .map(|class| (class.as_str(), self.class_instances(class)))
            .collect()
    }

    /// Transitive dependencies of `id` in topological order.
    pub fn closure(&self, id: &InstanceId) -> &[InstanceId] {
        self.nodes
            .get(id)
            .map(|r| r.closure.as_slice())
            .unwrap_or_default()
    }

    /// Transitive dependencies of `id` grouped by class, classes in class order.
    /// Classes without members in the closure are omitted.
    pub fn closure_by_class(&self, id: &InstanceId) -> Vec<(String, Vec<&ResolvedInstance>)> {
        self.group_by_class(self.closure(id))
    }

    /// Direct dependencies of `id` grouped like [`ResolvedGraph::closure_by_class`].
    pub fn direct_by_class(&self, id: &InstanceId) -> Vec<(String, Vec<&ResolvedInstance>)> {
        let direct = self
            .nodes
            .get(id)
            .map(|r| r.direct.as_slice())
            .unwrap_or_default();
        self.group_by_class(direct)
    }

    fn group_by_class(&self, ids: &[InstanceId]) -> Vec<(String, Vec<&ResolvedInstance>)> {
        self.class_order
            .iter()
            .filter_map(|class| {
                let mut members: Vec<&ResolvedInstance> = ids
                    .iter()
                    .filter(|dep| dep.class == *class)
                    .filter_map(|dep| self.nodes.get(dep))
                    .collect();
                members.sort_by_key(|r| r.position);
                (!members.is_empty()).then(|| (class.clone(), members))
            })
            .collect()
    }

    /// `ids` plus everything that transitively depends on any of them.
    pub fn reverse_closure(&self, ids: &[InstanceId]) -> BTreeSet<InstanceId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&InstanceId> = ids.iter().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            stack.extend(self.dependents.get(id).into_iter().flatten());
        }
        seen
    }

    /// Instances grouped in dependency waves. Every member of a wave depends
    /// only on members of earlier waves; each wave is in topological order.
    pub fn levels(&self) -> Vec<Vec<InstanceId>> {
        let mut levels: Vec<Vec<InstanceId>> = Vec::new();
        for resolved in self.iter() {
            if levels.len() <= resolved.level {
                levels.resize_with(resolved.level + 1, Vec::new);
            }
            levels[resolved.level].push(resolved.id().clone());
        }
        levels
    }
}

/// Walk unplaced nodes along unplaced dependencies until a node repeats.
///
/// Every unplaced node has at least one unplaced dependency, so the walk
/// always closes a cycle.
fn find_cycle(
    by_id: &BTreeMap<InstanceId, Arc<Instance>>,
    placed: &BTreeSet<&InstanceId>,
) -> GenError {
    let start = by_id.keys().find(|id| !placed.contains(id));
    let mut path: Vec<&InstanceId> = Vec::new();
    let mut current = start;
    while let Some(id) = current {
        if let Some(pos) = path.iter().position(|p| *p == id) {
            let cycle: Vec<&InstanceId> = path[pos..].to_vec();
            let classes: BTreeSet<&str> = cycle.iter().map(|c| c.class.as_str()).collect();
            let mut rendered: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            rendered.push(id.to_string());
            return GenError::CycleDetected {
                cycle: rendered,
                cross_class: classes.len() > 1,
            };
        }
        path.push(id);
        current = by_id.get(id).and_then(|instance| {
            let mut deps: Vec<&InstanceId> = instance
                .dependencies
                .iter()
                .filter(|d| !placed.contains(d))
                .collect();
            deps.sort();
            deps.first().and_then(|d| by_id.get_key_value(*d).map(|(k, _)| k))
        });
    }
    GenError::CycleDetected {
        cycle: path.iter().map(ToString::to_string).collect(),
        cross_class: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::module::PackageInfo;
    use serde_json::Value;
    use std::path::PathBuf;

    fn instance(class: &str, name: &str, deps: &[(&str, &str)]) -> Instance {
        Instance {
            id: InstanceId::new(class, name),
            type_name: "default".to_string(),
            base_dir: PathBuf::from("/cfg"),
            relative_dir: PathBuf::from(format!("{class}s/{name}")),
            config: Value::Null,
            dependencies: deps.iter().map(|(c, n)| InstanceId::new(c, n)).collect(),
            raw_config: Vec::new(),
            idl_file: None,
            package: PackageInfo {
                package_name: name.to_string(),
                package_alias: name.to_string(),
                generated_package_path: String::new(),
                module_package_path: String::new(),
                export_name: String::new(),
                export_type: String::new(),
                qualified_instance_name: name.to_string(),
                is_export_generated: true,
            },
        }
    }

    fn classes() -> Vec<String> {
        ["client", "middleware", "endpoint", "service"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn rendered(ids: &[InstanceId]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_endpoint_after_its_clients() {
        let graph = ResolvedGraph::resolve(
            vec![
                instance("endpoint", "bounce", &[("client", "mirror"), ("client", "echo")]),
                instance("client", "mirror", &[]),
                instance("client", "echo", &[]),
            ],
            &classes(),
        )
        .unwrap();
        assert_eq!(
            rendered(graph.order()),
            ["client/echo", "client/mirror", "endpoint/bounce"]
        );
        let bounce = InstanceId::new("endpoint", "bounce");
        assert_eq!(rendered(graph.closure(&bounce)), ["client/echo", "client/mirror"]);
        assert_eq!(graph.levels().len(), 2);
    }

    #[test]
    fn test_closure_is_transitive() {
        let graph = ResolvedGraph::resolve(
            vec![
                instance("service", "gw", &[("endpoint", "bounce")]),
                instance("endpoint", "bounce", &[("middleware", "auth")]),
                instance("middleware", "auth", &[("client", "echo")]),
                instance("client", "echo", &[]),
            ],
            &classes(),
        )
        .unwrap();
        let gw = InstanceId::new("service", "gw");
        assert_eq!(
            rendered(graph.closure(&gw)),
            ["client/echo", "middleware/auth", "endpoint/bounce"]
        );
        let grouped: Vec<String> = graph
            .closure_by_class(&gw)
            .into_iter()
            .map(|(class, members)| format!("{class}:{}", members.len()))
            .collect();
        assert_eq!(grouped, ["client:1", "middleware:1", "endpoint:1"]);
        assert_eq!(graph.get(&gw).unwrap().level, 3);

        let direct: Vec<String> = graph
            .direct_by_class(&gw)
            .into_iter()
            .map(|(class, members)| format!("{class}:{}", members[0].id()))
            .collect();
        assert_eq!(direct, ["endpoint:endpoint/bounce"]);
    }

    #[test]
    fn test_topology_holds_for_every_edge() {
        let graph = ResolvedGraph::resolve(
            vec![
                instance("client", "z", &[]),
                instance("client", "a", &[("client", "z")]),
                instance("endpoint", "e1", &[("client", "a")]),
                instance("endpoint", "e0", &[("endpoint", "e1"), ("client", "z")]),
            ],
            &classes(),
        )
        .unwrap();
        for resolved in graph.iter() {
            for dep in &resolved.direct {
                assert!(graph.get(dep).unwrap().position < resolved.position);
            }
        }
        assert_eq!(
            rendered(graph.order()),
            ["client/z", "client/a", "endpoint/e1", "endpoint/e0"]
        );
        let by_class: Vec<(&str, usize)> = graph
            .by_class()
            .into_iter()
            .map(|(class, members)| (class, members.len()))
            .collect();
        assert_eq!(
            by_class,
            [("client", 2), ("middleware", 0), ("endpoint", 2), ("service", 0)]
        );
    }

    #[test]
    fn test_reverse_closure() {
        let graph = ResolvedGraph::resolve(
            vec![
                instance("client", "echo", &[]),
                instance("client", "mirror", &[]),
                instance("endpoint", "bounce", &[("client", "echo"), ("client", "mirror")]),
                instance("service", "gw", &[("endpoint", "bounce")]),
            ],
            &classes(),
        )
        .unwrap();
        let selected = graph.reverse_closure(&[InstanceId::new("client", "mirror")]);
        let names: Vec<String> = selected.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["client/mirror", "endpoint/bounce", "service/gw"]);
    }

    #[test]
    fn test_empty_input() {
        let graph = ResolvedGraph::resolve(Vec::new(), &classes()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.levels().is_empty());
        assert!(graph.class_instances("client").is_empty());
    }

    #[test]
    fn test_unknown_dependency() {
        let err = ResolvedGraph::resolve(
            vec![instance("endpoint", "bounce", &[("client", "ghost")])],
            &classes(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownDependency);
        assert!(err.to_string().contains("client/ghost"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = ResolvedGraph::resolve(
            vec![instance("client", "echo", &[("client", "echo")])],
            &classes(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);
        assert_eq!(err.to_string(), "cycle-detected: client/echo -> client/echo");
    }

    #[test]
    fn test_cycle_names_both_members() {
        let err = ResolvedGraph::resolve(
            vec![
                instance("client", "a", &[("client", "b")]),
                instance("client", "b", &[("client", "a")]),
                instance("client", "c", &[]),
            ],
            &classes(),
        )
        .unwrap_err();
        let GenError::CycleDetected { cycle, cross_class } = &err else {
            panic!("expected a cycle, got {err}");
        };
        assert_eq!(cycle, &["client/a", "client/b", "client/a"]);
        assert!(!cross_class);
    }

    #[test]
    fn test_cross_class_cycle_flagged() {
        let err = ResolvedGraph::resolve(
            vec![
                instance("client", "a", &[("endpoint", "e")]),
                instance("endpoint", "e", &[("client", "a")]),
            ],
            &classes(),
        )
        .unwrap_err();
        assert!(err.to_string().ends_with("(cross-class)"), "{err}");
    }
}
