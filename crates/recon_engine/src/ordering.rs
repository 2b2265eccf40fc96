//! Dependency ordering over entity relations.
//!
//! Entities live in a slice and edges are index lists, so relation cycles
//! never turn into reference cycles. Ordering is Kahn's algorithm with the
//! lowest input index chosen among ready nodes, which makes the output a
//! pure function of the input order.
//!
//! A cycle is only ever broken inside a strongly connected component none
//! of whose members waits on anything outside it, so every edge between
//! components is still honored.

use recon_model::{Entity, EntityRef, Identified};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Which discipline an order must follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Dependencies before dependents. Search-identifier entities go
    /// first, in input order, exempt from the graph.
    ForCreation,
    /// Dependents before dependencies.
    ForDeletion,
}

/// An item that may depend on other items through its relations.
pub trait Dependent: Identified {
    /// Identifiers this item's relations point at.
    fn dependency_ids(&self) -> impl Iterator<Item = &str>;

    /// True if the identifier is resolved by the remote store.
    fn uses_search_identifier(&self) -> bool {
        false
    }
}

impl Dependent for Entity {
    fn dependency_ids(&self) -> impl Iterator<Item = &str> {
        self.relation_targets()
    }

    fn uses_search_identifier(&self) -> bool {
        self.uses_search_identifier
    }
}

impl Dependent for EntityRef {
    fn dependency_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::empty()
    }
}

/// Orders `items` for the given direction, consuming them.
pub fn order<T: Dependent>(items: Vec<T>, direction: Direction) -> Vec<T> {
    let indices = order_indices(&items, direction);
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    indices
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

/// Returns a permutation of `0..items.len()` following `direction`.
pub fn order_indices<T: Dependent>(items: &[T], direction: Direction) -> Vec<usize> {
    let mut order = Vec::with_capacity(items.len());

    // Search identifiers are resolved server side, so for creation they
    // are written first and take no part in the graph.
    let graph_nodes: Vec<usize> = match direction {
        Direction::ForCreation => {
            let (search, rest): (Vec<usize>, Vec<usize>) =
                (0..items.len()).partition(|&i| items[i].uses_search_identifier());
            order.extend(search);
            rest
        }
        Direction::ForDeletion => (0..items.len()).collect(),
    };

    let dependencies = dependency_edges(items, &graph_nodes);

    // prerequisites[n]: nodes that must be emitted before node n
    let mut prerequisites: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); graph_nodes.len()];
    for (node, deps) in dependencies.iter().enumerate() {
        for &dep in deps {
            match direction {
                Direction::ForCreation => prerequisites[node].insert(dep),
                Direction::ForDeletion => prerequisites[dep].insert(node),
            };
        }
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); graph_nodes.len()];
    let mut in_degree: Vec<usize> = Vec::with_capacity(graph_nodes.len());
    for (node, prereqs) in prerequisites.iter().enumerate() {
        in_degree.push(prereqs.len());
        for &prereq in prereqs {
            successors[prereq].push(node);
        }
    }

    let component = strongly_connected_components(&successors);
    let mut broken_components = HashSet::new();

    let mut ready: BTreeSet<usize> = (0..graph_nodes.len())
        .filter(|&node| in_degree[node] == 0)
        .collect();
    let mut remaining: BTreeSet<usize> = (0..graph_nodes.len()).collect();

    while let Some(&first) = remaining.first() {
        let node = match ready.pop_first() {
            Some(node) => node,
            None => {
                // a component may be entered once no member waits on
                // anything outside it
                let unblocked = |candidate: usize| {
                    remaining
                        .iter()
                        .filter(|&&member| component[member] == component[candidate])
                        .all(|&member| {
                            prerequisites[member].iter().all(|prereq| {
                                !remaining.contains(prereq)
                                    || component[*prereq] == component[candidate]
                            })
                        })
                };
                let node = remaining
                    .iter()
                    .copied()
                    .find(|&candidate| unblocked(candidate))
                    .unwrap_or(first);

                let item = &items[graph_nodes[node]];
                if broken_components.insert(component[node]) {
                    warn!(
                        identifier = item.identifier(),
                        blueprint = item.blueprint(),
                        "dependency cycle detected, breaking it at the earliest input entity"
                    );
                } else {
                    debug!(
                        identifier = item.identifier(),
                        blueprint = item.blueprint(),
                        "breaking dependency cycle again"
                    );
                }
                node
            }
        };

        remaining.remove(&node);
        order.push(graph_nodes[node]);

        for &next in &successors[node] {
            in_degree[next] = in_degree[next].saturating_sub(1);
            if in_degree[next] == 0 && remaining.contains(&next) {
                ready.insert(next);
            }
        }
    }

    order
}

/// Builds, for each graph node, the deduplicated list of graph nodes it
/// depends on. Self references are dropped.
fn dependency_edges<T: Dependent>(items: &[T], graph_nodes: &[usize]) -> Vec<Vec<usize>> {
    let mut by_identifier: HashMap<&str, Vec<usize>> = HashMap::new();
    for (node, &index) in graph_nodes.iter().enumerate() {
        by_identifier
            .entry(items[index].identifier())
            .or_default()
            .push(node);
    }

    graph_nodes
        .iter()
        .enumerate()
        .map(|(node, &index)| {
            let mut deps = BTreeSet::new();
            for target in items[index].dependency_ids() {
                if let Some(nodes) = by_identifier.get(target) {
                    deps.extend(nodes.iter().copied().filter(|&dep| dep != node));
                }
            }
            deps.into_iter().collect()
        })
        .collect()
}

/// Labels every node with its strongly connected component (Tarjan,
/// iterative). Nodes share a label iff each reaches the other.
fn strongly_connected_components(successors: &[Vec<usize>]) -> Vec<usize> {
    const UNVISITED: usize = usize::MAX;

    let n = successors.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut component = vec![UNVISITED; n];
    let mut next_index = 0;
    let mut next_component = 0;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        // (node, position of the next successor to visit)
        let mut frames = vec![(root, 0usize)];
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = frames.last_mut() {
            let node = frame.0;
            if let Some(&next) = successors[node].get(frame.1) {
                frame.1 += 1;
                if index[next] == UNVISITED {
                    index[next] = next_index;
                    low[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    frames.push((next, 0));
                } else if on_stack[next] {
                    low[node] = low[node].min(index[next]);
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] == index[node] {
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component[member] = next_component;
                    if member == node {
                        break;
                    }
                }
                next_component += 1;
            }
        }
    }

    component
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[Entity]) -> Vec<&str> {
        items.iter().map(|e| e.identifier.as_str()).collect()
    }

    fn service(id: &str) -> Entity {
        Entity::new(id, "service")
    }

    #[test]
    fn creation_puts_dependencies_first() {
        let items = vec![
            service("api").with_relation("depends_on", "db"),
            service("web").with_relation("depends_on", "api"),
            service("db"),
        ];

        let ordered = order(items, Direction::ForCreation);
        assert_eq!(ids(&ordered), vec!["db", "api", "web"]);
    }

    #[test]
    fn deletion_puts_dependents_first() {
        let items = vec![service("a"), service("b").with_relation("depends_on", "a")];

        let ordered = order(items, Direction::ForDeletion);
        assert_eq!(ids(&ordered), vec!["b", "a"]);
    }

    #[test]
    fn independent_items_keep_input_order() {
        let items = vec![service("z"), service("m"), service("a")];
        assert_eq!(
            ids(&order(items.clone(), Direction::ForCreation)),
            vec!["z", "m", "a"]
        );
        assert_eq!(ids(&order(items, Direction::ForDeletion)), vec!["z", "m", "a"]);
    }

    #[test]
    fn diamond() {
        let items = vec![
            service("top").with_relation("uses", vec!["left".to_string(), "right".to_string()]),
            service("left").with_relation("uses", "bottom"),
            service("right").with_relation("uses", "bottom"),
            service("bottom"),
        ];

        let created = order(items.clone(), Direction::ForCreation);
        assert_eq!(ids(&created), vec!["bottom", "left", "right", "top"]);

        let deleted = order(items, Direction::ForDeletion);
        assert_eq!(ids(&deleted), vec!["top", "left", "right", "bottom"]);
    }

    #[test]
    fn search_identifier_entities_go_first_for_creation() {
        let items = vec![
            service("api").with_relation("depends_on", "db"),
            service("db"),
            service("lookup").with_search_identifier(),
        ];

        let ordered = order(items.clone(), Direction::ForCreation);
        assert_eq!(ids(&ordered), vec!["lookup", "db", "api"]);

        // no special placement when deleting
        let ordered = order(items, Direction::ForDeletion);
        assert_eq!(ids(&ordered), vec!["api", "db", "lookup"]);
    }

    #[test]
    fn cycle_is_broken_by_input_order() {
        let items = vec![
            service("a").with_relation("next", "b"),
            service("b").with_relation("next", "c"),
            service("c").with_relation("next", "a"),
            service("free"),
        ];

        let first = order(items.clone(), Direction::ForCreation);
        assert_eq!(ids(&first), vec!["free", "a", "c", "b"]);

        let second = order(items.clone(), Direction::ForCreation);
        assert_eq!(ids(&first), ids(&second));

        let deleted = order(items, Direction::ForDeletion);
        assert_eq!(ids(&deleted), vec!["free", "a", "b", "c"]);
    }

    #[test]
    fn dependent_of_a_cycle_waits_for_it_on_creation() {
        // x depends on the a <-> b cycle but is not part of it
        let items = vec![
            service("x").with_relation("uses", "a"),
            service("a").with_relation("next", "b"),
            service("b").with_relation("next", "a"),
        ];

        let ordered = order(items, Direction::ForCreation);
        let pos = |id: &str| ordered.iter().position(|e| e.identifier == id).unwrap();
        assert!(pos("a") < pos("x"));
        assert_eq!(ids(&ordered), vec!["a", "x", "b"]);
    }

    #[test]
    fn dependency_of_a_cycle_outlives_it_on_deletion() {
        // a is in the a <-> b cycle and also depends on z
        let items = vec![
            service("z"),
            service("a").with_relation("uses", vec!["b".to_string(), "z".to_string()]),
            service("b").with_relation("next", "a"),
        ];

        let ordered = order(items, Direction::ForDeletion);
        let pos = |id: &str| ordered.iter().position(|e| e.identifier == id).unwrap();
        assert!(pos("a") < pos("z"));
        assert_eq!(ids(&ordered), vec!["a", "z", "b"]);
    }

    #[test]
    fn two_cycles_joined_by_an_edge() {
        // c <-> d depends on a <-> b
        let items = vec![
            service("c").with_relation("next", vec!["d".to_string(), "a".to_string()]),
            service("d").with_relation("next", "c"),
            service("a").with_relation("next", "b"),
            service("b").with_relation("next", "a"),
        ];

        let created = order(items.clone(), Direction::ForCreation);
        let pos = |list: &[Entity], id: &str| list.iter().position(|e| e.identifier == id).unwrap();
        assert_eq!(ids(&created), vec!["a", "b", "c", "d"]);
        assert!(pos(&created, "b") < pos(&created, "c"));

        let deleted = order(items, Direction::ForDeletion);
        assert!(pos(&deleted, "c") < pos(&deleted, "a"));
        assert!(pos(&deleted, "d") < pos(&deleted, "a"));
    }

    #[test]
    fn components_group_mutual_reachability() {
        // 0 -> 1 -> 2 -> 0, 2 -> 3, 4 alone
        let successors = vec![vec![1], vec![2], vec![0, 3], vec![], vec![]];
        let component = strongly_connected_components(&successors);

        assert_eq!(component[0], component[1]);
        assert_eq!(component[1], component[2]);
        assert_ne!(component[2], component[3]);
        assert_ne!(component[3], component[4]);
        assert_ne!(component[0], component[4]);
    }

    #[test]
    fn self_reference_is_ignored() {
        let items = vec![
            service("loop").with_relation("parent", "loop"),
            service("other"),
        ];
        assert_eq!(
            ids(&order(items, Direction::ForCreation)),
            vec!["loop", "other"]
        );
    }

    #[test]
    fn relations_to_absent_entities_are_ignored() {
        let items = vec![service("api").with_relation("depends_on", "elsewhere")];
        assert_eq!(order(items, Direction::ForCreation).len(), 1);
    }

    #[test]
    fn matching_is_by_identifier_across_blueprints() {
        let items = vec![
            Entity::new("svc", "service").with_relation("owner", "core"),
            Entity::new("core", "team"),
        ];
        let ordered = order(items, Direction::ForCreation);
        assert_eq!(ordered[0].blueprint, "team");
    }

    #[test]
    fn refs_keep_input_order() {
        let refs = vec![
            EntityRef::new("b", "service"),
            EntityRef::new("a", "service"),
        ];
        assert_eq!(order_indices(&refs, Direction::ForDeletion), vec![0, 1]);
        assert_eq!(order(refs.clone(), Direction::ForCreation), refs);
    }

    #[test]
    fn empty_input() {
        assert!(order(Vec::<Entity>::new(), Direction::ForCreation).is_empty());
    }
}
