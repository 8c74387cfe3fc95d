use crate::coordinate_system::to_frame;
use crate::error::LayoutError;
use crate::graph::{Graph, NodeId, NodeKind};
use crate::types::{GraphSnapshot, LayoutDirection, NodeSnapshot, PinDirection, PinSnapshot, Vector2};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::cmp::Reverse;
use std::sync::Arc;

/// Geometry callbacks used while building. Each is called exactly once per
/// snapshot node or pin.
///
/// The default methods read the geometry stored in the snapshot itself.
pub trait Measure {
    fn size_of(&self, node: &NodeSnapshot) -> Vector2 {
        node.size
    }

    fn pin_offset(&self, pin: &PinSnapshot) -> Vector2 {
        pin.offset
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotMeasure;

impl Measure for SnapshotMeasure {}

// Geometry is stored in the layering frame
struct MeasuredNode {
    id: Arc<str>,
    position: Vector2,
    size: Vector2,
    pins: Vec<usize>,
}

struct MeasuredPin {
    id: Arc<str>,
    direction: PinDirection,
    offset: Vector2,
    owner: usize,
}

/// Turns a snapshot into a [`Graph`], collapsing group members into nested
/// subgraphs and splitting every level into weakly-connected components.
pub struct GraphBuilder {
    nodes: Vec<MeasuredNode>,
    pins: Vec<MeasuredPin>,
    // (out pin, in pin), deduplicated, in snapshot order
    links: Vec<(usize, usize)>,
    // Claiming group of each node
    owner: Vec<Option<usize>>,
    // Nodes claimed by each group, in snapshot order
    children: Vec<Vec<usize>>,
}

impl GraphBuilder {
    pub fn new<M: Measure + ?Sized>(
        snapshot: &GraphSnapshot,
        measure: &M,
        direction: LayoutDirection,
    ) -> Result<Self, LayoutError> {
        let mut node_index: HashMap<&str, usize> = HashMap::with_capacity(snapshot.nodes.len());
        let mut pin_index: HashMap<&str, usize> = HashMap::new();
        let mut nodes = Vec::with_capacity(snapshot.nodes.len());
        let mut pins = Vec::new();

        for (index, node) in snapshot.nodes.iter().enumerate() {
            if node_index.insert(node.id.as_str(), index).is_some() {
                return Err(LayoutError::DuplicateNode(node.id.clone()));
            }
            let mut own_pins = Vec::with_capacity(node.pins.len());
            for pin in &node.pins {
                if pin_index.insert(pin.id.as_str(), pins.len()).is_some() {
                    return Err(LayoutError::DuplicatePin(pin.id.clone()));
                }
                own_pins.push(pins.len());
                pins.push(MeasuredPin {
                    id: Arc::from(pin.id.as_str()),
                    direction: pin.direction,
                    offset: to_frame(measure.pin_offset(pin), direction),
                    owner: index,
                });
            }
            nodes.push(MeasuredNode {
                id: Arc::from(node.id.as_str()),
                position: to_frame(node.position, direction),
                size: to_frame(measure.size_of(node), direction),
                pins: own_pins,
            });
        }

        let mut links = Vec::with_capacity(snapshot.links.len());
        let mut seen = HashSet::with_capacity(snapshot.links.len());
        for link in &snapshot.links {
            let (Some(&a), Some(&b)) = (
                pin_index.get(link.from.as_str()),
                pin_index.get(link.to.as_str()),
            ) else {
                log::trace!("ignoring link {} -> {}: pin not in snapshot", link.from, link.to);
                continue;
            };
            let (source, target) = match (pins[a].direction, pins[b].direction) {
                (PinDirection::Out, PinDirection::In) => (a, b),
                (PinDirection::In, PinDirection::Out) => (b, a),
                (direction, _) => {
                    return Err(LayoutError::MismatchedLink {
                        from: link.from.clone(),
                        to: link.to.clone(),
                        direction: direction.as_str(),
                    })
                }
            };
            if pins[source].owner == pins[target].owner {
                continue;
            }
            if seen.insert((source, target)) {
                links.push((source, target));
            }
        }

        let (owner, children) = resolve_groups(snapshot, &node_index);

        Ok(GraphBuilder {
            nodes,
            pins,
            links,
            owner,
            children,
        })
    }

    pub fn build(&self) -> Graph {
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&index| self.owner[index].is_none())
            .collect();
        self.build_level(&roots)
    }

    fn build_level(&self, level: &[usize]) -> Graph {
        let mut components = self.split_components(level);
        if components.len() <= 1 {
            return self.build_graph(level);
        }
        let mut graph = Graph::new();
        graph.components = components
            .drain(..)
            .map(|component| self.build_graph(&component))
            .collect();
        graph
    }

    // Weakly-connected components of one level; links into collapsed groups
    // count as links to the group node
    fn split_components(&self, level: &[usize]) -> Vec<Vec<usize>> {
        let level_set: HashSet<usize> = level.iter().copied().collect();
        let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(source, target) in &self.links {
            let (Some(a), Some(b)) = (
                self.representative(self.pins[source].owner, &level_set),
                self.representative(self.pins[target].owner, &level_set),
            ) else {
                continue;
            };
            if a != b {
                adjacency.entry(a).or_default().push(b);
                adjacency.entry(b).or_default().push(a);
            }
        }

        let mut visited = HashSet::with_capacity(level.len());
        let mut components = Vec::new();
        for &start in level {
            if !visited.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut stack = vec![start];
            while let Some(current) = stack.pop() {
                if let Some(neighbors) = adjacency.get(&current) {
                    for &next in neighbors {
                        if visited.insert(next) {
                            component.push(next);
                            stack.push(next);
                        }
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    // The node of `level` that is `index` itself or collapses it
    fn representative(&self, index: usize, level: &HashSet<usize>) -> Option<usize> {
        let mut current = Some(index);
        while let Some(node) = current {
            if level.contains(&node) {
                return Some(node);
            }
            current = self.owner[node];
        }
        None
    }

    fn build_graph(&self, level: &[usize]) -> Graph {
        let mut sorted = level.to_vec();
        sorted.sort_by(|&a, &b| {
            self.nodes[a]
                .position
                .y
                .total_cmp(&self.nodes[b].position.y)
        });

        let mut graph = Graph::new();
        for &index in &sorted {
            let node = &self.nodes[index];
            let id = graph.add_node(
                Some(node.id.clone()),
                NodeKind::Real,
                node.size,
                node.position,
            );
            for &pin in &node.pins {
                let pin = &self.pins[pin];
                graph.add_pin(id, pin.direction, pin.offset, Some(pin.id.clone()));
            }

            if !self.children[index].is_empty() {
                let sub = self.build_level(&self.children[index]);
                self.mirror_boundary_pins(&mut graph, id, index);
                graph.subgraphs.insert(id, sub);
            }

            let node_ref = graph.node(id);
            if node_ref.in_pins.is_empty() && node_ref.out_pins.is_empty() {
                let half = node.size.y / 2.0;
                graph.add_pin(id, PinDirection::In, Vector2::new(0.0, half), None);
                graph.add_pin(id, PinDirection::Out, Vector2::new(node.size.x, half), None);
            }
            graph.sort_pins_by_offset(id);
        }

        for &(source, target) in &self.links {
            let local = (
                graph.origin_pins.get(&self.pins[source].id).copied(),
                graph.origin_pins.get(&self.pins[target].id).copied(),
            );
            if let (Some(a), Some(b)) = local {
                graph.add_edge(a, b);
            }
        }
        graph
    }

    // A collapsed group exposes every inner pin linked to something outside it
    fn mirror_boundary_pins(&self, graph: &mut Graph, id: NodeId, group: usize) {
        let inside = self.descendants(group);
        let group_position = self.nodes[group].position;
        let mut mirrored = HashSet::new();
        for &(source, target) in &self.links {
            let inner = match (
                inside.contains(&self.pins[source].owner),
                inside.contains(&self.pins[target].owner),
            ) {
                (true, false) => source,
                (false, true) => target,
                _ => continue,
            };
            if !mirrored.insert(inner) {
                continue;
            }
            let pin = &self.pins[inner];
            let offset = self.nodes[pin.owner].position + pin.offset - group_position;
            graph.add_pin(id, pin.direction, offset, Some(pin.id.clone()));
        }
    }

    fn descendants(&self, group: usize) -> HashSet<usize> {
        let mut result = HashSet::new();
        let mut stack: Vec<usize> = self.children[group].clone();
        while let Some(node) = stack.pop() {
            if result.insert(node) {
                stack.extend(self.children[node].iter().copied());
            }
        }
        result
    }
}

// Deepest groups claim first; a node already claimed is skipped, and a group
// never claims one of the groups that (transitively) claimed it. Depth is the
// length of the longest chain of listing groups above a node.
fn resolve_groups(
    snapshot: &GraphSnapshot,
    node_index: &HashMap<&str, usize>,
) -> (Vec<Option<usize>>, Vec<Vec<usize>>) {
    let count = snapshot.nodes.len();
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut listed_by: Vec<Vec<usize>> = vec![Vec::new(); count];

    for (index, node) in snapshot.nodes.iter().enumerate() {
        let Some(ref listed) = node.members else {
            continue;
        };
        let mut unique = HashSet::new();
        for id in listed {
            if let Some(&member) = node_index.get(id.as_str()) {
                if member != index && unique.insert(member) {
                    members[index].push(member);
                    listed_by[member].push(index);
                }
            }
        }
    }

    let mut memo = vec![None; count];
    let mut on_path = vec![false; count];
    let depth: Vec<usize> = (0..count)
        .map(|index| nesting_depth(index, &listed_by, &mut memo, &mut on_path))
        .collect();

    let mut groups: Vec<usize> = (0..count).filter(|&i| !members[i].is_empty()).collect();
    groups.sort_by_key(|&group| Reverse(depth[group]));

    let mut owner: Vec<Option<usize>> = vec![None; count];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    for group in groups {
        for &member in &members[group] {
            if owner[member].is_some() || claims(&owner, member, group) {
                continue;
            }
            owner[member] = Some(group);
            children[group].push(member);
        }
        children[group].sort_unstable();
    }
    (owner, children)
}

// Listing groups already on the current chain are cycles and are ignored
fn nesting_depth(
    node: usize,
    listed_by: &[Vec<usize>],
    memo: &mut [Option<usize>],
    on_path: &mut [bool],
) -> usize {
    if let Some(depth) = memo[node] {
        return depth;
    }
    on_path[node] = true;
    let mut depth = 0;
    for &group in &listed_by[node] {
        if !on_path[group] {
            depth = depth.max(nesting_depth(group, listed_by, memo, on_path) + 1);
        }
    }
    on_path[node] = false;
    memo[node] = Some(depth);
    depth
}

// Whether `ancestor` is on the claim chain above `node`
fn claims(owner: &[Option<usize>], ancestor: usize, node: usize) -> bool {
    let mut current = owner[node];
    while let Some(group) = current {
        if group == ancestor {
            return true;
        }
        current = owner[group];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Link;

    fn node(id: &str, y: f64) -> NodeSnapshot {
        NodeSnapshot::new(id, Vector2::new(0.0, y), Vector2::new(100.0, 50.0))
            .with_pin(&format!("{id}.in"), PinDirection::In, Vector2::new(0.0, 25.0))
            .with_pin(&format!("{id}.out"), PinDirection::Out, Vector2::new(100.0, 25.0))
    }

    fn link(from: &str, to: &str) -> Link {
        Link::new(&format!("{from}.out"), &format!("{to}.in"))
    }

    fn build(snapshot: &GraphSnapshot) -> Graph {
        GraphBuilder::new(snapshot, &SnapshotMeasure, LayoutDirection::Horizontal)
            .unwrap()
            .build()
    }

    fn origin_of(g: &Graph, id: NodeId) -> &str {
        g.node(id).origin.as_deref().unwrap()
    }

    #[test]
    fn links_are_oriented_from_out_to_in() {
        let snapshot = GraphSnapshot {
            nodes: vec![node("a", 0.0), node("b", 100.0)],
            links: vec![Link::new("b.in", "a.out")],
        };
        let g = build(&snapshot);
        assert_eq!(g.edges.len(), 1);
        let edge = g.edges.values().next().unwrap();
        assert_eq!(g.pin(edge.source).origin.as_deref(), Some("a.out"));
        assert_eq!(g.pin(edge.target).origin.as_deref(), Some("b.in"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let snapshot = GraphSnapshot {
            nodes: vec![node("a", 0.0), node("a", 10.0)],
            links: vec![],
        };
        let result = GraphBuilder::new(&snapshot, &SnapshotMeasure, LayoutDirection::Horizontal);
        assert!(matches!(result, Err(LayoutError::DuplicateNode(id)) if id == "a"));
    }

    #[test]
    fn same_direction_link_is_rejected() {
        let snapshot = GraphSnapshot {
            nodes: vec![node("a", 0.0), node("b", 10.0)],
            links: vec![Link::new("a.out", "b.out")],
        };
        let result = GraphBuilder::new(&snapshot, &SnapshotMeasure, LayoutDirection::Horizontal);
        assert!(matches!(result, Err(LayoutError::MismatchedLink { .. })));
    }

    #[test]
    fn unknown_pins_and_self_links_are_ignored() {
        let snapshot = GraphSnapshot {
            nodes: vec![node("a", 0.0), node("b", 10.0)],
            links: vec![link("a", "b"), link("a", "a"), Link::new("a.out", "zzz.in")],
        };
        let g = build(&snapshot);
        assert_eq!(g.edges.len(), 1);
    }

    #[test]
    fn pinless_node_gets_implicit_pair() {
        let snapshot = GraphSnapshot {
            nodes: vec![NodeSnapshot::new("lonely", Vector2::ZERO, Vector2::new(40.0, 20.0))],
            links: vec![],
        };
        let g = build(&snapshot);
        let node = g.nodes.values().next().unwrap();
        assert_eq!(node.in_pins.len(), 1);
        assert_eq!(node.out_pins.len(), 1);
        assert_eq!(g.pin(node.out_pins[0]).offset, Vector2::new(40.0, 10.0));
    }

    #[test]
    fn nodes_are_sorted_along_cross_axis() {
        let snapshot = GraphSnapshot {
            nodes: vec![node("low", 300.0), node("high", 0.0), node("mid", 100.0)],
            links: vec![link("high", "low"), link("mid", "low")],
        };
        let g = build(&snapshot);
        let order: Vec<&str> = g.nodes.keys().map(|&id| origin_of(&g, id)).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn disconnected_nodes_become_components() {
        let snapshot = GraphSnapshot {
            nodes: vec![node("a", 0.0), node("b", 0.0), node("c", 0.0), node("d", 0.0)],
            links: vec![link("a", "b"), link("c", "d")],
        };
        let g = build(&snapshot);
        assert!(g.nodes.is_empty());
        assert_eq!(g.components.len(), 2);
        assert_eq!(g.components[0].nodes.len(), 2);
        assert_eq!(g.components[1].edges.len(), 1);
    }

    #[test]
    fn group_collapses_members_and_mirrors_boundary_pins() {
        let group = NodeSnapshot::new("g", Vector2::new(200.0, 0.0), Vector2::new(300.0, 300.0))
            .with_members(&["b", "c"]);
        let mut b = node("b", 10.0);
        b.position.x = 220.0;
        let snapshot = GraphSnapshot {
            nodes: vec![node("a", 0.0), group, b, node("c", 200.0), node("d", 0.0)],
            links: vec![link("a", "b"), link("b", "c"), link("c", "d")],
        };
        let g = build(&snapshot);

        assert_eq!(g.nodes.len(), 3);
        assert_eq!(g.subgraphs.len(), 1);
        let (&group_id, sub) = g.subgraphs.iter().next().unwrap();
        assert_eq!(sub.nodes.len(), 2);
        assert_eq!(sub.edges.len(), 1);

        // a -> g -> d at this level
        assert_eq!(g.edges.len(), 2);
        let group_node = g.node(group_id);
        assert_eq!(group_node.in_pins.len(), 1);
        assert_eq!(group_node.out_pins.len(), 1);
        let mirrored = g.pin(group_node.in_pins[0]);
        assert_eq!(mirrored.origin.as_deref(), Some("b.in"));
        assert_eq!(mirrored.offset, Vector2::new(20.0, 35.0));
    }

    #[test]
    fn deepest_group_claims_shared_member() {
        let outer = NodeSnapshot::new("outer", Vector2::ZERO, Vector2::new(500.0, 500.0))
            .with_members(&["inner", "x", "y"]);
        let inner = NodeSnapshot::new("inner", Vector2::ZERO, Vector2::new(200.0, 200.0))
            .with_members(&["x"]);
        let snapshot = GraphSnapshot {
            nodes: vec![outer, inner, node("x", 0.0), node("y", 50.0)],
            links: vec![link("x", "y")],
        };
        let g = build(&snapshot);

        assert_eq!(g.nodes.len(), 1);
        let outer_sub = g.subgraphs.values().next().unwrap();
        assert_eq!(outer_sub.nodes.len(), 2);
        let inner_sub = outer_sub.subgraphs.values().next().unwrap();
        let names: Vec<&str> = inner_sub.nodes.keys().map(|&id| origin_of(inner_sub, id)).collect();
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn nesting_depth_follows_the_containment_chain() {
        // Every group lists only its direct children, except A which also lists x
        let group = |id: &str, members: &[&str]| {
            NodeSnapshot::new(id, Vector2::ZERO, Vector2::new(300.0, 300.0)).with_members(members)
        };
        let snapshot = GraphSnapshot {
            nodes: vec![
                group("top", &["A"]),
                group("A", &["C", "x"]),
                group("C", &["B"]),
                group("B", &["x"]),
                node("x", 0.0),
            ],
            links: vec![],
        };
        let g = build(&snapshot);

        let mut level = &g;
        for expected in ["top", "A", "C", "B", "x"] {
            assert_eq!(level.nodes.len(), 1, "level of {expected}");
            let id = *level.nodes.keys().next().unwrap();
            assert_eq!(origin_of(level, id), expected);
            if let Some(sub) = level.subgraphs.get(&id) {
                level = sub;
            }
        }
    }

    #[test]
    fn empty_group_stays_uncollapsed() {
        let empty = NodeSnapshot::new("comment", Vector2::ZERO, Vector2::new(80.0, 80.0))
            .with_members(&["missing"]);
        let snapshot = GraphSnapshot {
            nodes: vec![empty],
            links: vec![],
        };
        let g = build(&snapshot);
        assert!(g.subgraphs.is_empty());
        assert_eq!(g.nodes.len(), 1);
    }

    #[test]
    fn mutually_listed_groups_do_not_claim_each_other() {
        let a = NodeSnapshot::new("a", Vector2::ZERO, Vector2::new(10.0, 10.0)).with_members(&["b"]);
        let b = NodeSnapshot::new("b", Vector2::ZERO, Vector2::new(10.0, 10.0)).with_members(&["a"]);
        let snapshot = GraphSnapshot {
            nodes: vec![a, b],
            links: vec![],
        };
        let g = build(&snapshot);
        assert_eq!(g.nodes.len(), 1);
        let sub = g.subgraphs.values().next().unwrap();
        assert_eq!(sub.nodes.len(), 1);
    }

    #[test]
    fn vertical_direction_transposes_geometry() {
        let snapshot = GraphSnapshot {
            nodes: vec![node("a", 30.0)],
            links: vec![],
        };
        let g = GraphBuilder::new(&snapshot, &SnapshotMeasure, LayoutDirection::Vertical)
            .unwrap()
            .build();
        let node = g.nodes.values().next().unwrap();
        assert_eq!(node.size, Vector2::new(50.0, 100.0));
        assert_eq!(node.position, Vector2::new(30.0, 0.0));
    }
}
