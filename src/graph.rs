use crate::types::{PinDirection, Rect, Vector2};
use ahash::AHashMap as HashMap;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId(pub u32);

// An edge is identified by its two pins: source is always an out pin, target an in pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: PinId,
    pub target: PinId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Real,
    // Zero-size node splitting an edge that spans several layers
    Routing,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    // Snapshot node id; None for synthetic nodes and structural copies
    pub origin: Option<Arc<str>>,
    pub kind: NodeKind,
    pub size: Vector2,
    pub position: Vector2,
    pub in_pins: Vec<PinId>,
    pub out_pins: Vec<PinId>,
    pub in_edges: Vec<EdgeKey>,
    pub out_edges: Vec<EdgeKey>,
    pub layer: usize,
    pub order: usize,
}

impl Node {
    pub fn is_routing(&self) -> bool {
        self.kind == NodeKind::Routing
    }

    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }
}

#[derive(Debug, Clone)]
pub struct Pin {
    pub id: PinId,
    pub direction: PinDirection,
    pub owner: NodeId,
    // Relative to the owner's origin
    pub offset: Vector2,
    // Snapshot pin id this pin stands for (its own, or a mirrored inner pin)
    pub origin: Option<Arc<str>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: PinId,
    pub target: PinId,
    // Set when the edge runs against the layering direction
    pub inverted: bool,
}

impl Edge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source,
            target: self.target,
        }
    }

    // Pin on the upper (earlier) layer
    #[inline]
    pub fn tail(&self) -> PinId {
        if self.inverted {
            self.target
        } else {
            self.source
        }
    }

    // Pin on the lower (later) layer
    #[inline]
    pub fn head(&self) -> PinId {
        if self.inverted {
            self.source
        } else {
            self.target
        }
    }
}

/// Arena holding the nodes, pins and edges of one level of the layout.
///
/// Cross references (pin -> node, edge -> pin) are ids into the arena.
/// Looking up an id that is not present is an invariant violation and
/// panics.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: IndexMap<NodeId, Node>,
    pub pins: IndexMap<PinId, Pin>,
    pub edges: IndexMap<EdgeKey, Edge>,
    // Snapshot pin id -> local pin standing for it
    pub origin_pins: HashMap<Arc<str>, PinId>,
    // Collapsed group node -> laid out content of the group
    pub subgraphs: IndexMap<NodeId, Graph>,
    // Independent weakly-connected components; a graph with components has no nodes of its own
    pub components: Vec<Graph>,
    pub layers: Vec<Vec<NodeId>>,
    pub bound: Rect,
    next_node: u32,
    next_pin: u32,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.components.is_empty()
    }

    pub fn add_node(
        &mut self,
        origin: Option<Arc<str>>,
        kind: NodeKind,
        size: Vector2,
        position: Vector2,
    ) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            id,
            Node {
                id,
                origin,
                kind,
                size,
                position,
                in_pins: Vec::new(),
                out_pins: Vec::new(),
                in_edges: Vec::new(),
                out_edges: Vec::new(),
                layer: 0,
                order: 0,
            },
        );
        id
    }

    pub fn add_pin(
        &mut self,
        owner: NodeId,
        direction: PinDirection,
        offset: Vector2,
        origin: Option<Arc<str>>,
    ) -> PinId {
        let id = PinId(self.next_pin);
        self.next_pin += 1;
        let node = self.node_mut(owner);
        match direction {
            PinDirection::In => node.in_pins.push(id),
            PinDirection::Out => node.out_pins.push(id),
        }
        if let Some(ref origin) = origin {
            self.origin_pins.insert(origin.clone(), id);
        }
        self.pins.insert(
            id,
            Pin {
                id,
                direction,
                owner,
                offset,
                origin,
            },
        );
        id
    }

    /// Connects an out pin to an in pin. Self loops and duplicates are
    /// ignored and yield `None`.
    pub fn add_edge(&mut self, source: PinId, target: PinId) -> Option<EdgeKey> {
        self.add_edge_with(source, target, false)
    }

    pub(crate) fn add_edge_with(
        &mut self,
        source: PinId,
        target: PinId,
        inverted: bool,
    ) -> Option<EdgeKey> {
        debug_assert_eq!(self.pin(source).direction, PinDirection::Out);
        debug_assert_eq!(self.pin(target).direction, PinDirection::In);

        let source_node = self.pin(source).owner;
        let target_node = self.pin(target).owner;
        let key = EdgeKey { source, target };
        if source_node == target_node || self.edges.contains_key(&key) {
            return None;
        }

        self.edges.insert(
            key,
            Edge {
                source,
                target,
                inverted,
            },
        );
        self.node_mut(source_node).out_edges.push(key);
        self.node_mut(target_node).in_edges.push(key);
        Some(key)
    }

    pub fn remove_edge(&mut self, key: &EdgeKey) -> Option<Edge> {
        let edge = self.edges.shift_remove(key)?;
        let source_node = self.pin(edge.source).owner;
        let target_node = self.pin(edge.target).owner;
        self.node_mut(source_node).out_edges.retain(|k| k != key);
        self.node_mut(target_node).in_edges.retain(|k| k != key);
        Some(edge)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[&id]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[&id]
    }

    #[inline]
    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[&id]
    }

    #[inline]
    pub fn pin_mut(&mut self, id: PinId) -> &mut Pin {
        &mut self.pins[&id]
    }

    #[inline]
    pub fn edge(&self, key: &EdgeKey) -> &Edge {
        &self.edges[key]
    }

    #[inline]
    pub fn owner(&self, pin: PinId) -> NodeId {
        self.pin(pin).owner
    }

    pub fn pin_position(&self, pin: PinId) -> Vector2 {
        let pin = self.pin(pin);
        self.node(pin.owner).position + pin.offset
    }

    // Edges attaching the node to the previous layer
    pub fn upper_edges(&self, id: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        let node = self.node(id);
        node.in_edges
            .iter()
            .chain(node.out_edges.iter())
            .map(move |key| self.edge(key))
            .filter(move |edge| self.owner(edge.head()) == id)
    }

    // Edges attaching the node to the next layer
    pub fn lower_edges(&self, id: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        let node = self.node(id);
        node.out_edges
            .iter()
            .chain(node.in_edges.iter())
            .map(move |key| self.edge(key))
            .filter(move |edge| self.owner(edge.tail()) == id)
    }

    pub fn uppers(&self, id: NodeId) -> Vec<NodeId> {
        self.upper_edges(id)
            .map(|edge| self.owner(edge.tail()))
            .collect()
    }

    pub fn lowers(&self, id: NodeId) -> Vec<NodeId> {
        self.lower_edges(id)
            .map(|edge| self.owner(edge.head()))
            .collect()
    }

    /// Moves a node, dragging its collapsed content along.
    pub fn set_position(&mut self, id: NodeId, position: Vector2) {
        let node = self.node_mut(id);
        let delta = position - node.position;
        node.position = position;
        if let Some(sub) = self.subgraphs.get_mut(&id) {
            sub.offset_by(delta);
        }
    }

    pub fn offset_by(&mut self, delta: Vector2) {
        for node in self.nodes.values_mut() {
            node.position += delta;
        }
        for sub in self.subgraphs.values_mut() {
            sub.offset_by(delta);
        }
        for component in self.components.iter_mut() {
            component.offset_by(delta);
        }
        self.bound = self.bound.offset(delta);
    }

    // Union of the real nodes' rectangles
    pub fn real_bound(&self) -> Rect {
        self.nodes
            .values()
            .filter(|node| !node.is_routing())
            .map(Node::rect)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
    }

    /// Absolute position of the local pin standing for a snapshot pin,
    /// searching components as well.
    pub fn origin_pin_position(&self, origin: &str) -> Option<Vector2> {
        if let Some(&pin) = self.origin_pins.get(origin) {
            return Some(self.pin_position(pin));
        }
        self.components
            .iter()
            .find_map(|component| component.origin_pin_position(origin))
    }

    // Pins of each side ordered along the cross axis
    pub fn sort_pins_by_offset(&mut self, id: NodeId) {
        let pins = &self.pins;
        let node = &mut self.nodes[&id];
        let cross = |pin: &PinId| pins[pin].offset.y;
        node.in_pins.sort_by(|a, b| cross(a).total_cmp(&cross(b)));
        node.out_pins.sort_by(|a, b| cross(a).total_cmp(&cross(b)));
    }

    pub fn routing_node_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_routing()).count()
    }

    pub(crate) fn sync_layer_order(&mut self) {
        let layers = std::mem::take(&mut self.layers);
        for (layer_index, layer) in layers.iter().enumerate() {
            for (order, &id) in layer.iter().enumerate() {
                let node = self.node_mut(id);
                node.layer = layer_index;
                node.order = order;
            }
        }
        self.layers = layers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_nodes() -> (Graph, NodeId, NodeId, PinId, PinId) {
        let mut g = Graph::new();
        let a = g.add_node(None, NodeKind::Real, Vector2::new(10.0, 10.0), Vector2::ZERO);
        let b = g.add_node(None, NodeKind::Real, Vector2::new(10.0, 10.0), Vector2::ZERO);
        let out = g.add_pin(a, PinDirection::Out, Vector2::new(10.0, 5.0), None);
        let inp = g.add_pin(b, PinDirection::In, Vector2::new(0.0, 5.0), None);
        (g, a, b, out, inp)
    }

    #[test]
    fn edge_is_reachable_from_both_ends() {
        let (mut g, a, b, out, inp) = two_nodes();
        let key = g.add_edge(out, inp).unwrap();
        assert_eq!(g.node(a).out_edges, vec![key]);
        assert_eq!(g.node(b).in_edges, vec![key]);
        assert_eq!(g.lowers(a), vec![b]);
        assert_eq!(g.uppers(b), vec![a]);
    }

    #[test]
    fn duplicate_edges_are_merged() {
        let (mut g, _, _, out, inp) = two_nodes();
        assert!(g.add_edge(out, inp).is_some());
        assert!(g.add_edge(out, inp).is_none());
        assert_eq!(g.edges.len(), 1);
    }

    #[test]
    fn inverted_edge_swaps_layer_sides() {
        let (mut g, a, b, out, inp) = two_nodes();
        let key = g.add_edge(out, inp).unwrap();
        g.edges[&key].inverted = true;
        assert_eq!(g.uppers(a), vec![b]);
        assert_eq!(g.lowers(b), vec![a]);
        assert!(g.lowers(a).is_empty());
    }

    #[test]
    fn moving_a_group_node_moves_its_content() {
        let mut g = Graph::new();
        let group = g.add_node(None, NodeKind::Real, Vector2::new(50.0, 50.0), Vector2::ZERO);
        let mut sub = Graph::new();
        let inner = sub.add_node(None, NodeKind::Real, Vector2::new(5.0, 5.0), Vector2::new(10.0, 10.0));
        g.subgraphs.insert(group, sub);

        g.set_position(group, Vector2::new(100.0, 0.0));
        assert_eq!(g.subgraphs[&group].node(inner).position, Vector2::new(110.0, 10.0));
    }
}
