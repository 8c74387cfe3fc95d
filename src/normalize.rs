use crate::graph::{EdgeKey, Graph, NodeId, NodeKind, PinId};
use crate::types::{PinDirection, Vector2};

/// Splits every edge spanning more than one layer into a chain of routing
/// nodes, one per intermediate layer. Returns the number of routing nodes
/// inserted.
///
/// Chain segments keep the inversion flag of the edge they replace, so
/// each segment still joins an out pin to an in pin.
pub fn insert_routing_nodes(g: &mut Graph) -> usize {
    let long_edges: Vec<EdgeKey> = g
        .edges
        .values()
        .filter(|edge| span(g, edge.tail(), edge.head()) > 1)
        .map(|edge| edge.key())
        .collect();

    let mut inserted = 0;
    for key in long_edges {
        let Some(edge) = g.remove_edge(&key) else {
            continue;
        };
        let upper_layer = g.node(g.owner(edge.tail())).layer;
        let lower_layer = g.node(g.owner(edge.head())).layer;

        // Walk from the upper end to the lower end
        let mut previous = edge.tail();
        for layer in (upper_layer + 1)..lower_layer {
            let (node, input, output) = add_routing_node(g, layer);
            let entry = if edge.inverted { output } else { input };
            connect(g, previous, entry, edge.inverted);
            previous = if edge.inverted { input } else { output };
            log::trace!("routing node {:?} on layer {}", node, layer);
            inserted += 1;
        }
        connect(g, previous, edge.head(), edge.inverted);
    }
    inserted
}

fn span(g: &Graph, tail: PinId, head: PinId) -> usize {
    let upper = g.node(g.owner(tail)).layer;
    let lower = g.node(g.owner(head)).layer;
    lower.saturating_sub(upper)
}

fn add_routing_node(g: &mut Graph, layer: usize) -> (NodeId, PinId, PinId) {
    let id = g.add_node(None, NodeKind::Routing, Vector2::ZERO, Vector2::ZERO);
    let input = g.add_pin(id, PinDirection::In, Vector2::ZERO, None);
    let output = g.add_pin(id, PinDirection::Out, Vector2::ZERO, None);
    let order = g.layers[layer].len();
    let node = g.node_mut(id);
    node.layer = layer;
    node.order = order;
    g.layers[layer].push(id);
    (id, input, output)
}

// Joins an upper pin to a lower pin; for inverted chains the lower pin is the source
fn connect(g: &mut Graph, upper: PinId, lower: PinId, inverted: bool) {
    if inverted {
        g.add_edge_with(lower, upper, true);
    } else {
        g.add_edge_with(upper, lower, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acyclic::acyclic_order;
    use crate::rank::rank;

    fn chain_graph(edges: &[(usize, usize)], count: usize) -> (Graph, Vec<NodeId>) {
        let mut g = Graph::new();
        let mut ids = Vec::new();
        let mut pins = Vec::new();
        for _ in 0..count {
            let id = g.add_node(None, NodeKind::Real, Vector2::new(10.0, 10.0), Vector2::ZERO);
            let input = g.add_pin(id, PinDirection::In, Vector2::ZERO, None);
            let output = g.add_pin(id, PinDirection::Out, Vector2::ZERO, None);
            ids.push(id);
            pins.push((input, output));
        }
        for &(from, to) in edges {
            g.add_edge(pins[from].1, pins[to].0);
        }
        let acyclic = acyclic_order(&g);
        rank(&mut g, &acyclic);
        (g, ids)
    }

    fn assert_unit_spans(g: &Graph) {
        for edge in g.edges.values() {
            assert_eq!(span(g, edge.tail(), edge.head()), 1);
        }
    }

    #[test]
    fn diamond_needs_no_routing() {
        let (mut g, _) = chain_graph(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        assert_eq!(insert_routing_nodes(&mut g), 0);
        assert_eq!(g.edges.len(), 4);
    }

    #[test]
    fn long_edge_becomes_chain() {
        let (mut g, _) = chain_graph(&[(0, 1), (1, 2), (2, 3), (0, 3)], 4);
        assert_eq!(insert_routing_nodes(&mut g), 2);
        assert_eq!(g.routing_node_count(), 2);
        assert_eq!(g.edges.len(), 6);
        assert_unit_spans(&g);
        for layer in &g.layers[1..3] {
            assert_eq!(layer.len(), 2);
        }
    }

    #[test]
    fn inverted_long_edge_keeps_pin_directions() {
        let (mut g, _) = chain_graph(&[(0, 1), (1, 2), (2, 3), (3, 0)], 4);
        let inserted = insert_routing_nodes(&mut g);
        assert_eq!(inserted, 2);
        assert_unit_spans(&g);
        for edge in g.edges.values() {
            assert_eq!(g.pin(edge.source).direction, PinDirection::Out);
            assert_eq!(g.pin(edge.target).direction, PinDirection::In);
        }
        assert_eq!(g.edges.values().filter(|e| e.inverted).count(), 3);
    }
}
