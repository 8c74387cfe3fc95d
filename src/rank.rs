use crate::acyclic::AcyclicOrder;
use crate::graph::{EdgeKey, Graph, NodeId};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};

/*
 * Assigns every node to a layer:
 *
 * 1. Edges running against the acyclic order are flagged as inverted, so
 *    that following upper/lower edges never cycles.
 * 2. Longest-path ranks are computed from the sinks (rank 1) upwards.
 * 3. Layers are filled from the highest rank down. A node enters the
 *    current layer once all of its upper neighbors sit in earlier layers,
 *    either because its rank is reached or because one of its uppers was
 *    already placed.
 */
pub fn rank(g: &mut Graph, acyclic: &AcyclicOrder) {
    mark_inverted_edges(g, acyclic);
    let ranks = longest_path(g, acyclic);
    g.layers = build_layers(g, &ranks);
    g.sync_layer_order();
}

fn mark_inverted_edges(g: &mut Graph, acyclic: &AcyclicOrder) {
    let flags: Vec<(EdgeKey, bool)> = g
        .edges
        .values()
        .map(|edge| {
            let source = acyclic.position(g.owner(edge.source));
            let target = acyclic.position(g.owner(edge.target));
            (edge.key(), source > target)
        })
        .collect();

    let mut inverted = 0;
    for (key, flag) in flags {
        g.edges[&key].inverted = flag;
        inverted += flag as usize;
    }
    if inverted > 0 {
        log::trace!("{} edges run against the layering direction", inverted);
    }
}

pub(crate) fn longest_path(g: &Graph, acyclic: &AcyclicOrder) -> HashMap<NodeId, usize> {
    let mut ranks: HashMap<NodeId, usize> = HashMap::with_capacity(acyclic.order.len());
    for &id in acyclic.order.iter().rev() {
        // Lower neighbors come later in the acyclic order and are ranked already
        let rank = g
            .lowers(id)
            .iter()
            .map(|lower| ranks[lower])
            .max()
            .map_or(1, |deepest| deepest + 1);
        ranks.insert(id, rank);
    }
    ranks
}

fn build_layers(g: &Graph, ranks: &HashMap<NodeId, usize>) -> Vec<Vec<NodeId>> {
    let max_rank = ranks.values().copied().max().unwrap_or(0);
    let uppers: HashMap<NodeId, Vec<NodeId>> =
        g.nodes.keys().map(|&id| (id, g.uppers(id))).collect();

    let mut placed: HashSet<NodeId> = HashSet::with_capacity(g.nodes.len());
    let mut layers = Vec::with_capacity(max_rank);

    for current in (1..=max_rank).rev() {
        let layer: Vec<NodeId> = g
            .nodes
            .keys()
            .copied()
            .filter(|id| !placed.contains(id))
            .filter(|id| {
                let ups = &uppers[id];
                let candidate = ranks[id] >= current || ups.iter().any(|u| placed.contains(u));
                candidate && ups.iter().all(|u| placed.contains(u))
            })
            .collect();

        if layer.is_empty() {
            continue;
        }
        placed.extend(layer.iter().copied());
        layers.push(layer);
    }

    debug_assert_eq!(placed.len(), g.nodes.len());
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acyclic::acyclic_order;
    use crate::graph::NodeKind;
    use crate::types::{PinDirection, Vector2};

    fn layered(count: usize, edges: &[(usize, usize)]) -> (Graph, Vec<NodeId>) {
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

    #[test]
    fn diamond_layers() {
        let (g, ids) = layered(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert_eq!(g.layers.len(), 3);
        assert_eq!(g.node(ids[0]).layer, 0);
        assert_eq!(g.node(ids[1]).layer, 1);
        assert_eq!(g.node(ids[2]).layer, 1);
        assert_eq!(g.node(ids[3]).layer, 2);
    }

    #[test]
    fn longest_path_counts_from_sinks() {
        let (g, ids) = layered(4, &[(0, 1), (1, 2), (0, 3)]);
        let acyclic = acyclic_order(&g);
        let ranks = longest_path(&g, &acyclic);
        assert_eq!(ranks[&ids[0]], 3);
        assert_eq!(ranks[&ids[1]], 2);
        assert_eq!(ranks[&ids[2]], 1);
        assert_eq!(ranks[&ids[3]], 1);
    }

    #[test]
    fn successors_are_pulled_next_to_their_source() {
        // 3 has rank 1 but follows 0 directly
        let (g, ids) = layered(4, &[(0, 1), (1, 2), (0, 3)]);
        assert_eq!(g.node(ids[3]).layer, 1);
        assert_eq!(g.node(ids[2]).layer, 2);
    }

    #[test]
    fn late_sources_hug_their_targets() {
        // 3 only feeds 2, which sits two layers below 0
        let (g, ids) = layered(4, &[(0, 1), (1, 2), (3, 2)]);
        assert_eq!(g.node(ids[0]).layer, 0);
        assert_eq!(g.node(ids[3]).layer, 1);
    }

    #[test]
    fn two_cycle_gets_finite_layers() {
        let (g, ids) = layered(2, &[(0, 1), (1, 0)]);
        assert_eq!(g.layers.len(), 2);
        assert_ne!(g.node(ids[0]).layer, g.node(ids[1]).layer);
        assert_eq!(g.edges.values().filter(|e| e.inverted).count(), 1);
    }

    #[test]
    fn every_edge_points_to_a_later_layer() {
        let (g, _) = layered(5, &[(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 1)]);
        for edge in g.edges.values() {
            let upper = g.node(g.owner(edge.tail())).layer;
            let lower = g.node(g.owner(edge.head())).layer;
            assert!(upper < lower);
        }
    }
}
