use crate::graph::{Graph, NodeId, PinId};
use crate::utils::mean;
use ahash::AHashMap as HashMap;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    // Pins facing the previous layer
    Upper,
    // Pins facing the next layer
    Lower,
}

/// Reorders nodes within layers with alternating barycenter sweeps and keeps
/// the ordering with the fewest crossings. Returns that crossing count.
pub fn order(g: &mut Graph, max_iterations: usize) -> usize {
    let mut layers = std::mem::take(&mut g.layers);
    let mut best = layers.clone();
    let mut best_crossings = crossings(g, &layers);

    for sweep in 0..max_iterations {
        if best_crossings == 0 {
            break;
        }

        if sweep % 2 == 0 {
            for index in 1..layers.len() {
                sort_layer(g, &mut layers, index, Side::Upper);
            }
        } else {
            for index in (0..layers.len().saturating_sub(1)).rev() {
                sort_layer(g, &mut layers, index, Side::Lower);
            }
        }

        let current = crossings(g, &layers);
        if current < best_crossings {
            log::trace!(
                "sweep {} lowers crossings {} -> {}",
                sweep,
                best_crossings,
                current
            );
            best = layers.clone();
            best_crossings = current;
        }
    }

    g.layers = best;
    g.sync_layer_order();
    best_crossings
}

// Column of every pin of a layer on the given side. In pins come first on the
// upper side, out pins first on the lower side.
fn columns(g: &Graph, layer: &[NodeId], side: Side) -> HashMap<PinId, usize> {
    let mut columns = HashMap::new();
    let mut next = 0;
    for &id in layer {
        let node = g.node(id);
        let (first, second) = match side {
            Side::Upper => (&node.in_pins, &node.out_pins),
            Side::Lower => (&node.out_pins, &node.in_pins),
        };
        for &pin in first.iter().chain(second.iter()) {
            columns.insert(pin, next);
            next += 1;
        }
    }
    columns
}

// Stable re-sort of one layer by barycenter against its fixed neighbor layer
fn sort_layer(g: &Graph, layers: &mut [Vec<NodeId>], index: usize, toward: Side) {
    let (fixed, fixed_side) = match toward {
        Side::Upper => (index - 1, Side::Lower),
        Side::Lower => (index + 1, Side::Upper),
    };
    let fixed_columns = columns(g, &layers[fixed], fixed_side);

    let mut keyed: Vec<(f64, NodeId)> = layers[index]
        .iter()
        .map(|&id| {
            let barycenter = match toward {
                Side::Upper => mean(
                    g.upper_edges(id)
                        .map(|edge| fixed_columns[&edge.tail()] as f64),
                ),
                Side::Lower => mean(
                    g.lower_edges(id)
                        .map(|edge| fixed_columns[&edge.head()] as f64),
                ),
            };
            (barycenter.unwrap_or(0.0), id)
        })
        .collect();

    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    layers[index] = keyed.into_iter().map(|(_, id)| id).collect();
}

/// Total number of edge crossings between all adjacent layer pairs.
pub fn crossings(g: &Graph, layers: &[Vec<NodeId>]) -> usize {
    (1..layers.len())
        .into_par_iter()
        .map(|index| bilayer_crossings(g, &layers[index - 1], &layers[index]))
        .sum()
}

fn bilayer_crossings(g: &Graph, upper: &[NodeId], lower: &[NodeId]) -> usize {
    let upper_columns = columns(g, upper, Side::Lower);
    let lower_columns = columns(g, lower, Side::Upper);

    let mut entries: Vec<(usize, usize)> = upper
        .iter()
        .flat_map(|&id| g.lower_edges(id))
        .map(|edge| (upper_columns[&edge.tail()], lower_columns[&edge.head()]))
        .collect();
    if entries.len() < 2 {
        return 0;
    }
    entries.sort_unstable();

    // Build the accumulator tree
    let mut first_index = 1usize;
    while first_index < lower_columns.len() {
        first_index <<= 1;
    }
    let tree_size = 2 * first_index - 1;
    first_index -= 1;
    let mut tree = vec![0usize; tree_size];

    // Each entry crosses the earlier entries that landed further right
    let mut count = 0;
    for (_, to) in entries {
        let mut index = to + first_index;
        tree[index] += 1;
        while index > 0 {
            if index % 2 == 1 {
                count += tree[index + 1];
            }
            index = (index - 1) >> 1;
            tree[index] += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acyclic::acyclic_order;
    use crate::graph::NodeKind;
    use crate::normalize::insert_routing_nodes;
    use crate::rank::rank;
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
        insert_routing_nodes(&mut g);
        (g, ids)
    }

    fn brute_force(g: &Graph, upper: &[NodeId], lower: &[NodeId]) -> usize {
        let upper_columns = columns(g, upper, Side::Lower);
        let lower_columns = columns(g, lower, Side::Upper);
        let entries: Vec<(usize, usize)> = upper
            .iter()
            .flat_map(|&id| g.lower_edges(id))
            .map(|edge| (upper_columns[&edge.tail()], lower_columns[&edge.head()]))
            .collect();
        let mut count = 0;
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let (f1, t1) = entries[i];
                let (f2, t2) = entries[j];
                if (f1 < f2 && t1 > t2) || (f1 > f2 && t1 < t2) {
                    count += 1;
                }
            }
        }
        count
    }

    const TANGLED: &[(usize, usize)] = &[
        (0, 5),
        (0, 3),
        (1, 4),
        (2, 3),
        (2, 6),
        (1, 7),
        (3, 8),
        (4, 9),
        (5, 8),
        (6, 9),
        (7, 8),
        (0, 9),
    ];

    #[test]
    fn counts_a_single_crossing() {
        let (g, _) = layered(4, &[(0, 3), (1, 2)]);
        assert_eq!(g.layers.len(), 2);
        assert_eq!(crossings(&g, &g.layers), 1);
    }

    #[test]
    fn shared_source_pin_does_not_cross() {
        let (g, _) = layered(3, &[(0, 1), (0, 2)]);
        assert_eq!(crossings(&g, &g.layers), 0);
    }

    #[test]
    fn tree_count_matches_pairwise_definition() {
        let (g, _) = layered(10, TANGLED);
        for index in 1..g.layers.len() {
            let upper = &g.layers[index - 1];
            let lower = &g.layers[index];
            assert_eq!(
                bilayer_crossings(&g, upper, lower),
                brute_force(&g, upper, lower)
            );
        }
    }

    #[test]
    fn one_sweep_untangles_a_swap() {
        let (mut g, ids) = layered(4, &[(0, 3), (1, 2)]);
        assert_eq!(order(&mut g, 1), 0);
        assert_eq!(g.layers[1], vec![ids[3], ids[2]]);
        assert_eq!(g.node(ids[3]).order, 0);
    }

    #[test]
    fn adopted_crossings_never_increase_with_more_sweeps() {
        let mut previous = usize::MAX;
        for cap in 0..8 {
            let (mut g, _) = layered(10, TANGLED);
            let adopted = order(&mut g, cap);
            assert_eq!(adopted, crossings(&g, &g.layers));
            assert!(adopted <= previous);
            previous = adopted;
        }
    }

    #[test]
    fn ordering_keeps_every_node() {
        let (mut g, _) = layered(10, TANGLED);
        let before = g.nodes.len();
        order(&mut g, 4);
        let placed: usize = g.layers.iter().map(Vec::len).sum();
        assert_eq!(placed, before);
    }
}
