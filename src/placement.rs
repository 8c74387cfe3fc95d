use crate::graph::{Graph, NodeId, PinId};
use crate::position::{assign_cross_coordinates, CombinePolicy};
use crate::types::{FrameSettings, PositioningPolicy, Vector2};
use crate::utils::mean;
use ahash::AHashMap as HashMap;
use std::cmp::Reverse;

/// Final placement of a layered, ordered graph. The layering coordinate
/// comes from per-layer bands, the cross coordinate from the configured
/// positioning policy. The whole graph is then translated so that the first
/// node of the first layer keeps its pre-layout position.
pub fn place(g: &mut Graph, settings: &FrameSettings) {
    let Some(anchor) = g.layers.first().and_then(|layer| layer.first()).copied() else {
        return;
    };
    let anchor_before = g.node(anchor).position;

    let layer_x = layer_bands(g, settings.layer_spacing);
    let spacing = settings.node_spacing;
    let cross = match settings.positioning {
        PositioningPolicy::EvenlySpaced => evenly_spaced(g, spacing),
        PositioningPolicy::Priority => priority(g, spacing),
        PositioningPolicy::BrandesKopfTop => assign_cross_coordinates(g, spacing, CombinePolicy::Top),
        PositioningPolicy::BrandesKopfMedian => {
            assign_cross_coordinates(g, spacing, CombinePolicy::Median)
        }
    };

    let ids: Vec<NodeId> = g.nodes.keys().copied().collect();
    for id in ids {
        g.set_position(id, Vector2::new(layer_x[&id], cross[&id]));
    }

    let delta = anchor_before - g.node(anchor).position;
    g.offset_by(delta);
    g.bound = g.real_bound();
}

// Every layer is a band as wide as its widest node. Nodes without upper
// neighbors hug the far edge of their band, the rest the near edge.
fn layer_bands(g: &Graph, spacing: f64) -> HashMap<NodeId, f64> {
    let mut result = HashMap::with_capacity(g.nodes.len());
    let mut near = 0.0;
    for layer in &g.layers {
        let width = layer
            .iter()
            .map(|&id| g.node(id).size.x)
            .fold(0.0f64, f64::max);
        for &id in layer {
            let x = if g.upper_edges(id).next().is_none() {
                near + width - g.node(id).size.x
            } else {
                near
            };
            result.insert(id, x);
        }
        near += width + spacing;
    }
    result
}

// Layers stacked with fixed spacing, each centered on the tallest one
fn evenly_spaced(g: &Graph, spacing: f64) -> HashMap<NodeId, f64> {
    let totals: Vec<f64> = g
        .layers
        .iter()
        .map(|layer| {
            let sizes: f64 = layer.iter().map(|&id| g.node(id).size.y).sum();
            sizes + spacing * layer.len().saturating_sub(1) as f64
        })
        .collect();
    let tallest = totals.iter().copied().fold(0.0f64, f64::max);

    let mut result = HashMap::with_capacity(g.nodes.len());
    for (layer, total) in g.layers.iter().zip(totals) {
        let mut y = (tallest - total) / 2.0;
        for &id in layer {
            result.insert(id, y);
            y += g.node(id).size.y + spacing;
        }
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fixed {
    Above,
    Below,
}

/*
 * Priority method: starting from the evenly spaced layout, sweep down, up
 * and down again. In each layer, nodes are visited by decreasing priority
 * (routing nodes first, then by number of connections to the fixed layer)
 * and moved towards the mean position of their connected pins. A move may
 * push lower priority nodes aside but never a node visited before it.
 */
fn priority(g: &Graph, spacing: f64) -> HashMap<NodeId, f64> {
    let mut coords = evenly_spaced(g, spacing);
    let count = g.layers.len();
    for fixed in [Fixed::Above, Fixed::Below, Fixed::Above] {
        match fixed {
            Fixed::Above => {
                for index in 1..count {
                    improve_layer(g, &mut coords, index, fixed, spacing);
                }
            }
            Fixed::Below => {
                for index in (0..count.saturating_sub(1)).rev() {
                    improve_layer(g, &mut coords, index, fixed, spacing);
                }
            }
        }
    }
    coords
}

// (own pin, pin on the fixed layer)
fn connections(g: &Graph, id: NodeId, fixed: Fixed) -> Vec<(PinId, PinId)> {
    match fixed {
        Fixed::Above => g
            .upper_edges(id)
            .map(|edge| (edge.head(), edge.tail()))
            .collect(),
        Fixed::Below => g
            .lower_edges(id)
            .map(|edge| (edge.tail(), edge.head()))
            .collect(),
    }
}

fn improve_layer(
    g: &Graph,
    coords: &mut HashMap<NodeId, f64>,
    index: usize,
    fixed: Fixed,
    spacing: f64,
) {
    let layer = &g.layers[index];
    let mut ys: Vec<f64> = layer.iter().map(|id| coords[id]).collect();
    let sizes: Vec<f64> = layer.iter().map(|&id| g.node(id).size.y).collect();

    let mut desired = Vec::with_capacity(layer.len());
    let mut priorities = Vec::with_capacity(layer.len());
    for &id in layer {
        let links = connections(g, id, fixed);
        desired.push(mean(links.iter().map(|&(own, theirs)| {
            coords[&g.owner(theirs)] + g.pin(theirs).offset.y - g.pin(own).offset.y
        })));
        priorities.push(if g.node(id).is_routing() {
            usize::MAX
        } else {
            links.len()
        });
    }

    let mut visit: Vec<usize> = (0..layer.len()).collect();
    visit.sort_by_key(|&i| Reverse(priorities[i]));

    let mut locked = vec![false; layer.len()];
    for i in visit {
        if let Some(target) = desired[i] {
            move_towards(&mut ys, &sizes, &locked, i, target, spacing);
        }
        locked[i] = true;
    }

    for (&id, y) in layer.iter().zip(ys) {
        coords.insert(id, y);
    }
}

// Moves node `i` as close to `target` as the locked nodes allow, pushing
// unlocked nodes on the way
fn move_towards(ys: &mut [f64], sizes: &[f64], locked: &[bool], i: usize, target: f64, spacing: f64) {
    if target < ys[i] {
        let mut room = 0.0;
        let mut bound = f64::NEG_INFINITY;
        for j in (0..i).rev() {
            room += sizes[j] + spacing;
            if locked[j] {
                bound = ys[j] + room;
                break;
            }
        }
        ys[i] = target.max(bound);
        for j in (0..i).rev() {
            let limit = ys[j + 1] - spacing - sizes[j];
            if ys[j] <= limit {
                break;
            }
            ys[j] = limit;
        }
    } else if target > ys[i] {
        let mut room = sizes[i] + spacing;
        let mut bound = f64::INFINITY;
        for j in (i + 1)..ys.len() {
            if locked[j] {
                bound = ys[j] - room;
                break;
            }
            room += sizes[j] + spacing;
        }
        ys[i] = target.min(bound);
        for j in (i + 1)..ys.len() {
            let limit = ys[j - 1] + sizes[j - 1] + spacing;
            if ys[j] >= limit {
                break;
            }
            ys[j] = limit;
        }
    }
}
