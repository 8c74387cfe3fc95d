use crate::acyclic::acyclic_order;
use crate::builder::{GraphBuilder, Measure, SnapshotMeasure};
use crate::coordinate_system::rect_from_frame;
use crate::error::LayoutError;
use crate::graph::{Graph, NodeId};
use crate::normalize::insert_routing_nodes;
use crate::order::order;
use crate::placement::place;
use crate::rank::rank;
use crate::types::{
    FrameSettings, GraphSnapshot, LayoutConfig, LayoutRequest, LayoutResult, PinDirection, Rect,
    Vector2,
};
use crate::utils::union_all;
use ahash::AHashMap as HashMap;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// Lays out a snapshot and returns the final rectangle of every snapshot
/// node, in snapshot order, together with the overall bound.
///
/// Geometry is read through `measure`, once per node and pin.
pub fn layout<M: Measure + ?Sized>(
    snapshot: &GraphSnapshot,
    measure: &M,
    config: &LayoutConfig,
) -> Result<LayoutResult, LayoutError> {
    config.validate()?;
    if snapshot.nodes.is_empty() {
        return Ok(LayoutResult::default());
    }

    let total_start = Instant::now();
    let settings = FrameSettings::from_config(config);

    let start = Instant::now();
    let builder = GraphBuilder::new(snapshot, measure, settings.direction)?;
    let mut g = builder.build();
    log::debug!("build graph: {:?}", start.elapsed());

    format_graph(&mut g, &settings);

    let mut frame_rects = HashMap::with_capacity(snapshot.nodes.len());
    collect_rects(&g, &mut frame_rects);
    let rects = snapshot
        .nodes
        .iter()
        .filter_map(|node| {
            frame_rects
                .get(node.id.as_str())
                .map(|&rect| (node.id.clone(), rect_from_frame(rect, settings.direction)))
        })
        .collect();

    log::debug!(
        "layout of {} nodes and {} links: {:?}",
        snapshot.nodes.len(),
        snapshot.links.len(),
        total_start.elapsed()
    );

    Ok(LayoutResult {
        rects,
        bound: rect_from_frame(g.bound, settings.direction),
    })
}

/// [`layout`] with the geometry stored in the snapshot.
pub fn layout_snapshot(
    snapshot: &GraphSnapshot,
    config: &LayoutConfig,
) -> Result<LayoutResult, LayoutError> {
    layout(snapshot, &SnapshotMeasure, config)
}

/// JSON in, JSON out. The input carries `nodes`, `links` and an optional
/// `layout` config object.
pub fn layout_json(input: &str) -> Result<String, LayoutError> {
    let request: LayoutRequest = serde_json::from_str(input)?;
    let snapshot = GraphSnapshot {
        nodes: request.nodes,
        links: request.links,
    };
    let result = layout_snapshot(&snapshot, &request.layout)?;
    Ok(serde_json::to_string(&result)?)
}

/// Formats a graph in place: nested subgraphs first, then the layered
/// pipeline on this level. Components are formatted independently and
/// stacked along the cross axis.
pub(crate) fn format_graph(g: &mut Graph, settings: &FrameSettings) {
    if !g.components.is_empty() {
        g.components
            .par_iter_mut()
            .for_each(|component| format_graph(component, settings));
        stack_components(g, settings.node_spacing);
        return;
    }

    let mut subgraphs: Vec<&mut Graph> = g.subgraphs.values_mut().collect();
    subgraphs
        .par_iter_mut()
        .for_each(|sub| format_graph(sub, settings));
    fit_groups(g, settings.group_border);

    if g.nodes.is_empty() {
        return;
    }

    let start = Instant::now();
    let acyclic = acyclic_order(g);
    log::debug!(
        "acyclic order: {:?} ({} edges reversed)",
        start.elapsed(),
        acyclic.reversed.len()
    );

    let start = Instant::now();
    rank(g, &acyclic);
    log::debug!("rank: {:?} ({} layers)", start.elapsed(), g.layers.len());

    let start = Instant::now();
    let routing = insert_routing_nodes(g);
    log::debug!("routing nodes: {:?} ({} inserted)", start.elapsed(), routing);

    let start = Instant::now();
    let crossings = order(g, settings.max_ordering_iterations);
    log::debug!("order: {:?} ({} crossings)", start.elapsed(), crossings);

    let start = Instant::now();
    place(g, settings);
    log::debug!("placement: {:?}", start.elapsed());
}

// Every component after the first goes below the union of those before it
fn stack_components(g: &mut Graph, spacing: f64) {
    let mut placed: Option<Rect> = None;
    for component in g.components.iter_mut() {
        if let Some(union) = placed {
            let target = Vector2::new(union.left(), union.bottom() + spacing);
            component.offset_by(target - component.bound.origin());
        }
        placed = Some(match placed {
            Some(union) => union.union(&component.bound),
            None => component.bound,
        });
    }
    g.bound = union_all(g.components.iter().map(|component| &component.bound)).unwrap_or_default();
}

// Group nodes take the bound of their formatted subgraph plus the border.
// Mirrored pins follow the inner pins they stand for and the group's own pins
// keep their relative place on the resized node.
fn fit_groups(g: &mut Graph, border: f64) {
    let groups: Vec<NodeId> = g.subgraphs.keys().copied().collect();
    for id in groups {
        let bound = g.subgraphs[&id].bound;
        let position = bound.origin() - Vector2::new(border, border);
        let size = bound.size() + Vector2::new(2.0 * border, 2.0 * border);
        let old_size = {
            let node = g.node_mut(id);
            node.position = position;
            std::mem::replace(&mut node.size, size)
        };

        let pins: Vec<_> = {
            let node = g.node(id);
            node.in_pins.iter().chain(node.out_pins.iter()).copied().collect()
        };
        for pin in pins {
            let current = g.pin(pin);
            let offset = match current.origin {
                Some(ref origin) => match g.subgraphs[&id].origin_pin_position(origin) {
                    Some(absolute) => absolute - position,
                    None => rescale(current.offset, old_size, size),
                },
                None => match current.direction {
                    PinDirection::In => Vector2::new(0.0, size.y / 2.0),
                    PinDirection::Out => Vector2::new(size.x, size.y / 2.0),
                },
            };
            g.pin_mut(pin).offset = offset;
        }
        g.sort_pins_by_offset(id);
    }
}

fn rescale(offset: Vector2, from: Vector2, to: Vector2) -> Vector2 {
    let axis = |o: f64, from: f64, to: f64| {
        if from > 0.0 {
            (o / from * to).clamp(0.0, to)
        } else {
            o.clamp(0.0, to)
        }
    };
    Vector2::new(axis(offset.x, from.x, to.x), axis(offset.y, from.y, to.y))
}

fn collect_rects(g: &Graph, out: &mut HashMap<Arc<str>, Rect>) {
    for node in g.nodes.values() {
        if let Some(ref origin) = node.origin {
            out.insert(origin.clone(), node.rect());
        }
    }
    for sub in g.subgraphs.values() {
        collect_rects(sub, out);
    }
    for component in &g.components {
        collect_rects(component, out);
    }
}
