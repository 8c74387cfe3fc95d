use crate::graph::{Graph, NodeId, PinId};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use rayon::prelude::*;

/// How the four directional results are merged into one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinePolicy {
    // Average of the two middle values
    Top,
    // Average of the extremes
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vertical {
    TopDown,
    BottomUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Horizontal {
    Left,
    Right,
}

const SWEEPS: [(Vertical, Horizontal); 4] = [
    (Vertical::TopDown, Horizontal::Left),
    (Vertical::TopDown, Horizontal::Right),
    (Vertical::BottomUp, Horizontal::Left),
    (Vertical::BottomUp, Horizontal::Right),
];

// Normalized (smaller id, larger id) pairs excluded from alignment
type Conflicts = HashSet<(NodeId, NodeId)>;

fn add_conflict(conflicts: &mut Conflicts, a: NodeId, b: NodeId) {
    conflicts.insert(if a <= b { (a, b) } else { (b, a) });
}

fn has_conflict(conflicts: &Conflicts, a: NodeId, b: NodeId) -> bool {
    conflicts.contains(&if a <= b { (a, b) } else { (b, a) })
}

/// Cross-axis coordinate (top edge) of every node of a layered, ordered
/// graph, such that nodes of one layer keep their order and are at least
/// `spacing` apart.
pub fn assign_cross_coordinates(
    g: &Graph,
    spacing: f64,
    policy: CombinePolicy,
) -> HashMap<NodeId, f64> {
    if g.layers.is_empty() {
        return HashMap::new();
    }

    let step = std::time::Instant::now();
    let conflicts = mark_type1_conflicts(g);
    log::trace!(
        "type-1 conflicts: {} in {:?}",
        conflicts.len(),
        step.elapsed()
    );

    // Each sweep owns fresh state; only the graph and conflicts are shared
    let results: Vec<HashMap<NodeId, f64>> = SWEEPS
        .par_iter()
        .map(|&(vertical, horizontal)| {
            Sweep::new(g, vertical, horizontal, &conflicts, spacing).run()
        })
        .collect();

    combine(g, &results, policy)
}

// A non-routing edge crossing an inner segment (routing node to routing
// node) conflicts with it; the real edge loses alignment priority.
fn mark_type1_conflicts(g: &Graph) -> Conflicts {
    let per_layer: Vec<Conflicts> = (1..g.layers.len())
        .into_par_iter()
        .map(|k| {
            let mut local = Conflicts::default();
            let previous = &g.layers[k - 1];
            let layer = &g.layers[k];
            let last = layer.len().saturating_sub(1);
            let mut k0 = 0;
            let mut scan_pos = 0;

            for (i, &v) in layer.iter().enumerate() {
                let inner_upper = if g.node(v).is_routing() {
                    g.uppers(v).into_iter().find(|&u| g.node(u).is_routing())
                } else {
                    None
                };

                if inner_upper.is_some() || i == last {
                    let k1 = inner_upper.map_or(previous.len(), |w| g.node(w).order);
                    for &scan in &layer[scan_pos..=i] {
                        let scan_routing = g.node(scan).is_routing();
                        for u in g.uppers(scan) {
                            let upper = g.node(u);
                            if (upper.order < k0 || k1 < upper.order)
                                && !(upper.is_routing() && scan_routing)
                            {
                                add_conflict(&mut local, u, scan);
                            }
                        }
                    }
                    scan_pos = i + 1;
                    k0 = k1;
                }
            }
            local
        })
        .collect();

    let mut conflicts = Conflicts::default();
    for local in per_layer {
        conflicts.extend(local);
    }
    conflicts
}

// Left-most neighbor of a block placed relative to a block of another class
struct ClassConstraint {
    left_root: NodeId,
    right_root: NodeId,
    gap: f64,
}

/*
 * One directional pass. Every pass is computed in a canonical frame where
 * alignment runs from the first layer onwards and compaction pushes towards
 * smaller coordinates:
 *
 * - bottom-up passes walk the layers in reverse and align to lower neighbors
 * - right-biased passes reverse each layer and mirror pin offsets inside
 *   their node; results are mirrored back at the end
 */
struct Sweep<'a> {
    g: &'a Graph,
    vertical: Vertical,
    horizontal: Horizontal,
    conflicts: &'a Conflicts,
    spacing: f64,
    layers: Vec<Vec<NodeId>>,
    pos: HashMap<NodeId, usize>,
    left: HashMap<NodeId, NodeId>,
    root: HashMap<NodeId, NodeId>,
    align: HashMap<NodeId, NodeId>,
    // (own pin, neighbor pin) of the link each aligned node was aligned on
    chosen: HashMap<NodeId, (PinId, PinId)>,
    inner: HashMap<NodeId, f64>,
    sink: HashMap<NodeId, NodeId>,
    x: HashMap<NodeId, f64>,
    constraints: Vec<ClassConstraint>,
}

impl<'a> Sweep<'a> {
    fn new(
        g: &'a Graph,
        vertical: Vertical,
        horizontal: Horizontal,
        conflicts: &'a Conflicts,
        spacing: f64,
    ) -> Self {
        let mut layers: Vec<Vec<NodeId>> = match vertical {
            Vertical::TopDown => g.layers.clone(),
            Vertical::BottomUp => g.layers.iter().rev().cloned().collect(),
        };
        if horizontal == Horizontal::Right {
            for layer in layers.iter_mut() {
                layer.reverse();
            }
        }

        let count = g.nodes.len();
        let mut pos = HashMap::with_capacity(count);
        let mut left = HashMap::with_capacity(count);
        for layer in &layers {
            for (index, &v) in layer.iter().enumerate() {
                pos.insert(v, index);
                if index > 0 {
                    left.insert(v, layer[index - 1]);
                }
            }
        }

        Sweep {
            g,
            vertical,
            horizontal,
            conflicts,
            spacing,
            layers,
            pos,
            left,
            root: HashMap::with_capacity(count),
            align: HashMap::with_capacity(count),
            chosen: HashMap::with_capacity(count),
            inner: HashMap::with_capacity(count),
            sink: HashMap::with_capacity(count),
            x: HashMap::with_capacity(count),
            constraints: Vec::new(),
        }
    }

    fn run(mut self) -> HashMap<NodeId, f64> {
        self.vertical_alignment();
        self.inner_shift();
        self.place_blocks();
        self.horizontal_compaction()
    }

    #[inline]
    fn extent(&self, v: NodeId) -> f64 {
        self.g.node(v).size.y
    }

    // Pin offset along the cross axis, mirrored for right-biased passes
    fn offset(&self, pin: PinId) -> f64 {
        let pin = self.g.pin(pin);
        match self.horizontal {
            Horizontal::Left => pin.offset.y,
            Horizontal::Right => self.extent(pin.owner) - pin.offset.y,
        }
    }

    // Connections to the previously processed layer as
    // (neighbor, own pin, neighbor pin), in neighbor order
    fn neighbors(&self, v: NodeId) -> Vec<(NodeId, PinId, PinId)> {
        let mut result: Vec<(NodeId, PinId, PinId)> = match self.vertical {
            Vertical::TopDown => self
                .g
                .upper_edges(v)
                .map(|edge| (self.g.owner(edge.tail()), edge.head(), edge.tail()))
                .collect(),
            Vertical::BottomUp => self
                .g
                .lower_edges(v)
                .map(|edge| (self.g.owner(edge.head()), edge.tail(), edge.head()))
                .collect(),
        };
        result.sort_by(|a, b| {
            self.pos[&a.0]
                .cmp(&self.pos[&b.0])
                .then_with(|| self.offset(a.2).total_cmp(&self.offset(b.2)))
        });
        result
    }

    fn vertical_alignment(&mut self) {
        let layers = std::mem::take(&mut self.layers);
        for &v in layers.iter().flatten() {
            self.root.insert(v, v);
            self.align.insert(v, v);
        }

        for layer in &layers {
            let mut guide: Option<usize> = None;
            for &v in layer {
                let neighbors = self.neighbors(v);
                if neighbors.is_empty() {
                    continue;
                }
                let d = neighbors.len();
                let medians = if d % 2 == 1 {
                    vec![(d - 1) / 2]
                } else {
                    vec![d / 2 - 1, d / 2]
                };

                for m in medians {
                    if self.align[&v] != v {
                        break;
                    }
                    let (u, own, theirs) = neighbors[m];
                    let u_pos = self.pos[&u];
                    let unaligned_below = self.align[&u] == self.root[&u];
                    if unaligned_below
                        && guide.is_none_or(|g| g < u_pos)
                        && !has_conflict(self.conflicts, u, v)
                    {
                        let block_root = self.root[&u];
                        self.align.insert(u, v);
                        self.root.insert(v, block_root);
                        self.align.insert(v, block_root);
                        self.chosen.insert(v, (own, theirs));
                        guide = Some(u_pos);
                    }
                }
            }
        }
        self.layers = layers;
    }

    fn block(&self, root: NodeId) -> Vec<NodeId> {
        let mut members = vec![root];
        let mut current = self.align[&root];
        while current != root {
            members.push(current);
            current = self.align[&current];
        }
        members
    }

    fn roots(&self) -> Vec<NodeId> {
        self.layers
            .iter()
            .flatten()
            .copied()
            .filter(|v| self.root[v] == *v)
            .collect()
    }

    // Offsets of block members relative to their root such that the pins
    // joining consecutive members line up, normalized to a minimum of zero
    fn inner_shift(&mut self) {
        let mut widest = 0.0f64;
        for root in self.roots() {
            let members = self.block(root);
            self.inner.insert(root, 0.0);
            for pair in members.windows(2) {
                let (upper, lower) = (pair[0], pair[1]);
                let base = self.inner[&upper];
                let shift = self.chosen.get(&lower).map_or(base, |&(own, theirs)| {
                    base + self.offset(theirs) - self.offset(own)
                });
                self.inner.insert(lower, shift);
            }

            let min = members
                .iter()
                .map(|m| self.inner[m])
                .fold(f64::INFINITY, f64::min);
            let mut extent = 0.0f64;
            for m in &members {
                let normalized = self.inner[m] - min;
                self.inner.insert(*m, normalized);
                extent = extent.max(normalized + self.extent(*m));
            }
            widest = widest.max(extent);
        }
        log::trace!(
            "{:?}/{:?}: widest block {:.1}",
            self.vertical,
            self.horizontal,
            widest
        );
    }

    fn horizontal_compaction(self) -> HashMap<NodeId, f64> {
        let shifts = self.class_shifts();

        let mut coords: HashMap<NodeId, f64> = HashMap::with_capacity(self.pos.len());
        for layer in &self.layers {
            for &v in layer {
                let root = self.root[&v];
                let class = self.sink[&root];
                let shift = shifts.get(&class).copied().unwrap_or(0.0);
                coords.insert(v, self.x[&root] + shift + self.inner[&v]);
            }
        }

        // Alignment may leave blocks of different classes too close
        for layer in &self.layers {
            for pair in layer.windows(2) {
                let (u, v) = (pair[0], pair[1]);
                let min = coords[&u] + self.extent(u) + self.spacing;
                if coords[&v] < min {
                    coords.insert(v, min);
                }
            }
        }

        if self.horizontal == Horizontal::Right {
            for (v, y) in coords.iter_mut() {
                *y = -(*y + self.g.node(*v).size.y);
            }
        }
        coords
    }

    // Root coordinates relative to the sink of each class
    fn place_blocks(&mut self) {
        for &root in self.root.values() {
            self.sink.insert(root, root);
        }
        for root in self.roots() {
            if !self.x.contains_key(&root) {
                self.place_block(root);
            }
        }
    }

    // Depth-first placement of a block and, before it, every block to its
    // left. Iterative to keep deep graphs off the call stack.
    fn place_block(&mut self, start: NodeId) {
        #[derive(Clone, Copy)]
        struct Frame {
            root: NodeId,
            member: NodeId,
            initial: bool,
        }

        self.x.insert(start, 0.0);
        let mut stack = vec![Frame {
            root: start,
            member: start,
            initial: true,
        }];

        while let Some(&Frame {
            root: v,
            member: w,
            mut initial,
        }) = stack.last()
        {
            if let Some(&u) = self.left.get(&w) {
                let u_root = self.root[&u];
                if !self.x.contains_key(&u_root) {
                    self.x.insert(u_root, 0.0);
                    stack.push(Frame {
                        root: u_root,
                        member: u_root,
                        initial: true,
                    });
                    continue;
                }

                // Minimum distance between the two roots
                let gap = self.inner[&u] + self.extent(u) + self.spacing - self.inner[&w];
                if self.sink[&v] == v {
                    let class = self.sink[&u_root];
                    self.sink.insert(v, class);
                }
                if self.sink[&v] != self.sink[&u_root] {
                    self.constraints.push(ClassConstraint {
                        left_root: u_root,
                        right_root: v,
                        gap,
                    });
                } else {
                    let candidate = self.x[&u_root] + gap;
                    let x = self.x.entry(v).or_insert(0.0);
                    *x = if initial { candidate } else { x.max(candidate) };
                    initial = false;
                }
            }

            let next = self.align[&w];
            stack.pop();
            if next != v {
                stack.push(Frame {
                    root: v,
                    member: next,
                    initial,
                });
            }
        }
    }

    // shift(C) = min over constraints (C left of D) of shift(D) + slack,
    // zero for classes nothing constrains
    fn class_shifts(&self) -> HashMap<NodeId, f64> {
        let mut edges: HashMap<NodeId, Vec<(NodeId, f64)>> = HashMap::new();
        for c in &self.constraints {
            let left_class = self.sink[&c.left_root];
            let right_class = self.sink[&c.right_root];
            let slack = self.x[&c.right_root] - self.x[&c.left_root] - c.gap;
            edges.entry(left_class).or_default().push((right_class, slack));
        }

        let mut shifts: HashMap<NodeId, f64> = HashMap::with_capacity(edges.len());
        let mut visiting: HashSet<NodeId> = HashSet::new();
        let mut classes: Vec<NodeId> = edges.keys().copied().collect();
        classes.sort_unstable();

        for start in classes {
            let mut stack = vec![(start, false)];
            while let Some((class, expanded)) = stack.pop() {
                if expanded {
                    let shift = edges
                        .get(&class)
                        .into_iter()
                        .flatten()
                        .filter_map(|(right, slack)| shifts.get(right).map(|s| s + slack))
                        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
                        .unwrap_or(0.0);
                    shifts.insert(class, shift);
                    continue;
                }
                if shifts.contains_key(&class) || !visiting.insert(class) {
                    continue;
                }
                stack.push((class, true));
                for (right, _) in edges.get(&class).into_iter().flatten() {
                    if shifts.contains_key(right) {
                        continue;
                    }
                    if visiting.contains(right) {
                        log::warn!("cyclic class constraints at {:?}", right);
                        continue;
                    }
                    stack.push((*right, false));
                }
            }
        }
        shifts
    }
}

fn combine(
    g: &Graph,
    results: &[HashMap<NodeId, f64>],
    policy: CombinePolicy,
) -> HashMap<NodeId, f64> {
    let spans: Vec<(f64, f64)> = results
        .iter()
        .map(|coords| {
            coords.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(min, max), (v, &y)| (min.min(y), max.max(y + g.node(*v).size.y)),
            )
        })
        .collect();

    let mut narrowest = 0;
    for (index, &(min, max)) in spans.iter().enumerate() {
        let (best_min, best_max) = spans[narrowest];
        if max - min < best_max - best_min {
            narrowest = index;
        }
    }
    let (target_min, target_max) = spans[narrowest];

    let deltas: Vec<f64> = SWEEPS
        .iter()
        .zip(spans.iter())
        .map(|(&(_, horizontal), &(min, max))| match horizontal {
            Horizontal::Left => target_min - min,
            Horizontal::Right => target_max - max,
        })
        .collect();

    results[0]
        .keys()
        .map(|&v| {
            let mut values = [0.0; 4];
            for (slot, (coords, delta)) in values.iter_mut().zip(results.iter().zip(&deltas)) {
                *slot = coords[&v] + delta;
            }
            (v, combine_values(values, policy))
        })
        .collect()
}

/// Merges the four directional coordinates of one node.
pub fn combine_values(mut values: [f64; 4], policy: CombinePolicy) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    match policy {
        CombinePolicy::Top => (values[1] + values[2]) / 2.0,
        CombinePolicy::Median => (values[0] + values[3]) / 2.0,
    }
}
