use crate::graph::{EdgeKey, Graph, NodeId};
use ahash::AHashMap as HashMap;
use std::collections::VecDeque;

/// Total precedence order over the nodes of a graph. Edges running against
/// it are the ones that had to be logically reversed to break cycles.
#[derive(Debug, Clone, Default)]
pub struct AcyclicOrder {
    pub order: Vec<NodeId>,
    pub index: HashMap<NodeId, usize>,
    // Incoming edges dropped from the nodes picked to break a cycle
    pub reversed: Vec<EdgeKey>,
}

impl AcyclicOrder {
    #[inline]
    pub fn position(&self, id: NodeId) -> usize {
        self.index[&id]
    }
}

/// Peels sources to the front and sinks to the back of the order; when
/// neither exists, the node with the largest out-degree minus in-degree is
/// moved to the front and its incoming edges are ignored from then on.
///
/// Runs on a copy of the adjacency so `g` is never modified.
pub fn acyclic_order(g: &Graph) -> AcyclicOrder {
    let mut work = Peeling::new(g);
    let mut front: Vec<NodeId> = Vec::with_capacity(g.nodes.len());
    let mut back: Vec<NodeId> = Vec::new();
    let mut reversed = Vec::new();

    while work.remaining > 0 {
        while let Some(i) = work.sources.pop_front() {
            if work.alive[i] {
                work.remove(i);
                front.push(work.ids[i]);
            }
        }
        while let Some(i) = work.sinks.pop_front() {
            if work.alive[i] {
                work.remove(i);
                back.push(work.ids[i]);
            }
        }
        // Removing sinks never creates sources
        if work.remaining == 0 {
            break;
        }

        // Everything left lies on a cycle
        let mut pick: Option<(usize, isize)> = None;
        for i in (0..work.ids.len()).filter(|&i| work.alive[i]) {
            let score = work.out_degree[i] as isize - work.in_degree[i] as isize;
            if pick.is_none_or(|(_, best)| score > best) {
                pick = Some((i, score));
            }
        }
        if let Some((i, score)) = pick {
            log::trace!("breaking cycle at {:?} (out - in = {})", work.ids[i], score);
            reversed.extend(
                work.incoming[i]
                    .iter()
                    .filter(|(from, _)| work.alive[*from])
                    .map(|&(_, key)| key),
            );
            work.remove(i);
            front.push(work.ids[i]);
        }
    }

    back.reverse();
    front.extend(back);
    let index = front
        .iter()
        .enumerate()
        .map(|(position, &id)| (id, position))
        .collect();

    AcyclicOrder {
        order: front,
        index,
        reversed,
    }
}

// Adjacency by node index with live degree counters and source/sink worklists
struct Peeling {
    ids: Vec<NodeId>,
    outgoing: Vec<Vec<(usize, EdgeKey)>>,
    incoming: Vec<Vec<(usize, EdgeKey)>>,
    in_degree: Vec<usize>,
    out_degree: Vec<usize>,
    alive: Vec<bool>,
    remaining: usize,
    sources: VecDeque<usize>,
    sinks: VecDeque<usize>,
}

impl Peeling {
    fn new(g: &Graph) -> Self {
        let ids: Vec<NodeId> = g.nodes.keys().copied().collect();
        let count = ids.len();
        let mut outgoing = vec![Vec::new(); count];
        let mut incoming = vec![Vec::new(); count];
        for edge in g.edges.values() {
            let from = g.nodes.get_index_of(&g.owner(edge.source));
            let to = g.nodes.get_index_of(&g.owner(edge.target));
            if let (Some(from), Some(to)) = (from, to) {
                outgoing[from].push((to, edge.key()));
                incoming[to].push((from, edge.key()));
            }
        }
        let in_degree: Vec<usize> = incoming.iter().map(Vec::len).collect();
        let out_degree: Vec<usize> = outgoing.iter().map(Vec::len).collect();
        let sources = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let sinks = (0..count).filter(|&i| out_degree[i] == 0).collect();

        Peeling {
            ids,
            outgoing,
            incoming,
            in_degree,
            out_degree,
            alive: vec![true; count],
            remaining: count,
            sources,
            sinks,
        }
    }

    fn remove(&mut self, i: usize) {
        self.alive[i] = false;
        self.remaining -= 1;
        for &(to, _) in &self.outgoing[i] {
            if self.alive[to] {
                self.in_degree[to] -= 1;
                if self.in_degree[to] == 0 {
                    self.sources.push_back(to);
                }
            }
        }
        for &(from, _) in &self.incoming[i] {
            if self.alive[from] {
                self.out_degree[from] -= 1;
                if self.out_degree[from] == 0 {
                    self.sinks.push_back(from);
                }
            }
        }
    }
}
