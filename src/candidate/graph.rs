use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::candidate::Candidate;

/// Dependency edges between candidates of one batch. Edges that point
/// outside the batch are ignored here; the constraint builder rejects them.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<String>,
    /// `requires[c]` lists the indices `c` depends on.
    requires: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        Self::from_edges(candidates.iter().map(|c| (c.id.as_str(), &c.depends_on)))
    }

    /// Builds the graph from bare `(id, depends_on)` pairs. A repeated id
    /// keeps its first occurrence.
    pub fn from_edges<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a BTreeSet<String>)>,
    {
        let mut ids: Vec<String> = Vec::new();
        let mut deps: Vec<&BTreeSet<String>> = Vec::new();
        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for (id, depends_on) in nodes {
            if index.contains_key(id) {
                continue;
            }
            index.insert(id, ids.len());
            ids.push(id.to_string());
            deps.push(depends_on);
        }
        let requires = deps
            .iter()
            .map(|depends_on| {
                depends_on
                    .iter()
                    .filter_map(|dep| index.get(dep.as_str()).copied())
                    .collect()
            })
            .collect();
        Self { ids, requires }
    }

    /// Kahn's algorithm, dependencies first. On failure returns every cycle
    /// as a sorted list of member ids.
    pub fn topological_order(&self) -> Result<Vec<usize>, Vec<Vec<String>>> {
        let n = self.ids.len();
        let mut pending = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (node, deps) in self.requires.iter().enumerate() {
            pending[node] = deps.len();
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&idx| pending[idx] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = ready.pop_front() {
            order.push(node);
            for &next in &dependents[node] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if order.len() == n {
            return Ok(order);
        }
        let stuck: BTreeSet<usize> = (0..n).filter(|&idx| pending[idx] > 0).collect();
        Err(self.cycles_within(&stuck))
    }

    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        self.topological_order().err().unwrap_or_default()
    }

    /// Nodes Kahn could not drain are either on a cycle or downstream of
    /// one; strongly connected components separate the two.
    fn cycles_within(&self, nodes: &BTreeSet<usize>) -> Vec<Vec<String>> {
        let mut tarjan = Tarjan::new(self.ids.len());
        for &node in nodes {
            if tarjan.index[node].is_none() {
                tarjan.visit(node, &self.requires, nodes);
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan
            .components
            .into_iter()
            .filter(|component| {
                component.len() > 1 || self.requires[component[0]].contains(&component[0])
            })
            .map(|component| {
                let mut members: Vec<String> =
                    component.iter().map(|&idx| self.ids[idx].clone()).collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }
}

struct Tarjan {
    next_index: usize,
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan {
    fn new(n: usize) -> Self {
        Self {
            next_index: 0,
            index: vec![None; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn enter(&mut self, node: usize) {
        self.index[node] = Some(self.next_index);
        self.low[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
    }

    /// Depth-first walk from `root` on an explicit frame stack of
    /// `(node, next edge)`, so chain length never grows the call stack.
    fn visit(&mut self, root: usize, edges: &[Vec<usize>], allowed: &BTreeSet<usize>) {
        self.enter(root);
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = frames.last_mut() {
            let (node, cursor) = *frame;
            if let Some(&next) = edges[node].get(cursor) {
                frame.1 += 1;
                if !allowed.contains(&next) {
                    continue;
                }
                match self.index[next] {
                    None => {
                        self.enter(next);
                        frames.push((next, 0));
                    }
                    Some(next_index) if self.on_stack[next] => {
                        self.low[node] = self.low[node].min(next_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.low[parent] = self.low[parent].min(self.low[node]);
            }
            if Some(self.low[node]) == self.index[node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }
}

/// Seeds plus every in-set candidate they transitively depend on.
pub fn dependency_closure(candidates: &[Candidate], seeds: &BTreeSet<String>) -> BTreeSet<String> {
    let by_id: BTreeMap<&str, &Candidate> =
        candidates.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut closed = BTreeSet::new();
    let mut queue: Vec<&str> = seeds.iter().map(String::as_str).collect();
    while let Some(id) = queue.pop() {
        let Some(candidate) = by_id.get(id) else {
            continue;
        };
        if !closed.insert(candidate.id.clone()) {
            continue;
        }
        for dep in &candidate.depends_on {
            if !closed.contains(dep) {
                queue.push(dep.as_str());
            }
        }
    }
    closed
}
