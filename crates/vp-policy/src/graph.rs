// graph.rs — Dependency graph between a policy's inputs and outputs.
//
// Built once per policy. Each output reads from at most one node (an input
// feature or another output's value), so the graph is a forest of short
// chains in practice, but it is still checked for cycles before anything is
// evaluated rather than trusting the shape of the schema.

use std::collections::{BTreeSet, VecDeque};

/// A node a derivation rule reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// Index into `PolicySpec::inputs`.
    Input(usize),
    /// Index into `PolicySpec::outputs`.
    Output(usize),
}

/// Resolved references plus a dependency-respecting evaluation order.
#[derive(Debug, Clone)]
pub struct PolicyGraph {
    /// `sources[i]` is what output `i` reads from (`None` for CONST).
    sources: Vec<Option<NodeRef>>,
    /// Output indices, every output after the output it reads from.
    order: Vec<usize>,
}

impl PolicyGraph {
    /// Build the graph and topologically order the outputs.
    ///
    /// Returns the indices of outputs caught in a cycle on failure.
    pub fn build(sources: Vec<Option<NodeRef>>) -> Result<Self, Vec<usize>> {
        let n = sources.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, source) in sources.iter().enumerate() {
            if let Some(NodeRef::Output(dep)) = source {
                in_degree[idx] += 1;
                dependents[*dep].push(idx);
            }
        }

        // Kahn's algorithm, seeded in declaration order so the resulting
        // order is deterministic.
        let mut ready: VecDeque<usize> = (0..n).filter(|i| in_degree[*i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(idx) = ready.pop_front() {
            order.push(idx);
            for &next in &dependents[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if order.len() != n {
            let cyclic = (0..n).filter(|i| in_degree[*i] > 0).collect();
            return Err(cyclic);
        }

        Ok(Self { sources, order })
    }

    /// Outputs in an order where every output follows its dependency.
    pub fn evaluation_order(&self) -> &[usize] {
        &self.order
    }

    pub fn source_of(&self, output: usize) -> Option<NodeRef> {
        self.sources.get(output).copied().flatten()
    }

    /// Every input an output ultimately reads, following output-to-output
    /// edges. Used as claim provenance.
    pub fn inputs_of(&self, output: usize) -> BTreeSet<usize> {
        let mut inputs = BTreeSet::new();
        let mut current = self.source_of(output);
        // Acyclic by construction, but bound the walk anyway.
        for _ in 0..=self.sources.len() {
            match current {
                Some(NodeRef::Input(idx)) => {
                    inputs.insert(idx);
                    break;
                }
                Some(NodeRef::Output(idx)) => current = self.source_of(idx),
                None => break,
            }
        }
        inputs
    }

    /// Inputs read by at least one output.
    pub fn referenced_inputs(&self) -> BTreeSet<usize> {
        (0..self.sources.len())
            .flat_map(|idx| self.inputs_of(idx))
            .collect()
    }
}
