//! Wave computation over the step reference graph.
//!
//! Uses `petgraph` to model reference edges between steps. Depth-based
//! grouping produces waves where every step only reads from steps in earlier
//! waves, so a wave's executor calls can be dispatched concurrently.

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::registry::compiled::CompiledStep;

/// Group step indices into waves by reference depth.
///
/// A step with no step references has depth 0; otherwise its depth is one
/// more than the deepest step it references. Within a wave, indices keep
/// declaration order.
pub fn build_waves(steps: &[CompiledStep]) -> Vec<Vec<usize>> {
    if steps.is_empty() {
        return vec![];
    }

    // Edge from referenced step -> referencing step
    let mut graph = DiGraph::<usize, ()>::new();
    let nodes: Vec<_> = (0..steps.len()).map(|i| graph.add_node(i)).collect();
    for (to, step) in steps.iter().enumerate() {
        for &from in &step.depends_on {
            graph.add_edge(nodes[from], nodes[to], ());
        }
    }

    // References only point backwards, so the graph is acyclic and
    // declaration order is already topological.
    let order: Vec<usize> = match toposort(&graph, None) {
        Ok(sorted) => sorted.into_iter().map(|n| graph[n]).collect(),
        Err(_) => (0..steps.len()).collect(),
    };

    let mut depths = vec![0usize; steps.len()];
    for idx in order {
        depths[idx] = steps[idx]
            .depends_on
            .iter()
            .map(|&dep| depths[dep] + 1)
            .max()
            .unwrap_or(0);
    }

    let max_depth = depths.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<usize>> = vec![vec![]; max_depth + 1];
    for (idx, depth) in depths.into_iter().enumerate() {
        waves[depth].push(idx);
    }
    waves
}

/// One step per wave, in declaration order.
pub fn sequential_waves(step_count: usize) -> Vec<Vec<usize>> {
    (0..step_count).map(|i| vec![i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, depends_on: Vec<usize>) -> CompiledStep {
        CompiledStep {
            id: id.to_string(),
            skill_id: "s".to_string(),
            condition: None,
            inputs: vec![],
            depends_on,
        }
    }

    #[test]
    fn test_empty_plan() {
        assert!(build_waves(&[]).is_empty());
    }

    #[test]
    fn test_independent_steps_share_a_wave() {
        let steps = vec![step("a", vec![]), step("b", vec![]), step("c", vec![])];
        assert_eq!(build_waves(&steps), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_chain_and_diamond() {
        // rewrite -> (genie, web) -> merge
        let steps = vec![
            step("rewrite", vec![]),
            step("genie", vec![0]),
            step("web", vec![0]),
            step("merge", vec![1, 2]),
        ];
        assert_eq!(build_waves(&steps), vec![vec![0], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_depth_uses_deepest_dependency() {
        let steps = vec![
            step("a", vec![]),
            step("b", vec![0]),
            step("c", vec![1]),
            step("d", vec![0, 2]),
        ];
        assert_eq!(build_waves(&steps), vec![vec![0], vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_sequential_waves() {
        assert_eq!(sequential_waves(3), vec![vec![0], vec![1], vec![2]]);
    }
}
