//! Signal-flow graph construction, topological sort, DSP-chain discovery,
//! and the complexity score. Grounded almost directly on
//! `ekg-phonon/src/dependency_graph.rs`: a `petgraph::DiGraph` wrapper with
//! `toposort`, a graceful (not fatal) cycle fallback, and the same test
//! scenario shapes (`test_simple_linear_graph`, `test_cycle_detection`, ...).

use crate::ast::Canvas;
use crate::registry::{self, AUDIO_SINKS, AUDIO_SOURCES};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Audio,
    Control,
}

/// A per-canvas signal-flow graph: nodes are node indices within that
/// canvas, edges carry an [`EdgeKind`].
pub struct SignalGraph {
    graph: DiGraph<usize, EdgeKind>,
    index_of: HashMap<usize, NodeIndex>,
}

impl SignalGraph {
    pub fn build(canvas: &Canvas) -> Self {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::new();

        for node in &canvas.nodes {
            index_of.insert(node.id, graph.add_node(node.id));
        }

        for c in &canvas.connections {
            let (Some(&from), Some(&to)) = (index_of.get(&c.from_node), index_of.get(&c.to_node)) else {
                continue;
            };
            let from_audio = canvas.nodes.get(c.from_node).and_then(|n| n.name()).map(registry::is_audio_object).unwrap_or(false);
            let to_audio = canvas.nodes.get(c.to_node).and_then(|n| n.name()).map(registry::is_audio_object).unwrap_or(false);
            let kind = if from_audio && to_audio { EdgeKind::Audio } else { EdgeKind::Control };
            graph.add_edge(from, to, kind);
        }

        Self { graph, index_of }
    }

    /// Kahn's-algorithm toposort. On a cycle, falls back to declaration
    /// order rather than failing — feedback is normal in this domain and is
    /// reported via [`Self::has_cycles`], not treated as an error.
    pub fn execution_order(&self) -> (Vec<usize>, bool) {
        match toposort(&self.graph, None) {
            Ok(order) => (order.into_iter().map(|ix| self.graph[ix]).collect(), false),
            Err(_) => {
                let mut ids: Vec<usize> = self.index_of.keys().copied().collect();
                ids.sort_unstable();
                (ids, true)
            }
        }
    }

    pub fn has_cycles(&self) -> bool {
        toposort(&self.graph, None).is_err()
    }

    fn neighbors_via(&self, node_id: usize, kind: EdgeKind) -> Vec<usize> {
        let Some(&ix) = self.index_of.get(&node_id) else {
            return Vec::new();
        };
        self.graph
            .edges(ix)
            .filter(|e| *e.weight() == kind)
            .map(|e| self.graph[e.target()])
            .collect()
    }
}

/// A discovered path of audio-signal nodes from a registered source to a
/// registered sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DspChain {
    pub node_ids: Vec<usize>,
    pub names: Vec<String>,
}

fn dfs_chains(canvas: &Canvas, graph: &SignalGraph, start: usize, path: &mut Vec<usize>, on_path: &mut HashSet<usize>, out: &mut Vec<DspChain>) {
    path.push(start);
    on_path.insert(start);

    let name = canvas.nodes.get(start).and_then(|n| n.name()).unwrap_or("");
    if AUDIO_SINKS.contains(name) && path.len() > 1 {
        out.push(DspChain {
            node_ids: path.clone(),
            names: path.iter().map(|&id| canvas.nodes[id].name().unwrap_or("").to_string()).collect(),
        });
    } else {
        for next in graph.neighbors_via(start, EdgeKind::Audio) {
            if !on_path.contains(&next) {
                dfs_chains(canvas, graph, next, path, on_path, out);
            }
        }
    }

    on_path.remove(&start);
    path.pop();
}

/// DFS from every registered audio source along audio-tagged edges,
/// terminating at a registered sink. Paths that never reach a sink are
/// discarded; per-path cycle guards prevent infinite recursion.
pub fn find_dsp_chains(canvas: &Canvas, graph: &SignalGraph) -> Vec<DspChain> {
    let mut chains = Vec::new();
    for node in &canvas.nodes {
        let Some(name) = node.name() else { continue };
        if AUDIO_SOURCES.contains(name) {
            let mut path = Vec::new();
            let mut on_path = HashSet::new();
            dfs_chains(canvas, graph, node.id, &mut path, &mut on_path, &mut chains);
        }
    }
    chains
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplexityLabel {
    Trivial,
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub score: u32,
    pub label: ComplexityLabel,
}

fn complexity_label(score: u32) -> ComplexityLabel {
    match score {
        0..=15 => ComplexityLabel::Trivial,
        16..=35 => ComplexityLabel::Simple,
        36..=60 => ComplexityLabel::Moderate,
        61..=80 => ComplexityLabel::Complex,
        _ => ComplexityLabel::VeryComplex,
    }
}

fn compute_complexity(canvas: &Canvas, chains: &[DspChain], max_subpatch_depth: usize) -> ComplexityScore {
    let total_objects = canvas.nodes.len() as f64;
    let connections = canvas.connections.len() as f64;

    let object_factor = (total_objects / 3.3).min(30.0);
    let density_factor = if total_objects == 0.0 { 0.0 } else { ((connections / total_objects) * 6.7).min(20.0) };
    let depth_factor = ((max_subpatch_depth as f64) * 5.0).min(15.0);

    let avg_chain_len = if chains.is_empty() {
        0.0
    } else {
        chains.iter().map(|c| c.node_ids.len() as f64).sum::<f64>() / chains.len() as f64
    };
    let audio_factor = (chains.len() as f64 * avg_chain_len * 2.0).min(20.0);

    let unique_types: HashSet<&str> = canvas.nodes.iter().filter_map(|n| n.name()).collect();
    let unique_factor = (unique_types.len() as f64 * 0.75).min(15.0);

    let sum = object_factor + density_factor + depth_factor + audio_factor + unique_factor;
    let score = sum.round() as u32;
    ComplexityScore {
        score,
        label: complexity_label(score),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub execution_order: Vec<usize>,
    pub has_cycles: bool,
    pub dsp_chains: Vec<DspChain>,
    pub complexity: ComplexityScore,
}

/// Analyze a single canvas: build the signal-flow graph, run toposort,
/// enumerate DSP chains, and compute the complexity score. Side-effect-free
/// and deterministic for a given canvas.
pub fn analyze(canvas: &Canvas) -> AnalysisResult {
    let graph = SignalGraph::build(canvas);
    let (execution_order, has_cycles) = graph.execution_order();
    let dsp_chains = find_dsp_chains(canvas, &graph);
    let complexity = compute_complexity(canvas, &dsp_chains, canvas.max_subpatch_depth());

    AnalysisResult {
        execution_order,
        has_cycles,
        dsp_chains,
        complexity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn minimal_chain() -> Canvas {
        let src = "#N canvas 0 50 800 600 12;\n\
                    #X obj 50 50 osc~ 440;\n\
                    #X obj 50 100 *~ 0.1;\n\
                    #X obj 50 150 dac~;\n\
                    #X connect 0 0 1 0;\n\
                    #X connect 1 0 2 0;\n\
                    #X connect 1 0 2 1;\n";
        parse(src).unwrap().root
    }

    #[test]
    fn test_simple_linear_graph() {
        let canvas = minimal_chain();
        let result = analyze(&canvas);
        assert!(!result.has_cycles);
        assert_eq!(result.execution_order, vec![0, 1, 2]);
    }

    #[test]
    fn test_dsp_chain_found() {
        let canvas = minimal_chain();
        let result = analyze(&canvas);
        assert_eq!(result.dsp_chains.len(), 1);
        assert_eq!(result.dsp_chains[0].names.first().map(|s| s.as_str()), Some("osc~"));
        assert_eq!(result.dsp_chains[0].names.last().map(|s| s.as_str()), Some("dac~"));
    }

    #[test]
    fn test_complexity_label_is_trivial_or_simple_for_minimal_chain() {
        let canvas = minimal_chain();
        let result = analyze(&canvas);
        assert!(matches!(result.complexity.label, ComplexityLabel::Trivial | ComplexityLabel::Simple));
    }

    #[test]
    fn test_cycle_detection() {
        let src = "#N canvas 0 0 400 300 12;\n\
                    #X obj 0 0 + 1;\n\
                    #X obj 0 50 + 1;\n\
                    #X connect 0 0 1 0;\n\
                    #X connect 1 0 0 0;\n";
        let canvas = parse(src).unwrap().root;
        let result = analyze(&canvas);
        assert!(result.has_cycles);
    }

    #[test]
    fn test_parallel_branches_toposort_respects_dependencies() {
        let src = "#N canvas 0 0 400 300 12;\n\
                    #X obj 0 0 osc~ 220;\n\
                    #X obj 0 50 osc~ 440;\n\
                    #X obj 0 100 *~ 0.5;\n\
                    #X connect 0 0 2 0;\n\
                    #X connect 1 0 2 1;\n";
        let canvas = parse(src).unwrap().root;
        let result = analyze(&canvas);
        assert!(!result.has_cycles);
        let pos_of = |id: usize| result.execution_order.iter().position(|&n| n == id).unwrap();
        assert!(pos_of(0) < pos_of(2));
        assert!(pos_of(1) < pos_of(2));
    }

    #[test]
    fn test_no_chain_when_source_never_reaches_sink() {
        let src = "#N canvas 0 0 400 300 12;\n#X obj 0 0 osc~ 440;\n#X obj 0 50 *~ 0.5;\n#X connect 0 0 1 0;\n";
        let canvas = parse(src).unwrap().root;
        let result = analyze(&canvas);
        assert!(result.dsp_chains.is_empty());
    }

    #[test]
    fn test_invalid_reference_does_not_panic() {
        let mut canvas = minimal_chain();
        canvas.connections[0].to_node = 99;
        let result = analyze(&canvas);
        // Broken edges are silently dropped by the graph builder; the
        // validator is responsible for flagging them.
        assert!(result.execution_order.len() == canvas.nodes.len());
    }
}
