//! Structural validator: accumulates [`Issue`]s, never fails. Grounded on
//! `ekg-phonon/src/error_diagnostics.rs`'s accumulate-diagnostics-and-report
//! style and the typed-error half contributed by the `max2sc-codegen`
//! example's `CodegenError` enum (used here for the `validate_strict`
//! escape hatch only, per SPEC_FULL.md §9).

use crate::ast::{Canvas, NodeKind, Patch};
use crate::error::{Error, ErrorKind, Result};
use crate::registry::{self, ORPHAN_EXEMPT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub canvas_id: usize,
    pub node_id: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<Issue>,
    pub summary: Summary,
}

fn push(issues: &mut Vec<Issue>, severity: Severity, code: &'static str, message: String, canvas_id: usize, node_id: Option<usize>) {
    issues.push(Issue {
        severity,
        code,
        message,
        canvas_id,
        node_id,
    });
}

fn validate_canvas(canvas: &Canvas, issues: &mut Vec<Issue>) {
    let node_count = canvas.nodes.len();

    for c in &canvas.connections {
        if c.from_node >= node_count {
            push(
                issues,
                Severity::Error,
                "BROKEN_CONNECTION_SOURCE",
                format!("connection references nonexistent source node {}", c.from_node),
                canvas.id,
                None,
            );
        }
        if c.to_node >= node_count {
            push(
                issues,
                Severity::Error,
                "BROKEN_CONNECTION_TARGET",
                format!("connection references nonexistent target node {}", c.to_node),
                canvas.id,
                None,
            );
        }
    }

    for c in &canvas.connections {
        if c.from_node >= node_count || c.to_node >= node_count {
            continue;
        }
        let from = &canvas.nodes[c.from_node];
        let to = &canvas.nodes[c.to_node];

        if let Some(counts) = port_counts_for(canvas, from) {
            if c.from_outlet >= counts.outlets {
                push(
                    issues,
                    Severity::Error,
                    "OUTLET_OUT_OF_BOUNDS",
                    format!("outlet {} out of bounds on node {}", c.from_outlet, c.from_node),
                    canvas.id,
                    Some(c.from_node),
                );
            }
        }
        if let Some(counts) = port_counts_for(canvas, to) {
            if c.to_inlet >= counts.inlets {
                push(
                    issues,
                    Severity::Error,
                    "INLET_OUT_OF_BOUNDS",
                    format!("inlet {} out of bounds on node {}", c.to_inlet, c.to_node),
                    canvas.id,
                    Some(c.to_node),
                );
            }
        }
    }

    let mut seen = HashSet::new();
    for c in &canvas.connections {
        let key = (c.from_node, c.from_outlet, c.to_node, c.to_inlet);
        if !seen.insert(key) {
            push(
                issues,
                Severity::Warning,
                "DUPLICATE_CONNECTION",
                format!("duplicate connection {:?}", key),
                canvas.id,
                None,
            );
        }
    }

    for node in &canvas.nodes {
        if let Some(name) = node.name() {
            if name != "pd" && registry::lookup(name).is_none() {
                push(
                    issues,
                    Severity::Warning,
                    "UNKNOWN_OBJECT",
                    format!("unknown object '{name}'"),
                    canvas.id,
                    Some(node.id),
                );
            }
        }
    }

    let mut incident = vec![false; node_count];
    for c in &canvas.connections {
        if c.from_node < node_count {
            incident[c.from_node] = true;
        }
        if c.to_node < node_count {
            incident[c.to_node] = true;
        }
    }
    for node in &canvas.nodes {
        if incident[node.id] {
            continue;
        }
        if matches!(node.kind, NodeKind::Text { .. }) {
            continue;
        }
        let exempt = node
            .name()
            .map(|n| n == "pd" || ORPHAN_EXEMPT.contains(n))
            .unwrap_or(false);
        if !exempt {
            push(
                issues,
                Severity::Warning,
                "ORPHAN_OBJECT",
                format!("node '{}' has no connections", node.name().unwrap_or(node.kind_tag())),
                canvas.id,
                Some(node.id),
            );
        }
    }

    if canvas.is_subpatch && canvas.nodes.is_empty() {
        push(
            issues,
            Severity::Warning,
            "EMPTY_SUBPATCH",
            "subpatch has no nodes".to_string(),
            canvas.id,
            None,
        );
    }

    let has_audio_node = canvas.nodes.iter().any(|n| n.name().map(registry::is_audio_object).unwrap_or(false));
    let has_sink = canvas
        .nodes
        .iter()
        .any(|n| n.name().map(|name| registry::AUDIO_SINKS.contains(name)).unwrap_or(false));
    if has_audio_node && !has_sink {
        push(
            issues,
            Severity::Warning,
            "NO_DSP_SINK",
            "canvas contains audio-signal nodes but no audio sink".to_string(),
            canvas.id,
            None,
        );
    }
}

fn port_counts_for(canvas: &Canvas, node: &crate::ast::Node) -> Option<registry::PortCounts> {
    if let NodeKind::Obj { name, .. } = &node.kind {
        if name == "pd" {
            let sub_name = node.args().first().and_then(|t| t.as_str())?;
            let child = canvas.find_subpatch(sub_name)?;
            let counts = registry::resolve_subpatch_ports(child);
            return Some(counts);
        }
    }
    registry::resolve_port_counts(node)
}

/// `validate(Patch) -> ValidationResult`: runs §4.4's nine checks in DFS
/// pre-order over canvases, always succeeds.
pub fn validate(patch: &Patch) -> ValidationResult {
    let mut issues = Vec::new();
    patch.root.walk(&mut |canvas| validate_canvas(canvas, &mut issues));

    let mut summary = Summary::default();
    for issue in &issues {
        match issue.severity {
            Severity::Error => summary.errors += 1,
            Severity::Warning => summary.warnings += 1,
            Severity::Info => summary.infos += 1,
        }
    }
    let valid = summary.errors == 0;
    debug!(errors = summary.errors, warnings = summary.warnings, "validation complete");

    ValidationResult { valid, issues, summary }
}

/// Strict entry point: turns `errors > 0` into a hard `Err`, reserving
/// `ErrorKind::ValidationError` for callers that opt into fail-fast
/// semantics (SPEC_FULL.md §9).
pub fn validate_strict(patch: &Patch) -> Result<ValidationResult> {
    let result = validate(patch);
    if result.valid {
        Ok(result)
    } else {
        Err(Error::new(
            ErrorKind::ValidationError,
            format!("{} structural error(s) found", result.summary.errors),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn minimal_chain() -> Patch {
        let src = "#N canvas 0 50 800 600 12;\n\
                    #X obj 50 50 osc~ 440;\n\
                    #X obj 50 100 *~ 0.1;\n\
                    #X obj 50 150 dac~;\n\
                    #X connect 0 0 1 0;\n\
                    #X connect 1 0 2 0;\n\
                    #X connect 1 0 2 1;\n";
        parse(src).unwrap()
    }

    #[test]
    fn minimal_chain_is_valid() {
        let result = validate(&minimal_chain());
        assert!(result.valid);
        assert_eq!(result.summary.errors, 0);
    }

    #[test]
    fn broken_connection_target_is_detected() {
        let mut patch = minimal_chain();
        patch.root.connections[2].to_node = 9;
        let result = validate(&patch);
        assert!(!result.valid);
        assert!(result.issues.iter().any(|i| i.code == "BROKEN_CONNECTION_TARGET"));
    }

    #[test]
    fn duplicate_connection_is_a_warning_not_an_error() {
        let mut patch = minimal_chain();
        let dup = patch.root.connections[0];
        patch.root.connections.push(dup);
        let result = validate(&patch);
        assert!(result.valid);
        assert!(result.issues.iter().any(|i| i.code == "DUPLICATE_CONNECTION" && i.severity == Severity::Warning));
    }

    #[test]
    fn unknown_object_is_a_warning() {
        let src = "#N canvas 0 0 400 300 12;\n#X obj 0 0 totally_made_up;\n";
        let patch = parse(src).unwrap();
        let result = validate(&patch);
        assert!(result.issues.iter().any(|i| i.code == "UNKNOWN_OBJECT"));
    }

    #[test]
    fn orphan_object_flagged_but_wireless_and_gui_are_exempt() {
        let src = "#N canvas 0 0 400 300 12;\n\
                    #X obj 0 0 osc~ 440;\n\
                    #X obj 0 50 send foo;\n\
                    #X obj 0 100 bng;\n\
                    #X obj 0 150 loadbang;\n";
        let patch = parse(src).unwrap();
        let result = validate(&patch);
        let codes: Vec<_> = result.issues.iter().map(|i| (i.code, i.node_id)).collect();
        assert!(codes.contains(&("ORPHAN_OBJECT", Some(0))));
        assert!(!codes.iter().any(|(c, n)| *c == "ORPHAN_OBJECT" && *n == Some(1)));
        assert!(!codes.iter().any(|(c, n)| *c == "ORPHAN_OBJECT" && *n == Some(2)));
        assert!(!codes.iter().any(|(c, n)| *c == "ORPHAN_OBJECT" && *n == Some(3)));
    }

    #[test]
    fn no_dsp_sink_warns_when_audio_chain_has_no_sink() {
        let src = "#N canvas 0 0 400 300 12;\n#X obj 0 0 osc~ 440;\n";
        let patch = parse(src).unwrap();
        let result = validate(&patch);
        assert!(result.issues.iter().any(|i| i.code == "NO_DSP_SINK"));
    }

    #[test]
    fn empty_subpatch_is_a_warning() {
        let src = "#N canvas 0 0 400 300 12;\n#N canvas 0 0 200 200 12;\n#X restore 0 0 pd empty;\n";
        let patch = parse(src).unwrap();
        let result = validate(&patch);
        assert!(result.issues.iter().any(|i| i.code == "EMPTY_SUBPATCH"));
    }

    #[test]
    fn validate_strict_errs_on_structural_errors() {
        let mut patch = minimal_chain();
        patch.root.connections[2].to_node = 9;
        let err = validate_strict(&patch).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn validate_is_idempotent() {
        let patch = minimal_chain();
        let a = validate(&patch);
        let b = validate(&patch);
        assert_eq!(a.summary.errors, b.summary.errors);
        assert_eq!(a.summary.warnings, b.summary.warnings);
        assert_eq!(a.issues.len(), b.issues.len());
    }
}
