//! `Patch` → text, plus a builder-facing `build_patch` convenience that
//! turns a bare node/connection list into a well-formed `Patch`.
//!
//! Grounded on the teacher's round-trip discipline in `dependency_graph.rs`
//! (deterministic DFS ordering) and the `fmt::Display`-driven text
//! reconstruction style of `error_diagnostics.rs`.

use crate::ast::{format_number, Canvas, Connection, Node, NodeKind, Patch, Token};
use std::fmt::Write as _;

fn write_tokens(out: &mut String, tokens: &[Token]) {
    for t in tokens {
        out.push(' ');
        out.push_str(&t.to_string());
    }
}

fn write_node(out: &mut String, node: &Node) {
    match &node.kind {
        NodeKind::Obj { name, args } => {
            let _ = write!(out, "#X obj {} {} {}", node.x, node.y, name);
            write_tokens(out, args);
            out.push_str(";\n");
        }
        NodeKind::Msg { tokens } => {
            let _ = write!(out, "#X msg {} {}", node.x, node.y);
            write_tokens(out, tokens);
            out.push_str(";\n");
        }
        NodeKind::FloatAtom { extra } => {
            let _ = write!(out, "#X floatatom {} {}", node.x, node.y);
            write_tokens(out, extra);
            out.push_str(";\n");
        }
        NodeKind::SymbolAtom { extra } => {
            let _ = write!(out, "#X symbolatom {} {}", node.x, node.y);
            write_tokens(out, extra);
            out.push_str(";\n");
        }
        NodeKind::Text { tokens } => {
            let _ = write!(out, "#X text {} {}", node.x, node.y);
            write_tokens(out, tokens);
            out.push_str(";\n");
        }
        NodeKind::Array {
            name,
            size,
            array_type,
            flags,
            continuation,
        } => {
            let _ = write!(out, "#X array {name} {size} {array_type}");
            write_tokens(out, flags);
            out.push_str(";\n");
            for line in continuation {
                out.push_str("#A");
                write_tokens(out, line);
                out.push_str(";\n");
            }
        }
    }
}

fn write_connection(out: &mut String, c: &Connection) {
    let _ = writeln!(out, "#X connect {} {} {} {};", c.from_node, c.from_outlet, c.to_node, c.to_inlet);
}

fn write_canvas(out: &mut String, canvas: &Canvas) {
    let _ = writeln!(
        out,
        "#N canvas {} {} {} {} {};",
        canvas.x, canvas.y, canvas.width, canvas.height, canvas.font_size
    );
    for node in &canvas.nodes {
        if let NodeKind::Obj { name, args } = &node.kind {
            if name == "pd" {
                // A subpatch reference: emit the nested canvas's own
                // open/body/connections, then the closing restore line,
                // rather than a literal `#X obj ... pd NAME` line.
                if let Some(child_name) = args.first().and_then(|t| t.as_str()) {
                    if let Some(child) = canvas.find_subpatch(child_name) {
                        write_canvas(out, child);
                        let _ = writeln!(out, "#X restore {} {} pd {};", node.x, node.y, child_name);
                        continue;
                    }
                }
            }
        }
        write_node(out, node);
    }
    for c in &canvas.connections {
        write_connection(out, c);
    }
}

/// `serialize(Patch) -> String`. DFS canvas order matching parse.
pub fn serialize(patch: &Patch) -> String {
    let mut out = String::new();
    write_canvas(&mut out, &patch.root);
    out
}

/// A bare node description with no assigned id, for [`build_patch`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
}

/// A flat builder-facing patch description (single canvas; composer and
/// template builders work at this level before wrapping in a `Patch`).
#[derive(Debug, Clone, Default)]
pub struct PatchSpec {
    pub nodes: Vec<NodeSpec>,
    pub connections: Vec<Connection>,
    pub title: Option<String>,
}

/// Assigns ids by position; when `title` is set, prepends a `text` node and
/// shifts every connection index by one to account for it (§4.3).
pub fn build_patch(spec: PatchSpec) -> Patch {
    let mut canvas = Canvas::new_root(0.0, 50.0, 800.0, 600.0, 12.0);
    let shift = if spec.title.is_some() { 1 } else { 0 };

    if let Some(title) = &spec.title {
        canvas.push_node(
            NodeKind::Text {
                tokens: vec![Token::Symbol(title.clone())],
            },
            20.0,
            10.0,
        );
    }

    for n in spec.nodes {
        canvas.push_node(n.kind, n.x, n.y);
    }

    for c in spec.connections {
        canvas.connections.push(Connection::new(
            c.from_node + shift,
            c.from_outlet,
            c.to_node + shift,
            c.to_inlet,
        ));
    }

    Patch::new(canvas)
}

#[allow(dead_code)]
fn canonicalize_for_test(n: f64) -> String {
    format_number(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn round_trips_minimal_signal_chain() {
        let src = "#N canvas 0 50 800 600 12;\n\
                    #X obj 50 50 osc~ 440;\n\
                    #X obj 50 100 *~ 0.1;\n\
                    #X obj 50 150 dac~;\n\
                    #X connect 0 0 1 0;\n\
                    #X connect 1 0 2 0;\n\
                    #X connect 1 0 2 1;\n";
        let patch = parse(src).unwrap();
        let text = serialize(&patch);
        let reparsed = parse(&text).unwrap();
        assert_eq!(patch, reparsed);
    }

    #[test]
    fn subpatch_round_trips() {
        let src = "#N canvas 0 0 400 300 12;\n\
                    #N canvas 100 100 300 300 12;\n\
                    #X obj 10 10 inlet;\n\
                    #X obj 10 50 outlet;\n\
                    #X restore 50 50 pd sub1;\n";
        let patch = parse(src).unwrap();
        let text = serialize(&patch);
        let reparsed = parse(&text).unwrap();
        assert_eq!(patch, reparsed);
    }

    #[test]
    fn build_patch_without_title_has_no_shift() {
        let spec = PatchSpec {
            nodes: vec![NodeSpec {
                kind: NodeKind::Obj {
                    name: "osc~".into(),
                    args: vec![Token::Number(440.0)],
                },
                x: 0.0,
                y: 0.0,
            }],
            connections: vec![Connection::new(0, 0, 0, 0)],
            title: None,
        };
        let patch = build_patch(spec);
        assert_eq!(patch.root.connections[0].from_node, 0);
    }

    #[test]
    fn build_patch_with_title_shifts_indices() {
        let spec = PatchSpec {
            nodes: vec![NodeSpec {
                kind: NodeKind::Obj {
                    name: "osc~".into(),
                    args: vec![],
                },
                x: 0.0,
                y: 0.0,
            }],
            connections: vec![Connection::new(0, 0, 0, 0)],
            title: Some("My Patch".into()),
        };
        let patch = build_patch(spec);
        assert_eq!(patch.root.nodes.len(), 2);
        assert_eq!(patch.root.connections[0].from_node, 1);
        assert_eq!(patch.root.connections[0].to_node, 1);
    }

    #[test]
    fn numeric_canonicalization_trims_trailing_zeros() {
        assert_eq!(canonicalize_for_test(440.0), "440");
        assert_eq!(canonicalize_for_test(0.1), "0.1");
        assert_eq!(canonicalize_for_test(1.0 / 3.0), "0.333333");
    }
}
