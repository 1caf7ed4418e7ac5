//! Text → `Patch`. Statement-oriented, canvas-stack-based recursive descent,
//! grounded on `ekg-phonon/src/nom_parser.rs::parse_dsl`'s line-by-line,
//! stateful accumulation loop (its bus-map accumulator corresponds to our
//! canvas stack) and on `glicol_parser.rs`'s hand-rolled statement splitting
//! rather than a `nom` grammar, since this format is statement-terminated
//! rather than expression-oriented.

use crate::ast::{Canvas, Connection, Node, NodeKind, Patch, Token};
use crate::error::{Error, Result};
use tracing::{trace, warn};

/// Split `input` into raw statement bodies, honoring `\;` as a literal
/// semicolon rather than a terminator.
fn split_statements(input: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&';') => {
                current.push(';');
                chars.next();
            }
            ';' => {
                statements.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

/// Whitespace-tokenize a statement body into words, preserving escaped
/// semicolons (already resolved to literal `;` by [`split_statements`]).
fn tokenize(statement: &str) -> Vec<String> {
    statement.split_whitespace().map(|s| s.to_string()).collect()
}

fn parse_tokens(words: &[String]) -> Vec<Token> {
    words.iter().map(|w| Token::parse(w)).collect()
}

fn parse_f64(word: &str, line: usize) -> Result<f64> {
    word.parse::<f64>()
        .map_err(|_| Error::parse(format!("expected a number, found '{word}'"), line))
}

/// Parse a complete patch document. Fails on any structurally unrecoverable
/// defect; unknown statement prefixes are skipped with a warning, matching
/// §4.1's "best-effort, structural parsing continues" rule.
pub fn parse(input: &str) -> Result<Patch> {
    let statements = split_statements(input);
    let mut stack: Vec<Canvas> = Vec::new();
    let mut next_canvas_id = 0usize;
    let mut root: Option<Canvas> = None;

    for (line, raw) in statements.iter().enumerate() {
        let line = line + 1;
        let words = tokenize(raw);
        if words.is_empty() {
            continue;
        }
        trace!(line, statement = %raw.trim(), "parsing statement");

        match (words[0].as_str(), words.get(1).map(|s| s.as_str())) {
            ("#N", Some("canvas")) => {
                if words.len() < 6 {
                    return Err(Error::parse("malformed #N canvas header", line));
                }
                let x = parse_f64(&words[2], line)?;
                let y = parse_f64(&words[3], line)?;
                let w = parse_f64(&words[4], line)?;
                let h = parse_f64(&words[5], line)?;
                let font = words.get(6).map(|s| parse_f64(s, line)).transpose()?.unwrap_or(12.0);
                let mut canvas = Canvas::new_root(x, y, w, h, font);
                canvas.id = next_canvas_id;
                next_canvas_id += 1;
                if !stack.is_empty() {
                    canvas.is_subpatch = true;
                }
                stack.push(canvas);
            }
            ("#X", Some("restore")) => {
                let mut finished = stack
                    .pop()
                    .ok_or_else(|| Error::parse("#X restore with no open canvas", line))?;
                let name = words.get(5).cloned();
                finished.name = name.clone();
                match stack.last_mut() {
                    Some(parent) => {
                        let arg = name.unwrap_or_else(|| format!("subpatch_{}", finished.id));
                        parent.push_node(
                            NodeKind::Obj {
                                name: "pd".to_string(),
                                args: vec![Token::Symbol(arg)],
                            },
                            words.get(2).map(|s| parse_f64(s, line)).transpose()?.unwrap_or(0.0),
                            words.get(3).map(|s| parse_f64(s, line)).transpose()?.unwrap_or(0.0),
                        );
                        parent.canvases.push(finished);
                    }
                    None => {
                        return Err(Error::parse("#X restore closed the root canvas", line));
                    }
                }
            }
            ("#X", Some("obj")) => {
                let canvas = current_canvas(&mut stack, line)?;
                if words.len() < 4 {
                    return Err(Error::parse("malformed #X obj statement", line));
                }
                let x = parse_f64(&words[2], line)?;
                let y = parse_f64(&words[3], line)?;
                let name = words[4].clone();
                let args = parse_tokens(&words[5..]);
                canvas.push_node(NodeKind::Obj { name, args }, x, y);
            }
            ("#X", Some("msg")) => {
                let canvas = current_canvas(&mut stack, line)?;
                if words.len() < 4 {
                    return Err(Error::parse("malformed #X msg statement", line));
                }
                let x = parse_f64(&words[2], line)?;
                let y = parse_f64(&words[3], line)?;
                let tokens = parse_tokens(&words[4..]);
                canvas.push_node(NodeKind::Msg { tokens }, x, y);
            }
            ("#X", Some("floatatom")) | ("#X", Some("symbolatom")) => {
                let is_float = words[1] == "floatatom";
                let canvas = current_canvas(&mut stack, line)?;
                if words.len() < 4 {
                    return Err(Error::parse("malformed atom statement", line));
                }
                let x = parse_f64(&words[2], line)?;
                let y = parse_f64(&words[3], line)?;
                let extra = parse_tokens(&words[4..]);
                let kind = if is_float {
                    NodeKind::FloatAtom { extra }
                } else {
                    NodeKind::SymbolAtom { extra }
                };
                canvas.push_node(kind, x, y);
            }
            ("#X", Some("text")) => {
                let canvas = current_canvas(&mut stack, line)?;
                if words.len() < 4 {
                    return Err(Error::parse("malformed #X text statement", line));
                }
                let x = parse_f64(&words[2], line)?;
                let y = parse_f64(&words[3], line)?;
                let tokens = parse_tokens(&words[4..]);
                canvas.push_node(NodeKind::Text { tokens }, x, y);
            }
            ("#X", Some("array")) => {
                let canvas = current_canvas(&mut stack, line)?;
                if words.len() < 5 {
                    return Err(Error::parse("malformed #X array statement", line));
                }
                let name = words[2].clone();
                let size = words[3]
                    .parse::<i64>()
                    .map_err(|_| Error::parse(format!("bad array size '{}'", words[3]), line))?;
                let array_type = words[4].clone();
                let flags = parse_tokens(&words[5..]);
                canvas.push_node(
                    NodeKind::Array {
                        name,
                        size,
                        array_type,
                        flags,
                        continuation: Vec::new(),
                    },
                    0.0,
                    0.0,
                );
            }
            ("#X", Some("connect")) => {
                let canvas = current_canvas(&mut stack, line)?;
                if words.len() < 6 {
                    return Err(Error::parse("malformed #X connect statement", line));
                }
                let from_node = words[2]
                    .parse::<usize>()
                    .map_err(|_| Error::parse("bad connect source index", line))?;
                let from_outlet = words[3]
                    .parse::<usize>()
                    .map_err(|_| Error::parse("bad connect source outlet", line))?;
                let to_node = words[4]
                    .parse::<usize>()
                    .map_err(|_| Error::parse("bad connect target index", line))?;
                let to_inlet = words[5]
                    .parse::<usize>()
                    .map_err(|_| Error::parse("bad connect target inlet", line))?;
                canvas
                    .connections
                    .push(Connection::new(from_node, from_outlet, to_node, to_inlet));
            }
            ("#A", _) => {
                let canvas = current_canvas(&mut stack, line)?;
                let continuation_tokens = parse_tokens(&words[1..]);
                match canvas.nodes.iter_mut().rev().find(|n| matches!(n.kind, NodeKind::Array { .. })) {
                    Some(Node {
                        kind: NodeKind::Array { continuation, .. },
                        ..
                    }) => continuation.push(continuation_tokens),
                    _ => warn!(line, "#A continuation with no preceding array node, ignoring"),
                }
            }
            (other, _) => {
                warn!(line, prefix = other, "unrecognized statement prefix, skipping");
            }
        }
    }

    if root.is_none() && stack.len() == 1 {
        // Only the root canvas remains open: that's the success path for a
        // patch with no subpatches, since `#X restore` never pops it.
        root = stack.pop();
    }

    match root {
        Some(root) => {
            if !stack.is_empty() {
                return Err(Error::new(
                    crate::error::ErrorKind::ParseError,
                    "unterminated subpatch at end of input",
                ));
            }
            Ok(Patch::new(root))
        }
        None => {
            if stack.len() > 1 {
                Err(Error::new(
                    crate::error::ErrorKind::ParseError,
                    "unterminated subpatch at end of input",
                ))
            } else {
                Err(Error::new(crate::error::ErrorKind::ParseError, "no root canvas found"))
            }
        }
    }
}

fn current_canvas<'a>(stack: &'a mut [Canvas], line: usize) -> Result<&'a mut Canvas> {
    stack.last_mut().ok_or_else(|| Error::parse("statement outside any canvas", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_signal_chain() {
        let src = "#N canvas 0 50 800 600 12;\n\
                    #X obj 50 50 osc~ 440;\n\
                    #X obj 50 100 *~ 0.1;\n\
                    #X obj 50 150 dac~;\n\
                    #X connect 0 0 1 0;\n\
                    #X connect 1 0 2 0;\n\
                    #X connect 1 0 2 1;\n";
        let patch = parse(src).unwrap();
        assert_eq!(patch.root.nodes.len(), 3);
        assert_eq!(patch.root.connections.len(), 3);
        assert_eq!(patch.root.nodes[0].name(), Some("osc~"));
    }

    #[test]
    fn missing_root_canvas_is_an_error() {
        let err = parse("#X obj 0 0 osc~;\n").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ParseError);
    }

    #[test]
    fn unterminated_subpatch_is_an_error() {
        let src = "#N canvas 0 0 100 100 12;\n#N canvas 0 0 100 100 12;\n#X obj 0 0 osc~;\n";
        let err = parse(src).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ParseError);
    }

    #[test]
    fn subpatch_round_trips_into_pd_node_and_child_canvas() {
        let src = "#N canvas 0 0 400 300 12;\n\
                    #N canvas 100 100 300 300 12;\n\
                    #X obj 10 10 inlet;\n\
                    #X restore 50 50 pd sub1;\n";
        let patch = parse(src).unwrap();
        assert_eq!(patch.root.nodes.len(), 1);
        assert_eq!(patch.root.nodes[0].name(), Some("pd"));
        assert_eq!(patch.root.canvases.len(), 1);
        assert_eq!(patch.root.canvases[0].name.as_deref(), Some("sub1"));
    }

    #[test]
    fn array_continuation_attaches_to_last_array_node() {
        let src = "#N canvas 0 0 400 300 12;\n\
                    #X array mytable 4 float 0;\n\
                    #A 0 1 2 3 4;\n";
        let patch = parse(src).unwrap();
        match &patch.root.nodes[0].kind {
            NodeKind::Array { continuation, .. } => {
                assert_eq!(continuation.len(), 1);
                assert_eq!(continuation[0].len(), 5);
            }
            _ => panic!("expected array node"),
        }
    }

    #[test]
    fn escaped_semicolon_survives_as_literal_token() {
        let src = "#N canvas 0 0 400 300 12;\n#X msg 0 0 hello \\; world;\n";
        let patch = parse(src).unwrap();
        match &patch.root.nodes[0].kind {
            NodeKind::Msg { tokens } => {
                assert!(tokens.iter().any(|t| t.as_str() == Some(";")));
            }
            _ => panic!("expected msg node"),
        }
    }

    #[test]
    fn unknown_prefix_is_skipped_not_fatal() {
        let src = "#N canvas 0 0 400 300 12;\n#Z future-extension 1 2 3;\n#X obj 0 0 osc~;\n";
        let patch = parse(src).unwrap();
        assert_eq!(patch.root.nodes.len(), 1);
    }
}
