//! The shared AST spine: `Patch` owns one root `Canvas`, canvases own nodes,
//! connections, and nested (subpatch) canvases.

use serde::{Deserialize, Serialize};

/// A single argument token: either a number or a bare symbol.
///
/// Numeric tokens are stored as `f64` rather than retaining their original
/// decimal spelling; round-tripping through [`crate::serializer`] is allowed
/// to canonicalize formatting (see SPEC_FULL.md §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    Number(f64),
    Symbol(String),
}

impl Token {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Token::Number(n) => Some(*n),
            Token::Symbol(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Symbol(s) => Some(s),
            Token::Number(_) => None,
        }
    }

    /// Parse a raw word into a `Token`, preferring `Number` when the text
    /// parses cleanly as a float.
    pub fn parse(word: &str) -> Token {
        match word.parse::<f64>() {
            Ok(n) if !word.is_empty() => Token::Number(n),
            _ => Token::Symbol(word.to_string()),
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", format_number(*n)),
            Token::Symbol(s) => write!(f, "{s}"),
        }
    }
}

/// Canonical numeric formatting used throughout serialization: integers
/// print without a decimal point, everything else to 6 significant
/// fractional digits with trailing zeros trimmed.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let s = format!("{n:.6}");
        let trimmed = s.trim_end_matches('0');
        let trimmed = trimmed.trim_end_matches('.');
        trimmed.to_string()
    }
}

/// A placed element within a canvas's node sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Equals this node's 0-based index within its canvas's node sequence.
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Obj {
        name: String,
        args: Vec<Token>,
    },
    Msg {
        tokens: Vec<Token>,
    },
    FloatAtom {
        /// Everything after `x y` in the original statement (width, min, max,
        /// position flag, label, send/receive names) retained verbatim.
        extra: Vec<Token>,
    },
    SymbolAtom {
        extra: Vec<Token>,
    },
    /// A comment. Never an orphan, never connected.
    Text {
        tokens: Vec<Token>,
    },
    Array {
        name: String,
        size: i64,
        array_type: String,
        flags: Vec<Token>,
        /// Raw `#A` continuation statements attached to this array, each
        /// stored as the statement's token sequence (minus the `#A` tag),
        /// retained so the serializer can re-emit them losslessly.
        continuation: Vec<Vec<Token>>,
    },
}

impl Node {
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Obj { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Token] {
        match &self.kind {
            NodeKind::Obj { args, .. } => args,
            _ => &[],
        }
    }

    pub fn kind_tag(&self) -> &'static str {
        match &self.kind {
            NodeKind::Obj { .. } => "obj",
            NodeKind::Msg { .. } => "msg",
            NodeKind::FloatAtom { .. } => "floatatom",
            NodeKind::SymbolAtom { .. } => "symbolatom",
            NodeKind::Text { .. } => "text",
            NodeKind::Array { .. } => "array",
        }
    }
}

/// A directed edge within one canvas: `(fromNode, fromOutlet) -> (toNode, toInlet)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: usize,
    pub from_outlet: usize,
    pub to_node: usize,
    pub to_inlet: usize,
}

impl Connection {
    pub fn new(from_node: usize, from_outlet: usize, to_node: usize, to_inlet: usize) -> Self {
        Self {
            from_node,
            from_outlet,
            to_node,
            to_inlet,
        }
    }
}

/// A rectangular container: owns nodes, connections, and nested (subpatch)
/// canvases. Nested canvases form a tree, never a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub font_size: f64,
    pub name: Option<String>,
    pub is_subpatch: bool,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    pub canvases: Vec<Canvas>,
}

impl Canvas {
    pub fn new_root(x: f64, y: f64, width: f64, height: f64, font_size: f64) -> Self {
        Self {
            id: 0,
            x,
            y,
            width,
            height,
            font_size,
            name: None,
            is_subpatch: false,
            nodes: Vec::new(),
            connections: Vec::new(),
            canvases: Vec::new(),
        }
    }

    /// Append a node, assigning it the next dense index.
    pub fn push_node(&mut self, kind: NodeKind, x: f64, y: f64) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node { id, x, y, kind });
        id
    }

    /// Find a child canvas whose `name` matches, used to resolve a `pd`
    /// node's subpatch by index at the moment of use (no back-pointers).
    pub fn find_subpatch(&self, name: &str) -> Option<&Canvas> {
        self.canvases.iter().find(|c| c.name.as_deref() == Some(name))
    }

    /// Recurse DFS pre-order over this canvas and all nested canvases.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Canvas)) {
        f(self);
        for child in &self.canvases {
            child.walk(f);
        }
    }

    pub fn max_subpatch_depth(&self) -> usize {
        self.canvases
            .iter()
            .map(|c| 1 + c.max_subpatch_depth())
            .max()
            .unwrap_or(0)
    }
}

/// Top-level container: owns exactly one root canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub root: Canvas,
}

impl Patch {
    pub fn new(root: Canvas) -> Self {
        Self { root }
    }
}
