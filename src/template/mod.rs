//! Shared fragment-assembly primitives used by every template builder.
//!
//! Grounded on `ekg-phonon/src/superdirt_synths.rs::SynthLibrary`: each
//! builder method there takes `&mut UnifiedSignalGraph` plus typed
//! `Option<T>` parameters defaulted via `.unwrap_or(...)`, and returns a
//! `NodeId`. Here the same shape becomes `&mut FragmentBuilder` plus
//! `add`/`wire`, returning a `Fragment` once the whole voice is built.

pub mod bridge;
pub mod chaos;
pub mod clock;
pub mod drums;
pub mod granular;
pub mod maths;
pub mod mixer;
pub mod reverb;
pub mod sequencer;
pub mod synth;
pub mod turing;

use crate::ast::{Connection, NodeKind, Token};
use crate::error::{Error, ErrorKind, Result};
use crate::serializer::{NodeSpec, PatchSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Audio,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// A named, typed tap on a fragment's internal node graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub signal_type: SignalType,
    pub direction: Direction,
    pub node_index: usize,
    pub port: usize,
    /// When set, points at a terminal I/O sink/source node that a bus
    /// wirer must disconnect when this port is routed through a bus
    /// (SPEC_FULL.md §4.7 step 4).
    pub io_node_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub unit: String,
    pub curve: Curve,
    pub node_index: usize,
    pub inlet: usize,
    pub category: String,
}

/// A template builder's output: a canvas-worth of nodes/connections plus
/// port and parameter metadata (SPEC_FULL.md §3.3).
#[derive(Debug, Clone)]
pub struct Fragment {
    pub patch_spec: PatchSpec,
    pub ports: Vec<Port>,
    pub parameters: Vec<ParameterDescriptor>,
}

/// Accumulates nodes/connections for one fragment. `add` appends a node and
/// returns its index; `wire` appends a connection with default outlet/inlet
/// 0, matching §4.5's shared primitives.
#[derive(Debug, Default)]
pub struct FragmentBuilder {
    spec: PatchSpec,
    ports: Vec<Port>,
    parameters: Vec<ParameterDescriptor>,
}

impl FragmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: NodeKind, x: f64, y: f64) -> usize {
        let index = self.spec.nodes.len();
        self.spec.nodes.push(NodeSpec { kind, x, y });
        index
    }

    pub fn obj(&mut self, name: &str, args: Vec<Token>, x: f64, y: f64) -> usize {
        self.add(NodeKind::Obj { name: name.to_string(), args }, x, y)
    }

    pub fn msg(&mut self, tokens: Vec<Token>, x: f64, y: f64) -> usize {
        self.add(NodeKind::Msg { tokens }, x, y)
    }

    pub fn wire(&mut self, from: usize, to: usize) {
        self.wire_ports(from, 0, to, 0);
    }

    pub fn wire_ports(&mut self, from: usize, outlet: usize, to: usize, inlet: usize) {
        self.spec.connections.push(Connection::new(from, outlet, to, inlet));
    }

    pub fn port(&mut self, name: &str, signal_type: SignalType, direction: Direction, node_index: usize, port: usize) {
        self.ports.push(Port {
            name: name.to_string(),
            signal_type,
            direction,
            node_index,
            port,
            io_node_index: None,
        });
    }

    pub fn port_with_io(&mut self, name: &str, signal_type: SignalType, direction: Direction, node_index: usize, port: usize, io_node_index: usize) {
        self.ports.push(Port {
            name: name.to_string(),
            signal_type,
            direction,
            node_index,
            port,
            io_node_index: Some(io_node_index),
        });
    }

    pub fn parameter(&mut self, name: &str, label: &str, min: f64, max: f64, default: f64, unit: &str, curve: Curve, node_index: usize, inlet: usize, category: &str) {
        self.parameters.push(ParameterDescriptor {
            name: name.to_string(),
            label: label.to_string(),
            min,
            max,
            default,
            unit: unit.to_string(),
            curve,
            node_index,
            inlet,
            category: category.to_string(),
        });
    }

    pub fn finish(self) -> Fragment {
        Fragment {
            patch_spec: self.spec,
            ports: self.ports,
            parameters: self.parameters,
        }
    }
}

// --- Parameter-bundle coercion helpers, shared across `from_map` constructors ---

pub fn get_str<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(|v| v.as_str())
}

pub fn get_f64(map: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(|v| v.as_f64())
}

pub fn get_bool(map: &serde_json::Map<String, Value>, key: &str) -> Option<bool> {
    map.get(key).and_then(|v| v.as_bool())
}

/// Case-insensitive, hyphen-or-underscore-insensitive match against an
/// enumeration of allowed values, per §4.5's "recognized parameter
/// coercion" rule.
pub fn normalize_enum(value: &str) -> String {
    value.to_lowercase().replace('-', "_")
}

pub fn invalid_param(name: &str, reason: &str, allowed: Option<&[&str]>) -> Error {
    let message = match allowed {
        Some(values) => format!("invalid parameter '{name}': {reason} (allowed: {})", values.join(", ")),
        None => format!("invalid parameter '{name}': {reason}"),
    };
    Error::new(ErrorKind::InvalidParam, message)
}

/// Resolve an enum-typed option: accepts a string (normalized and matched
/// against `allowed`), a boolean (mapped to `bool_default` when true, the
/// enum default when false), or absence (enum default).
pub fn resolve_enum_option(
    map: &serde_json::Map<String, Value>,
    key: &str,
    allowed: &[&str],
    default: &str,
    bool_true_value: Option<&str>,
) -> Result<String> {
    match map.get(key) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) => {
            let normalized = normalize_enum(s);
            if allowed.contains(&normalized.as_str()) {
                Ok(normalized)
            } else {
                Err(invalid_param(key, &format!("unrecognized value '{s}'"), Some(allowed)))
            }
        }
        Some(Value::Bool(b)) => {
            if *b {
                Ok(bool_true_value.unwrap_or(default).to_string())
            } else {
                Ok(default.to_string())
            }
        }
        Some(other) => Err(invalid_param(key, &format!("expected a string or boolean, got {other}"), Some(allowed))),
    }
}

pub fn resolve_f64_range(map: &serde_json::Map<String, Value>, key: &str, default: f64, min: f64, max: f64) -> Result<f64> {
    match get_f64(map, key) {
        None => Ok(default),
        Some(v) if v >= min && v <= max => Ok(v),
        Some(v) => Err(invalid_param(key, &format!("{v} is out of range [{min}, {max}]"), None)),
    }
}

/// Resolve a list-typed option; an empty list coerces to `default`.
pub fn resolve_list<T>(map: &serde_json::Map<String, Value>, key: &str, default: Vec<T>, parse_item: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    match map.get(key).and_then(|v| v.as_array()) {
        Some(items) if !items.is_empty() => {
            let parsed: Vec<T> = items.iter().filter_map(&parse_item).collect();
            if parsed.is_empty() {
                default
            } else {
                parsed
            }
        }
        _ => default,
    }
}
