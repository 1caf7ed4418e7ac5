//! Static object catalogue and port-count resolver.
//!
//! Grounded on `ekg-phonon/src/signal_graph.rs`'s static `ProcessorType`/
//! `SourceType` tables and the teacher's own use of `lazy_static` for
//! process-global data (e.g. scale tables in `pattern_tonal.rs`). The
//! registry here is initialized once per process and is read-only
//! afterward, as required by SPEC_FULL.md §3.2/§5.

use crate::ast::{Node, NodeKind, Token};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};

/// One inlet/outlet-count rule, applied to a node's argument list.
#[derive(Clone, Copy)]
pub enum PortCountRule {
    /// A constant port count.
    Fixed(usize),
    /// `max(argCount + offset, min)`.
    ArgsPlus { offset: i64, min: usize },
    /// A special-case function of the argument list.
    Custom(fn(&[Token]) -> usize),
}

impl PortCountRule {
    pub fn resolve(&self, args: &[Token]) -> usize {
        match self {
            PortCountRule::Fixed(n) => *n,
            PortCountRule::ArgsPlus { offset, min } => {
                let n = args.len() as i64 + offset;
                (n.max(0) as usize).max(*min)
            }
            PortCountRule::Custom(f) => f(args),
        }
    }
}

/// Whether a registered object operates on audio-rate signals or
/// control-rate messages. Connections between two audio-tagged objects are
/// tagged `audio` edges by the analyzer; everything else is `control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Audio,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Oscillator,
    Filter,
    Effect,
    Math,
    MessageControl,
    DataFlow,
    Gui,
    AudioIo,
    Wireless,
    ArrayData,
    Timing,
    Subpatch,
}

pub struct ObjectDef {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub category: Category,
    pub signal_type: SignalType,
    pub inlets: PortCountRule,
    pub outlets: PortCountRule,
    pub default_inlets: usize,
    pub default_outlets: usize,
}

/// Resolved inlet/outlet counts for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCounts {
    pub inlets: usize,
    pub outlets: usize,
}

fn channel_args(args: &[Token]) -> usize {
    if args.is_empty() {
        2
    } else {
        args.len()
    }
}

fn selector_outlets(args: &[Token]) -> usize {
    (args.len() + 1).max(2)
}

fn pack_ports(args: &[Token]) -> usize {
    args.len().max(2)
}

fn trigger_outlets(args: &[Token]) -> usize {
    args.len().max(2)
}

macro_rules! def {
    ($canonical:expr, $aliases:expr, $category:expr, $signal:expr,
     $inlets:expr, $outlets:expr, $def_in:expr, $def_out:expr) => {
        ObjectDef {
            canonical: $canonical,
            aliases: $aliases,
            category: $category,
            signal_type: $signal,
            inlets: $inlets,
            outlets: $outlets,
            default_inlets: $def_in,
            default_outlets: $def_out,
        }
    };
}

lazy_static! {
    static ref OBJECTS: Vec<ObjectDef> = build_objects();
    static ref ALIASES: HashMap<&'static str, &'static str> = build_aliases();
    static ref BY_NAME: HashMap<&'static str, usize> = build_index();

    /// Names whose connections are exempt from the `ORPHAN_OBJECT` check:
    /// wireless send/receive, data-by-name objects, fire-and-forget objects
    /// and GUI objects all legitimately have no wires in a well-formed patch.
    pub static ref ORPHAN_EXEMPT: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for name in WIRELESS_NAMES.iter().chain(FIRE_AND_FORGET.iter())
            .chain(GUI_OBJECTS.iter()).chain(TABLE_OBJECTS.iter())
        {
            s.insert(*name);
        }
        s.insert("pd");
        s
    };

    /// Object names considered legitimate audio-signal chain termination
    /// points for both the `NO_DSP_SINK` validator check and the analyzer's
    /// DSP-chain DFS.
    pub static ref AUDIO_SINKS: HashSet<&'static str> =
        ["dac~", "writesf~", "tabwrite~", "throw~", "send~", "outlet~"].into_iter().collect();

    /// Object names the analyzer's DSP-chain DFS starts from.
    pub static ref AUDIO_SOURCES: HashSet<&'static str> =
        ["osc~", "phasor~", "noise~", "adc~", "readsf~", "tabread~", "tabosc4~",
         "tabplay~", "catch~", "receive~", "inlet~"].into_iter().collect();
}

/// Objects whose first argument names a shared table/array resource; the
/// rack composer suffixes this argument per-module to avoid cross-module
/// collisions (SPEC_FULL.md §9 "Global-name collisions").
pub const TABLE_OBJECTS: &[&str] = &["tabwrite~", "tabread~", "tabread4~", "tabosc4~", "tabplay~", "soundfiler", "tabread"];

const WIRELESS_NAMES: &[&str] = &["s", "send", "r", "receive", "throw~", "catch~", "send~", "receive~"];
const FIRE_AND_FORGET: &[&str] = &["loadbang"];
const GUI_OBJECTS: &[&str] = &["bng", "tgl", "nbx", "hsl", "vsl", "hradio", "vradio", "vu", "cnv"];

fn build_objects() -> Vec<ObjectDef> {
    use Category::*;
    use PortCountRule::*;
    use SignalType::*;

    vec![
        // --- Oscillators / generators (audio) ---
        def!("osc~", &["sine~"], Oscillator, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("phasor~", &[], Oscillator, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("saw~", &[], Oscillator, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("square~", &[], Oscillator, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("tri~", &[], Oscillator, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("noise~", &[], Oscillator, Audio, Fixed(0), Fixed(1), 0, 1),
        def!("sig~", &[], Oscillator, Audio, Fixed(1), Fixed(1), 1, 1),

        // --- Filters / effects (audio) ---
        def!("lop~", &[], Filter, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("hip~", &[], Filter, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("bp~", &[], Filter, Audio, Fixed(3), Fixed(1), 3, 1),
        def!("vcf~", &[], Filter, Audio, Fixed(3), Fixed(2), 3, 2),
        def!("rzero~", &[], Filter, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("rpole~", &[], Filter, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("czero~", &[], Filter, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("cpole~", &[], Filter, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("*~", &[], Math, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("+~", &[], Math, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("-~", &[], Math, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("/~", &[], Math, Audio, Fixed(2), Fixed(1), 2, 1),
        def!(">~", &[], Math, Audio, Fixed(2), Fixed(1), 2, 1),
        def!("clip~", &[], Filter, Audio, Fixed(3), Fixed(1), 3, 1),
        def!("delwrite~", &[], Effect, Audio, Fixed(1), Fixed(0), 1, 0),
        def!("delread~", &[], Effect, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("vd~", &[], Effect, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("line~", &[], Effect, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("vline~", &[], Effect, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("env~", &[], Effect, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("samphold~", &[], Effect, Audio, Fixed(2), Fixed(1), 2, 1),

        // --- Audio I/O ---
        def!("dac~", &[], AudioIo, Audio, Custom(channel_args), Fixed(0), 2, 0),
        def!("adc~", &[], AudioIo, Audio, Fixed(0), Custom(channel_args), 0, 2),
        def!("readsf~", &[], AudioIo, Audio, Fixed(1), Custom(channel_args), 1, 2),
        def!("writesf~", &[], AudioIo, Audio, Custom(channel_args), Fixed(0), 2, 0),
        def!("tabwrite~", &[], ArrayData, Audio, Fixed(1), Fixed(0), 1, 0),
        def!("tabread~", &[], ArrayData, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("tabread4~", &[], ArrayData, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("tabosc4~", &[], ArrayData, Audio, Fixed(1), Fixed(1), 1, 1),
        def!("tabplay~", &[], ArrayData, Audio, Fixed(1), Fixed(2), 1, 2),
        def!("soundfiler", &[], ArrayData, Control, Fixed(1), Fixed(1), 1, 1),
        def!("tabread", &[], ArrayData, Control, Fixed(1), Fixed(1), 1, 1),

        // --- Wireless buses ---
        def!("throw~", &[], Wireless, Audio, Fixed(1), Fixed(0), 1, 0),
        def!("catch~", &[], Wireless, Audio, Fixed(0), Fixed(1), 0, 1),
        def!("send~", &["s~"], Wireless, Audio, Fixed(1), Fixed(0), 1, 0),
        def!("receive~", &["r~"], Wireless, Audio, Fixed(0), Fixed(1), 0, 1),
        def!("send", &["s"], Wireless, Control, Fixed(1), Fixed(0), 1, 0),
        def!("receive", &["r"], Wireless, Control, Fixed(0), Fixed(1), 0, 1),

        // --- Subpatch I/O (nodes that live inside a subpatch canvas) ---
        def!("inlet", &[], Subpatch, Control, Fixed(0), Fixed(1), 0, 1),
        def!("inlet~", &[], Subpatch, Audio, Fixed(0), Fixed(1), 0, 1),
        def!("outlet", &[], Subpatch, Control, Fixed(1), Fixed(0), 1, 0),
        def!("outlet~", &[], Subpatch, Audio, Fixed(1), Fixed(0), 1, 0),

        // --- Control math ---
        def!("+", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("-", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("*", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("/", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("mod", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("pow", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("min", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("max", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("abs", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("sqrt", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("exp", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("log", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("sin", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("cos", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("tan", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("atan", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("atan2", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),
        def!("mtof", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("ftom", &[], Math, Control, Fixed(1), Fixed(1), 1, 1),
        def!("clip", &[], Math, Control, Fixed(3), Fixed(1), 3, 1),
        def!("random", &[], Math, Control, Fixed(2), Fixed(1), 2, 1),

        // --- Message / control flow ---
        def!("float", &["f"], MessageControl, Control, Fixed(2), Fixed(1), 2, 1),
        def!("symbol", &[], MessageControl, Control, Fixed(2), Fixed(1), 2, 1),
        def!("int", &["i"], MessageControl, Control, Fixed(2), Fixed(1), 2, 1),
        def!("bang", &["b"], MessageControl, Control, Fixed(1), Fixed(1), 1, 1),
        def!("loadbang", &[], MessageControl, Control, Fixed(0), Fixed(1), 0, 1),
        def!("print", &[], MessageControl, Control, Fixed(1), Fixed(0), 1, 0),
        def!("select", &["sel"], MessageControl, Control, Fixed(2), Custom(selector_outlets), 2, 2),
        def!("route", &[], MessageControl, Control, Fixed(1), Custom(selector_outlets), 1, 2),
        def!("trigger", &["t"], MessageControl, Control, Fixed(1), Custom(trigger_outlets), 1, 2),
        def!("pack", &[], DataFlow, Control, Custom(pack_ports), Fixed(1), 2, 1),
        def!("unpack", &[], DataFlow, Control, Fixed(1), Custom(pack_ports), 1, 2),
        def!("list", &[], DataFlow, Control, Fixed(1), Fixed(1), 1, 1),
        def!("moses", &[], MessageControl, Control, Fixed(2), Fixed(2), 2, 2),
        def!("spigot", &[], MessageControl, Control, Fixed(2), Fixed(1), 2, 1),
        def!("change", &[], MessageControl, Control, Fixed(1), Fixed(1), 1, 1),
        def!("expr", &[], Math, Control, ArgsPlus { offset: 0, min: 1 }, Fixed(1), 1, 1),

        // --- Timing ---
        def!("metro", &[], Timing, Control, Fixed(2), Fixed(1), 2, 1),
        def!("delay", &["del"], Timing, Control, Fixed(2), Fixed(1), 2, 1),
        def!("timer", &[], Timing, Control, Fixed(2), Fixed(1), 2, 1),
        def!("pipe", &[], Timing, Control, Fixed(2), Fixed(1), 2, 1),
        def!("line_ctl", &[], Timing, Control, Fixed(2), Fixed(1), 2, 1),
        def!("counter", &[], Timing, Control, Fixed(3), Fixed(2), 3, 2),

        // --- GUI ---
        def!("bng", &[], Gui, Control, Fixed(1), Fixed(1), 1, 1),
        def!("tgl", &[], Gui, Control, Fixed(1), Fixed(1), 1, 1),
        def!("nbx", &[], Gui, Control, Fixed(1), Fixed(1), 1, 1),
        def!("hsl", &[], Gui, Control, Fixed(1), Fixed(1), 1, 1),
        def!("vsl", &[], Gui, Control, Fixed(1), Fixed(1), 1, 1),
        def!("hradio", &[], Gui, Control, Fixed(1), Fixed(1), 1, 1),
        def!("vradio", &[], Gui, Control, Fixed(1), Fixed(1), 1, 1),
        def!("vu", &[], Gui, Control, Fixed(1), Fixed(2), 1, 2),
        def!("cnv", &[], Gui, Control, Fixed(0), Fixed(0), 0, 0),

        // --- MIDI ---
        def!("notein", &[], MessageControl, Control, Fixed(0), Fixed(3), 0, 3),
        def!("noteout", &[], MessageControl, Control, Fixed(3), Fixed(0), 3, 0),
        def!("ctlin", &[], MessageControl, Control, Fixed(0), Fixed(3), 0, 3),
        def!("ctlout", &[], MessageControl, Control, Fixed(3), Fixed(0), 3, 0),
        def!("bendin", &[], MessageControl, Control, Fixed(0), Fixed(2), 0, 2),
        def!("bendout", &[], MessageControl, Control, Fixed(2), Fixed(0), 2, 0),

        // --- Network bridge ---
        def!("netreceive", &[], MessageControl, Control, Fixed(2), Fixed(2), 2, 2),
        def!("netsend", &[], MessageControl, Control, Fixed(1), Fixed(0), 1, 0),
        def!("oscparse", &[], MessageControl, Control, Fixed(1), Fixed(1), 1, 1),
        def!("oscformat", &[], MessageControl, Control, Fixed(1), Fixed(1), 1, 1),
    ]
}

fn build_aliases() -> HashMap<&'static str, &'static str> {
    let mut m = HashMap::new();
    for def in OBJECTS.iter() {
        for alias in def.aliases {
            m.insert(*alias, def.canonical);
        }
    }
    m
}

fn build_index() -> HashMap<&'static str, usize> {
    OBJECTS
        .iter()
        .enumerate()
        .map(|(i, def)| (def.canonical, i))
        .collect()
}

/// Resolve a surface name (alias or canonical) to its registry entry.
pub fn lookup(name: &str) -> Option<&'static ObjectDef> {
    let canonical = ALIASES.get(name).copied().unwrap_or(name);
    BY_NAME.get(canonical).map(|&i| &OBJECTS[i])
}

pub fn canonical_name(name: &str) -> &str {
    ALIASES.get(name).copied().unwrap_or(name)
}

/// `resolvePortCounts(Node) -> Option<{inlets, outlets}>` (SPEC_FULL.md §4.2).
pub fn resolve_port_counts(node: &Node) -> Option<PortCounts> {
    match &node.kind {
        NodeKind::Obj { name, args } => {
            let def = lookup(name)?;
            Some(PortCounts {
                inlets: def.inlets.resolve(args),
                outlets: def.outlets.resolve(args),
            })
        }
        NodeKind::Msg { .. } | NodeKind::FloatAtom { .. } | NodeKind::SymbolAtom { .. } => {
            Some(PortCounts { inlets: 1, outlets: 1 })
        }
        NodeKind::Text { .. } | NodeKind::Array { .. } => Some(PortCounts { inlets: 0, outlets: 0 }),
    }
}

/// `resolveSubpatchPorts(Canvas) -> {inlets, outlets}`: counts `inlet`/
/// `inlet~` and `outlet`/`outlet~` nodes within a canvas.
pub fn resolve_subpatch_ports(canvas: &crate::ast::Canvas) -> PortCounts {
    let mut inlets = 0;
    let mut outlets = 0;
    for node in &canvas.nodes {
        if let Some(name) = node.name() {
            match canonical_name(name) {
                "inlet" | "inlet~" => inlets += 1,
                "outlet" | "outlet~" => outlets += 1,
                _ => {}
            }
        }
    }
    PortCounts { inlets, outlets }
}

pub fn is_audio_object(name: &str) -> bool {
    lookup(name).map(|d| d.signal_type == SignalType::Audio).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn obj_node(name: &str, args: Vec<Token>) -> Node {
        Node {
            id: 0,
            x: 0.0,
            y: 0.0,
            kind: NodeKind::Obj {
                name: name.to_string(),
                args,
            },
        }
    }

    #[test]
    fn select_variable_arity() {
        let node = obj_node("select", vec![Token::Number(0.0), Token::Number(1.0), Token::Number(2.0), Token::Number(3.0)]);
        let counts = resolve_port_counts(&node).unwrap();
        assert_eq!(counts, PortCounts { inlets: 2, outlets: 5 });
    }

    #[test]
    fn select_zero_args_enforces_minimum() {
        let node = obj_node("select", vec![]);
        let counts = resolve_port_counts(&node).unwrap();
        assert_eq!(counts, PortCounts { inlets: 2, outlets: 2 });
    }

    #[test]
    fn dac_defaults_to_stereo() {
        let node = obj_node("dac~", vec![]);
        assert_eq!(resolve_port_counts(&node).unwrap().inlets, 2);
    }

    #[test]
    fn dac_channel_count_follows_args() {
        let node = obj_node("dac~", vec![Token::Number(1.0), Token::Number(2.0), Token::Number(3.0)]);
        assert_eq!(resolve_port_counts(&node).unwrap().inlets, 3);
    }

    #[test]
    fn unknown_object_resolves_to_none() {
        let node = obj_node("definitely_not_registered", vec![]);
        assert!(resolve_port_counts(&node).is_none());
    }

    #[test]
    fn alias_resolves_to_canonical() {
        assert_eq!(canonical_name("sel"), "select");
        assert_eq!(canonical_name("t"), "trigger");
        assert_eq!(canonical_name("s"), "send");
    }

    #[test]
    fn trigger_outlets_minimum_two() {
        let node = obj_node("t", vec![]);
        assert_eq!(resolve_port_counts(&node).unwrap().outlets, 2);
        let node = obj_node("t", vec![Token::Symbol("b".into()), Token::Symbol("f".into()), Token::Symbol("f".into())]);
        assert_eq!(resolve_port_counts(&node).unwrap().outlets, 3);
    }

    #[test]
    fn port_count_monotonicity_for_args_plus() {
        // `expr` is ArgsPlus(0, 1): more args never reduces the inlet count.
        let fewer = obj_node("expr", vec![Token::Symbol("$f1".into())]);
        let more = obj_node(
            "expr",
            vec![Token::Symbol("$f1".into()), Token::Symbol("$f2".into()), Token::Symbol("$f3".into())],
        );
        assert!(resolve_port_counts(&more).unwrap().inlets >= resolve_port_counts(&fewer).unwrap().inlets);
    }

    #[test]
    fn non_obj_nodes_are_one_in_one_out() {
        let node = Node {
            id: 0,
            x: 0.0,
            y: 0.0,
            kind: NodeKind::Msg { tokens: vec![] },
        };
        assert_eq!(resolve_port_counts(&node).unwrap(), PortCounts { inlets: 1, outlets: 1 });
    }

    #[test]
    fn text_and_array_are_zero_zero() {
        let node = Node {
            id: 0,
            x: 0.0,
            y: 0.0,
            kind: NodeKind::Text { tokens: vec![] },
        };
        assert_eq!(resolve_port_counts(&node).unwrap(), PortCounts { inlets: 0, outlets: 0 });
    }
}
