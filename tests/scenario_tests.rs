//! Integration tests for the parser/registry/validator/analyzer/composer
//! pipeline, one per documented end-to-end scenario.

use patchkit::analyzer::{analyze, ComplexityLabel};
use patchkit::composer::{compose, ComposerConfig, ControllerConfig, DeviceControl, ModuleSpec, WireSpec};
use patchkit::parser::parse;
use patchkit::registry::resolve_port_counts;
use patchkit::serializer::serialize;
use patchkit::template::drums::{build as build_drums, DrumsParams};
use patchkit::validator::validate;
use serde_json::json;

const MINIMAL_CHAIN: &str = "#N canvas 0 50 800 600 12;\n\
    #X obj 50 50 osc~ 440;\n\
    #X obj 50 100 *~ 0.1;\n\
    #X obj 50 150 dac~;\n\
    #X connect 0 0 1 0;\n\
    #X connect 1 0 2 0;\n\
    #X connect 1 0 2 1;\n";

#[test]
fn scenario_1_minimal_signal_chain() {
    let patch = parse(MINIMAL_CHAIN).unwrap();
    assert_eq!(patch.root.nodes.len(), 3);
    assert_eq!(patch.root.connections.len(), 3);

    let validation = validate(&patch);
    assert!(validation.valid);

    let analysis = analyze(&patch.root);
    assert!(!analysis.has_cycles);
    assert_eq!(analysis.execution_order, vec![0, 1, 2]);
    assert_eq!(analysis.dsp_chains.len(), 1);
    assert_eq!(analysis.dsp_chains[0].names.first().map(String::as_str), Some("osc~"));
    assert_eq!(analysis.dsp_chains[0].names.last().map(String::as_str), Some("dac~"));
    assert!(matches!(analysis.complexity.label, ComplexityLabel::Trivial | ComplexityLabel::Simple));
}

#[test]
fn scenario_2_broken_connection_is_reported() {
    let broken = MINIMAL_CHAIN.replace("#X connect 1 0 2 1;", "#X connect 1 0 9 1;");
    let patch = parse(&broken).unwrap();
    let validation = validate(&patch);
    assert!(!validation.valid);
    assert!(validation.issues.iter().any(|i| i.code == "BROKEN_CONNECTION_TARGET"));
}

#[test]
fn scenario_3_variable_arity_select_resolution() {
    let src = "#N canvas 0 50 800 600 12;\n#X obj 50 50 select 0 1 2 3;\n";
    let patch = parse(src).unwrap();
    let counts = resolve_port_counts(&patch.root.nodes[0]).unwrap();
    assert_eq!(counts.inlets, 2);
    assert_eq!(counts.outlets, 5);

    let src_empty = "#N canvas 0 50 800 600 12;\n#X obj 50 50 select;\n";
    let patch_empty = parse(src_empty).unwrap();
    let counts_empty = resolve_port_counts(&patch_empty.root.nodes[0]).unwrap();
    assert_eq!(counts_empty.inlets, 2);
    assert_eq!(counts_empty.outlets, 2);
}

#[test]
fn scenario_4_drum_machine_choke_message_wires_ch_into_oh() {
    let params = DrumsParams::from_map(json!({ "voices": ["ch", "oh"] }).as_object().unwrap()).unwrap();
    let fragment = build_drums(&params);

    let choke_nodes: Vec<usize> = fragment
        .patch_spec
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| match &n.kind {
            patchkit::ast::NodeKind::Msg { tokens } => {
                if tokens.first().and_then(|t| t.as_f64()) == Some(0.0) && tokens.get(1).and_then(|t| t.as_f64()) == Some(5.0) {
                    Some(i)
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect();
    assert_eq!(choke_nodes.len(), 1);

    let choke_node = choke_nodes[0];
    let feeds_in = fragment.patch_spec.connections.iter().any(|c| c.to_node == choke_node);
    let feeds_out = fragment.patch_spec.connections.iter().any(|c| c.from_node == choke_node);
    assert!(feeds_in, "choke message must be triggered by the CH voice");
    assert!(feeds_out, "choke message must feed the OH envelope ramp generator");
}

#[test]
fn scenario_5_rack_composition_injects_one_bus_and_reroutes_endpoints() {
    let modules = vec![
        ModuleSpec {
            template: "synth".to_string(),
            params: json!({}),
            id: Some("s".to_string()),
            filename: None,
        },
        ModuleSpec {
            template: "mixer".to_string(),
            params: json!({ "channels": 2 }),
            id: Some("m".to_string()),
            filename: None,
        },
    ];
    let wires = vec![WireSpec {
        from: "s".to_string(),
        output: "audio".to_string(),
        to: "m".to_string(),
        input: "ch1".to_string(),
    }];

    let result = compose(modules, wires, None, ComposerConfig::default()).unwrap();
    let patch = parse(&result.combined).unwrap();

    let send_count = patch.root.nodes.iter().filter(|n| n.name() == Some("send~")).count();
    let receive_count = patch.root.nodes.iter().filter(|n| n.name() == Some("receive~")).count();
    assert_eq!(send_count, 1);
    assert_eq!(receive_count, 1);

    let node_count = patch.root.nodes.len();
    for c in &patch.root.connections {
        assert!(c.from_node < node_count);
        assert!(c.to_node < node_count);
    }
}

#[test]
fn scenario_6_controller_injection_wires_named_receives_into_synth_parameters() {
    let modules = vec![ModuleSpec {
        template: "synth".to_string(),
        params: json!({}),
        id: Some("s".to_string()),
        filename: None,
    }];
    let controller = ControllerConfig {
        device: "k2".to_string(),
        midi_channel: None,
        controls: vec![
            DeviceControl { name: "knob1".into(), category: "filter".into() },
            DeviceControl { name: "knob2".into(), category: "amplitude".into() },
        ],
        mappings: vec![],
    };

    let result = compose(modules, vec![], Some(controller), ComposerConfig::default()).unwrap();
    let patch = parse(&result.combined).unwrap();

    let receive_names: Vec<String> = patch
        .root
        .nodes
        .iter()
        .filter(|n| n.name() == Some("receive"))
        .filter_map(|n| n.args().first().and_then(|t| t.as_str()).map(String::from))
        .collect();
    assert!(receive_names.contains(&"s__p__cutoff".to_string()));
    assert!(receive_names.contains(&"s__p__amplitude".to_string()));
}

#[test]
fn universal_round_trip_is_stable_modulo_canonicalization() {
    let patch = parse(MINIMAL_CHAIN).unwrap();
    let once = serialize(&patch);
    let twice = serialize(&parse(&once).unwrap());
    assert_eq!(once, twice);
}

#[test]
fn universal_validator_is_idempotent() {
    let patch = parse(MINIMAL_CHAIN).unwrap();
    let first = validate(&patch);
    let second = validate(&patch);
    assert_eq!(first.valid, second.valid);
    assert_eq!(first.issues.len(), second.issues.len());
}
