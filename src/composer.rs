//! Rack composer: assembles multiple template fragments into one combined
//! patch, injecting bus routing and controller-parameter receivers.
//!
//! Grounded on `other_examples/.../max2sc-codegen/project_gen.rs::ProjectGenerator`
//! for the multi-file project assembly shape (`output_dir` handling,
//! per-stage `Result<_, CodegenError>` propagation annotated with a path or
//! module index) combined with `ekg-phonon/src/dependency_graph.rs`'s index
//! rewriting discipline.

use crate::ast::{Connection, NodeKind, Token};
use crate::error::{Error, ErrorKind, Result};
use crate::registry::{self, TABLE_OBJECTS};
use crate::serializer::{self, NodeSpec, PatchSpec};
use crate::template::{self, Direction, Fragment, ParameterDescriptor, SignalType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

const COLUMN_WIDTH: f64 = 400.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub template: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSpec {
    pub from: String,
    pub output: String,
    pub to: String,
    pub input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitMapping {
    pub control: String,
    pub module: String,
    pub parameter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceControl {
    pub name: String,
    pub category: String,
}

/// `{ device, midiChannel?, mappings? }` (§6.3). `controls` enumerates the
/// physical device's assignable controls; populating it from a concrete
/// device's control layout is an external collaborator's job (§1 lists
/// device-profile tables as out of scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub device: String,
    #[serde(default)]
    pub midi_channel: Option<u8>,
    #[serde(default)]
    pub controls: Vec<DeviceControl>,
    #[serde(default)]
    pub mappings: Vec<ExplicitMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerMapping {
    pub control: String,
    pub module_id: String,
    pub parameter: String,
    pub bus_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ComposerConfig {
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ComposedModule {
    pub id: String,
    pub filename: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct CompositionResult {
    pub modules: Vec<ComposedModule>,
    pub combined: String,
    pub mappings: Vec<ControllerMapping>,
}

fn build_fragment(template: &str, params: &Value) -> Result<Fragment> {
    let empty = serde_json::Map::new();
    let map = params.as_object().unwrap_or(&empty);
    match template {
        "synth" => template::synth::SynthParams::from_map(map).map(|p| template::synth::build(&p)),
        "sequencer" => template::sequencer::SequencerParams::from_map(map).map(|p| template::sequencer::build(&p)),
        "drum-machine" => template::drums::DrumsParams::from_map(map).map(|p| template::drums::build(&p)),
        "mixer" => template::mixer::MixerParams::from_map(map).map(|p| template::mixer::build(&p)),
        "reverb" => template::reverb::ReverbParams::from_map(map).map(|p| template::reverb::build(&p)),
        "clock" => template::clock::ClockParams::from_map(map).map(|p| template::clock::build(&p)),
        "chaos" => template::chaos::ChaosParams::from_map(map).map(|p| template::chaos::build(&p)),
        "maths" => template::maths::MathsParams::from_map(map).map(|p| template::maths::build(&p)),
        "turing" => template::turing::TuringParams::from_map(map).map(|p| template::turing::build(&p)),
        "granular" => template::granular::GranularParams::from_map(map).map(|p| template::granular::build(&p)),
        "bridge" => template::bridge::BridgeParams::from_map(map).map(|p| template::bridge::build(&p)),
        other => Err(Error::new(ErrorKind::UnknownTemplate, format!("unknown template '{other}'"))),
    }
}

fn compute_ids(modules: &[ModuleSpec]) -> Vec<String> {
    let mut used = HashSet::new();
    let mut ids = Vec::with_capacity(modules.len());
    for m in modules {
        let base = m
            .id
            .clone()
            .or_else(|| m.filename.clone().map(|f| f.trim_end_matches(".pd").to_string()))
            .unwrap_or_else(|| m.template.clone());
        let mut candidate = base.clone();
        let mut suffix = 1;
        while used.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}{suffix}");
        }
        used.insert(candidate.clone());
        ids.push(candidate);
    }
    ids
}

/// Suffix any named-table resource's first argument with `_i` so that two
/// modules never collide on a shared table name (SPEC_FULL.md §9).
fn dedup_table_name(kind: &mut NodeKind, module_index: usize) {
    match kind {
        NodeKind::Obj { name, args } => {
            if TABLE_OBJECTS.contains(&registry::canonical_name(name)) {
                if let Some(Token::Symbol(s)) = args.first_mut() {
                    *s = format!("{s}_{module_index}");
                }
            }
        }
        NodeKind::Array { name, .. } => {
            *name = format!("{name}_{module_index}");
        }
        _ => {}
    }
}

struct Assembled {
    node_offset: usize,
}

fn assemble_combined(modules: &[ModuleSpec], ids: &[String], fragments: &[Fragment]) -> (PatchSpec, Vec<Assembled>) {
    let mut nodes: Vec<NodeSpec> = vec![NodeSpec {
        kind: NodeKind::Text {
            tokens: vec![Token::Symbol("Rack".to_string())],
        },
        x: 20.0,
        y: 10.0,
    }];
    let mut connections: Vec<Connection> = Vec::new();
    let mut assembled = Vec::with_capacity(modules.len());

    for (i, (m, fragment)) in modules.iter().zip(fragments.iter()).enumerate() {
        nodes.push(NodeSpec {
            kind: NodeKind::Text {
                tokens: vec![Token::Symbol(format!("--{}:{}--", ids[i], m.template))],
            },
            x: (i as f64) * COLUMN_WIDTH,
            y: 0.0,
        });
        let offset = nodes.len();

        for node_spec in &fragment.patch_spec.nodes {
            let mut kind = node_spec.kind.clone();
            dedup_table_name(&mut kind, i);
            nodes.push(NodeSpec {
                kind,
                x: node_spec.x + (i as f64) * COLUMN_WIDTH,
                y: node_spec.y,
            });
        }
        for c in &fragment.patch_spec.connections {
            connections.push(Connection::new(c.from_node + offset, c.from_outlet, c.to_node + offset, c.to_inlet));
        }

        assembled.push(Assembled { node_offset: offset });
        info!(module = i, id = %ids[i], template = %m.template, "assembled module into combined patch");
    }

    (PatchSpec { nodes, connections, title: None }, assembled)
}

fn find_module(ids: &[String], id: &str) -> Result<usize> {
    ids.iter()
        .position(|x| x == id)
        .ok_or_else(|| Error::new(ErrorKind::UnknownModule, format!("unknown module '{id}'")))
}

fn find_output_port<'a>(fragment: &'a Fragment, module_id: &str, name: &str) -> Result<&'a template::Port> {
    fragment
        .ports
        .iter()
        .find(|p| p.name == name && matches!(p.direction, Direction::Output))
        .ok_or_else(|| Error::new(ErrorKind::UnknownPort, format!("module '{module_id}' has no output port '{name}'")))
}

fn find_input_port<'a>(fragment: &'a Fragment, module_id: &str, name: &str) -> Result<&'a template::Port> {
    fragment
        .ports
        .iter()
        .find(|p| p.name == name && matches!(p.direction, Direction::Input))
        .ok_or_else(|| Error::new(ErrorKind::UnknownPort, format!("module '{module_id}' has no input port '{name}'")))
}

fn apply_wires(
    wires: &[WireSpec],
    ids: &[String],
    fragments: &[Fragment],
    assembled: &[Assembled],
    spec: &mut PatchSpec,
) -> Result<()> {
    for (n, wire) in wires.iter().enumerate() {
        let from_idx = find_module(ids, &wire.from)?;
        let to_idx = find_module(ids, &wire.to)?;
        let from_port = find_output_port(&fragments[from_idx], &wire.from, &wire.output)?;
        let to_port = find_input_port(&fragments[to_idx], &wire.to, &wire.input)?;

        let is_audio = from_port.signal_type == SignalType::Audio && to_port.signal_type == SignalType::Audio;
        let (send_name, recv_name) = if is_audio { ("send~", "receive~") } else { ("send", "receive") };
        let bus_name = format!("bus__{}_{}__{}_{}__{}", wire.from, wire.output, wire.to, wire.input, n);

        let send_index = spec.nodes.len();
        spec.nodes.push(NodeSpec {
            kind: NodeKind::Obj {
                name: send_name.to_string(),
                args: vec![Token::Symbol(bus_name.clone())],
            },
            x: 0.0,
            y: 0.0,
        });
        let recv_index = spec.nodes.len();
        spec.nodes.push(NodeSpec {
            kind: NodeKind::Obj {
                name: recv_name.to_string(),
                args: vec![Token::Symbol(bus_name.clone())],
            },
            x: 0.0,
            y: 0.0,
        });

        let from_global = from_port.node_index + assembled[from_idx].node_offset;
        let to_global = to_port.node_index + assembled[to_idx].node_offset;
        spec.connections.push(Connection::new(from_global, from_port.port, send_index, 0));
        spec.connections.push(Connection::new(recv_index, 0, to_global, to_port.port));

        if let Some(io_local) = from_port.io_node_index {
            let io_global = io_local + assembled[from_idx].node_offset;
            spec.connections
                .retain(|c| !(c.from_node == from_global && c.from_outlet == from_port.port && c.to_node == io_global));
        }
        if let Some(io_local) = to_port.io_node_index {
            let io_global = io_local + assembled[to_idx].node_offset;
            spec.connections
                .retain(|c| !(c.from_node == io_global && c.to_node == to_global && c.to_inlet == to_port.port));
        }
    }
    Ok(())
}

fn assign_phase(
    controls: &mut Vec<DeviceControl>,
    params: &mut Vec<(usize, ParameterDescriptor)>,
    ids: &[String],
    control_category: Option<&str>,
    param_category: Option<&str>,
    mappings: &mut Vec<ControllerMapping>,
) {
    loop {
        let control_pos = controls.iter().position(|c| control_category.map(|cat| c.category == cat).unwrap_or(true));
        let param_pos = params.iter().position(|(_, p)| param_category.map(|cat| p.category == cat).unwrap_or(true));
        match (control_pos, param_pos) {
            (Some(ci), Some(pi)) => {
                let control = controls.remove(ci);
                let (module_idx, param) = params.remove(pi);
                mappings.push(ControllerMapping {
                    control: control.name,
                    module_id: ids[module_idx].clone(),
                    parameter: param.name.clone(),
                    bus_name: format!("{}__p__{}", ids[module_idx], param.name),
                });
            }
            _ => break,
        }
    }
}

/// Four-phase Controller Auto-Mapper (§4.7): explicit mappings first, then
/// amplitude-to-amplitude, frequency-to-filter, then round-robin leftovers.
fn run_controller_mapping(fragments: &[Fragment], ids: &[String], controller: &ControllerConfig) -> Result<Vec<ControllerMapping>> {
    let mut mappings = Vec::new();
    let mut used_controls: HashSet<String> = HashSet::new();
    let mut used_params: HashSet<(usize, String)> = HashSet::new();

    for m in &controller.mappings {
        let module_idx = find_module(ids, &m.module)?;
        let param = fragments[module_idx]
            .parameters
            .iter()
            .find(|p| p.name == m.parameter)
            .ok_or_else(|| Error::new(ErrorKind::UnknownPort, format!("module '{}' has no parameter '{}'", m.module, m.parameter)))?;
        if !controller.controls.iter().any(|c| c.name == m.control) {
            return Err(Error::new(ErrorKind::UnknownPort, format!("device '{}' has no control '{}'", controller.device, m.control)));
        }
        if !used_controls.insert(m.control.clone()) {
            return Err(Error::new(ErrorKind::DuplicateMapping, format!("control '{}' mapped more than once", m.control)));
        }
        if !used_params.insert((module_idx, param.name.clone())) {
            return Err(Error::new(ErrorKind::DuplicateMapping, format!("parameter '{}' mapped more than once", param.name)));
        }
        mappings.push(ControllerMapping {
            control: m.control.clone(),
            module_id: ids[module_idx].clone(),
            parameter: param.name.clone(),
            bus_name: format!("{}__p__{}", ids[module_idx], param.name),
        });
    }

    let mut leftover_controls: Vec<DeviceControl> = controller.controls.iter().filter(|c| !used_controls.contains(&c.name)).cloned().collect();
    let mut leftover_params: Vec<(usize, ParameterDescriptor)> = fragments
        .iter()
        .enumerate()
        .flat_map(|(i, f)| f.parameters.iter().map(move |p| (i, p.clone())))
        .filter(|(i, p)| !used_params.contains(&(*i, p.name.clone())))
        .collect();

    assign_phase(&mut leftover_controls, &mut leftover_params, ids, Some("amplitude"), Some("amplitude"), &mut mappings);
    assign_phase(&mut leftover_controls, &mut leftover_params, ids, Some("frequency"), Some("filter"), &mut mappings);
    assign_phase(&mut leftover_controls, &mut leftover_params, ids, None, None, &mut mappings);

    if !leftover_controls.is_empty() {
        warn!(unused = leftover_controls.len(), "device controls left unmapped after auto-assignment");
    }

    Ok(mappings)
}

fn apply_controller_mappings(mappings: &[ControllerMapping], ids: &[String], fragments: &[Fragment], assembled: &[Assembled], spec: &mut PatchSpec) {
    for mapping in mappings {
        let module_idx = ids.iter().position(|id| id == &mapping.module_id).expect("mapping module resolved during validation");
        let param = fragments[module_idx]
            .parameters
            .iter()
            .find(|p| p.name == mapping.parameter)
            .expect("mapping parameter resolved during validation");

        let recv_index = spec.nodes.len();
        spec.nodes.push(NodeSpec {
            kind: NodeKind::Obj {
                name: "receive".to_string(),
                args: vec![Token::Symbol(mapping.bus_name.clone())],
            },
            x: 0.0,
            y: 0.0,
        });
        let target_global = param.node_index + assembled[module_idx].node_offset;
        spec.connections.push(Connection::new(recv_index, 0, target_global, param.inlet));
    }
}

fn serialize_module(id: &str, template: &str, fragment: &Fragment) -> String {
    let spec = PatchSpec {
        nodes: fragment.patch_spec.nodes.clone(),
        connections: fragment.patch_spec.connections.clone(),
        title: Some(format!("{id} ({template})")),
    };
    serializer::serialize(&serializer::build_patch(spec))
}

/// Composes `modules` into per-module patches plus one combined patch,
/// applying inter-module wiring and (if given) controller-parameter
/// injection. Returns contents only; writes files when `config.output_dir`
/// is set.
pub fn compose(modules: Vec<ModuleSpec>, wires: Vec<WireSpec>, controller: Option<ControllerConfig>, config: ComposerConfig) -> Result<CompositionResult> {
    let ids = compute_ids(&modules);

    let mut fragments = Vec::with_capacity(modules.len());
    for (i, m) in modules.iter().enumerate() {
        let fragment = build_fragment(&m.template, &m.params).map_err(|e| e.in_module(i, &m.template))?;
        fragments.push(fragment);
    }

    let module_texts: Vec<ComposedModule> = modules
        .iter()
        .zip(fragments.iter())
        .zip(ids.iter())
        .map(|((m, fragment), id)| ComposedModule {
            id: id.clone(),
            filename: m.filename.clone().unwrap_or_else(|| format!("{id}.pd")),
            text: serialize_module(id, &m.template, fragment),
        })
        .collect();

    let (mut spec, assembled) = assemble_combined(&modules, &ids, &fragments);
    apply_wires(&wires, &ids, &fragments, &assembled, &mut spec)?;

    let mappings = match &controller {
        Some(cfg) => {
            let mappings = run_controller_mapping(&fragments, &ids, cfg)?;
            apply_controller_mappings(&mappings, &ids, &fragments, &assembled, &mut spec);
            mappings
        }
        None => Vec::new(),
    };

    let combined = serializer::serialize(&serializer::build_patch(spec));

    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir).map_err(|e| Error::new(ErrorKind::FileIO, e.to_string()).with_context(dir.display().to_string()))?;
        for module in &module_texts {
            let path = dir.join(&module.filename);
            std::fs::write(&path, &module.text).map_err(|e| Error::new(ErrorKind::FileIO, e.to_string()).with_context(path.display().to_string()))?;
        }
        let rack_path = dir.join("_rack.pd");
        std::fs::write(&rack_path, &combined).map_err(|e| Error::new(ErrorKind::FileIO, e.to_string()).with_context(rack_path.display().to_string()))?;
    }

    Ok(CompositionResult {
        modules: module_texts,
        combined,
        mappings,
    })
}
