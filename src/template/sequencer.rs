//! Step sequencer (§4.6.2): metro-driven counter, selector, per-step note
//! message, packed MIDI output. Grounded on `superdirt_synths.rs`'s pattern
//! of a counter-plus-selector driving per-step behavior (cf. the teacher's
//! `pattern_euclid.rs` step-indexing helpers for the cyclic-fill idea).

use crate::ast::Token;
use crate::error::Result;
use crate::template::{resolve_enum_option, resolve_f64_range, resolve_list, Direction, Fragment, FragmentBuilder, SignalType};
use serde_json::Value;

const DEFAULT_C_MAJOR: &[i64] = &[60, 62, 64, 65, 67, 69, 71, 72];

pub struct SequencerParams {
    pub steps: usize,
    pub bpm: f64,
    pub notes: Vec<i64>,
    pub midi_channel: i64,
    pub velocity: i64,
}

impl SequencerParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let steps = resolve_f64_range(map, "steps", 8.0, 1.0, 64.0)? as usize;
        let bpm = resolve_f64_range(map, "bpm", 120.0, 0.0001, 10_000.0)?;
        let midi_channel = resolve_f64_range(map, "midiChannel", 1.0, 1.0, 16.0)? as i64;
        let velocity = resolve_f64_range(map, "velocity", 100.0, 0.0, 127.0)? as i64;
        let notes = resolve_list(map, "notes", DEFAULT_C_MAJOR.to_vec(), |v| v.as_i64().filter(|n| (0..=127).contains(n)));
        let _ = resolve_enum_option; // framework helper retained for symmetry with other templates

        Ok(Self {
            steps,
            bpm,
            notes,
            midi_channel,
            velocity,
        })
    }

    fn note_for_step(&self, step: usize) -> i64 {
        self.notes[step % self.notes.len()]
    }
}

/// Structure: loadbang → start message → metro → counter (float + +1 + mod
/// N feedback) → selector per step → per-step note message → packer →
/// note output.
pub fn build(params: &SequencerParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let loadbang = b.obj("loadbang", vec![], 0.0, 0.0);
    let start_msg = b.msg(vec![Token::Number(1.0)], 0.0, 30.0);
    b.wire(loadbang, start_msg);

    let interval_ms = 60_000.0 / params.bpm;
    let metro = b.obj("metro", vec![Token::Number(interval_ms)], 0.0, 60.0);
    b.wire(start_msg, metro);

    let clock_in = b.obj("inlet", vec![], 150.0, 60.0);

    let counter_float = b.obj("float", vec![Token::Number(0.0)], 0.0, 90.0);
    b.wire(metro, counter_float);
    b.wire(clock_in, counter_float);
    let increment = b.obj("+", vec![Token::Number(1.0)], 0.0, 120.0);
    b.wire(counter_float, increment);
    let wrap = b.obj("mod", vec![Token::Number(params.steps as f64)], 0.0, 150.0);
    b.wire(increment, wrap);
    b.wire_ports(wrap, 0, counter_float, 1);

    let step_values: Vec<Token> = (0..params.steps).map(|i| Token::Number(i as f64)).collect();
    let selector = b.obj("select", step_values, 0.0, 180.0);
    b.wire(wrap, selector);

    let packer = b.obj("pack", vec![Token::Number(0.0), Token::Number(0.0), Token::Number(0.0)], 0.0, 260.0);
    for step in 0..params.steps {
        let note = params.note_for_step(step);
        let note_msg = b.msg(
            vec![Token::Number(note as f64), Token::Number(params.velocity as f64), Token::Number(params.midi_channel as f64)],
            (step as f64) * 60.0,
            220.0,
        );
        b.wire_ports(selector, step, note_msg, 0);
        b.wire(note_msg, packer);
    }

    let note_out = b.obj("outlet", vec![], 0.0, 300.0);
    b.wire(packer, note_out);

    b.port("note", SignalType::Control, Direction::Output, packer, 0);
    b.port("clock_in", SignalType::Control, Direction::Input, clock_in, 0);

    b.finish()
}
