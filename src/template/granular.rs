//! Granular engine (§4.6.7): a circular audio buffer fed by `tabwrite~`,
//! read by N independently-clocked playback heads at variable pitch with
//! windowed envelopes, summed to output. Grounded on
//! `superdirt_synths.rs`'s multi-voice summation idiom (as in the drum
//! machine's per-voice adder chain), applied here to N grain heads instead
//! of N drum voices.

use crate::error::Result;
use crate::template::{resolve_f64_range, Direction, Fragment, FragmentBuilder, SignalType};
use crate::ast::Token;
use serde_json::Value;

pub struct GranularParams {
    pub heads: usize,
    pub grain_size_ms: f64,
    pub pitch: f64,
    pub buffer_seconds: f64,
}

impl GranularParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        Ok(Self {
            heads: resolve_f64_range(map, "heads", 4.0, 1.0, 32.0)? as usize,
            grain_size_ms: resolve_f64_range(map, "grainSize", 80.0, 1.0, 2_000.0)?,
            pitch: resolve_f64_range(map, "pitch", 1.0, 0.05, 8.0)?,
            buffer_seconds: resolve_f64_range(map, "bufferSize", 2.0, 0.1, 60.0)?,
        })
    }
}

pub fn build(params: &GranularParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let audio_in = b.obj("inlet~", vec![], 0.0, 0.0);
    let buffer_name = "granular_buffer";
    let buffer_size_samples = (params.buffer_seconds * 44_100.0).round();
    let array_node = b.add(
        crate::ast::NodeKind::Array {
            name: buffer_name.to_string(),
            size: buffer_size_samples as i64,
            array_type: "float".to_string(),
            flags: vec![],
            continuation: vec![],
        },
        0.0,
        30.0,
    );
    let write = b.obj("tabwrite~", vec![Token::Symbol(buffer_name.to_string())], 0.0, 60.0);
    b.wire(audio_in, write);
    let _ = array_node;

    // One shared pitch-control node feeds every head's `sig~`: a controller
    // mapping (or any other caller) only has to reach this single inlet to
    // retune all heads together, rather than one audio-rate `sig~` per head.
    let pitch_ctl = b.obj("float", vec![Token::Number(params.pitch)], 0.0, -30.0);
    let pitch_loadbang = b.obj("loadbang", vec![], 0.0, -60.0);
    let pitch_bang = b.msg(vec![Token::Symbol("bang".to_string())], 0.0, -45.0);
    b.wire(pitch_loadbang, pitch_bang);
    b.wire(pitch_bang, pitch_ctl);

    let mut mix_node: Option<usize> = None;
    for head in 0..params.heads {
        let x = (head as f64) * 80.0;
        let metro = b.obj("metro", vec![Token::Number(params.grain_size_ms / 2.0)], x, 100.0);
        let loadbang = b.obj("loadbang", vec![], x, 70.0);
        let start_msg = b.msg(vec![Token::Number(1.0)], x, 85.0);
        b.wire(loadbang, start_msg);
        b.wire(start_msg, metro);

        let read_head = b.obj("tabread4~", vec![Token::Symbol(buffer_name.to_string())], x, 160.0);
        let head_freq = b.obj("sig~", vec![], x, 130.0);
        b.wire(pitch_ctl, head_freq);
        let phasor = b.obj("phasor~", vec![], x, 130.0);
        b.wire(head_freq, phasor);
        let index_scale = b.obj("*~", vec![Token::Number(buffer_size_samples)], x, 145.0);
        b.wire(phasor, index_scale);
        b.wire(index_scale, read_head);

        let window_env = b.obj("line~", vec![], x, 190.0);
        let env_trigger = b.msg(vec![Token::Number(1.0), Token::Number(params.grain_size_ms / 2.0), Token::Number(0.0), Token::Number(params.grain_size_ms / 2.0)], x, 175.0);
        b.wire(metro, env_trigger);
        b.wire(env_trigger, window_env);
        let windowed = b.obj("*~", vec![], x, 220.0);
        b.wire(read_head, windowed);
        b.wire_ports(window_env, 0, windowed, 1);

        mix_node = Some(match mix_node {
            Some(prev) => {
                let adder = b.obj("+~", vec![], x, 250.0);
                b.wire(prev, adder);
                b.wire(windowed, adder);
                adder
            }
            None => windowed,
        });
    }

    let audio_out = b.obj("dac~", vec![], 0.0, 290.0);
    if let Some(mix) = mix_node {
        b.wire(mix, audio_out);
    }

    b.port("audio_in", SignalType::Audio, Direction::Input, write, 0);
    b.port_with_io("audio", SignalType::Audio, Direction::Output, mix_node.unwrap_or(audio_out), 0, audio_out);
    b.parameter("pitch", "Grain pitch", 0.05, 8.0, params.pitch, "", crate::template::Curve::Exponential, pitch_ctl, 0, "granular");

    b.finish()
}
