//! Five-voice drum machine with an internal 16-step counter, optional
//! metro/tap-tempo clock, per-voice synthesis, and a CH→OH choke rule
//! (§4.6.3). Grounded on `superdirt_synths.rs`'s per-voice builder methods
//! (`build_kick`, `build_snare`-equivalent noise+tone voices) generalized
//! into a multi-voice column layout, and on `dependency_graph.rs`'s
//! discipline of explicit fan-in nodes for the selector-to-trigger pattern
//! described in SPEC_FULL.md §9 ("selector fan-in for drum triggers").

use crate::ast::Token;
use crate::error::Result;
use crate::template::{get_f64, invalid_param, resolve_f64_range, resolve_list, Direction, Fragment, FragmentBuilder, SignalType};
use serde_json::Value;
use std::collections::HashSet;

const ALL_VOICES: &[&str] = &["bd", "sn", "ch", "oh", "cp"];

fn default_pattern(voice: &str) -> Vec<usize> {
    match voice {
        "bd" => vec![0, 4, 8, 12],
        "sn" => vec![4, 12],
        "ch" => (0..16).step_by(2).filter(|&s| s != 14).collect(),
        "oh" => vec![14],
        "cp" => vec![8],
        _ => vec![],
    }
}

fn normalize_voice(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower == "hh" {
        "ch".to_string()
    } else {
        lower
    }
}

pub struct DrumsParams {
    pub voices: Vec<String>,
    pub bpm: f64,
    pub morph_x: f64,
    pub morph_y: f64,
    pub amplitude: f64,
}

impl DrumsParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let raw_voices = resolve_list(map, "voices", ALL_VOICES.iter().map(|s| s.to_string()).collect(), |v| v.as_str().map(normalize_voice));
        let mut seen = HashSet::new();
        let mut voices = Vec::new();
        for v in raw_voices {
            if !ALL_VOICES.contains(&v.as_str()) {
                return Err(invalid_param("voices", &format!("unknown voice '{v}'"), Some(ALL_VOICES)));
            }
            if seen.insert(v.clone()) {
                voices.push(v);
            }
        }

        let bpm = resolve_f64_range(map, "bpm", 120.0, 0.0, 10_000.0)?;

        let mut morph_x = resolve_f64_range(map, "morphX", 0.5, 0.0, 1.0)?;
        let mut morph_y = resolve_f64_range(map, "morphY", 0.5, 0.0, 1.0)?;
        // Legacy aliases map onto the morph axes: tune/tone -> X, decay -> Y.
        if let Some(tune) = get_f64(map, "tune") {
            morph_x = tune.clamp(0.0, 1.0);
        }
        if let Some(tone) = get_f64(map, "tone") {
            morph_x = tone.clamp(0.0, 1.0);
        }
        if let Some(decay) = get_f64(map, "decay") {
            morph_y = decay.clamp(0.0, 1.0);
        }

        let amplitude = resolve_f64_range(map, "amplitude", 0.8, 0.0, 1.0)?;

        Ok(Self {
            voices,
            bpm,
            morph_x,
            morph_y,
            amplitude,
        })
    }
}

struct VoiceOutput {
    voice: String,
    trig_node: usize,
    audio_node: usize,
    /// The voice's envelope ramp generator, when it has exactly one
    /// (hat voices only); the choke rule retargets this, not the final
    /// audio-rate multiplier, since the multiplier's inlets are audio-signal.
    envelope_node: Option<usize>,
}

fn build_bd(b: &mut FragmentBuilder, morph_x: f64, morph_y: f64, x: f64) -> (usize, usize) {
    let trig = b.obj("bng", vec![], x, 380.0);
    let pitch_env = b.msg(
        vec![Token::Number(200.0 + morph_x * 400.0), Token::Number(40.0), Token::Number(40.0)],
        x,
        410.0,
    );
    b.wire(trig, pitch_env);
    let pitch_ramp = b.obj("line~", vec![], x, 440.0);
    b.wire(pitch_env, pitch_ramp);
    let osc = b.obj("osc~", vec![], x, 470.0);
    b.wire(pitch_ramp, osc);

    let amp_env = b.msg(
        vec![Token::Number(1.0), Token::Number(2.0), Token::Number(0.0), Token::Number(60.0 + morph_y * 300.0)],
        x,
        410.0,
    );
    b.wire(trig, amp_env);
    let amp_ramp = b.obj("line~", vec![], x, 440.0);
    b.wire(amp_env, amp_ramp);
    let amp_mult = b.obj("*~", vec![], x, 500.0);
    b.wire(osc, amp_mult);
    b.wire_ports(amp_ramp, 0, amp_mult, 1);

    (trig, amp_mult)
}

fn build_sn(b: &mut FragmentBuilder, morph_x: f64, morph_y: f64, x: f64) -> (usize, usize) {
    let trig = b.obj("bng", vec![], x, 380.0);
    let tone1 = b.obj("osc~", vec![Token::Number(180.0 + morph_x * 60.0)], x, 410.0);
    let tone2 = b.obj("osc~", vec![Token::Number(330.0 + morph_x * 90.0)], x, 440.0);
    let tone_sum = b.obj("+~", vec![], x, 470.0);
    b.wire(tone1, tone_sum);
    b.wire(tone2, tone_sum);
    let tone_env_msg = b.msg(vec![Token::Number(1.0), Token::Number(1.0), Token::Number(0.0), Token::Number(80.0 + morph_y * 120.0)], x, 380.0);
    b.wire(trig, tone_env_msg);
    let tone_ramp = b.obj("line~", vec![], x, 500.0);
    b.wire(tone_env_msg, tone_ramp);
    let tone_mult = b.obj("*~", vec![], x, 530.0);
    b.wire(tone_sum, tone_mult);
    b.wire_ports(tone_ramp, 0, tone_mult, 1);

    let noise = b.obj("noise~", vec![], x + 60.0, 410.0);
    let noise_bp = b.obj("bp~", vec![Token::Number(2500.0), Token::Number(2.0)], x + 60.0, 440.0);
    b.wire(noise, noise_bp);
    let noise_env_msg = b.msg(vec![Token::Number(1.0), Token::Number(1.0), Token::Number(0.0), Token::Number(40.0 + morph_y * 80.0)], x + 60.0, 380.0);
    b.wire(trig, noise_env_msg);
    let noise_ramp = b.obj("line~", vec![], x + 60.0, 500.0);
    b.wire(noise_env_msg, noise_ramp);
    let noise_mult = b.obj("*~", vec![], x + 60.0, 530.0);
    b.wire(noise_bp, noise_mult);
    b.wire_ports(noise_ramp, 0, noise_mult, 1);

    let sum = b.obj("+~", vec![], x + 30.0, 560.0);
    b.wire(tone_mult, sum);
    b.wire(noise_mult, sum);

    (trig, sum)
}

/// CH/OH share this builder: six inharmonic oscillators in two groups of
/// three, summed, through bandpass+highpass, with an amplitude envelope.
/// Returns `(trigger, audio_out, envelope_ramp)`.
fn build_hat(b: &mut FragmentBuilder, morph_x: f64, decay_ms: f64, x: f64) -> (usize, usize, usize) {
    let trig = b.obj("bng", vec![], x, 380.0);
    let base = 2000.0 + morph_x * 2000.0;
    let ratios = [1.0, 1.34, 1.78, 2.13, 2.56, 3.01];
    let mut group_a = Vec::new();
    let mut group_b = Vec::new();
    for (i, ratio) in ratios.iter().enumerate() {
        let osc = b.obj("osc~", vec![Token::Number(base * ratio)], x + (i as f64) * 20.0, 410.0);
        if i < 3 {
            group_a.push(osc);
        } else {
            group_b.push(osc);
        }
    }
    let sum_a = b.obj("+~", vec![], x, 450.0);
    b.wire(group_a[0], sum_a);
    b.wire(group_a[1], sum_a);
    let sum_a2 = b.obj("+~", vec![], x, 470.0);
    b.wire(sum_a, sum_a2);
    b.wire(group_a[2], sum_a2);

    let sum_b = b.obj("+~", vec![], x + 60.0, 450.0);
    b.wire(group_b[0], sum_b);
    b.wire(group_b[1], sum_b);
    let sum_b2 = b.obj("+~", vec![], x + 60.0, 470.0);
    b.wire(sum_b, sum_b2);
    b.wire(group_b[2], sum_b2);

    let total = b.obj("+~", vec![], x + 30.0, 490.0);
    b.wire(sum_a2, total);
    b.wire(sum_b2, total);

    let bp = b.obj("bp~", vec![Token::Number(8000.0), Token::Number(1.5)], x + 30.0, 520.0);
    b.wire(total, bp);
    let hip = b.obj("hip~", vec![Token::Number(6000.0)], x + 30.0, 550.0);
    b.wire(bp, hip);

    let env_msg = b.msg(vec![Token::Number(1.0), Token::Number(1.0), Token::Number(0.0), Token::Number(decay_ms)], x, 580.0);
    b.wire(trig, env_msg);
    let ramp = b.obj("line~", vec![], x, 610.0);
    b.wire(env_msg, ramp);
    let mult = b.obj("*~", vec![], x + 30.0, 610.0);
    b.wire(hip, mult);
    b.wire_ports(ramp, 0, mult, 1);

    (trig, mult, ramp)
}

fn build_cp(b: &mut FragmentBuilder, morph_y: f64, x: f64) -> (usize, usize) {
    let trig = b.obj("bng", vec![], x, 380.0);
    let noise = b.obj("noise~", vec![], x, 410.0);
    let bp = b.obj("bp~", vec![Token::Number(1800.0), Token::Number(3.0)], x, 440.0);
    b.wire(noise, bp);

    // Five-burst pattern via the ramp generator's documented multi-segment
    // message syntax: five short attack/decay bumps in sequence.
    let burst_ms = 15.0 + morph_y * 30.0;
    let mut segments = vec![Token::Number(0.0)];
    for i in 0..5 {
        let at = (i as f64) * (burst_ms + 5.0);
        segments.push(Token::Symbol(format!("1,{},{at}", burst_ms)));
    }
    let env_msg = b.msg(segments, x, 380.0);
    b.wire(trig, env_msg);
    let ramp = b.obj("line~", vec![], x, 470.0);
    b.wire(env_msg, ramp);
    let mult = b.obj("*~", vec![], x, 500.0);
    b.wire(bp, mult);
    b.wire_ports(ramp, 0, mult, 1);

    (trig, mult)
}

/// Always builds the 16-step counter; optionally builds a metro with
/// tap-tempo when `bpm > 0`.
pub fn build(params: &DrumsParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let clock_in = b.obj("inlet", vec![], 0.0, 0.0);
    let counter_float = b.obj("float", vec![Token::Number(0.0)], 0.0, 30.0);
    b.wire(clock_in, counter_float);
    let incr = b.obj("+", vec![Token::Number(1.0)], 0.0, 60.0);
    b.wire(counter_float, incr);
    let wrap = b.obj("mod", vec![Token::Number(16.0)], 0.0, 90.0);
    b.wire(incr, wrap);
    b.wire_ports(wrap, 0, counter_float, 1);
    let clock_out = b.obj("outlet", vec![], 0.0, 120.0);
    b.wire(wrap, clock_out);

    let mut internal_metro_out = None;
    if params.bpm > 0.0 {
        let loadbang = b.obj("loadbang", vec![], 150.0, 0.0);
        let start_msg = b.msg(vec![Token::Number(1.0)], 150.0, 30.0);
        b.wire(loadbang, start_msg);
        let interval = 60_000.0 / params.bpm / 4.0;
        let metro = b.obj("metro", vec![Token::Number(interval)], 150.0, 60.0);
        b.wire(start_msg, metro);
        b.wire(metro, clock_in);
        internal_metro_out = Some(metro);

        let tap_button = b.obj("bng", vec![], 250.0, 0.0);
        let tap_trigger = b.obj("trigger", vec![Token::Symbol("b".into()), Token::Symbol("b".into())], 250.0, 30.0);
        b.wire(tap_button, tap_trigger);
        let timer = b.obj("timer", vec![], 250.0, 60.0);
        let timer_reset = b.msg(vec![Token::Symbol("bang".into())], 220.0, 60.0);
        let timer_read = b.msg(vec![Token::Symbol("bang".into())], 280.0, 60.0);
        b.wire_ports(tap_trigger, 1, timer_reset, 0);
        b.wire_ports(tap_trigger, 0, timer_read, 0);
        b.wire(timer_reset, timer);
        b.wire(timer_read, timer);
        let divide = b.obj("/", vec![Token::Number(4.0)], 250.0, 90.0);
        b.wire(timer, divide);
        b.wire_ports(divide, 0, metro, 1);
    }

    let mut outputs = Vec::new();
    let mut col_x = 350.0;
    for voice in &params.voices {
        let pattern = default_pattern(voice);
        let step_args: Vec<Token> = pattern.iter().map(|&s| Token::Number(s as f64)).collect();
        let selector = b.obj("select", step_args.clone(), col_x, 150.0);
        b.wire(wrap, selector);
        let fanin = b.obj("bng", vec![], col_x, 350.0);
        for outlet in 0..pattern.len() {
            b.wire_ports(selector, outlet, fanin, 0);
        }

        let decay_ms = 60.0 + params.morph_y * 400.0;
        let (trig_source, audio_node, envelope_node) = match voice.as_str() {
            "bd" => {
                let (t, a) = build_bd(&mut b, params.morph_x, params.morph_y, col_x);
                (t, a, None)
            }
            "sn" => {
                let (t, a) = build_sn(&mut b, params.morph_x, params.morph_y, col_x);
                (t, a, None)
            }
            "ch" => {
                let (t, a, r) = build_hat(&mut b, params.morph_x, 60.0 + params.morph_y * 80.0, col_x);
                (t, a, Some(r))
            }
            "oh" => {
                let (t, a, r) = build_hat(&mut b, params.morph_x, decay_ms.max(250.0), col_x);
                (t, a, Some(r))
            }
            "cp" => {
                let (t, a) = build_cp(&mut b, params.morph_y, col_x);
                (t, a, None)
            }
            _ => unreachable!("voices are validated against ALL_VOICES in from_map"),
        };
        b.wire(fanin, trig_source);

        outputs.push(VoiceOutput {
            voice: voice.clone(),
            trig_node: fanin,
            audio_node,
            envelope_node,
        });
        col_x += 120.0;
    }

    // Choke rule: CH trigger overrides OH's envelope ramp to a fast decay,
    // shortening its tail. Targets the ramp generator, not the final
    // audio-rate multiplier, since the ramp's inlet is the only one that
    // accepts a control message.
    if let (Some(ch), Some(oh_envelope)) = (
        outputs.iter().find(|o| o.voice == "ch").map(|o| o.trig_node),
        outputs.iter().find(|o| o.voice == "oh").and_then(|o| o.envelope_node),
    ) {
        let choke_msg = b.msg(vec![Token::Number(0.0), Token::Number(5.0)], col_x, 700.0);
        b.wire(ch, choke_msg);
        b.wire(choke_msg, oh_envelope);
    }

    let mut mix_node: Option<usize> = None;
    for out in &outputs {
        let level = b.obj("*~", vec![Token::Number(1.0)], col_x, 650.0);
        b.wire(out.audio_node, level);
        mix_node = Some(match mix_node {
            Some(prev) => {
                let adder = b.obj("+~", vec![], col_x, 680.0);
                b.wire(prev, adder);
                b.wire(level, adder);
                adder
            }
            None => level,
        });
        b.parameter(
            &format!("volume_{}", out.voice),
            &format!("{} level", out.voice.to_uppercase()),
            0.0,
            1.0,
            1.0,
            "",
            crate::template::Curve::Linear,
            level,
            1,
            "mix",
        );
    }

    let master = b.obj("*~", vec![Token::Number(params.amplitude)], col_x, 720.0);
    if let Some(mix) = mix_node {
        b.wire(mix, master);
    }
    let audio_out = b.obj("dac~", vec![], col_x, 760.0);
    b.wire(master, audio_out);

    for out in &outputs {
        b.port(&format!("trig_{}", out.voice), SignalType::Control, Direction::Input, out.trig_node, 0);
    }
    match internal_metro_out {
        Some(metro) => b.port_with_io("clock_in", SignalType::Control, Direction::Input, clock_in, 0, metro),
        None => b.port("clock_in", SignalType::Control, Direction::Input, clock_in, 0),
    }
    b.port("clock_out", SignalType::Control, Direction::Output, clock_out, 0);
    b.port_with_io("audio", SignalType::Audio, Direction::Output, master, 0, audio_out);

    b.parameter("volume", "Master volume", 0.0, 1.0, params.amplitude, "", crate::template::Curve::Linear, master, 1, "amplitude");

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_hh_alias_maps_to_ch() {
        let p = DrumsParams::from_map(json!({"voices": ["hh"]}).as_object().unwrap()).unwrap();
        assert_eq!(p.voices, vec!["ch".to_string()]);
    }

    #[test]
    fn default_voices_are_all_five() {
        let p = DrumsParams::from_map(json!({}).as_object().unwrap()).unwrap();
        assert_eq!(p.voices.len(), 5);
    }

    #[test]
    fn choke_rule_emits_a_message_from_ch_fanin_to_oh_envelope_ramp() {
        let p = DrumsParams::from_map(json!({"voices": ["ch", "oh"]}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let choke_index = fragment
            .patch_spec
            .nodes
            .iter()
            .position(|n| matches!(&n.kind, crate::ast::NodeKind::Msg { tokens } if tokens.first().and_then(|t| t.as_f64()) == Some(0.0) && tokens.get(1).and_then(|t| t.as_f64()) == Some(5.0)))
            .expect("choke message must exist");

        let target = fragment
            .patch_spec
            .connections
            .iter()
            .find(|c| c.from_node == choke_index)
            .expect("choke message must feed a target node")
            .to_node;
        let target_is_line = matches!(&fragment.patch_spec.nodes[target].kind, crate::ast::NodeKind::Obj { name, .. } if name == "line~");
        assert!(target_is_line, "choke message must target OH's envelope ramp (line~), not its final multiplier");

        let fed_by_ch = fragment.patch_spec.connections.iter().any(|c| c.to_node == choke_index);
        assert!(fed_by_ch, "choke message must be triggered by the CH voice");
    }

    #[test]
    fn no_choke_message_when_oh_absent() {
        let p = DrumsParams::from_map(json!({"voices": ["ch"]}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let choke = fragment.patch_spec.nodes.iter().any(|n| matches!(&n.kind, crate::ast::NodeKind::Msg { tokens } if tokens.first().and_then(|t| t.as_f64()) == Some(0.0) && tokens.get(1).and_then(|t| t.as_f64()) == Some(5.0)));
        assert!(!choke);
    }

    #[test]
    fn zero_bpm_builds_no_internal_metro() {
        let p = DrumsParams::from_map(json!({"bpm": 0}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let has_metro = fragment.patch_spec.nodes.iter().any(|n| matches!(&n.kind, crate::ast::NodeKind::Obj { name, .. } if name == "metro"));
        assert!(!has_metro);
        let clock_port = fragment.ports.iter().find(|p| p.name == "clock_in").unwrap();
        assert!(clock_port.io_node_index.is_none());
    }

    #[test]
    fn unknown_voice_is_rejected() {
        let err = DrumsParams::from_map(json!({"voices": ["zz"]}).as_object().unwrap()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidParam);
    }
}
