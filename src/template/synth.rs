//! Oscillator + filter + envelope synth voice (§4.6.1).
//!
//! Grounded on `ekg-phonon/src/superdirt_synths.rs::SynthLibrary::build_supersaw`
//! and `build_kick`: oscillator selection, filter chain, and an
//! envelope-gated amplifier assembled in sequence, each stage a handful of
//! nodes wired source→destination.

use crate::ast::Token;
use crate::error::Result;
use crate::template::{
    get_f64, invalid_param, resolve_enum_option, resolve_f64_range, Curve, Direction, Fragment, FragmentBuilder, SignalType,
};
use serde_json::Value;

pub struct SynthParams {
    pub waveform: String,
    pub filter: String,
    pub frequency: f64,
    pub cutoff: f64,
    pub amplitude: f64,
    pub envelope: String,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

const WAVEFORMS: &[&str] = &["sine", "saw", "square", "noise"];
const FILTERS: &[&str] = &["lowpass", "highpass", "bandpass", "moog", "korg"];
const ENVELOPES: &[&str] = &["adsr", "ar", "decay", "none"];

impl SynthParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let waveform = resolve_enum_option(map, "waveform", WAVEFORMS, "saw", None)?;
        let filter = resolve_enum_option(map, "filter", FILTERS, "lowpass", None)?;
        let envelope = resolve_enum_option(map, "envelope", ENVELOPES, "none", None)?;
        let frequency = resolve_f64_range(map, "frequency", 440.0, 0.0001, 20_000.0)?;
        let cutoff = resolve_f64_range(map, "cutoff", 1000.0, 0.0001, 20_000.0)?;
        let amplitude = resolve_f64_range(map, "amplitude", 0.7, 0.0, 1.0)?;

        let envelope_params = map.get("envelopeParams").and_then(|v| v.as_object());
        let attack = envelope_params.and_then(|p| get_f64(p, "attack")).unwrap_or(10.0);
        let decay = envelope_params.and_then(|p| get_f64(p, "decay")).unwrap_or(100.0);
        let sustain = envelope_params.and_then(|p| get_f64(p, "sustain")).unwrap_or(0.7);
        let release = envelope_params.and_then(|p| get_f64(p, "release")).unwrap_or(200.0);
        if !(0.0..=1.0).contains(&sustain) {
            return Err(invalid_param("envelopeParams.sustain", "must be in [0, 1]", None));
        }

        Ok(Self {
            waveform,
            filter,
            frequency,
            cutoff,
            amplitude,
            envelope,
            attack,
            decay,
            sustain,
            release,
        })
    }
}

fn build_oscillator(b: &mut FragmentBuilder, waveform: &str, freq_node: usize, x: f64, y: f64) -> usize {
    match waveform {
        "sine" => {
            let osc = b.obj("osc~", vec![], x, y);
            b.wire(freq_node, osc);
            osc
        }
        "square" => {
            // phasor + comparator approximates a square wave, per §4.6.1.
            let phasor = b.obj("phasor~", vec![], x, y);
            b.wire(freq_node, phasor);
            let half = b.msg(vec![Token::Number(0.5)], x, y + 30.0);
            let cmp = b.obj(">~", vec![], x, y + 60.0);
            b.wire(phasor, cmp);
            b.wire_ports(half, 0, cmp, 1);
            cmp
        }
        "noise" => b.obj("noise~", vec![], x, y),
        _ => {
            let saw = b.obj("saw~", vec![], x, y);
            b.wire(freq_node, saw);
            saw
        }
    }
}

fn build_filter(b: &mut FragmentBuilder, filter: &str, cutoff_sig: usize, source: usize, x: f64, y: f64) -> (usize, Option<usize>) {
    match filter {
        "highpass" => {
            let hip = b.obj("hip~", vec![Token::Number(0.0)], x, y);
            b.wire(source, hip);
            b.wire_ports(cutoff_sig, 0, hip, 1);
            (hip, None)
        }
        "bandpass" => {
            let bp = b.obj("bp~", vec![Token::Number(0.0), Token::Number(5.0)], x, y);
            b.wire(source, bp);
            b.wire_ports(cutoff_sig, 0, bp, 1);
            (bp, Some(2))
        }
        "moog" => {
            let vcf = b.obj("vcf~", vec![Token::Number(0.0)], x, y);
            b.wire(source, vcf);
            b.wire_ports(cutoff_sig, 0, vcf, 2);
            (vcf, Some(2))
        }
        "korg" => {
            // korg filter is highpass followed by lowpass, per §4.6.1.
            let hip = b.obj("hip~", vec![Token::Number(0.0)], x, y);
            b.wire(source, hip);
            b.wire_ports(cutoff_sig, 0, hip, 1);
            let lop = b.obj("lop~", vec![Token::Number(0.0)], x, y + 40.0);
            b.wire(hip, lop);
            b.wire_ports(cutoff_sig, 0, lop, 1);
            (lop, None)
        }
        _ => {
            let lop = b.obj("lop~", vec![Token::Number(0.0)], x, y);
            b.wire(source, lop);
            b.wire_ports(cutoff_sig, 0, lop, 1);
            (lop, None)
        }
    }
}

/// Build a synth voice fragment. Structure: note in → mtof → oscillator →
/// filter → optional envelope-gated amplifier → master gain → audio out.
pub fn build(params: &SynthParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let note_in = b.obj("inlet", vec![], 0.0, 0.0);
    let mtof = b.obj("mtof", vec![], 0.0, 40.0);
    b.wire(note_in, mtof);
    let freq_default = b.msg(vec![Token::Number(params.frequency)], 150.0, 0.0);

    let osc = build_oscillator(&mut b, &params.waveform, mtof, 0.0, 80.0);
    let _ = freq_default;

    let cutoff_sig = b.obj("sig~", vec![Token::Number(params.cutoff)], 0.0, 120.0);
    let (filtered, resonance_inlet) = build_filter(&mut b, &params.filter, cutoff_sig, osc, 0.0, 160.0);

    let mut gate_node: Option<usize> = None;
    let post_gain = if params.envelope != "none" {
        let gate_in = b.obj("inlet", vec![], 200.0, 0.0);
        gate_node = Some(gate_in);
        let select = b.obj("select", vec![Token::Number(0.0), Token::Number(1.0)], 200.0, 40.0);
        b.wire(gate_in, select);
        let release_msg = b.msg(vec![Token::Number(0.0), Token::Number(params.release)], 160.0, 80.0);
        let attack_decay_msg = b.msg(
            vec![
                Token::Number(1.0),
                Token::Number(params.attack),
                Token::Number(params.sustain),
                Token::Number(params.decay),
            ],
            240.0,
            80.0,
        );
        b.wire_ports(select, 0, release_msg, 0);
        b.wire_ports(select, 1, attack_decay_msg, 0);
        let ramp = b.obj("line~", vec![], 200.0, 120.0);
        b.wire(release_msg, ramp);
        b.wire(attack_decay_msg, ramp);
        let amp_mult = b.obj("*~", vec![], 0.0, 200.0);
        b.wire(filtered, amp_mult);
        b.wire_ports(ramp, 0, amp_mult, 1);
        amp_mult
    } else {
        filtered
    };

    let master = b.obj("*~", vec![Token::Number(params.amplitude)], 0.0, 240.0);
    b.wire(post_gain, master);
    let audio_out = b.obj("dac~", vec![], 0.0, 280.0);
    b.wire(master, audio_out);

    b.port("note", SignalType::Control, Direction::Input, note_in, 0);
    if let Some(gate_in) = gate_node {
        b.port("gate", SignalType::Control, Direction::Input, gate_in, 0);
    }
    b.port_with_io("audio", SignalType::Audio, Direction::Output, master, 0, audio_out);

    b.parameter("cutoff", "Cutoff", 20.0, 20_000.0, params.cutoff, "Hz", Curve::Exponential, cutoff_sig, 0, "filter");
    b.parameter("amplitude", "Amplitude", 0.0, 1.0, params.amplitude, "", Curve::Linear, master, 1, "amplitude");
    if let Some(inlet) = resonance_inlet {
        b.parameter("resonance", "Resonance", 0.0, 1.0, 0.5, "", Curve::Linear, filtered, inlet, "filter");
    }

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(json: serde_json::Value) -> SynthParams {
        SynthParams::from_map(json.as_object().unwrap()).unwrap()
    }

    #[test]
    fn defaults_match_spec() {
        let p = params(json!({}));
        assert_eq!(p.waveform, "saw");
        assert_eq!(p.filter, "lowpass");
        assert_eq!(p.frequency, 440.0);
        assert_eq!(p.amplitude, 0.7);
        assert_eq!(p.envelope, "none");
    }

    #[test]
    fn rejects_unrecognized_waveform() {
        let err = SynthParams::from_map(json!({"waveform": "wobble"}).as_object().unwrap()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidParam);
    }

    #[test]
    fn build_without_envelope_has_audio_port_with_io_node() {
        let p = params(json!({}));
        let fragment = build(&p);
        let audio_port = fragment.ports.iter().find(|port| port.name == "audio").unwrap();
        assert!(audio_port.io_node_index.is_some());
    }

    #[test]
    fn bandpass_exposes_resonance_parameter() {
        let p = params(json!({"filter": "bandpass"}));
        let fragment = build(&p);
        assert!(fragment.parameters.iter().any(|param| param.name == "resonance"));
    }

    #[test]
    fn korg_filter_chains_highpass_into_lowpass() {
        let p = params(json!({"filter": "korg"}));
        let fragment = build(&p);
        let names: Vec<_> = fragment
            .patch_spec
            .nodes
            .iter()
            .filter_map(|n| match &n.kind {
                crate::ast::NodeKind::Obj { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"hip~"));
        assert!(names.contains(&"lop~"));
    }
}
