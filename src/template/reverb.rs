//! Reverb (§4.6.5): `simple` (single feedback delay + damping) or
//! `schroeder` (two parallel combs + one allpass). Grounded on
//! `superdirt_synths.rs`'s delay-line patterns (`delwrite~`/`delread~`
//! pairs) generalized to a feedback topology.

use crate::error::Result;
use crate::template::{resolve_enum_option, resolve_f64_range, Direction, Fragment, FragmentBuilder, SignalType};
use crate::ast::Token;
use serde_json::Value;

const VARIANTS: &[&str] = &["schroeder", "simple"];

pub struct ReverbParams {
    pub variant: String,
    pub room_size: f64,
    pub damping: f64,
    pub wet_dry: f64,
}

impl ReverbParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        Ok(Self {
            variant: resolve_enum_option(map, "variant", VARIANTS, "schroeder", None)?,
            room_size: resolve_f64_range(map, "roomSize", 0.5, 0.0, 1.0)?,
            damping: resolve_f64_range(map, "damping", 0.5, 0.0, 1.0)?,
            wet_dry: resolve_f64_range(map, "wetDry", 0.35, 0.0, 1.0)?,
        })
    }
}

fn comb(b: &mut FragmentBuilder, source: usize, delay_ms: f64, feedback: f64, damping: f64, x: f64) -> usize {
    let name = format!("delay_{}", delay_ms as i64);
    let write = b.obj("delwrite~", vec![Token::Symbol(name.clone()), Token::Number(500.0)], x, 0.0);
    b.wire(source, write);
    let read = b.obj("delread~", vec![Token::Symbol(name), Token::Number(delay_ms)], x, 30.0);
    let damp = b.obj("lop~", vec![Token::Number(2000.0 - damping * 1800.0)], x, 60.0);
    b.wire(read, damp);
    let fb = b.obj("*~", vec![Token::Number(feedback)], x, 90.0);
    b.wire(damp, fb);
    b.wire(fb, write);
    damp
}

pub fn build(params: &ReverbParams) -> Fragment {
    let mut b = FragmentBuilder::new();
    let audio_in_node = b.obj("inlet~", vec![], 0.0, 0.0);

    let wet = if params.variant == "simple" {
        let delay_ms = 20.0 + params.room_size * 200.0;
        comb(&mut b, audio_in_node, delay_ms, 0.4 + params.room_size * 0.3, params.damping, 0.0)
    } else {
        let comb_a = comb(&mut b, audio_in_node, 29.7 + params.room_size * 20.0, 0.6, params.damping, 0.0);
        let comb_b = comb(&mut b, audio_in_node, 37.1 + params.room_size * 25.0, 0.6, params.damping, 60.0);
        let sum = b.obj("+~", vec![], 30.0, 120.0);
        b.wire(comb_a, sum);
        b.wire(comb_b, sum);
        let allpass_write = b.obj("delwrite~", vec![Token::Symbol("reverb_ap".into()), Token::Number(50.0)], 30.0, 150.0);
        b.wire(sum, allpass_write);
        let allpass_read = b.obj("delread~", vec![Token::Symbol("reverb_ap".into()), Token::Number(5.0)], 30.0, 180.0);
        let allpass_mult = b.obj("*~", vec![Token::Number(-0.7)], 30.0, 210.0);
        b.wire(allpass_read, allpass_mult);
        let allpass_sum = b.obj("+~", vec![], 30.0, 240.0);
        b.wire(sum, allpass_sum);
        b.wire(allpass_mult, allpass_sum);
        allpass_sum
    };

    let dry_gain = b.obj("*~", vec![Token::Number(1.0 - params.wet_dry)], 0.0, 280.0);
    b.wire(audio_in_node, dry_gain);
    let wet_gain = b.obj("*~", vec![Token::Number(params.wet_dry)], 30.0, 280.0);
    b.wire(wet, wet_gain);
    let mix = b.obj("+~", vec![], 15.0, 310.0);
    b.wire(dry_gain, mix);
    b.wire(wet_gain, mix);

    let audio_out = b.obj("dac~", vec![], 15.0, 340.0);
    b.wire(mix, audio_out);

    b.port("audio_in", SignalType::Audio, Direction::Input, dry_gain, 0);
    b.port_with_io("audio", SignalType::Audio, Direction::Output, mix, 0, audio_out);

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_variant_is_schroeder() {
        let p = ReverbParams::from_map(json!({}).as_object().unwrap()).unwrap();
        assert_eq!(p.variant, "schroeder");
    }

    #[test]
    fn simple_variant_builds_a_single_delay_line() {
        let p = ReverbParams::from_map(json!({"variant": "simple"}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let delwrites = fragment
            .patch_spec
            .nodes
            .iter()
            .filter(|n| matches!(&n.kind, crate::ast::NodeKind::Obj { name, .. } if name == "delwrite~"))
            .count();
        assert_eq!(delwrites, 1);
    }

    #[test]
    fn schroeder_variant_builds_two_combs_and_an_allpass() {
        let p = ReverbParams::from_map(json!({"variant": "schroeder"}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let delwrites = fragment
            .patch_spec
            .nodes
            .iter()
            .filter(|n| matches!(&n.kind, crate::ast::NodeKind::Obj { name, .. } if name == "delwrite~"))
            .count();
        assert_eq!(delwrites, 3);
    }
}
