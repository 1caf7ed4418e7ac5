//! Turing Machine-style probabilistic shift register (§4.6.7): a named
//! data array holds the register; each clock tick shifts it and, with
//! probability `probability`, replaces the head value with a fresh random
//! draw instead of repeating the prior cycle. Grounded on the teacher's
//! `rand`/`fastrand` use for sample-selection jitter, generalized here to
//! drive a control-rate random gate (`random` object wired through a
//! `moses` threshold split).

use crate::error::Result;
use crate::template::{resolve_f64_range, Direction, Fragment, FragmentBuilder, SignalType};
use crate::ast::Token;
use rand::Rng;
use serde_json::Value;

pub struct TuringParams {
    pub length: usize,
    pub probability: f64,
    pub scale: i64,
}

impl TuringParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let length = resolve_f64_range(map, "length", 8.0, 1.0, 64.0)? as usize;
        let probability = resolve_f64_range(map, "probability", 0.25, 0.0, 1.0)?;
        let scale = resolve_f64_range(map, "scale", 15.0, 1.0, 127.0)? as i64;
        Ok(Self { length, probability, scale })
    }
}

pub fn build(params: &TuringParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    // Seed the register with a random bit pattern rather than silence, so
    // the first lap around the shift register already sounds like a Turing
    // Machine instead of N cycles of zeroes.
    let mut rng = rand::thread_rng();
    let seed: Vec<Token> = (0..params.length)
        .map(|_| Token::Number(rng.gen_range(0..=params.scale) as f64))
        .collect();

    let array_name = "turing_register";
    let array_node = b.add(
        crate::ast::NodeKind::Array {
            name: array_name.to_string(),
            size: params.length as i64,
            array_type: "float".to_string(),
            flags: vec![],
            continuation: vec![seed],
        },
        0.0,
        0.0,
    );

    let clock_in = b.obj("inlet", vec![], 0.0, 40.0);
    let index = b.obj("float", vec![Token::Number(0.0)], 0.0, 70.0);
    b.wire(clock_in, index);
    let incr = b.obj("+", vec![Token::Number(1.0)], 0.0, 100.0);
    b.wire(index, incr);
    let wrap = b.obj("mod", vec![Token::Number(params.length as f64)], 0.0, 130.0);
    b.wire(incr, wrap);
    b.wire_ports(wrap, 0, index, 1);

    let roll = b.obj("random", vec![Token::Number(100.0)], 100.0, 70.0);
    b.wire(clock_in, roll);
    let threshold = b.obj("moses", vec![Token::Number((params.probability * 100.0).round())], 100.0, 100.0);
    b.wire(roll, threshold);
    let fresh_draw = b.obj("random", vec![Token::Number((params.scale + 1) as f64)], 100.0, 130.0);
    b.wire_ports(threshold, 1, fresh_draw, 0);

    let write = b.obj("tabwrite~", vec![Token::Symbol(array_name.to_string())], 0.0, 160.0);
    b.wire(wrap, write);
    b.wire(fresh_draw, write);

    let read = b.obj("tabread", vec![Token::Symbol(array_name.to_string())], 0.0, 190.0);
    b.wire(wrap, read);

    let value_out = b.obj("outlet", vec![], 0.0, 220.0);
    b.wire(read, value_out);

    let _ = array_node;

    b.port("clock_in", SignalType::Control, Direction::Input, clock_in, 0);
    b.port("value", SignalType::Control, Direction::Output, read, 0);
    b.parameter("probability", "Flip probability", 0.0, 1.0, params.probability, "", crate::template::Curve::Linear, threshold, 0, "turing");

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_an_array_of_the_requested_length() {
        let p = TuringParams::from_map(json!({"length": 16}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let array = fragment.patch_spec.nodes.iter().find_map(|n| match &n.kind {
            crate::ast::NodeKind::Array { size, .. } => Some(*size),
            _ => None,
        });
        assert_eq!(array, Some(16));
    }

    #[test]
    fn register_is_seeded_with_a_random_initial_draw_per_slot() {
        let p = TuringParams::from_map(json!({"length": 16, "scale": 15}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let continuation = fragment.patch_spec.nodes.iter().find_map(|n| match &n.kind {
            crate::ast::NodeKind::Array { continuation, .. } => Some(continuation.clone()),
            _ => None,
        });
        let seed = continuation.unwrap();
        let values: Vec<_> = seed.into_iter().flatten().collect();
        assert_eq!(values.len(), 16);
        for token in &values {
            let n = token.as_f64().unwrap();
            assert!((0.0..=15.0).contains(&n));
        }
    }

    #[test]
    fn probability_out_of_range_is_rejected() {
        let err = TuringParams::from_map(json!({"probability": 1.5}).as_object().unwrap()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidParam);
    }
}
