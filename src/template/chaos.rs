//! Logistic-map chaos generator (§4.6.7): `x' = r * x * (1 - x)`, iterated
//! on each clock tick. Grounded on `superdirt_synths.rs`'s per-tick
//! feedback-expression idiom (the same `+` / `*` self-feedback shape as the
//! sequencer and clock counters, but through `expr` instead of `+`/`mod`).

use crate::error::Result;
use crate::template::{resolve_f64_range, Direction, Fragment, FragmentBuilder, SignalType};
use crate::ast::Token;
use serde_json::Value;

pub struct ChaosParams {
    pub r: f64,
    pub seed: f64,
}

impl ChaosParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        Ok(Self {
            r: resolve_f64_range(map, "r", 3.9, 0.0, 4.0)?,
            seed: resolve_f64_range(map, "seed", 0.5, 0.0001, 0.9999)?,
        })
    }
}

pub fn build(params: &ChaosParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let clock_in = b.obj("inlet", vec![], 0.0, 0.0);
    let state = b.obj("float", vec![Token::Number(params.seed)], 0.0, 30.0);
    b.wire(clock_in, state);
    let iterate = b.obj(
        "expr",
        vec![Token::Symbol(format!("{} * $f1 * (1 - $f1)", params.r))],
        0.0,
        60.0,
    );
    b.wire(state, iterate);
    b.wire_ports(iterate, 0, state, 1);

    let value_out = b.obj("outlet", vec![], 0.0, 90.0);
    b.wire(state, value_out);

    b.port("clock_in", SignalType::Control, Direction::Input, clock_in, 0);
    b.port("value", SignalType::Control, Direction::Output, state, 0);
    b.parameter("r", "Chaos coefficient", 0.0, 4.0, params.r, "", crate::template::Curve::Linear, iterate, 0, "chaos");

    b.finish()
}
