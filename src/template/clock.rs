//! Multi-division clock (§4.6.6): a base metro drives a master counter;
//! each division gets a selector matching the counter's multiples of that
//! stride. Grounded on `superdirt_synths.rs`'s metro-driven counter idiom,
//! reused verbatim from the sequencer template's counter shape.

use crate::ast::Token;
use crate::error::Result;
use crate::template::{resolve_f64_range, resolve_list, Direction, Fragment, FragmentBuilder, SignalType};
use serde_json::Value;

const DEFAULT_DIVISIONS: &[i64] = &[1, 2, 4, 8];
/// Counter range: large enough that every configured division's stride
/// divides evenly into a full cycle (least common multiple of defaults).
const CYCLE_LENGTH: i64 = 64;

pub struct ClockParams {
    pub bpm: f64,
    pub divisions: Vec<i64>,
}

impl ClockParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let bpm = resolve_f64_range(map, "bpm", 120.0, 0.0001, 10_000.0)?;
        let divisions = resolve_list(map, "divisions", DEFAULT_DIVISIONS.to_vec(), |v| v.as_i64().filter(|n| (1..=64).contains(n)));
        Ok(Self { bpm, divisions })
    }
}

pub fn build(params: &ClockParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let loadbang = b.obj("loadbang", vec![], 0.0, 0.0);
    let start = b.msg(vec![Token::Number(1.0)], 0.0, 30.0);
    b.wire(loadbang, start);
    let interval = 60_000.0 / params.bpm / 4.0;
    let metro = b.obj("metro", vec![Token::Number(interval)], 0.0, 60.0);
    b.wire(start, metro);

    let counter_float = b.obj("float", vec![Token::Number(0.0)], 0.0, 90.0);
    b.wire(metro, counter_float);
    let incr = b.obj("+", vec![Token::Number(1.0)], 0.0, 120.0);
    b.wire(counter_float, incr);
    let wrap = b.obj("mod", vec![Token::Number(CYCLE_LENGTH as f64)], 0.0, 150.0);
    b.wire(incr, wrap);
    b.wire_ports(wrap, 0, counter_float, 1);

    for (i, division) in params.divisions.iter().enumerate() {
        let x = 150.0 + (i as f64) * 80.0;
        let matches: Vec<Token> = (0..CYCLE_LENGTH)
            .step_by((*division).max(1) as usize)
            .map(|n| Token::Number(n as f64))
            .collect();
        let selector = b.obj("select", matches, x, 180.0);
        b.wire(wrap, selector);
        let fanin = b.obj("bng", vec![], x, 220.0);
        for outlet in 0..(CYCLE_LENGTH as usize / (*division).max(1) as usize) {
            b.wire_ports(selector, outlet, fanin, 0);
        }
        let out = b.obj("outlet", vec![], x, 260.0);
        b.wire(fanin, out);
        b.port(&format!("beat_div{division}"), SignalType::Control, Direction::Output, fanin, 0);
    }

    b.finish()
}
