//! Rise/fall/cycle function generator (§4.6.7): a triggered ramp that
//! climbs from `min` to `max` over `riseTime`, falls back over `fallTime`,
//! optionally looping. Grounded on the envelope ramp idiom shared with the
//! synth/drum templates (`line~`/`line` driven by a segmented message).

use crate::error::Result;
use crate::template::{get_bool, resolve_f64_range, Direction, Fragment, FragmentBuilder, SignalType};
use crate::ast::Token;
use serde_json::Value;

pub struct MathsParams {
    pub rise_ms: f64,
    pub fall_ms: f64,
    pub cycle: bool,
    pub min: f64,
    pub max: f64,
}

impl MathsParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        Ok(Self {
            rise_ms: resolve_f64_range(map, "riseTime", 100.0, 0.1, 60_000.0)?,
            fall_ms: resolve_f64_range(map, "fallTime", 100.0, 0.1, 60_000.0)?,
            cycle: get_bool(map, "cycle").unwrap_or(false),
            min: resolve_f64_range(map, "min", 0.0, -1_000_000.0, 1_000_000.0)?,
            max: resolve_f64_range(map, "max", 1.0, -1_000_000.0, 1_000_000.0)?,
        })
    }
}

pub fn build(params: &MathsParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let trigger_in = b.obj("inlet", vec![], 0.0, 0.0);
    let rise_msg = b.msg(vec![Token::Number(params.max), Token::Number(params.rise_ms)], 0.0, 30.0);
    let fall_msg = b.msg(vec![Token::Number(params.min), Token::Number(params.fall_ms)], 60.0, 30.0);
    let ramp = b.obj("line", vec![], 0.0, 60.0);
    b.wire(trigger_in, rise_msg);
    b.wire(rise_msg, ramp);

    // Always schedule the fall after the rise completes: `cycle` only
    // controls whether the whole rise/fall is then repeated, not whether a
    // fall happens at all.
    let fall_delay = b.obj("delay", vec![Token::Number(params.rise_ms)], 0.0, 90.0);
    b.wire(rise_msg, fall_delay);
    b.wire(fall_delay, fall_msg);
    b.wire(fall_msg, ramp);

    if params.cycle {
        let repeat_delay = b.obj("delay", vec![Token::Number(params.fall_ms)], 60.0, 90.0);
        b.wire(fall_msg, repeat_delay);
        b.wire(repeat_delay, rise_msg);
    }

    let value_out = b.obj("outlet", vec![], 0.0, 120.0);
    b.wire(ramp, value_out);

    b.port("trigger", SignalType::Control, Direction::Input, trigger_in, 0);
    b.port("value", SignalType::Control, Direction::Output, ramp, 0);

    b.finish()
}
