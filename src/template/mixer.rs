//! Channel-strip mixer (§4.6.4): per-channel volume multiplier summed
//! through a chained adder tree. Grounded on `superdirt_synths.rs`'s
//! gain-staging pattern (a `*~` fed by a loadbang-initialized control
//! value) repeated per channel.

use crate::ast::Token;
use crate::error::Result;
use crate::template::{resolve_f64_range, Curve, Direction, Fragment, FragmentBuilder, SignalType};
use serde_json::Value;

pub struct MixerParams {
    pub channels: usize,
}

impl MixerParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let channels = resolve_f64_range(map, "channels", 4.0, 1.0, 16.0)? as usize;
        Ok(Self { channels })
    }
}

pub fn build(params: &MixerParams) -> Fragment {
    let mut b = FragmentBuilder::new();
    let mut mix_node: Option<usize> = None;

    for ch in 1..=params.channels {
        let x = (ch as f64) * 80.0;
        let audio_in = b.obj("inlet~", vec![], x, 0.0);
        let gain_widget = b.obj("nbx", vec![], x, 30.0);
        let loadbang = b.obj("loadbang", vec![], x + 30.0, 0.0);
        let default_msg = b.msg(vec![Token::Number(0.8)], x + 30.0, 30.0);
        b.wire(loadbang, default_msg);
        b.wire(default_msg, gain_widget);

        let mult = b.obj("*~", vec![Token::Number(0.8)], x, 60.0);
        b.wire(audio_in, mult);
        b.wire_ports(gain_widget, 0, mult, 1);

        b.port_with_io(&format!("ch{ch}"), SignalType::Audio, Direction::Input, mult, 0, audio_in);
        b.parameter(&format!("volume_ch{ch}"), &format!("Channel {ch} volume"), 0.0, 1.0, 0.8, "", Curve::Linear, mult, 1, "mix");

        mix_node = Some(match mix_node {
            Some(prev) => {
                let adder = b.obj("+~", vec![], x, 100.0);
                b.wire(prev, adder);
                b.wire(mult, adder);
                adder
            }
            None => mult,
        });
    }

    let audio_out = b.obj("dac~", vec![], 0.0, 140.0);
    if let Some(mix) = mix_node {
        b.wire(mix, audio_out);
    }
    b.port_with_io("audio", SignalType::Audio, Direction::Output, mix_node.unwrap_or(audio_out), 0, audio_out);

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_channel_count_is_four() {
        let p = MixerParams::from_map(json!({}).as_object().unwrap()).unwrap();
        assert_eq!(p.channels, 4);
    }

    #[test]
    fn builds_one_input_port_per_channel() {
        let p = MixerParams::from_map(json!({"channels": 3}).as_object().unwrap()).unwrap();
        let fragment = build(&p);
        let input_ports = fragment.ports.iter().filter(|port| matches!(port.direction, Direction::Input)).count();
        assert_eq!(input_ports, 3);
    }

    #[test]
    fn out_of_range_channel_count_is_rejected() {
        let err = MixerParams::from_map(json!({"channels": 32}).as_object().unwrap()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidParam);
    }
}
