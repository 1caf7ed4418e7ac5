//! External control bridge (§4.6.8): receives OSC or FUDI messages and
//! dispatches them onto named control buses `pd-<route>`. Grounded on the
//! teacher's `rosc`-backed OSC receiver pattern generalized to AST-level
//! `netreceive`/`route`/`send` objects, since this crate never opens a real
//! socket — it only emits the patch text that would.

use crate::error::Result;
use crate::template::{invalid_param, resolve_enum_option, resolve_list, Direction, Fragment, FragmentBuilder, SignalType};
use crate::ast::Token;
use serde_json::Value;

const PROTOCOLS: &[&str] = &["osc", "fudi"];

pub struct BridgeParams {
    pub protocol: String,
    pub port: i64,
    pub routes: Vec<String>,
}

impl BridgeParams {
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let protocol = resolve_enum_option(map, "protocol", PROTOCOLS, "osc", None)?;
        let port = map.get("port").and_then(|v| v.as_i64()).unwrap_or(if protocol == "osc" { 9000 } else { 3000 });
        if !(1..=65535).contains(&port) {
            return Err(invalid_param("port", &format!("{port} is out of range [1, 65535]"), None));
        }
        let routes = resolve_list(map, "routes", vec![], |v| v.as_str().map(|s| s.to_string()));
        if routes.is_empty() {
            return Err(invalid_param("routes", "at least one route must be specified", None));
        }
        Ok(Self { protocol, port, routes })
    }
}

pub fn build(params: &BridgeParams) -> Fragment {
    let mut b = FragmentBuilder::new();

    let receiver = b.obj("netreceive", vec![Token::Number(params.port as f64), Token::Number(1.0)], 0.0, 0.0);

    // OSC carries its routes as slash-prefixed address patterns inside a
    // binary blob that `oscparse` has to unpack first. FUDI is PD's own
    // plain-message protocol: `netreceive` already hands `route` bare
    // symbols, so there's nothing to unpack.
    let router = if params.protocol == "osc" {
        let unpack_oscparse = b.obj("oscparse", vec![], 0.0, 30.0);
        b.wire(receiver, unpack_oscparse);
        let route_args: Vec<Token> = params.routes.iter().map(|r| Token::Symbol(format!("/{r}"))).collect();
        let router = b.obj("route", route_args, 0.0, 60.0);
        b.wire(unpack_oscparse, router);
        router
    } else {
        let route_args: Vec<Token> = params.routes.iter().map(|r| Token::Symbol(r.clone())).collect();
        let router = b.obj("route", route_args, 0.0, 30.0);
        b.wire(receiver, router);
        router
    };

    for (i, route) in params.routes.iter().enumerate() {
        let x = (i as f64) * 80.0;
        let send = b.obj("send", vec![Token::Symbol(format!("pd-{route}"))], x, 100.0);
        b.wire_ports(router, i, send, 0);
        b.port(route, SignalType::Control, Direction::Output, send, 0);
    }

    b.finish()
}
