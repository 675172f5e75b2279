//! Shared fixtures for the inline test modules.

use crate::error::CallError;
use crate::graph::{EdgeEnd, ModelGraph, Node};
use crate::signature::{BoundArguments, Function, Parameter, Signature};
use crate::value::Value;

/// Routes `log` output through the test harness; safe to call repeatedly.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn number(args: &BoundArguments, name: &str) -> Result<f64, CallError> {
    args.f64(name)
}

fn binary<F>(name: &str, left: &str, right: &str, op: F) -> Function
where
    F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
{
    let (l, r) = (left.to_string(), right.to_string());
    let sig = Signature::new(vec![Parameter::positional(left), Parameter::positional(right)]).unwrap();
    Function::plain(name, sig, move |args| Ok(Value::Float(op(number(args, &l)?, number(args, &r)?))))
}

/// add(a, constant=2) -> a + constant
pub fn addition() -> Function {
    let sig = Signature::new(vec![Parameter::positional("a"), Parameter::positional("constant").with_default(2)])
        .unwrap();
    Function::plain("addition", sig, |args| Ok(Value::Float(number(args, "a")? + number(args, "constant")?)))
}

pub fn subtraction() -> Function { binary("subtraction", "c", "d", |c, d| c - d) }

pub fn power() -> Function { binary("power", "c", "f", f64::powf) }

pub fn multiplication() -> Function { binary("multiplication", "e", "g", |e, g| e * g) }

/// Native `log(x, base)`; has no signature of its own.
pub fn logarithm() -> Function {
    Function::native("log", |args| {
        let x = args.first().and_then(Value::as_f64).unwrap_or(f64::NAN);
        let base = args.get(1).and_then(Value::as_f64).unwrap_or(std::f64::consts::E);
        if x <= 0.0 {
            return Err(CallError::msg("math domain error"));
        }
        Ok(Value::Float(x.ln() / base.ln()))
    })
}

pub fn scenario_nodes() -> Vec<Node> {
    vec![
        Node::builder("add", addition()).output("c").build().unwrap(),
        Node::builder("subtract", subtraction()).output("e").build().unwrap(),
        Node::builder("power", power()).output("g").build().unwrap(),
        Node::builder("multiply", multiplication()).output("k").build().unwrap(),
        Node::builder("log", logarithm()).inputs(["c", "b"]).output("m").build().unwrap(),
    ]
}

/// add -> {subtract, power, log}; {subtract, power} -> multiply
pub fn scenario_graph() -> ModelGraph {
    let edges: Vec<(EdgeEnd, EdgeEnd)> = vec![
        ("add".into(), vec!["subtract", "power", "log"].into()),
        (vec!["subtract", "power"].into(), "multiply".into()),
    ];
    let mut graph = ModelGraph::new("test_graph").with_doc("Test graph.");
    graph.add_grouped_edges_from(edges).unwrap();
    graph.set_node_objects_from(scenario_nodes());
    graph
}
