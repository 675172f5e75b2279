//! handler.rs
//! Compiles a validated graph into a plan and runs it under a strategy.
//!
//! The plan (merged signature, topological steps, read counts) is computed
//! once; every call opens a fresh execution state from the strategy, so
//! concurrent calls never share intermediate values.

use super::ledger::{CountedLedger, ExecutionState, PlainLedger};
use super::store::{GroupStore, JsonFileStore, MemoryStore, StoreLedger};
use super::telemetry::ExecutionStats;
use crate::error::{CallError, GraphError, StoreError};
use crate::graph::topology::{graph_outputs, graph_signature, param_counter, topological_order};
use crate::graph::{ModelGraph, Node};
use crate::signature::{split_arguments, Signature};
use crate::value::{Kwargs, Value};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// One node invocation in topological order.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub node: Node,
    pub params: Vec<String>,
    pub returns: SmallVec<[String; 1]>,
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub signature: Signature,
    pub returns: Vec<String>,
    pub steps: Vec<PlanStep>,
    /// Reads per value name, used by the reference-counted state.
    pub counter: HashMap<String, usize>,
}

impl ExecutionPlan {
    /// `returns` must name model inputs or node outputs.
    pub fn compile(graph: &ModelGraph, returns: &[String]) -> Result<Self, GraphError> {
        let order = topological_order(graph)?;
        let steps = order
            .iter()
            .map(|name| {
                let node = graph.node(name)?.clone();
                Ok(PlanStep {
                    params: node.signature().names().map(str::to_string).collect(),
                    returns: node.returns().into_iter().collect(),
                    node,
                })
            })
            .collect::<Result<Vec<_>, GraphError>>()?;

        let signature = graph_signature(graph)?;
        let outputs = graph_outputs(graph);
        if let Some(unknown) = returns.iter().find(|r| !signature.contains(r) && !outputs.contains(*r)) {
            return Err(GraphError::UnknownReturn(unknown.clone()));
        }

        log::debug!("compiled plan for graph '{}': {} steps, returns {:?}", graph.name(), steps.len(), returns);
        Ok(Self { signature, returns: returns.to_vec(), steps, counter: param_counter(graph, returns) })
    }
}

/// Intermediate-value storage policy of an executor.
pub trait Strategy: Send + Sync + fmt::Debug {
    fn name(&self) -> String;

    /// Opens the execution state for one call.
    fn open(&self, plan: &ExecutionPlan) -> Result<Box<dyn ExecutionState>, CallError>;
}

/// Keeps every value in memory until the call ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHandler;

impl Strategy for PlainHandler {
    fn name(&self) -> String { "PlainHandler".to_string() }

    fn open(&self, _plan: &ExecutionPlan) -> Result<Box<dyn ExecutionState>, CallError> {
        Ok(Box::new(PlainLedger::new()))
    }
}

/// Evicts each value right after its last read.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemHandler;

impl Strategy for MemHandler {
    fn name(&self) -> String { "MemHandler".to_string() }

    fn open(&self, plan: &ExecutionPlan) -> Result<Box<dyn ExecutionState>, CallError> {
        Ok(Box::new(CountedLedger::new(&plan.counter)))
    }
}

/// Writes every value of a call into a new group of a durable store.
#[derive(Clone)]
pub struct StoreHandler {
    store: Arc<dyn GroupStore>,
    group: String,
}

impl StoreHandler {
    pub fn new(store: Arc<dyn GroupStore>, group: impl Into<String>) -> Self {
        Self { store, group: group.into() }
    }

    pub fn store(&self) -> &Arc<dyn GroupStore> { &self.store }
}

impl fmt::Debug for StoreHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandler").field("group", &self.group).finish()
    }
}

impl Strategy for StoreHandler {
    fn name(&self) -> String { format!("StoreHandler(group='{}')", self.group) }

    fn open(&self, _plan: &ExecutionPlan) -> Result<Box<dyn ExecutionState>, CallError> {
        Ok(Box::new(StoreLedger::open(self.store.clone(), &self.group)?))
    }
}

fn default_group() -> String { "model".to_string() }

/// Serializable strategy choice, e.g. `{"type": "store", "path": "runs.json"}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    Plain,
    #[default]
    Memory,
    Store {
        /// JSON store file; an in-process store when absent.
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default = "default_group")]
        group: String,
    },
}

impl HandlerConfig {
    pub fn build(&self) -> Result<Arc<dyn Strategy>, StoreError> {
        Ok(match self {
            HandlerConfig::Plain => Arc::new(PlainHandler),
            HandlerConfig::Memory => Arc::new(MemHandler),
            HandlerConfig::Store { path: Some(path), group } => {
                Arc::new(StoreHandler::new(JsonFileStore::shared(path)?, group.clone()))
            }
            HandlerConfig::Store { path: None, group } => {
                Arc::new(StoreHandler::new(Arc::new(MemoryStore::new()), group.clone()))
            }
        })
    }
}

/// A compiled graph: a plan plus the strategy that runs it.
#[derive(Debug, Clone)]
pub struct Executor {
    plan: Arc<ExecutionPlan>,
    strategy: Arc<dyn Strategy>,
}

impl Executor {
    pub fn new(graph: &ModelGraph, returns: &[String], strategy: Arc<dyn Strategy>) -> Result<Self, GraphError> {
        Ok(Self { plan: Arc::new(ExecutionPlan::compile(graph, returns)?), strategy })
    }

    pub fn signature(&self) -> &Signature { &self.plan.signature }

    pub fn returns(&self) -> &[String] { &self.plan.returns }

    pub fn plan(&self) -> &ExecutionPlan { &self.plan }

    pub fn strategy(&self) -> &Arc<dyn Strategy> { &self.strategy }

    pub fn run(&self, kwargs: Kwargs) -> Result<Value, CallError> {
        self.run_with_stats(kwargs).map(|(value, _)| value)
    }

    /// Runs the plan; one return yields the value itself, several a tuple.
    pub fn run_with_stats(&self, kwargs: Kwargs) -> Result<(Value, ExecutionStats), CallError> {
        let inputs = self.plan.signature.bind_defaults(Vec::new(), kwargs)?.into_inner();
        let mut state = self.strategy.open(&self.plan)?;
        let mut stats = ExecutionStats::default();

        match self.execute(state.as_mut(), inputs, &mut stats) {
            Ok(value) => {
                state.close()?;
                Ok((value, stats))
            }
            Err(err) => {
                if let Err(close_err) = state.close() {
                    log::warn!("failed to release execution state: {}", close_err);
                }
                Err(err)
            }
        }
    }

    fn execute(
        &self,
        state: &mut dyn ExecutionState,
        inputs: Kwargs,
        stats: &mut ExecutionStats,
    ) -> Result<Value, CallError> {
        for (key, value) in inputs {
            state.write(&key, value)?;
            stats.values_written += 1;
        }
        stats.observe(state.live_count());

        for step in &self.plan.steps {
            let mut gathered = Kwargs::new();
            for param in &step.params {
                gathered.insert(param.clone(), state.read(param)?);
            }

            log::trace!("running node '{}'", step.node.name());
            let output = match self.invoke(step, gathered.clone()) {
                Ok(output) => output,
                Err(source) => return Err(node_failure(state, step, &gathered, source)),
            };
            for (key, value) in output {
                state.write(&key, value)?;
                stats.values_written += 1;
            }
            stats.nodes_run += 1;
            stats.observe(state.live_count());
        }

        let mut values = self
            .plan
            .returns
            .iter()
            .map(|key| state.read(key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match values.len() {
            0 => Value::None,
            1 => values.remove(0),
            _ => Value::tuple(values),
        })
    }

    /// Calls the node and pairs its result with the declared output names.
    fn invoke(&self, step: &PlanStep, gathered: Kwargs) -> Result<Vec<(String, Value)>, CallError> {
        let (args, kwargs) = split_arguments(step.node.signature(), gathered)?;
        let value = step.node.call_with(args, kwargs)?;

        match step.returns.as_slice() {
            [] => Ok(Vec::new()),
            [name] => Ok(vec![(name.clone(), value)]),
            names => {
                let items = value.into_items().unwrap_or_default();
                if items.len() != names.len() {
                    return Err(CallError::OutputMismatch { expected: names.to_vec(), given: items.len() });
                }
                Ok(names.iter().cloned().zip(items).collect())
            }
        }
    }
}

/// Wraps a node failure with the node description and its exact inputs.
fn node_failure(state: &mut dyn ExecutionState, step: &PlanStep, inputs: &Kwargs, source: CallError) -> CallError {
    let name = step.node.name().to_string();
    if let Err(e) = state.note_failure(&format!("exception occurred for node '{}': {}", name, source)) {
        log::warn!("failed to record node failure: {}", e);
    }

    let rendered: Vec<String> = inputs.iter().map(|(k, v)| format!("{} = {}", k, v)).collect();
    let details = format!(
        "--- node info ---\n{}\n--- input info ---\n{}\n--- error ---\n{}",
        step.node,
        rendered.join("\n"),
        source
    );
    CallError::Node { node: name, details, source: Box::new(source) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::StoreEntry;
    use crate::test_utils::{init_logger, scenario_graph};
    use crate::value::kwargs;
    use rstest::{fixture, rstest};

    #[fixture]
    fn graph() -> ModelGraph { scenario_graph() }

    fn returns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn inputs() -> Kwargs {
        kwargs([("a", 10), ("d", 15), ("f", 0), ("b", 2)])
    }

    fn expected() -> Value {
        Value::tuple(vec![Value::Float(-3.0), Value::Float(12f64.ln() / 2f64.ln())])
    }

    #[rstest]
    #[case(Arc::new(PlainHandler))]
    #[case(Arc::new(MemHandler))]
    #[case(Arc::new(StoreHandler::new(Arc::new(MemoryStore::new()), "test")))]
    fn test_strategies_agree(graph: ModelGraph, #[case] strategy: Arc<dyn Strategy>) {
        let executor = Executor::new(&graph, &returns(&["k", "m"]), strategy).unwrap();
        assert_eq!(executor.signature().to_string(), "(a, b, d, f, constant=2)");
        assert_eq!(executor.run(inputs()).unwrap(), expected());
    }

    #[rstest]
    fn test_mem_peak_never_exceeds_plain(graph: ModelGraph) {
        let rt = returns(&["k", "m"]);
        let plain = Executor::new(&graph, &rt, Arc::new(PlainHandler)).unwrap();
        let mem = Executor::new(&graph, &rt, Arc::new(MemHandler)).unwrap();

        let (plain_out, plain_stats) = plain.run_with_stats(inputs()).unwrap();
        let (mem_out, mem_stats) = mem.run_with_stats(inputs()).unwrap();
        assert_eq!(plain_out, mem_out);
        assert_eq!(plain_stats.nodes_run, 5);
        assert_eq!(mem_stats.nodes_run, 5);
        assert!(mem_stats.peak_live_values <= plain_stats.peak_live_values);
        // a, b, d, f, constant plus five outputs
        assert_eq!(plain_stats.peak_live_values, 10);
    }

    #[rstest]
    fn test_single_return_is_scalar(graph: ModelGraph) {
        let executor = Executor::new(&graph, &returns(&["c"]), Arc::new(MemHandler)).unwrap();
        assert_eq!(executor.run(inputs()).unwrap(), Value::Float(12.0));
    }

    #[rstest]
    fn test_input_can_be_returned(graph: ModelGraph) {
        let executor = Executor::new(&graph, &returns(&["k", "a"]), Arc::new(MemHandler)).unwrap();
        assert_eq!(executor.run(inputs()).unwrap(), Value::tuple(vec![Value::Float(-3.0), Value::Int(10)]));
    }

    #[rstest]
    fn test_unknown_return(graph: ModelGraph) {
        let err = Executor::new(&graph, &returns(&["zz"]), Arc::new(PlainHandler)).unwrap_err();
        assert_eq!(err, GraphError::UnknownReturn("zz".into()));
    }

    #[rstest]
    fn test_node_failure_is_wrapped(graph: ModelGraph) {
        init_logger();
        let executor = Executor::new(&graph, &returns(&["k", "m"]), Arc::new(MemHandler)).unwrap();
        let err = executor.run(kwargs([("a", -10), ("d", 15), ("f", 0), ("b", 2)])).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("exception occurred for node 'log'"), "{}", text);
        assert!(text.contains("--- input info ---\nb = 2\nc = -8.0"), "{}", text);
        assert!(text.contains("math domain error"), "{}", text);
        match err {
            CallError::Node { source, .. } => assert_eq!(source.to_string(), "math domain error"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[rstest]
    fn test_store_records_failure_note(graph: ModelGraph) {
        init_logger();
        let store = Arc::new(MemoryStore::new());
        let executor =
            Executor::new(&graph, &returns(&["k", "m"]), Arc::new(StoreHandler::new(store.clone(), "run"))).unwrap();
        executor.run(inputs()).unwrap();
        assert!(executor.run(kwargs([("a", -10), ("d", 15), ("f", 0), ("b", 2)])).is_err());

        let groups = store.group_names();
        assert_eq!(groups.len(), 2);
        let notes: Vec<String> = groups
            .iter()
            .filter_map(|g| store.group(g).ok()?.attrs.get("note").cloned())
            .collect();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("node 'log'"));
    }

    #[rstest]
    fn test_missing_input_is_binding_error(graph: ModelGraph) {
        let executor = Executor::new(&graph, &returns(&["k", "m"]), Arc::new(PlainHandler)).unwrap();
        let err = executor.run(kwargs([("a", 1)])).unwrap_err();
        assert!(matches!(err, CallError::MissingArgument(_)));
    }

    #[test]
    fn test_multiple_outputs_are_zipped() {
        use crate::signature::{Function, Signature};
        let sig = Signature::keyword_only(["x"]).unwrap();
        let split = Function::plain("split", sig, |args| {
            let x = args.f64("x")?;
            Ok(Value::tuple(vec![Value::Float(x.floor()), Value::Float(x - x.floor())]))
        });
        let mut graph = ModelGraph::new("split");
        graph.set_node_object(Node::builder("split", split).output(vec!["whole", "frac"]).build().unwrap());

        let executor = Executor::new(&graph, &returns(&["frac", "whole"]), Arc::new(MemHandler)).unwrap();
        assert_eq!(
            executor.run(kwargs([("x", 2.5)])).unwrap(),
            Value::tuple(vec![Value::Float(0.5), Value::Float(2.0)])
        );
    }

    #[rstest]
    #[case(r#"{"type": "plain"}"#, HandlerConfig::Plain)]
    #[case(r#"{"type": "memory"}"#, HandlerConfig::Memory)]
    #[case(r#"{"type": "store"}"#, HandlerConfig::Store { path: None, group: "model".into() })]
    #[case(
        r#"{"type": "store", "path": "runs.json", "group": "g"}"#,
        HandlerConfig::Store { path: Some("runs.json".into()), group: "g".into() }
    )]
    fn test_handler_config(#[case] json: &str, #[case] expected: HandlerConfig) {
        let parsed: HandlerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_json_store_handler_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let config = HandlerConfig::Store { path: Some(path.clone()), group: "scenario".into() };
        let executor = Executor::new(&scenario_graph(), &returns(&["k", "m"]), config.build().unwrap()).unwrap();
        executor.run(inputs()).unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        let groups = store.group_names();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].starts_with("scenario "));
        let group = store.group(&groups[0]).unwrap();
        assert!(group.entries.contains_key("c"));
        assert!(group.entries.contains_key("m"));
    }

    #[test]
    fn test_json_store_persists_failed_run() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let config = HandlerConfig::Store { path: Some(path.clone()), group: "failing".into() };
        let executor = Executor::new(&scenario_graph(), &returns(&["k", "m"]), config.build().unwrap()).unwrap();
        assert!(executor.run(kwargs([("a", -10), ("d", 15), ("f", 0), ("b", 2)])).is_err());

        let store = JsonFileStore::open(&path).unwrap();
        let groups = store.group_names();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].starts_with("failing "));
        let group = store.group(&groups[0]).unwrap();
        assert_eq!(group.attrs["note"], "exception occurred for node 'log': math domain error");
        assert_eq!(group.entries["c"], StoreEntry::Dataset(Value::Float(-8.0)));
        assert!(!group.entries.contains_key("m"));
    }
}
