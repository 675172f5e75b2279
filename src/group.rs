//! group.rs
//! Several models built from one shared pool of nodes.
//!
//! Each recipe names its graph by grouped edges over node names; the node
//! objects come from the pool. Recipe settings override the group defaults.

use crate::compute::HandlerConfig;
use crate::display::metadata::{self, Metadata};
use crate::error::{GraphError, GroupError};
use crate::graph::{EdgeEnd, ModelGraph, Node};
use crate::model::Model;
use crate::modifier::Modifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Construction arguments of one model in a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRecipe {
    pub grouped_edges: Vec<(EdgeEnd, EdgeEnd)>,
    /// Nodes without edges, e.g. a single-node model.
    pub nodes: Vec<String>,
    pub handler: Option<HandlerConfig>,
    pub modifiers: Option<Vec<Modifier>>,
    pub returns: Option<Vec<String>>,
    pub doc: Option<String>,
}

impl ModelRecipe {
    pub fn new<I>(grouped_edges: I) -> Self
    where
        I: IntoIterator<Item = (EdgeEnd, EdgeEnd)>,
    {
        Self { grouped_edges: grouped_edges.into_iter().collect(), ..Self::default() }
    }
}

/// Settings shared by every recipe of a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefaults {
    pub handler: HandlerConfig,
    pub modifiers: Vec<Modifier>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelGroup {
    name: String,
    doc: String,
    nodes: Vec<Node>,
    recipes: BTreeMap<String, ModelRecipe>,
    defaults: ModelDefaults,
    models: BTreeMap<String, Model>,
}

impl ModelGroup {
    /// Builds every recipe; the first failing recipe aborts construction.
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<Node>,
        recipes: BTreeMap<String, ModelRecipe>,
        defaults: ModelDefaults,
    ) -> Result<Self, GroupError> {
        let name = name.into();
        let models = recipes
            .iter()
            .map(|(model, recipe)| Ok((model.clone(), build_model(model, recipe, &nodes, &defaults)?)))
            .collect::<Result<BTreeMap<_, _>, GroupError>>()?;
        log::debug!("model group '{}': built {} models from {} nodes", name, models.len(), nodes.len());
        Ok(Self { name, doc: String::new(), nodes, recipes, defaults, models })
    }

    /// Reads recipes from a JSON object keyed by model name.
    pub fn from_json(
        name: impl Into<String>,
        nodes: Vec<Node>,
        recipes: &str,
        defaults: ModelDefaults,
    ) -> Result<Self, GroupError> {
        let recipes: BTreeMap<String, ModelRecipe> = serde_json::from_str(recipes)?;
        Self::new(name, nodes, recipes, defaults)
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn doc(&self) -> &str { &self.doc }

    pub fn models(&self) -> &BTreeMap<String, Model> { &self.models }

    pub fn model(&self, name: &str) -> Option<&Model> { self.models.get(name) }

    pub fn nodes(&self) -> &[Node] { &self.nodes }

    pub fn recipes(&self) -> &BTreeMap<String, ModelRecipe> { &self.recipes }

    pub fn model_defaults(&self) -> &ModelDefaults { &self.defaults }

    /// Rebuilds all models of the group with new defaults.
    pub fn edit(&self, defaults: ModelDefaults) -> Result<Self, GroupError> {
        Ok(Self::new(self.name.clone(), self.nodes.clone(), self.recipes.clone(), defaults)?.with_doc(self.doc.clone()))
    }

    pub fn metadata(&self) -> Metadata {
        let models: Vec<_> = self.models.keys().map(|m| format!("- {}", m)).collect();
        let nodes: Vec<_> = self.nodes.iter().map(|n| format!("- {}", n.name())).collect();
        vec![
            ("name", self.name.clone()),
            ("models", models.join("\n")),
            ("nodes", nodes.join("\n")),
            ("doc", self.doc.trim().to_string()),
        ]
    }
}

impl fmt::Display for ModelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", metadata::format_metadata(&self.metadata()))
    }
}

fn build_model(
    model: &str,
    recipe: &ModelRecipe,
    nodes: &[Node],
    defaults: &ModelDefaults,
) -> Result<Model, GroupError> {
    let graph_error = |source: GraphError| GroupError::Model { model: model.to_string(), source };

    let mut graph = ModelGraph::new(format!("{}_graph", model));
    graph.add_grouped_edges_from(recipe.grouped_edges.iter().cloned()).map_err(graph_error)?;
    for name in &recipe.nodes {
        graph.add_node(name);
    }

    let objects = graph
        .node_names()
        .into_iter()
        .map(|name| {
            nodes.iter().find(|n| n.name() == name).cloned().ok_or(GraphError::NodeNotFound(name))
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(graph_error)?;
    graph.set_node_objects_from(objects);

    let handler = recipe
        .handler
        .as_ref()
        .unwrap_or(&defaults.handler)
        .build()
        .map_err(|source| GroupError::Handler { model: model.to_string(), source })?;
    let modifiers = recipe.modifiers.clone().unwrap_or_else(|| defaults.modifiers.clone());

    let mut builder = Model::builder(model, &graph).handler(handler).modifiers(modifiers);
    if let Some(returns) = &recipe.returns {
        builder = builder.returns(returns.iter().cloned());
    }
    if let Some(doc) = recipe.doc.as_ref().or(defaults.doc.as_ref()) {
        builder = builder.doc(doc.clone());
    }
    builder.build().map_err(graph_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scenario_nodes;
    use crate::value::{kwargs, Value};
    use rstest::{fixture, rstest};

    const RECIPES: &str = r#"{
        "full": {
            "grouped_edges": [["add", ["subtract", "power", "log"]], [["subtract", "power"], "multiply"]],
            "doc": "Full model."
        },
        "partial": {
            "grouped_edges": [["add", ["subtract", "log"]]],
            "handler": {"type": "plain"},
            "returns": ["e"]
        },
        "single": {
            "nodes": ["add"],
            "modifiers": [{"modifier": "loop", "parameter": "a"}]
        }
    }"#;

    #[fixture]
    fn group() -> ModelGroup {
        ModelGroup::from_json("group", scenario_nodes(), RECIPES, ModelDefaults::default()).unwrap()
    }

    #[rstest]
    fn test_models_are_built(group: ModelGroup) {
        assert_eq!(group.models().keys().collect::<Vec<_>>(), ["full", "partial", "single"]);

        let full = group.model("full").unwrap();
        assert_eq!(full.graph().name(), "full_graph");
        assert_eq!(full.doc(), "Full model.");
        assert_eq!(full.handler().name(), "MemHandler");

        let partial = group.model("partial").unwrap();
        assert_eq!(partial.handler().name(), "PlainHandler");
        assert_eq!(partial.call(kwargs([("a", 1), ("d", 1), ("b", 2)])).unwrap(), Value::Float(2.0));

        let single = group.model("single").unwrap();
        assert_eq!(single.signature().to_string(), "(a, constant=2)");
        let result = single.call(kwargs([("a", Value::from(vec![1, 2]))])).unwrap();
        assert_eq!(result, Value::list(vec![Value::Float(3.0), Value::Float(4.0)]));
    }

    #[rstest]
    fn test_defaults_and_overrides(group: ModelGroup) {
        let defaults = ModelDefaults {
            handler: HandlerConfig::Plain,
            modifiers: Vec::new(),
            doc: Some("Shared doc.".into()),
        };
        let edited = group.edit(defaults.clone()).unwrap();
        assert_eq!(edited.model_defaults(), &defaults);
        assert_eq!(edited.model("full").unwrap().doc(), "Full model.");
        assert_eq!(edited.model("full").unwrap().handler().name(), "PlainHandler");
        assert_eq!(edited.model("partial").unwrap().doc(), "Shared doc.");
        // recipe modifiers replace the (empty) defaults
        assert_eq!(edited.model("single").unwrap().modifiers(), vec![Modifier::looped("a")]);
        assert_eq!(group.model("full").unwrap().handler().name(), "MemHandler");
    }

    #[test]
    fn test_missing_node() {
        let edges: Vec<(EdgeEnd, EdgeEnd)> = vec![("add".into(), "divide".into())];
        let recipes = BTreeMap::from([("m".to_string(), ModelRecipe::new(edges))]);
        let err = ModelGroup::new("group", scenario_nodes(), recipes, ModelDefaults::default()).unwrap_err();
        assert!(matches!(&err, GroupError::Model { source: GraphError::NodeNotFound(n), .. } if n == "divide"));
        assert_eq!(err.to_string(), "model 'm': node 'divide' not found");
    }

    #[test]
    fn test_invalid_json() {
        let err = ModelGroup::from_json("group", scenario_nodes(), "{\"m\": 1}", ModelDefaults::default());
        assert!(matches!(err, Err(GroupError::Config(_))));
    }

    #[test]
    fn test_models_sharing_a_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let edges: Vec<(EdgeEnd, EdgeEnd)> = vec![("add".into(), "log".into())];
        let recipes = BTreeMap::from([
            ("m1".to_string(), ModelRecipe::new(edges.clone())),
            ("m2".to_string(), ModelRecipe::new(edges)),
        ]);
        let defaults = ModelDefaults {
            handler: HandlerConfig::Store { path: Some(path.clone()), group: "run".into() },
            ..ModelDefaults::default()
        };
        let group = ModelGroup::new("group", scenario_nodes(), recipes, defaults).unwrap();
        let inputs = || kwargs([("a", 1), ("b", 2)]);
        group.model("m1").unwrap().call(inputs()).unwrap();
        group.model("m2").unwrap().call(inputs()).unwrap();

        let store = crate::compute::JsonFileStore::open(&path).unwrap();
        let names = store.group_names();
        assert_eq!(names.len(), 2, "{:?}", names);
        assert!(names.iter().all(|n| n.starts_with("run ")));
    }

    #[rstest]
    fn test_display(group: ModelGroup) {
        let text = group.with_doc("Group doc.").to_string();
        assert!(text.starts_with("group\nmodels:\n  - full\n  - partial\n  - single\nnodes:\n  - add"));
        assert!(text.ends_with("\n\nGroup doc."));
    }
}
