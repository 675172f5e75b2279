//! Shortcuts that rebuild a model with a modified copy of its graph.

use crate::error::{GraphError, SignatureError};
use crate::graph::{Node, Output};
use crate::model::Model;
use crate::modifier::Modifier;
use crate::signature::Function;

/// Appends modifiers to the named nodes and rebuilds the model.
///
/// `name` defaults to the model's own name.
pub fn modifier_shortcut<I, S>(model: &Model, modifiers: I, name: Option<&str>) -> Result<Model, GraphError>
where
    I: IntoIterator<Item = (S, Vec<Modifier>)>,
    S: AsRef<str>,
{
    let mut graph = model.graph().clone();
    for (node, extra) in modifiers {
        graph.modify_node(node.as_ref(), |builder| extra.into_iter().fold(builder, |b, m| b.modifier(m)))?;
    }
    model.edit().name(name.unwrap_or(model.name())).graph(&graph).build()
}

/// Loops the part of the model that depends on `parameter`.
///
/// The nodes reading `parameter` and their descendants become a sub-model
/// with the same strategy; it is wrapped in a node named `node_name` with
/// `loop_modifier(parameter)` and replaces those nodes. The loop node's
/// output defaults to the sub-model's single return.
pub fn loop_shortcut(
    model: &Model,
    parameter: &str,
    node_name: Option<&str>,
    output: Option<&str>,
) -> Result<Model, GraphError> {
    let graph = model.graph();
    let mut subgraph = graph.subgraph(&[], &[parameter.to_string()], &[]);
    if subgraph.node_count() == 0 {
        return Err(SignatureError::UnknownParameter {
            modifier: "loop_shortcut".to_string(),
            parameter: parameter.to_string(),
        }
        .into());
    }

    let node_name = node_name.map_or_else(|| format!("{} loop node", parameter), str::to_string);
    subgraph.set_name(format!("{} subgraph", node_name));
    let submodel = Model::builder(node_name.clone(), &subgraph)
        .handler(model.handler().clone())
        .doc(format!("Loop over '{}' of {}.", parameter, model.name()))
        .build()?;

    let output = match output {
        Some(output) => output.to_string(),
        None => match submodel.returns() {
            [single] => single.clone(),
            many => {
                return Err(GraphError::AmbiguousOutput { node: node_name, outputs: many.to_vec() });
            }
        },
    };

    let node = Node::builder(node_name, Function::from(submodel))
        .modifier(Modifier::looped(parameter))
        .build()?;
    let looped = graph.replace_subgraph(&subgraph, node, Some(Output::Single(output)))?;
    model.edit().graph(&looped).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_logger, scenario_graph};
    use crate::value::{kwargs, Value};

    fn model() -> Model { Model::new("model", &scenario_graph()).unwrap() }

    #[test]
    fn test_modifier_shortcut() {
        let model = model();
        let looped = modifier_shortcut(&model, [("power", vec![Modifier::looped("f")])], Some("looped")).unwrap();
        assert_eq!(looped.name(), "looped");
        assert_eq!(looped.get_node("power").unwrap().modifiers(), vec![Modifier::looped("f")]);
        assert!(model.get_node("power").unwrap().modifiers().is_empty());

        // power now yields a list, so multiply receives a list for g
        let err = looped.call(kwargs([("a", Value::from(1)), ("d", 1.into()), ("f", Value::from(vec![1, 2])), ("b", 2.into())]));
        assert!(err.is_err());
    }

    #[test]
    fn test_modifier_shortcut_unknown_node() {
        let err = modifier_shortcut(&model(), [("nope", vec![Modifier::looped("f")])], None).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound("nope".into()));
    }

    #[test]
    fn test_loop_shortcut() {
        init_logger();
        let model = model();
        let looped = loop_shortcut(&model, "f", None, None).unwrap();
        let graph = looped.graph();
        assert!(graph.contains_node("f loop node"));
        assert!(!graph.contains_node("power"));
        assert!(!graph.contains_node("multiply"));
        assert_eq!(looped.returns(), &["k".to_string(), "m".to_string()]);

        let result = looped
            .call(kwargs([("a", Value::from(1)), ("d", 1.into()), ("f", Value::from(vec![1, 2])), ("b", 2.into())]))
            .unwrap();
        // c = 3, e = 2, g = 3 and 9
        let items = result.as_items().unwrap();
        assert_eq!(items[0], Value::list(vec![Value::Float(6.0), Value::Float(18.0)]));
    }

    #[test]
    fn test_loop_shortcut_unknown_parameter() {
        assert!(matches!(
            loop_shortcut(&model(), "zz", None, None),
            Err(GraphError::Signature(SignatureError::UnknownParameter { .. }))
        ));
    }

    #[test]
    fn test_loop_shortcut_ambiguous_output() {
        // every node depends on a
        let err = loop_shortcut(&model(), "a", Some("all"), None).unwrap_err();
        assert_eq!(err, GraphError::AmbiguousOutput { node: "all".into(), outputs: vec!["k".into(), "m".into()] });
    }
}
