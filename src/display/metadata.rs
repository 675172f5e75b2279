//! Render-ready metadata for nodes, edges and models.
//!
//! The core only produces ordered `(key, text)` pairs and label strings;
//! rendering them (graphviz, docs) is left to the consumer.

use crate::graph::ModelGraph;
use crate::modifier::Modifier;

/// Ordered `(attribute, text)` pairs.
pub type Metadata = Vec<(&'static str, String)>;

/// Renders returns as `None`, `c`, or `(c, d)`.
pub fn format_returns(returns: &[String]) -> String {
    match returns {
        [] => "None".to_string(),
        [single] => single.clone(),
        many => format!("({})", many.join(", ")),
    }
}

/// One modifier per line, as `- loop_modifier(parameter='a')`.
pub fn format_modifiers(modifiers: &[Modifier]) -> String {
    modifiers.iter().map(|m| format!("- {}", m)).collect::<Vec<_>>().join("\n")
}

/// Formats metadata as plain text.
///
/// `name` becomes the title line, `doc` a trailing paragraph, multi-line and
/// list values an indented block. Empty values are skipped.
pub fn format_metadata(metadata: &[(&str, String)]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut doc = None;

    for (key, value) in metadata {
        if value.is_empty() {
            continue;
        }
        match *key {
            "name" => lines.push(value.clone()),
            "doc" => doc = Some(value),
            _ if value.contains('\n') || value.starts_with("- ") => {
                lines.push(format!("{}:", key));
                lines.extend(value.lines().map(|line| format!("  {}", line)));
            }
            _ => lines.push(format!("{}: {}", key, value)),
        }
    }

    if let Some(doc) = doc {
        lines.push(String::new());
        lines.push(doc.clone());
    }
    lines.join("\n").trim_end().to_string()
}

/// Label for each node that carries a node object, in graph order.
pub fn node_labels(graph: &ModelGraph) -> Vec<(String, String)> {
    graph
        .node_names()
        .into_iter()
        .filter_map(|name| {
            let node = graph.node(&name).ok()?;
            Some((name, node.to_string()))
        })
        .collect()
}

/// Label for each edge: the names routed along it (empty if none yet).
pub fn edge_labels(graph: &ModelGraph) -> Vec<((String, String), String)> {
    graph
        .edges()
        .into_iter()
        .map(|(u, v)| {
            let label = graph.edge_output(&u, &v).map(|names| names.join(", ")).unwrap_or_default();
            ((u, v), label)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![], "None")]
    #[case(vec!["c"], "c")]
    #[case(vec!["c", "d"], "(c, d)")]
    fn test_format_returns(#[case] returns: Vec<&str>, #[case] expected: &str) {
        let returns: Vec<String> = returns.into_iter().map(String::from).collect();
        assert_eq!(format_returns(&returns), expected);
    }

    #[test]
    fn test_format_metadata_doc_only() {
        let metadata: Metadata = vec![("name", "node".to_string()), ("doc", "Line one.\nLine two.".to_string())];
        assert_eq!(format_metadata(&metadata), "node\n\nLine one.\nLine two.");
    }

    #[test]
    fn test_format_metadata() {
        let metadata: Metadata = vec![
            ("name", "model".to_string()),
            ("signature", "model(a, b=2)".to_string()),
            ("returns", "c".to_string()),
            ("modifiers", format_modifiers(&[Modifier::looped("a")])),
            ("handler", String::new()),
            ("doc", "Sums things.".to_string()),
        ];
        let text = format_metadata(&metadata);
        assert_eq!(
            text,
            "model\nsignature: model(a, b=2)\nreturns: c\nmodifiers:\n  - loop_modifier(parameter='a')\n\nSums things."
        );
    }
}
