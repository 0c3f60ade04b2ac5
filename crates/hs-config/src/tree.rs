//! Nested configuration-tree addressing.
//!
//! Hyperparameter names use colon-separated segments (`model:optimizer:lr`)
//! to index into arbitrary nesting depth in the model document.
//! [`update_path`] descends the tree creating mapping levels on demand and
//! sets the leaf; [`flatten`] walks the tree lazily and yields one
//! `(path, value)` pair per leaf so callers can audit which declared
//! parameters were actually reachable after an update.

use std::collections::HashSet;

use serde_yaml::{Mapping, Value};

/// Split a declared parameter name into its path segments.
pub fn split_path(name: &str) -> Vec<&str> {
    name.split(':').collect()
}

/// Set `value` at `path` inside `tree`, mutating it in place.
///
/// The final segment is assigned unconditionally. Any non-final segment that
/// is absent, or present but not a mapping, is replaced by an empty mapping
/// before descending. Recursion depth is bounded by the segment count.
pub fn update_path(tree: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    if !tree.is_mapping() {
        *tree = Value::Mapping(Mapping::new());
    }
    let Some(map) = tree.as_mapping_mut() else {
        return;
    };

    let key = Value::String((*head).to_string());
    if rest.is_empty() {
        map.insert(key, value);
        return;
    }

    if !matches!(map.get(&key), Some(Value::Mapping(_))) {
        map.insert(key.clone(), Value::Mapping(Mapping::new()));
    }
    if let Some(child) = map.get_mut(&key) {
        update_path(child, rest, value);
    }
}

/// [`update_path`] for a colon-joined parameter name.
pub fn update_colon_path(tree: &mut Value, name: &str, value: Value) {
    update_path(tree, &split_path(name), value);
}

/// Lazy depth-first iterator over the leaves of a configuration tree.
///
/// Yields `(segments, value)` for every non-mapping node. Sequences count as
/// leaves; parameter paths never index into them.
pub struct Leaves<'a> {
    stack: Vec<(Vec<String>, &'a Value)>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = (Vec<String>, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((path, node)) = self.stack.pop() {
            match node {
                Value::Mapping(map) => {
                    for (key, child) in map {
                        let mut child_path = path.clone();
                        child_path.push(key_to_string(key));
                        self.stack.push((child_path, child));
                    }
                }
                leaf => return Some((path, leaf)),
            }
        }
        None
    }
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => "~".to_string(),
    }
}

/// Walk `tree` and lazily yield every leaf with its full path from the root.
pub fn flatten(tree: &Value) -> Leaves<'_> {
    Leaves {
        stack: vec![(Vec::new(), tree)],
    }
}

/// Report which declared parameter names could not be matched against the
/// flattened tree.
///
/// A name counts as observed when its final path segment occurs as a segment
/// of some leaf path. Unmatched names are a warning, not an error: a custom
/// objective may apply those parameters itself.
pub fn unmatched_parameters<'a, I>(declared: I, tree: &Value) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let segments: HashSet<String> = flatten(tree).flat_map(|(path, _)| path).collect();

    declared
        .into_iter()
        .filter(|name| {
            let last = name.rsplit(':').next().unwrap_or(name);
            !segments.contains(last)
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn update_then_flatten_yields_single_leaf() {
        let mut tree = Value::Mapping(Mapping::new());
        update_path(&mut tree, &["a", "b", "c"], Value::from(0.5));

        let leaves: Vec<_> = flatten(&tree).collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, vec!["a", "b", "c"]);
        assert_eq!(*leaves[0].1, Value::from(0.5));
    }

    #[test]
    fn second_update_overwrites_without_duplication() {
        let mut tree = Value::Mapping(Mapping::new());
        update_path(&mut tree, &["a", "b"], Value::from(1));
        update_path(&mut tree, &["a", "b"], Value::from(2));

        let leaves: Vec<_> = flatten(&tree).collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(*leaves[0].1, Value::from(2));
    }

    #[test]
    fn non_mapping_intermediate_is_replaced() {
        let mut tree = yaml("a: 7");
        update_path(&mut tree, &["a", "b"], Value::from("x"));

        let leaves: Vec<_> = flatten(&tree).collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, vec!["a", "b"]);
    }

    #[test]
    fn single_segment_sets_top_level_key() {
        let mut tree = yaml("epochs: 10\nbatch_size: 32");
        update_colon_path(&mut tree, "epochs", Value::from(50));

        assert_eq!(tree.get("epochs"), Some(&Value::from(50)));
        assert_eq!(tree.get("batch_size"), Some(&Value::from(32)));
    }

    #[test]
    fn flatten_walks_existing_document() {
        let tree = yaml("model:\n  optimizer:\n    lr: 0.001\n    decay: 0.9\n  layers: [64, 64]\nseed: 1");
        let mut paths: Vec<String> = flatten(&tree).map(|(p, _)| p.join(":")).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["model:layers", "model:optimizer:decay", "model:optimizer:lr", "seed"]
        );
    }

    #[test]
    fn unmatched_parameters_reports_missing_suffix() {
        let tree = yaml("model:\n  optimizer:\n    lr: 0.001");
        let missing = unmatched_parameters(
            ["model:optimizer:lr", "model:dropout"].into_iter(),
            &tree,
        );
        assert_eq!(missing, vec!["model:dropout"]);
    }

    #[test]
    fn flatten_is_lazy_over_scalar_root() {
        let tree = Value::from(3);
        let leaves: Vec<_> = flatten(&tree).collect();
        assert_eq!(leaves.len(), 1);
        assert!(leaves[0].0.is_empty());
    }
}
