//! Structural diff of two JSON-like documents.
//!
//! Objects are compared key by key. Arrays are compared as multisets:
//! reordering alone is not a change. Paths read `root['key'][2]`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Key present only in the new document.
    Added { path: String, value: Value },
    /// Key present only in the old document.
    Removed { path: String, value: Value },
    Changed { path: String, old: Value, new: Value },
    /// Array element without a counterpart in the old array.
    ItemAdded { path: String, value: Value },
    /// Array element without a counterpart in the new array.
    ItemRemoved { path: String, value: Value },
}

impl Change {
    pub fn path(&self) -> &str {
        match self {
            Change::Added { path, .. }
            | Change::Removed { path, .. }
            | Change::Changed { path, .. }
            | Change::ItemAdded { path, .. }
            | Change::ItemRemoved { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralDiff {
    pub changes: Vec<Change>,
}

impl StructuralDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// One sentence per change.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = match change {
                Change::Added { path, .. } => write!(out, "Item {path} added to dictionary."),
                Change::Removed { path, .. } => write!(out, "Item {path} removed from dictionary."),
                Change::Changed { path, old, new } => write!(
                    out,
                    "Value of {path} changed from {} to {}.",
                    render(old),
                    render(new)
                ),
                Change::ItemAdded { path, value } => {
                    write!(out, "Item {path} ({}) added to iterable.", render(value))
                }
                Change::ItemRemoved { path, value } => {
                    write!(out, "Item {path} ({}) removed from iterable.", render(value))
                }
            };
        }
        out
    }
}

pub fn diff(old: &Value, new: &Value) -> StructuralDiff {
    let mut changes = Vec::new();
    walk("root", old, new, &mut changes);
    StructuralDiff { changes }
}

fn walk(path: &str, old: &Value, new: &Value, out: &mut Vec<Change>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in a {
                let child = format!("{path}['{key}']");
                match b.get(key) {
                    Some(other) => walk(&child, value, other, out),
                    None => out.push(Change::Removed {
                        path: child,
                        value: value.clone(),
                    }),
                }
            }
            for (key, value) in b {
                if !a.contains_key(key) {
                    out.push(Change::Added {
                        path: format!("{path}['{key}']"),
                        value: value.clone(),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => diff_multiset(path, a, b, out),
        _ if old != new => out.push(Change::Changed {
            path: path.to_owned(),
            old: old.clone(),
            new: new.clone(),
        }),
        _ => {}
    }
}

fn diff_multiset(path: &str, old: &[Value], new: &[Value], out: &mut Vec<Change>) {
    // serde_json maps are sorted, so the rendering is canonical
    let mut remaining: BTreeMap<String, usize> = BTreeMap::new();
    for item in new {
        *remaining.entry(item.to_string()).or_default() += 1;
    }

    let mut unmatched_old = Vec::new();
    for (i, item) in old.iter().enumerate() {
        match remaining.get_mut(&item.to_string()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => unmatched_old.push((i, item)),
        }
    }

    for (i, item) in unmatched_old {
        out.push(Change::ItemRemoved {
            path: format!("{path}[{i}]"),
            value: item.clone(),
        });
    }
    for (i, item) in new.iter().enumerate() {
        if let Some(n) = remaining.get_mut(&item.to_string()) {
            if *n > 0 {
                *n -= 1;
                out.push(Change::ItemAdded {
                    path: format!("{path}[{i}]"),
                    value: item.clone(),
                });
            }
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_documents_have_no_changes() {
        let doc = json!({"core400s": {"type": "wifi", "tags": ["a", "b"]}});
        assert!(diff(&doc, &doc.clone()).is_empty());
    }

    #[test]
    fn arrays_ignore_order_but_not_multiplicity() {
        assert!(diff(&json!([1, 2, 3]), &json!([3, 1, 2])).is_empty());

        let d = diff(&json!([1, 1, 2]), &json!([1, 2]));
        assert_eq!(
            d.changes,
            vec![Change::ItemRemoved {
                path: "root[1]".into(),
                value: json!(1)
            }]
        );
    }

    #[test]
    fn keyed_rows_report_paths_by_key() {
        let old = json!({
            "core400s": {"model": "Core400S", "category": "air"},
            "gone": {"model": "X"}
        });
        let new = json!({
            "core400s": {"model": "Core400S", "category": "purifier"},
            "lv600s": {"model": "LV600S"}
        });
        let d = diff(&old, &new);
        assert_eq!(d.len(), 3);
        assert_eq!(
            d.pretty(),
            "Value of root['core400s']['category'] changed from 'air' to 'purifier'.\n\
             Item root['gone'] removed from dictionary.\n\
             Item root['lv600s'] added to dictionary."
        );
    }

    #[test]
    fn type_change_is_a_value_change() {
        let d = diff(&json!({"a": 1}), &json!({"a": "1"}));
        assert_eq!(d.changes[0].path(), "root['a']");
        assert!(matches!(d.changes[0], Change::Changed { .. }));
    }

    #[test]
    fn array_item_changes_are_phrased_as_iterable() {
        let d = diff(&json!({"l": ["x"]}), &json!({"l": ["x", "y"]}));
        assert_eq!(d.pretty(), "Item root['l'][1] ('y') added to iterable.");
    }
}
