//! Merge context: the flat name → value environment templates render against.

use std::collections::BTreeMap;

use tracing::warn;

use crate::expr::Value;
use crate::store::Record;

/// Per-row rendering environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Context from parameter values alone, used to render the query.
    pub fn from_params(params: &[(String, Value)]) -> Self {
        Self {
            values: params.iter().cloned().collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Assemble the context for one row.
///
/// Layers, in order: parameters, row fields, `updated_{f}` for each computed
/// update field, `inserted_{t}_{n}_{f}` for field `f` of the `n`-th record
/// computed for table `t`. A derived key that collides with a row field is
/// dropped; raw row fields always win.
pub fn build_context(
    params: &[(String, Value)],
    row: &Record,
    updates: Option<&Record>,
    inserts: &[(String, Vec<Record>)],
) -> Context {
    let mut values: BTreeMap<String, Value> = params.iter().cloned().collect();
    for (name, value) in row.iter() {
        values.insert(name.to_string(), value.clone());
    }

    let mut derived = |key: String, value: &Value| {
        if row.get(&key).is_some() {
            warn!(key = %key, "Computed value shadows a row field; keeping the row field");
            return;
        }
        values.insert(key, value.clone());
    };

    if let Some(updates) = updates {
        for (field, value) in updates.iter() {
            derived(format!("updated_{field}"), value);
        }
    }
    for (table, records) in inserts {
        for (n, record) in records.iter().enumerate() {
            for (field, value) in record.iter() {
                derived(format!("inserted_{table}_{n}_{field}"), value);
            }
        }
    }

    Context { values }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Record {
        Record::new().with("id", 3i64).with("name", "Ada")
    }

    #[test]
    fn layers_params_then_row() {
        let params = vec![("year".to_string(), Value::from("2020"))];
        let ctx = build_context(&params, &row(), None, &[]);
        assert_eq!(ctx.get("year"), Some(&Value::from("2020")));
        assert_eq!(ctx.get("name"), Some(&Value::from("Ada")));
        assert_eq!(
            ctx.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["id", "name", "year"]
        );
    }

    #[test]
    fn row_fields_shadow_parameters() {
        let params = vec![("name".to_string(), Value::from("param"))];
        let ctx = build_context(&params, &row(), None, &[]);
        assert_eq!(ctx.get("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn updates_are_namespaced() {
        let updates = Record::new().with("name", "Grace");
        let ctx = build_context(&[], &row(), Some(&updates), &[]);
        assert_eq!(ctx.get("name"), Some(&Value::from("Ada")));
        assert_eq!(ctx.get("updated_name"), Some(&Value::from("Grace")));
        assert!(!ctx.contains("updated_id"));
    }

    #[test]
    fn inserts_are_numbered_per_table() {
        let inserts = vec![
            (
                "Log".to_string(),
                vec![
                    Record::new().with("note", "first"),
                    Record::new().with("note", "second"),
                ],
            ),
            ("Audit".to_string(), vec![Record::new().with("who", 3i64)]),
        ];
        let ctx = build_context(&[], &row(), None, &inserts);
        assert_eq!(ctx.get("inserted_Log_0_note"), Some(&Value::from("first")));
        assert_eq!(ctx.get("inserted_Log_1_note"), Some(&Value::from("second")));
        assert_eq!(ctx.get("inserted_Audit_0_who"), Some(&Value::Int(3)));
    }

    #[test]
    fn derived_keys_never_overwrite_row_fields() {
        let row = row().with("updated_name", "raw");
        let updates = Record::new().with("name", "computed");
        let ctx = build_context(&[], &row, Some(&updates), &[]);
        assert_eq!(ctx.get("updated_name"), Some(&Value::from("raw")));
    }
}
