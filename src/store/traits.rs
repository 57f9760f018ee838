//! `DataSource` trait: the tabular store a merge job reads from and writes
//! back to.

use std::fmt;

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::expr::{Bindings, Value};

/// Identifier of a row in its table, used for batched updates.
pub type RowId = i64;

/// An ordered column → value mapping.
///
/// Used both for query result rows and for computed insert/update records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

/// One query result row.
pub type Row = Record;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The row's integer `id`, if it has one.
    pub fn id(&self) -> Option<RowId> {
        match self.get("id")? {
            Value::Int(n) => Some(*n),
            Value::Float(x) if x.fract() == 0.0 => Some(*x as RowId),
            _ => None,
        }
    }

    /// Immutable evaluation bindings for computed-field snippets.
    pub fn bindings(&self) -> Bindings {
        self.fields.iter().cloned().collect()
    }

    /// JSON object for write-back payloads.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    /// Build from a JSON object returned by a data source.
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Python-dict style, used when announcing write-back.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", k, v.repr())?;
        }
        f.write_str("}")
    }
}

/// Backend-agnostic tabular data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run a read query and return its rows in order.
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>, DatabaseError>;

    /// Append `records` to `table` in one call.
    async fn batch_insert(&self, table: &str, records: &[Record]) -> Result<(), DatabaseError>;

    /// Apply per-row field updates to `table` in one call.
    async fn batch_update(
        &self,
        table: &str,
        updates: &[(RowId, Record)],
    ) -> Result<(), DatabaseError>;
}
