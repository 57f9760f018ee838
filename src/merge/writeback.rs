//! Write-back buffers: job-lifetime accumulation of updates and inserts,
//! flushed as one batch per table at the end of the run.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::DatabaseError;
use crate::store::{DataSource, Record, RowId};

/// What a flush wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub updated_rows: usize,
    /// Table → number of records inserted.
    pub inserted: BTreeMap<String, usize>,
}

/// Updates and inserts from rows whose send succeeded.
#[derive(Debug, Default)]
pub struct WritebackBuffers {
    updates: Vec<(RowId, Record)>,
    /// Tables in first-seen order, each with its records in row order.
    inserts: Vec<(String, Vec<Record>)>,
}

impl WritebackBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take in one successful row's computed update and insert records.
    pub fn accumulate(&mut self, update: Option<(RowId, Record)>, inserts: Vec<(String, Vec<Record>)>) {
        if let Some(update) = update {
            self.updates.push(update);
        }
        for (table, records) in inserts {
            match self.inserts.iter_mut().find(|(t, _)| *t == table) {
                Some((_, buffered)) => buffered.extend(records),
                None => self.inserts.push((table, records)),
            }
        }
    }

    pub fn updates(&self) -> &[(RowId, Record)] {
        &self.updates
    }

    pub fn inserts(&self) -> &[(String, Vec<Record>)] {
        &self.inserts
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.inserts.iter().all(|(_, r)| r.is_empty())
    }

    /// Issue at most one insert call per table and one update call.
    ///
    /// Consumes the buffers; nothing is retried.
    pub async fn flush(
        self,
        source: &dyn DataSource,
        update_table: Option<&str>,
    ) -> Result<FlushSummary, DatabaseError> {
        let mut summary = FlushSummary::default();

        for (table, records) in &self.inserts {
            if records.is_empty() {
                continue;
            }
            source.batch_insert(table, records).await?;
            info!(table = %table, count = records.len(), "Write-back: inserted records");
            summary.inserted.insert(table.clone(), records.len());
        }

        if !self.updates.is_empty() {
            let table = update_table.ok_or_else(|| {
                DatabaseError::Query("updates were computed but no update table is configured".into())
            })?;
            source.batch_update(table, &self.updates).await?;
            info!(table, count = self.updates.len(), "Write-back: updated rows");
            summary.updated_rows = self.updates.len();
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Row;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DataSource for Recorder {
        async fn execute_query(&self, _sql: &str) -> Result<Vec<Row>, DatabaseError> {
            Ok(Vec::new())
        }

        async fn batch_insert(&self, table: &str, records: &[Record]) -> Result<(), DatabaseError> {
            self.calls.lock().unwrap().push(format!("insert {table} {}", records.len()));
            Ok(())
        }

        async fn batch_update(&self, table: &str, updates: &[(RowId, Record)]) -> Result<(), DatabaseError> {
            self.calls.lock().unwrap().push(format!("update {table} {}", updates.len()));
            Ok(())
        }
    }

    #[test]
    fn accumulate_groups_inserts_by_table_in_row_order() {
        let mut buffers = WritebackBuffers::new();
        buffers.accumulate(
            Some((1, Record::new().with("greeted", true))),
            vec![("Log".into(), vec![Record::new().with("n", 1i64)])],
        );
        buffers.accumulate(
            None,
            vec![
                ("Audit".into(), vec![Record::new()]),
                ("Log".into(), vec![Record::new().with("n", 2i64)]),
            ],
        );
        assert_eq!(buffers.updates().len(), 1);
        let tables: Vec<_> = buffers.inserts().iter().map(|(t, r)| (t.as_str(), r.len())).collect();
        assert_eq!(tables, vec![("Log", 2), ("Audit", 1)]);
        assert_eq!(buffers.inserts()[0].1[1].get("n"), Some(&crate::expr::Value::Int(2)));
    }

    #[tokio::test]
    async fn flush_makes_one_call_per_table() {
        let mut buffers = WritebackBuffers::new();
        for id in 1..=3 {
            buffers.accumulate(
                Some((id, Record::new().with("greeted", true))),
                vec![("Log".into(), vec![Record::new().with("person", id)])],
            );
        }
        let source = Recorder::default();
        let summary = buffers.flush(&source, Some("People")).await.unwrap();
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec!["insert Log 3".to_string(), "update People 3".to_string()]
        );
        assert_eq!(summary.updated_rows, 3);
        assert_eq!(summary.inserted.get("Log"), Some(&3));
    }

    #[tokio::test]
    async fn empty_buffers_make_no_calls() {
        let source = Recorder::default();
        let summary = WritebackBuffers::new().flush(&source, Some("People")).await.unwrap();
        assert!(source.calls.lock().unwrap().is_empty());
        assert_eq!(summary, FlushSummary::default());
    }
}
