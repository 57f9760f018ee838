//! Merge driver: runs a job row by row.
//!
//! Per row, in order:
//! 1. Compute insert records, then the update record
//! 2. Build the context and render subject and body
//! 3. Resolve recipients and build the message
//! 4. Send (skipped in dry-run and no-email mode)
//! 5. On success, buffer the row's write-back
//!
//! Buffered write-back is flushed once after the last row. Expression,
//! template, and address errors abort the run; a failed send only drops that
//! row's write-back.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{JobSpec, RunOptions, TableRule};
use crate::error::{Error, Result};
use crate::expr::{Bindings, Snippet, Value};
use crate::merge::address::RecipientList;
use crate::merge::context::{Context, build_context};
use crate::merge::message::OutgoingMessage;
use crate::merge::template::{Template, TemplateEngine, render_body, render_subject};
use crate::merge::writeback::WritebackBuffers;
use crate::store::{DataSource, Record, Row, RowId};
use crate::transport::MailTransport;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub rows: usize,
    pub sent: usize,
    pub send_failures: usize,
    pub previews: usize,
    pub updated_rows: usize,
    /// Table → records inserted.
    pub inserted: BTreeMap<String, usize>,
}

/// An update or insert rule with its snippets compiled.
struct CompiledRule {
    table: String,
    /// `(field, error location, snippet)` in declaration order.
    fields: Vec<(String, String, Snippet)>,
}

impl CompiledRule {
    fn compile(rule: &TableRule, location: impl Fn(&str) -> String) -> Result<Self> {
        let fields = rule
            .fields
            .iter()
            .map(|(field, code)| {
                let location = location(field);
                let snippet = Snippet::compile(code).map_err(|e| Error::field(&location, e))?;
                Ok((field.clone(), location, snippet))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            table: rule.table.clone(),
            fields,
        })
    }

    /// One record; fields whose snippet yields nothing are left out.
    fn evaluate(&self, bindings: &Bindings) -> Result<Record> {
        let mut record = Record::new();
        for (field, location, snippet) in &self.fields {
            if let Some(value) = snippet
                .evaluate(bindings)
                .map_err(|e| Error::field(location, e))?
            {
                record.insert(field.clone(), value);
            }
        }
        Ok(record)
    }
}

/// Everything computed for one row before sending.
struct RowOutcome {
    update: Option<(RowId, Record)>,
    inserts: Vec<(String, Vec<Record>)>,
    message: OutgoingMessage,
}

/// Runs one merge job against a data source and a mail transport.
pub struct MergeDriver {
    job: JobSpec,
    options: RunOptions,
    source: Arc<dyn DataSource>,
    transport: Arc<dyn MailTransport>,
    templates: TemplateEngine,
    query: Option<Template>,
    subject: Template,
    body: Template,
    update: Option<CompiledRule>,
    inserts: Vec<CompiledRule>,
    from: Option<RecipientList>,
    to: RecipientList,
    cc: RecipientList,
    bcc: RecipientList,
    output: Box<dyn Write + Send>,
}

impl MergeDriver {
    /// Compile every snippet and template of `job` into `templates`, which
    /// also gains the `q()` query global over `source`. Syntax errors
    /// surface here, before the data source is contacted.
    pub fn new(
        job: JobSpec,
        options: RunOptions,
        source: Arc<dyn DataSource>,
        transport: Arc<dyn MailTransport>,
        mut templates: TemplateEngine,
    ) -> Result<Self> {
        templates.register_query(source.clone());
        let mut compile = |name: &str, src: &str| {
            Template::compile(&mut templates, name, src).map_err(|e| Error::template(name, e))
        };
        let query = match job.parameters {
            Some(_) => Some(compile("query", &job.query)?),
            None => None,
        };
        let subject = compile("subject", &job.subject)?;
        let body = compile("body", &job.body)?;

        let update = job
            .update
            .as_ref()
            .map(|rule| CompiledRule::compile(rule, |field| format!("update for '{field}'")))
            .transpose()?;
        let inserts = job
            .insert
            .iter()
            .map(|rule| {
                CompiledRule::compile(rule, |field| format!("insert for '{}.{field}'", rule.table))
            })
            .collect::<Result<Vec<_>>>()?;

        let from = job
            .from
            .as_ref()
            .map(|spec| RecipientList::compile("from", std::slice::from_ref(spec), &mut templates))
            .transpose()?;
        let to = RecipientList::compile("to", &job.to, &mut templates)?;
        let cc = RecipientList::compile("cc", &job.cc, &mut templates)?;
        let bcc = RecipientList::compile("bcc", &job.bcc, &mut templates)?;

        Ok(Self {
            job,
            options,
            source,
            transport,
            templates,
            query,
            subject,
            body,
            update,
            inserts,
            from,
            to,
            cc,
            bcc,
            output: Box::new(std::io::stdout()),
        })
    }

    /// Send previews and write-back announcements to `output` instead of
    /// stdout.
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    /// Run the job with `args` bound to the declared parameters.
    pub async fn run(&mut self, args: &[String]) -> Result<MergeReport> {
        let params = self.job.bind_parameters(args)?;
        let query = match &self.query {
            Some(template) => template
                .render(&Context::from_params(&params), &self.templates)
                .map_err(|e| Error::template("query", e))?,
            None => self.job.query.clone(),
        };

        debug!(query = %query, "Running query");
        let rows = self.source.execute_query(&query).await?;
        info!(rows = rows.len(), dry_run = self.options.dry_run, "Starting merge");

        let mut report = MergeReport::default();
        let mut buffers = WritebackBuffers::new();

        for (index, row) in rows.iter().enumerate() {
            report.rows += 1;
            let outcome = self.prepare_row(index, row, &params)?;

            if self.options.shows_previews() {
                self.announce(&outcome)?;
                report.previews += 1;
            }

            if self.deliver(index, &outcome.message).await {
                if self.options.sends_email() {
                    report.sent += 1;
                }
                buffers.accumulate(outcome.update, outcome.inserts);
            } else {
                report.send_failures += 1;
            }
        }

        if self.options.verbose {
            writeln!(self.output, "{} rows considered.", report.rows)?;
        }
        self.output.flush()?;

        if self.options.writes_back() {
            let update_table = self.update.as_ref().map(|rule| rule.table.as_str());
            let summary = buffers.flush(self.source.as_ref(), update_table).await?;
            report.updated_rows = summary.updated_rows;
            report.inserted = summary.inserted;
        } else if !buffers.is_empty() {
            info!(
                updates = buffers.updates().len(),
                "Dry run: write-back skipped"
            );
        }

        info!(
            rows = report.rows,
            sent = report.sent,
            failed = report.send_failures,
            "Merge finished"
        );
        Ok(report)
    }

    /// Compute, render, and resolve everything for one row.
    fn prepare_row(&self, index: usize, row: &Row, params: &[(String, Value)]) -> Result<RowOutcome> {
        let bindings = row.bindings();

        let mut inserts: Vec<(String, Vec<Record>)> = Vec::new();
        for rule in &self.inserts {
            let record = rule.evaluate(&bindings)?;
            match inserts.iter_mut().find(|(t, _)| *t == rule.table) {
                Some((_, records)) => records.push(record),
                None => inserts.push((rule.table.clone(), vec![record])),
            }
        }

        let update = match &self.update {
            Some(rule) => {
                let id = row.id().ok_or(Error::MissingRowId { row: index })?;
                let record = rule.evaluate(&bindings)?;
                (!record.is_empty()).then_some((id, record))
            }
            None => None,
        };

        let context = build_context(params, row, update.as_ref().map(|(_, r)| r), &inserts);
        let subject = render_subject(&self.subject, &context, &self.templates)
            .map_err(|e| Error::template("subject", e))?;
        let body = render_body(&self.body, &context, &self.templates)
            .map_err(|e| Error::template("body", e))?;

        let from = match &self.from {
            Some(list) => list.resolve(&context, &self.templates)?.into_iter().next(),
            None => None,
        };
        let message = OutgoingMessage {
            subject,
            from,
            to: self.to.resolve(&context, &self.templates)?,
            cc: self.cc.resolve(&context, &self.templates)?,
            bcc: self.bcc.resolve(&context, &self.templates)?,
            body,
        };
        debug!(row = index, to = message.to.len(), "Row prepared");

        Ok(RowOutcome {
            update,
            inserts,
            message,
        })
    }

    /// Print the preview block and the write-back this row would cause.
    fn announce(&mut self, outcome: &RowOutcome) -> Result<()> {
        write!(self.output, "{}", outcome.message.preview())?;
        if let Some((_, record)) = &outcome.update {
            writeln!(self.output, "UPDATE {record}")?;
        }
        for (table, records) in &outcome.inserts {
            for record in records {
                writeln!(self.output, "INSERT {table} {record}")?;
            }
        }
        Ok(())
    }

    /// `true` when the row counts as delivered.
    async fn deliver(&self, index: usize, message: &OutgoingMessage) -> bool {
        if !self.options.sends_email() {
            return true;
        }
        match self.transport.send(&message.formatted()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(row = index, error = %e, "Send failed; row will not be written back");
                false
            }
        }
    }
}
