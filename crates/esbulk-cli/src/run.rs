//! 🏃 The ingestion run: NDJSON file in, bulk requests out, tally at the end.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use comfy_table::{presets::NOTHING, Cell, CellAlignment, ContentArrangement, Table};
use esbulk::bulk::{read_item_status, read_to_items, BulkAction, BulkMeta};
use esbulk::{Connection, Doc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use crate::app_config::AppConfig;

/// Where each document ended up, per the per-item status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Acked,
    Duplicate,
    TooMany,
    NonIndexable,
    Failed,
}

fn classify(status: i64) -> Outcome {
    match status {
        s if s < 300 => Outcome::Acked,
        409 => Outcome::Duplicate,
        429 => Outcome::TooMany,
        s if s < 500 => Outcome::NonIndexable,
        _ => Outcome::Failed,
    }
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub acked: u64,
    pub duplicates: u64,
    pub too_many: u64,
    pub non_indexable: u64,
    pub fails: u64,
    pub malformed: u64,
}

impl RunStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Acked => self.acked += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::TooMany => self.too_many += 1,
            Outcome::NonIndexable => self.non_indexable += 1,
            Outcome::Failed => self.fails += 1,
        }
    }

    fn total(&self) -> u64 {
        self.acked + self.duplicates + self.too_many + self.non_indexable + self.fails
            + self.malformed
    }
}

pub async fn run(config: AppConfig, input: &Path) -> Result<()> {
    let raw = tokio::fs::read(input)
        .await
        .with_context(|| format!("cannot read input file '{}'", input.display()))?;
    let lines: Vec<&[u8]> = raw
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .collect();
    if lines.is_empty() {
        bail!("input file '{}' contains no documents", input.display());
    }

    let mut conn = Connection::new(config.connection.clone())
        .context("cannot build a connection from the [connection] section")?;
    let version = conn
        .connect()
        .await
        .context("cannot reach the server")?
        .clone();
    debug!(version = %version, docs = lines.len(), "starting ingestion");

    let ingest = &config.ingest;
    let progress = ProgressBar::new(lines.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40} {pos}/{len} docs ({per_sec}, eta {eta})")
            .context("invalid progress template")?,
    );

    let mut stats = RunStats::default();
    let mut batch: Vec<Doc> = Vec::with_capacity(ingest.batch_size * 2);
    let mut batch_docs = 0usize;

    for line in &lines {
        // cheap validation pass; a broken line would otherwise poison
        // the whole request it rides in
        if serde_json::from_slice::<serde::de::IgnoredAny>(line).is_err() {
            warn!(len = line.len(), "skipping malformed input line");
            stats.malformed += 1;
            progress.inc(1);
            continue;
        }

        let mut meta = BulkMeta::new(&ingest.index);
        meta.doc_type = ingest.doc_type.clone();
        meta.pipeline = ingest.pipeline.clone();
        let action = if ingest.force_create {
            BulkAction::Create(meta)
        } else {
            BulkAction::for_version(meta, &version)
        };
        batch.push(Doc::Action(action));
        batch.push(Doc::Raw(line.to_vec()));
        batch_docs += 1;

        if batch_docs >= ingest.batch_size {
            flush(&mut conn, &config, &batch, batch_docs, &mut stats).await?;
            progress.inc(batch_docs as u64);
            batch.clear();
            batch_docs = 0;
        }
    }
    if batch_docs > 0 {
        flush(&mut conn, &config, &batch, batch_docs, &mut stats).await?;
        progress.inc(batch_docs as u64);
    }
    progress.finish_and_clear();

    println!("{}", summary_table(&stats));
    if stats.fails > 0 {
        bail!("{} of {} documents failed", stats.fails, stats.total());
    }
    Ok(())
}

/// Send one batch and fold its per-item statuses into the tally.
///
/// A 429 on the whole request is retried up to `max_retries` times; when
/// retries run out the batch counts as throttled rather than failed.
async fn flush(
    conn: &mut Connection,
    config: &AppConfig,
    batch: &[Doc],
    batch_docs: usize,
    stats: &mut RunStats,
) -> Result<()> {
    let ingest = &config.ingest;
    let params = HashMap::new();

    let mut attempt = 0;
    let result = loop {
        attempt += 1;
        match conn
            .bulk(&ingest.index, ingest.doc_type.as_deref(), &params, batch)
            .await
        {
            Ok((_, result)) => break result,
            Err(esbulk::ClientError::TempBulkFailure) if attempt < ingest.max_retries => {
                warn!(attempt, "server is throttling, retrying batch");
                continue;
            }
            Err(esbulk::ClientError::TempBulkFailure) => {
                warn!(docs = batch_docs, "batch dropped after repeated throttling");
                stats.too_many += batch_docs as u64;
                return Ok(());
            }
            Err(err) => return Err(err).context("bulk request failed"),
        }
    };

    let result = result.context("server accepted the batch but sent no body")?;
    let mut reader = result.reader();
    read_to_items(&mut reader).context("unparseable bulk response")?;
    for _ in 0..batch_docs {
        let (status, error) = read_item_status(&mut reader).context("unparseable bulk item")?;
        let outcome = classify(status);
        if outcome != Outcome::Acked {
            debug!(
                status,
                error = %String::from_utf8_lossy(error.unwrap_or_default()),
                "document not acknowledged"
            );
        }
        stats.record(outcome);
    }
    Ok(())
}

fn summary_table(stats: &RunStats) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (label, count) in [
        ("indexed", stats.acked),
        ("duplicates", stats.duplicates),
        ("throttled", stats.too_many),
        ("rejected", stats.non_indexable),
        ("failed", stats.fails),
        ("malformed", stats.malformed),
        ("total", stats.total()),
    ] {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(count).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_statuses_map_to_outcomes() {
        assert_eq!(classify(200), Outcome::Acked);
        assert_eq!(classify(201), Outcome::Acked);
        assert_eq!(classify(409), Outcome::Duplicate);
        assert_eq!(classify(429), Outcome::TooMany);
        assert_eq!(classify(400), Outcome::NonIndexable);
        assert_eq!(classify(404), Outcome::NonIndexable);
        assert_eq!(classify(500), Outcome::Failed);
        assert_eq!(classify(503), Outcome::Failed);
    }

    #[test]
    fn the_one_where_the_tally_sums_to_the_total() {
        let mut stats = RunStats::default();
        for outcome in [
            Outcome::Acked,
            Outcome::Acked,
            Outcome::Duplicate,
            Outcome::TooMany,
            Outcome::NonIndexable,
            Outcome::Failed,
        ] {
            stats.record(outcome);
        }
        stats.malformed = 2;
        assert_eq!(stats.acked, 2);
        assert_eq!(stats.total(), 8);
    }

    #[test]
    fn the_one_where_the_summary_lists_every_bucket() {
        let stats = RunStats {
            acked: 10,
            duplicates: 1,
            ..RunStats::default()
        };
        let rendered = summary_table(&stats).to_string();
        assert!(rendered.contains("indexed"));
        assert!(rendered.contains("10"));
        assert!(rendered.contains("duplicates"));
        assert!(rendered.contains("total"));
    }
}
