//! Batch pipeline around the crawler: split a target list into chunks,
//! process one chunk per job, merge the per-chunk results.
//!
//! File layout, relative to the directories the caller passes in:
//!
//! - `chunk_XX.csv`: targets with at least `doi` and `pub_year`, optionally
//!   `repl_year`; other columns are carried along untouched
//! - `results_chunk_XX.csv`: one feature row per successfully processed DOI
//! - `<doi with / replaced by _>.json`: raw network snapshot per root

use crate::client::RateLimitedClient;
use crate::config::{CrawlOptions, FeatureOptions};
use crate::crawler::crawl;
use crate::error::{Result, RppError};
use crate::features::{extract, FeatureVector};
use crate::network::Network;
use csv::StringRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Default seed for the target shuffle
pub const DEFAULT_SPLIT_SEED: u64 = 42;

const RESULTS_PREFIX: &str = "results_chunk_";

/// One target paper. Unparsable years read as missing.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetRow {
    pub doi: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pub_year: Option<i32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub repl_year: Option<i32>,
}

impl TargetRow {
    /// Replication year if known, else publication year.
    pub fn cutoff_year(&self) -> Option<i32> {
        self.repl_year.or(self.pub_year)
    }
}

pub fn chunk_file_name(chunk_id: u32) -> String {
    format!("chunk_{:02}.csv", chunk_id)
}

pub fn results_file_name(chunk_id: u32) -> String {
    format!("{}{:02}.csv", RESULTS_PREFIX, chunk_id)
}

/// Snapshot file name for a root id
pub fn snapshot_file_name(doi: &str) -> String {
    format!("{}.json", doi.replace('/', "_"))
}

/// Write a raw network snapshot into `dir`.
pub fn write_snapshot(dir: &Path, network: &Network) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(&network.root_id));
    let file = File::create(&path)?;
    serde_json::to_writer(file, network)?;
    Ok(path)
}

/// Crawl one root, optionally persist the snapshot, extract its features.
pub async fn process_root(
    client: &RateLimitedClient,
    doi: &str,
    crawl_options: &CrawlOptions,
    feature_options: &FeatureOptions,
    snapshot_dir: Option<&Path>,
) -> Result<FeatureVector> {
    let network = crawl(client, doi, crawl_options).await?;

    if let Some(dir) = snapshot_dir {
        let path = write_snapshot(dir, &network)?;
        info!(doi = %doi, path = %path.display(), "Saved network snapshot");
    }

    extract(client, &network, doi, feature_options).await
}

/// Settings for one chunk job
#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub chunk_id: u32,
    pub chunks_dir: PathBuf,
    pub features_dir: PathBuf,
    /// Where raw snapshots go; `None` skips them
    pub networks_dir: Option<PathBuf>,
    pub crawl: CrawlOptions,
    pub features: FeatureOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Process every target of one chunk.
///
/// Per-root failures are logged and leave no row; they never abort the chunk.
/// Once the crawl token is cancelled the remaining targets are not started,
/// and a crawl interrupted by it leaves no row either.
pub async fn run_chunk(client: &RateLimitedClient, job: &ChunkJob) -> Result<ChunkSummary> {
    let chunk_path = job.chunks_dir.join(chunk_file_name(job.chunk_id));
    let mut reader = csv::Reader::from_path(&chunk_path)?;
    let targets: Vec<TargetRow> = reader.deserialize().collect::<std::result::Result<_, _>>()?;

    let mut summary = ChunkSummary {
        total: targets.len(),
        ..Default::default()
    };
    info!(chunk = job.chunk_id, targets = targets.len(), "Processing chunk");

    let mut rows = Vec::with_capacity(targets.len());
    for (i, target) in targets.iter().enumerate() {
        if job.crawl.cancel.is_cancelled() {
            warn!(chunk = job.chunk_id, remaining = targets.len() - i, "Chunk cancelled");
            break;
        }
        info!("[{}/{}] Processing {}", i + 1, targets.len(), target.doi);

        let Some(cutoff) = target.cutoff_year() else {
            warn!(doi = %target.doi, "No publication or replication year, skipping");
            summary.skipped += 1;
            continue;
        };

        let crawl_options = CrawlOptions {
            cutoff_year: cutoff,
            ..job.crawl.clone()
        };
        match process_root(
            client,
            &target.doi,
            &crawl_options,
            &job.features,
            job.networks_dir.as_deref(),
        )
        .await
        {
            Ok(features) => {
                info!(doi = %target.doi, "Root done");
                rows.push(features);
                summary.succeeded += 1;
            }
            Err(e) => {
                error!(doi = %target.doi, error = %e, "Root failed");
                summary.failed += 1;
            }
        }
    }

    fs::create_dir_all(&job.features_dir)?;
    let out_path = job.features_dir.join(results_file_name(job.chunk_id));
    write_feature_rows(&out_path, &rows)?;

    info!(
        chunk = job.chunk_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        path = %out_path.display(),
        "Completed chunk"
    );
    Ok(summary)
}

/// Write feature rows as CSV; with no rows the file is left empty.
pub fn write_feature_rows(path: &Path, rows: &[FeatureVector]) -> Result<()> {
    if rows.is_empty() {
        File::create(path)?;
        return Ok(());
    }

    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        RppError::Validation(format!("{} has no '{}' column", path.display(), name))
    })
}

/// Deduplicate targets by DOI, shuffle them with `seed`, and write
/// `n_chunks` files of at most ⌈n / n_chunks⌉ rows each.
///
/// All input columns are preserved. Returns the written paths in chunk order.
pub fn split_targets(
    input: &Path,
    out_dir: &Path,
    n_chunks: u32,
    seed: u64,
) -> Result<Vec<PathBuf>> {
    if n_chunks == 0 {
        return Err(RppError::Validation("n_chunks must be at least 1".into()));
    }

    let mut reader = csv::Reader::from_path(input)?;
    let headers = reader.headers()?.clone();
    let doi = column(&headers, "doi", input)?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut read = 0usize;
    for record in reader.records() {
        let record = record?;
        read += 1;
        if seen.insert(record.get(doi).unwrap_or_default().to_string()) {
            records.push(record);
        }
    }
    if records.len() < read {
        warn!(removed = read - records.len(), "Removed duplicate DOIs");
    }

    records.shuffle(&mut StdRng::seed_from_u64(seed));

    let per_chunk = records.len().div_ceil(n_chunks as usize).max(1);
    fs::create_dir_all(out_dir)?;
    info!(
        papers = records.len(),
        chunks = n_chunks,
        per_chunk = per_chunk,
        "Splitting targets"
    );

    let mut paths = Vec::with_capacity(n_chunks as usize);
    let mut chunks = records.chunks(per_chunk);
    for chunk_id in 0..n_chunks {
        let rows = chunks.next().unwrap_or_default();
        let path = out_dir.join(chunk_file_name(chunk_id));

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&headers)?;
        for record in rows {
            writer.write_record(record)?;
        }
        writer.flush()?;

        info!(rows = rows.len(), path = %path.display(), "Wrote chunk");
        paths.push(path);
    }

    Ok(paths)
}

/// Per-chunk results concatenated under one header
struct ResultTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

fn read_results(features_dir: &Path) -> Result<ResultTable> {
    let mut files: Vec<PathBuf> = fs::read_dir(features_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(RESULTS_PREFIX) && name.ends_with(".csv"))
        })
        .collect();
    files.sort();

    let mut table: Option<ResultTable> = None;
    for path in files {
        let mut reader = csv::Reader::from_path(&path)?;
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            warn!(path = %path.display(), "Skipping empty results file");
            continue;
        }

        let table = table.get_or_insert_with(|| ResultTable {
            headers: headers.clone(),
            rows: Vec::new(),
        });
        // Reorder into the first file's column order
        let positions: Vec<Option<usize>> = table
            .headers
            .iter()
            .map(|name| headers.iter().position(|h| h == name))
            .collect();

        for record in reader.records() {
            let record = record?;
            let row: StringRecord = positions
                .iter()
                .map(|p| p.and_then(|i| record.get(i)).unwrap_or_default())
                .collect();
            table.rows.push(row);
        }
    }

    table.ok_or_else(|| {
        RppError::Validation(format!(
            "No non-empty result chunks found in {}",
            features_dir.display()
        ))
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub targets: usize,
    pub matched: usize,
}

/// Concatenate all result chunks and left-join them onto the targets by DOI.
///
/// Every target row appears once in `output`; targets without a feature row
/// get empty feature columns.
pub fn merge_results(features_dir: &Path, targets: &Path, output: &Path) -> Result<MergeSummary> {
    let results = read_results(features_dir)?;
    let result_doi = column(&results.headers, "doi", features_dir)?;

    let mut by_doi: HashMap<&str, &StringRecord> = HashMap::new();
    for row in &results.rows {
        by_doi.entry(row.get(result_doi).unwrap_or_default()).or_insert(row);
    }

    let mut reader = csv::Reader::from_path(targets)?;
    let target_headers = reader.headers()?.clone();
    let target_doi = column(&target_headers, "doi", targets)?;

    let feature_columns: Vec<usize> = (0..results.headers.len())
        .filter(|&i| i != result_doi)
        .collect();

    // Feature columns that clash with a target column get a `_feature` suffix
    let mut header = target_headers.clone();
    for &i in &feature_columns {
        let name = &results.headers[i];
        let mut merged = name.to_string();
        while header.iter().any(|h| h == merged) {
            merged.push_str("_feature");
        }
        if merged != name {
            warn!(column = name, renamed = %merged, "Feature column clashes with target column");
        }
        header.push_field(&merged);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(&header)?;

    let mut summary = MergeSummary::default();
    for record in reader.records() {
        let mut record = record?;
        summary.targets += 1;

        let matched = by_doi.get(record.get(target_doi).unwrap_or_default());
        if matched.is_some() {
            summary.matched += 1;
        }
        for &i in &feature_columns {
            record.push_field(matched.and_then(|row| row.get(i)).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        targets = summary.targets,
        matched = summary.matched,
        path = %output.display(),
        "Merged results"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockApi;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    fn read_rows(path: &Path) -> (StringRecord, Vec<StringRecord>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let rows = reader.records().map(|r| r.unwrap()).collect();
        (headers, rows)
    }

    #[test]
    fn test_target_row_cutoff() {
        let data = "doi,pub_year,repl_year,journal\n10.1/a,2005,2012,JPSP\n10.1/b,2006,,PS\n10.1/c,n/a,,PS\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<TargetRow> = reader.deserialize().map(|r| r.unwrap()).collect();

        assert_eq!(rows[0].cutoff_year(), Some(2012));
        assert_eq!(rows[1].cutoff_year(), Some(2006));
        assert_eq!(rows[2].cutoff_year(), None);
    }

    #[test]
    fn test_target_row_without_repl_column() {
        let mut reader = csv::Reader::from_reader("doi,pub_year\n10.1/a,2001\n".as_bytes());
        let row: TargetRow = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row.cutoff_year(), Some(2001));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(chunk_file_name(3), "chunk_03.csv");
        assert_eq!(results_file_name(12), "results_chunk_12.csv");
        assert_eq!(snapshot_file_name("10.1037/a.b/c"), "10.1037_a.b_c.json");
    }

    #[test]
    fn test_split_dedups_and_preserves_columns() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("targets.csv");
        let mut csv_text = String::from("doi,pub_year,journal\n");
        for i in 0..7 {
            csv_text.push_str(&format!("10.1/{},200{},J{}\n", i, i, i));
        }
        csv_text.push_str("10.1/3,2003,J3\n");
        write(&input, &csv_text);

        let out = dir.path().join("chunks");
        let paths = split_targets(&input, &out, 3, DEFAULT_SPLIT_SEED).unwrap();
        assert_eq!(paths.len(), 3);

        let mut all = Vec::new();
        let mut sizes = Vec::new();
        for path in &paths {
            let (headers, rows) = read_rows(path);
            assert_eq!(&headers, &StringRecord::from(vec!["doi", "pub_year", "journal"]));
            sizes.push(rows.len());
            all.extend(rows.into_iter().map(|r| r[0].to_string()));
        }

        assert_eq!(sizes, vec![3, 3, 1]);
        all.sort();
        let expected: Vec<String> = (0..7).map(|i| format!("10.1/{}", i)).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_split_is_deterministic() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("targets.csv");
        let body: String = (0..20).map(|i| format!("10.1/{},2000\n", i)).collect();
        write(&input, &format!("doi,pub_year\n{}", body));

        let a = split_targets(&input, &dir.path().join("a"), 4, 7).unwrap();
        let b = split_targets(&input, &dir.path().join("b"), 4, 7).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(fs::read_to_string(x).unwrap(), fs::read_to_string(y).unwrap());
        }
    }

    #[test]
    fn test_split_rejects_zero_chunks() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("targets.csv");
        write(&input, "doi\n10.1/a\n");
        assert!(matches!(
            split_targets(&input, dir.path(), 0, 1),
            Err(RppError::Validation(_))
        ));
    }

    #[test]
    fn test_merge_left_joins_targets() {
        let dir = tempdir().unwrap();
        let features = dir.path().join("features");
        fs::create_dir_all(&features).unwrap();
        write(
            &features.join("results_chunk_00.csv"),
            "doi,n_nodes,gini\n10.1/a,12,0.5\n",
        );
        write(
            &features.join("results_chunk_01.csv"),
            "gini,doi,n_nodes\n0.1,10.1/c,3\n",
        );
        write(&features.join("results_chunk_02.csv"), "");
        write(&features.join("unrelated.csv"), "doi,n_nodes\n10.1/b,99\n");

        let targets = dir.path().join("targets.csv");
        write(&targets, "doi,replicated\n10.1/a,1\n10.1/b,0\n10.1/c,1\n");

        let output = dir.path().join("out/master.csv");
        let summary = merge_results(&features, &targets, &output).unwrap();
        assert_eq!(summary, MergeSummary { targets: 3, matched: 2 });

        let (headers, rows) = read_rows(&output);
        assert_eq!(&headers, &StringRecord::from(vec!["doi", "replicated", "n_nodes", "gini"]));
        assert_eq!(&rows[0], &StringRecord::from(vec!["10.1/a", "1", "12", "0.5"]));
        assert_eq!(&rows[1], &StringRecord::from(vec!["10.1/b", "0", "", ""]));
        assert_eq!(&rows[2], &StringRecord::from(vec!["10.1/c", "1", "3", "0.1"]));
    }

    #[test]
    fn test_merge_keeps_target_column_on_name_clash() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("results_chunk_00.csv"), "doi,n_nodes\n10.1/a,12\n");
        let targets = dir.path().join("targets.csv");
        write(&targets, "doi,n_nodes,n_nodes_feature\n10.1/a,orig,x\n");

        let output = dir.path().join("master.csv");
        merge_results(dir.path(), &targets, &output).unwrap();

        let (headers, rows) = read_rows(&output);
        assert_eq!(
            &headers,
            &StringRecord::from(vec!["doi", "n_nodes", "n_nodes_feature", "n_nodes_feature_feature"])
        );
        assert_eq!(&rows[0], &StringRecord::from(vec!["10.1/a", "orig", "x", "12"]));
    }

    #[test]
    fn test_merge_without_results_fails() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("results_chunk_00.csv"), "");
        let targets = dir.path().join("targets.csv");
        write(&targets, "doi\n10.1/a\n");

        let result = merge_results(dir.path(), &targets, &dir.path().join("master.csv"));
        assert!(matches!(result, Err(RppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_run_chunk_isolates_failures() {
        let api = MockApi::start().await;
        api.work("10.1000/ok", 2005, &["https://doi.org/10.1000/ref"], &[("A1", "I1")]);
        api.work("10.1000/ref", 2001, &[], &[("A2", "I2")]);
        api.author_counts("A1", &[(2005, 3)]);
        api.author_counts("A2", &[(2001, 8)]);

        let dir = tempdir().unwrap();
        let chunks = dir.path().join("chunks");
        fs::create_dir_all(&chunks).unwrap();
        write(
            &chunks.join("chunk_05.csv"),
            "doi,pub_year,repl_year\n10.1000/ok,2005,2010\n10.1000/missing,2001,\n10.1000/undated,,\n",
        );

        let job = ChunkJob {
            chunk_id: 5,
            chunks_dir: chunks,
            features_dir: dir.path().join("features"),
            networks_dir: Some(dir.path().join("networks")),
            crawl: CrawlOptions::default(),
            features: FeatureOptions {
                seed: Some(1),
                ..Default::default()
            },
        };

        let summary = run_chunk(&api.client(), &job).await.unwrap();
        assert_eq!(
            summary,
            ChunkSummary {
                total: 3,
                succeeded: 1,
                failed: 1,
                skipped: 1,
            }
        );

        let (headers, rows) = read_rows(&dir.path().join("features/results_chunk_05.csv"));
        assert_eq!(&headers[0], "doi");
        assert!(headers.iter().any(|h| h == "pbi_mean"));
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "10.1000/ok");

        let snapshot = dir.path().join("networks/10.1000_ok.json");
        let network: Network = serde_json::from_str(&fs::read_to_string(snapshot).unwrap()).unwrap();
        assert_eq!(network.node_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_root_leaves_no_row() {
        let api = MockApi::start().await;
        api.work("W0", 2000, &["W1"], &[]);
        api.work("W1", 1999, &[], &[]);

        let dir = tempdir().unwrap();
        let crawl_options = CrawlOptions::new(2010);
        crawl_options.cancel.cancel();

        let result = process_root(
            &api.client(),
            "W0",
            &crawl_options,
            &FeatureOptions::default(),
            Some(dir.path()),
        )
        .await;
        assert!(matches!(result, Err(RppError::Cancelled(_))));
        assert!(!dir.path().join("W0.json").exists());

        let chunks = dir.path().join("chunks");
        fs::create_dir_all(&chunks).unwrap();
        write(&chunks.join("chunk_00.csv"), "doi,pub_year
W0,2000
");
        let job = ChunkJob {
            chunk_id: 0,
            chunks_dir: chunks,
            features_dir: dir.path().join("features"),
            networks_dir: None,
            crawl: crawl_options,
            features: FeatureOptions::default(),
        };

        let summary = run_chunk(&api.client(), &job).await.unwrap();
        assert_eq!(summary.succeeded, 0);
        let written = fs::read_to_string(dir.path().join("features/results_chunk_00.csv")).unwrap();
        assert!(written.is_empty());
    }
}
