//! File statistics collection engine.
//!
//! The engine owns the resolved set of leaf collectors grouped by tree and
//! performs one full filesystem walk per scrape, streaming gauge samples to
//! a [`SampleSink`]. No state survives a scrape: the dedup maps live on the
//! call stack, so back-to-back scrapes never accumulate memory and the
//! engine is safe to share read-only across concurrent callers.

pub mod scan;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::template;

/// The fixed set of metrics the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Files matching a pattern, excluding directories and stat failures.
    GlobMatchNumber,
    /// File size in bytes.
    SizeBytes,
    /// Last modification time as fractional Unix epoch seconds.
    ModifTimeSeconds,
    /// CRC32 of the file content (IEEE polynomial). Optional.
    ContentHashCrc32,
    /// Number of `\n` bytes in the file content. Optional.
    ContentLineNumber,
}

/// One gauge sample: metric kind, key label (pattern or display path), the
/// optional tree label and the numeric value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub kind: MetricKind,
    pub key: String,
    pub tree: Option<String>,
    pub value: f64,
}

/// Output sink consuming samples as the scrape produces them.
///
/// The engine never buffers the full result set; the sink decides what to
/// do with each sample (encode it, collect it for a test, ...).
pub trait SampleSink {
    fn emit(&mut self, sample: Sample);
}

impl SampleSink for Vec<Sample> {
    fn emit(&mut self, sample: Sample) {
        self.push(sample);
    }
}

/// One leaf collector: a pattern group resolved against its owning scope.
///
/// Constructed once at startup by the configuration merge and immutable
/// thereafter. Root and patterns are template strings, expanded fresh on
/// every scrape.
#[derive(Debug, Clone)]
pub struct FileStatCollector {
    pub tree_name: Option<String>,
    pub tree_root: String,
    pub patterns: Vec<String>,
    pub enable_crc32: bool,
    pub enable_lines: bool,
}

/// The aggregate collector: every leaf collector, grouped by tree.
#[derive(Debug, Default)]
pub struct FilesCollector {
    // BTreeMap keeps the tree iteration order deterministic across scrapes.
    trees: BTreeMap<String, Vec<FileStatCollector>>,
}

impl FilesCollector {
    /// Groups the resolved leaf collectors by tree name.
    pub fn new(collectors: Vec<FileStatCollector>) -> Self {
        let mut trees: BTreeMap<String, Vec<FileStatCollector>> = BTreeMap::new();
        for collector in collectors {
            let name = collector.tree_name.clone().unwrap_or_default();
            trees.entry(name).or_default().push(collector);
        }
        FilesCollector { trees }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Performs one full scrape, walking every tree in order.
    pub fn collect(&self, sink: &mut dyn SampleSink) {
        for collectors in self.trees.values() {
            collect_tree(collectors, sink);
        }
    }
}

/// Walks one tree: expands templates, enumerates glob matches, deduplicates
/// and emits samples.
///
/// Patterns are deduplicated by their fully resolved `root/pattern` key, so
/// a pattern declared in several groups is matched (and reported) once.
/// Files are deduplicated by their on-disk path: the first pattern to match
/// a file emits its per-file samples, later patterns only count it.
fn collect_tree(collectors: &[FileStatCollector], sink: &mut dyn SampleSink) {
    let mut seen_patterns: HashSet<String> = HashSet::new();
    // Maps each visited path to whether it was processable (a stat-able
    // non-directory), so later patterns reuse the outcome.
    let mut seen_files: HashMap<PathBuf, bool> = HashMap::new();

    for collector in collectors {
        let root = match template::expand(&collector.tree_root) {
            Ok(root) => root,
            Err(e) => {
                warn!(tree_root = %collector.tree_root, reason = %e,
                    "error expanding template on tree root");
                continue;
            }
        };
        // An absent root is expected when trees describe machines or mounts
        // that may not be present; skip without noise.
        if !root.is_empty() && !Path::new(&root).exists() {
            debug!(tree_root = %root, "skip collecting file stats, tree root not found");
            continue;
        }

        for pattern in &collector.patterns {
            let resolved = match template::expand(pattern) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(pattern = %pattern, reason = %e,
                        "error expanding template on file pattern");
                    continue;
                }
            };

            let full_pattern = join_pattern(&root, &resolved);
            if !seen_patterns.insert(full_pattern.clone()) {
                continue;
            }

            let mut match_count: u64 = 0;
            match glob::glob(&full_pattern) {
                Ok(entries) => {
                    for entry in entries {
                        let path = match entry {
                            Ok(path) => path,
                            Err(e) => {
                                debug!(pattern = %resolved, reason = %e,
                                    "error reading glob match");
                                continue;
                            }
                        };
                        let display = display_path(&path, &root);

                        if let Some(&processable) = seen_files.get(&path) {
                            if processable {
                                match_count += 1;
                            }
                            continue;
                        }

                        let processable =
                            collect_file_samples(&path, &display, collector, &mut match_count, sink);
                        seen_files.insert(path.clone(), processable);
                        if processable && (collector.enable_crc32 || collector.enable_lines) {
                            collect_content_samples(&path, &display, collector, sink);
                        }
                    }
                }
                Err(e) => {
                    debug!(pattern = %resolved, reason = %e, "error getting matches for glob");
                }
            }

            // The match-number label carries the configured pattern, not the
            // expanded one, so time-based patterns keep a stable series.
            sink.emit(Sample {
                kind: MetricKind::GlobMatchNumber,
                key: pattern.clone(),
                tree: collector.tree_name.clone(),
                value: match_count as f64,
            });
        }
    }
}

/// Stats one file and emits its size and mtime samples.
///
/// Returns whether the file is processable: directories and stat failures
/// are excluded from the match count and from content scanning.
fn collect_file_samples(
    path: &Path,
    display: &str,
    collector: &FileStatCollector,
    match_count: &mut u64,
    sink: &mut dyn SampleSink,
) -> bool {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            debug!(path = %path.display(), reason = %e, "error getting file info");
            return false;
        }
    };
    if meta.is_dir() {
        return false;
    }
    *match_count += 1;

    sink.emit(Sample {
        kind: MetricKind::SizeBytes,
        key: display.to_string(),
        tree: collector.tree_name.clone(),
        value: meta.len() as f64,
    });
    let mtime = meta
        .modified()
        .map(epoch_seconds)
        .unwrap_or_default();
    sink.emit(Sample {
        kind: MetricKind::ModifTimeSeconds,
        key: display.to_string(),
        tree: collector.tree_name.clone(),
        value: mtime,
    });
    true
}

/// Runs the content scanner once and emits the enabled content samples.
///
/// A scan error drops both samples for this file; the next scrape retries
/// by virtue of re-walking everything.
fn collect_content_samples(
    path: &Path,
    display: &str,
    collector: &FileStatCollector,
    sink: &mut dyn SampleSink,
) {
    let stats = match scan::scan_content(path, collector.enable_crc32, collector.enable_lines) {
        Ok(stats) => stats,
        Err(e) => {
            debug!(path = %path.display(), reason = %e, "error reading content of file");
            return;
        }
    };

    if let Some(crc32) = stats.crc32 {
        sink.emit(Sample {
            kind: MetricKind::ContentHashCrc32,
            key: display.to_string(),
            tree: collector.tree_name.clone(),
            value: f64::from(crc32),
        });
    }
    if let Some(lines) = stats.lines {
        sink.emit(Sample {
            kind: MetricKind::ContentLineNumber,
            key: display.to_string(),
            tree: collector.tree_name.clone(),
            value: lines as f64,
        });
    }
}

/// Joins the resolved tree root and a pattern into one glob expression.
///
/// The root is a literal directory path, never pattern syntax: its glob
/// metacharacters are escaped so a root like `/data/data[1]` still matches.
fn join_pattern(root: &str, pattern: &str) -> String {
    if root.is_empty() {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            glob::Pattern::escape(root.trim_end_matches('/')),
            pattern
        )
    }
}

/// The path used as a metric label: relative to the tree root, so labels
/// never leak the tree's location on this machine.
fn display_path(path: &Path, root: &str) -> String {
    let relative = if root.is_empty() {
        path
    } else {
        path.strip_prefix(root.trim_end_matches('/')).unwrap_or(path)
    };
    relative.display().to_string()
}

/// Converts a file mtime to fractional Unix epoch seconds.
fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        // Pre-epoch mtimes exist on badly behaved filesystems.
        Err(e) => -e.duration().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &[u8]) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(content).unwrap();
    }

    fn collector(root: &str, patterns: &[&str]) -> FileStatCollector {
        FileStatCollector {
            tree_name: None,
            tree_root: root.to_string(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            enable_crc32: false,
            enable_lines: false,
        }
    }

    fn samples_of(samples: &[Sample], kind: MetricKind) -> Vec<&Sample> {
        samples.iter().filter(|s| s.kind == kind).collect()
    }

    #[test]
    fn tree_scenario_counts_files_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "app.log", b"0123456789");
        fs::create_dir(dir.path().join("old.log")).unwrap();

        let mut col = collector(&dir.path().display().to_string(), &["*.log"]);
        col.tree_name = Some("prod".to_string());
        let engine = FilesCollector::new(vec![col]);

        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        let matches = samples_of(&samples, MetricKind::GlobMatchNumber);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, "*.log");
        assert_eq!(matches[0].tree.as_deref(), Some("prod"));
        assert_eq!(matches[0].value, 1.0);

        let sizes = samples_of(&samples, MetricKind::SizeBytes);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].key, "app.log");
        assert_eq!(sizes[0].value, 10.0);

        let mtimes = samples_of(&samples, MetricKind::ModifTimeSeconds);
        assert_eq!(mtimes.len(), 1);
        assert!(mtimes[0].value > 0.0);
    }

    #[test]
    fn display_path_excludes_tree_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_file(&dir.path().join("sub"), "app.log", b"x");

        let engine = FilesCollector::new(vec![collector(
            &dir.path().display().to_string(),
            &["**/*.log"],
        )]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        let sizes = samples_of(&samples, MetricKind::SizeBytes);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].key, format!("sub{}app.log", std::path::MAIN_SEPARATOR));
    }

    #[test]
    fn file_matched_by_two_patterns_is_stated_once_but_counted_twice() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "app.log", b"x");

        let engine = FilesCollector::new(vec![collector(
            &dir.path().display().to_string(),
            &["*.log", "app.*"],
        )]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        assert_eq!(samples_of(&samples, MetricKind::SizeBytes).len(), 1);
        let matches = samples_of(&samples, MetricKind::GlobMatchNumber);
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|s| s.value == 1.0));
    }

    #[test]
    fn duplicate_pattern_across_groups_is_matched_once() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "app.log", b"x");
        let root = dir.path().display().to_string();

        let engine =
            FilesCollector::new(vec![collector(&root, &["*.log"]), collector(&root, &["*.log"])]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        assert_eq!(samples_of(&samples, MetricKind::GlobMatchNumber).len(), 1);
        assert_eq!(samples_of(&samples, MetricKind::SizeBytes).len(), 1);
    }

    #[test]
    fn tree_root_with_glob_metacharacters_is_taken_literally() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data[1]");
        fs::create_dir(&root).unwrap();
        write_file(&root, "app.log", b"x");

        let engine = FilesCollector::new(vec![collector(
            &root.display().to_string(),
            &["*.log"],
        )]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        let matches = samples_of(&samples, MetricKind::GlobMatchNumber);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, 1.0);
        let sizes = samples_of(&samples, MetricKind::SizeBytes);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].key, "app.log");
    }

    #[test]
    fn missing_tree_root_emits_nothing() {
        let engine = FilesCollector::new(vec![collector("/nonexistent/fstatd-root", &["*.log"])]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);
        assert!(samples.is_empty());
    }

    #[test]
    fn bad_template_skips_pattern_without_aborting_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "app.log", b"x");

        let engine = FilesCollector::new(vec![collector(
            &dir.path().display().to_string(),
            &["{{broken", "*.log"],
        )]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        // The malformed pattern emits nothing, the healthy one proceeds.
        let matches = samples_of(&samples, MetricKind::GlobMatchNumber);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].key, "*.log");
    }

    #[test]
    fn unmatched_pattern_still_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FilesCollector::new(vec![collector(
            &dir.path().display().to_string(),
            &["*.missing"],
        )]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        let matches = samples_of(&samples, MetricKind::GlobMatchNumber);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, 0.0);
    }

    #[test]
    fn content_samples_follow_the_collector_flags() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "app.log", b"a\nb\nc\n");

        let mut col = collector(&dir.path().display().to_string(), &["*.log"]);
        col.enable_crc32 = true;
        col.enable_lines = true;
        let engine = FilesCollector::new(vec![col]);

        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        let hashes = samples_of(&samples, MetricKind::ContentHashCrc32);
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes[0].value, f64::from(crc32fast::hash(b"a\nb\nc\n")));

        let lines = samples_of(&samples, MetricKind::ContentLineNumber);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].value, 3.0);
    }

    #[test]
    fn content_samples_absent_when_flags_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "app.log", b"a\n");

        let engine = FilesCollector::new(vec![collector(
            &dir.path().display().to_string(),
            &["*.log"],
        )]);
        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);

        assert!(samples_of(&samples, MetricKind::ContentHashCrc32).is_empty());
        assert!(samples_of(&samples, MetricKind::ContentLineNumber).is_empty());
    }

    #[test]
    fn trees_are_walked_in_deterministic_order() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.log", b"x");
        let root = dir.path().display().to_string();

        let mut beta = collector(&root, &["a.log"]);
        beta.tree_name = Some("beta".to_string());
        let mut alpha = collector(&root, &["a.log"]);
        alpha.tree_name = Some("alpha".to_string());

        let engine = FilesCollector::new(vec![beta, alpha]);
        assert_eq!(engine.tree_count(), 2);

        let mut samples: Vec<Sample> = Vec::new();
        engine.collect(&mut samples);
        let matches = samples_of(&samples, MetricKind::GlobMatchNumber);
        assert_eq!(matches[0].tree.as_deref(), Some("alpha"));
        assert_eq!(matches[1].tree.as_deref(), Some("beta"));
    }
}
