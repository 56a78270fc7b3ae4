//! Prometheus export surface for the collection engine.
//!
//! [`FilesExporter`] adapts the engine to `prometheus::core::Collector`: the
//! registry drives one synchronous scrape per gather. The descriptor set is
//! built once from the aggregate configuration flags: the optional content
//! metrics are only registered when some collector enables them, and the
//! `tree` label exists on every metric or on none. Each gather uses fresh
//! gauge families, so concurrent gathers never share scrape state.

use std::collections::HashMap;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};

use crate::collector::{FilesCollector, MetricKind, Sample, SampleSink};

/// Default metric namespace.
pub const DEFAULT_NAMESPACE: &str = "file";

/// Kinds in exposition order.
const ALL_KINDS: [MetricKind; 5] = [
    MetricKind::GlobMatchNumber,
    MetricKind::SizeBytes,
    MetricKind::ModifTimeSeconds,
    MetricKind::ContentHashCrc32,
    MetricKind::ContentLineNumber,
];

/// Naming and labeling of one metric family.
struct FamilySpec {
    subsystem: &'static str,
    name: &'static str,
    help: &'static str,
    key_label: &'static str,
}

fn family_spec(kind: MetricKind) -> FamilySpec {
    match kind {
        MetricKind::GlobMatchNumber => FamilySpec {
            subsystem: "glob",
            name: "match_number",
            help: "Number of files matching pattern",
            key_label: "pattern",
        },
        MetricKind::SizeBytes => FamilySpec {
            subsystem: "stat",
            name: "size_bytes",
            help: "Size of file in bytes",
            key_label: "path",
        },
        MetricKind::ModifTimeSeconds => FamilySpec {
            subsystem: "stat",
            name: "modif_time_seconds",
            help: "Last modification time of file in epoch time",
            key_label: "path",
        },
        MetricKind::ContentHashCrc32 => FamilySpec {
            subsystem: "content",
            name: "hash_crc32",
            help: "CRC32 hash of file content using the IEEE polynomial",
            key_label: "path",
        },
        MetricKind::ContentLineNumber => FamilySpec {
            subsystem: "content",
            name: "line_number",
            help: "Number of lines in file",
            key_label: "path",
        },
    }
}

/// The immutable descriptor configuration, decided once at startup.
#[derive(Debug, Clone)]
pub struct MetricDescriptors {
    pub namespace: String,
    pub has_tree_label: bool,
    pub enable_crc32: bool,
    pub enable_lines: bool,
}

impl MetricDescriptors {
    /// The kinds this configuration actually exposes.
    fn active_kinds(&self) -> impl Iterator<Item = MetricKind> + '_ {
        ALL_KINDS.into_iter().filter(|kind| match kind {
            MetricKind::ContentHashCrc32 => self.enable_crc32,
            MetricKind::ContentLineNumber => self.enable_lines,
            _ => true,
        })
    }

    fn labels(&self, spec: &FamilySpec) -> Vec<String> {
        let mut labels = vec![spec.key_label.to_string()];
        if self.has_tree_label {
            labels.push("tree".to_string());
        }
        labels
    }

    fn opts(&self, spec: &FamilySpec) -> Opts {
        Opts::new(spec.name, spec.help)
            .namespace(self.namespace.clone())
            .subsystem(spec.subsystem)
    }
}

/// Prometheus collector wrapping the engine.
#[derive(Debug)]
pub struct FilesExporter {
    collector: FilesCollector,
    descriptors: MetricDescriptors,
    descs: Vec<Desc>,
}

impl FilesExporter {
    /// Builds the exporter and its fixed descriptor set.
    ///
    /// Fails on an invalid namespace; this is a startup error.
    pub fn new(
        collector: FilesCollector,
        descriptors: MetricDescriptors,
    ) -> Result<Self, prometheus::Error> {
        let mut descs = Vec::new();
        for kind in descriptors.active_kinds() {
            let spec = family_spec(kind);
            descs.push(Desc::new(
                format!("{}_{}_{}", descriptors.namespace, spec.subsystem, spec.name),
                spec.help.to_string(),
                descriptors.labels(&spec),
                HashMap::new(),
            )?);
        }
        Ok(FilesExporter {
            collector,
            descriptors,
            descs,
        })
    }
}

impl Collector for FilesExporter {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut sink = FamilySink::new(&self.descriptors);
        self.collector.collect(&mut sink);
        sink.into_families()
    }
}

/// Per-scrape sink translating engine samples into gauge families.
struct FamilySink {
    has_tree_label: bool,
    vecs: HashMap<MetricKind, GaugeVec>,
}

impl FamilySink {
    fn new(descriptors: &MetricDescriptors) -> Self {
        let mut vecs = HashMap::new();
        for kind in descriptors.active_kinds() {
            let spec = family_spec(kind);
            let labels = descriptors.labels(&spec);
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            // The descriptor set was validated at construction; rebuilding
            // the same family cannot fail.
            let vec = GaugeVec::new(descriptors.opts(&spec), &label_refs)
                .expect("descriptor validated at construction");
            vecs.insert(kind, vec);
        }
        FamilySink {
            has_tree_label: descriptors.has_tree_label,
            vecs,
        }
    }

    fn into_families(self) -> Vec<MetricFamily> {
        let mut families = Vec::new();
        for kind in ALL_KINDS {
            let Some(vec) = self.vecs.get(&kind) else {
                continue;
            };
            // Families with no samples this scrape are not exposed.
            families.extend(
                vec.collect()
                    .into_iter()
                    .filter(|family| !family.get_metric().is_empty()),
            );
        }
        families
    }
}

impl SampleSink for FamilySink {
    fn emit(&mut self, sample: Sample) {
        let Some(vec) = self.vecs.get(&sample.kind) else {
            return;
        };
        let mut values: Vec<&str> = vec![&sample.key];
        if self.has_tree_label {
            values.push(sample.tree.as_deref().unwrap_or(""));
        }
        vec.with_label_values(&values).set(sample.value);
    }
}
