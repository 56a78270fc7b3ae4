//! Configuration merging: CLI defaults, general scope, trees and pattern
//! groups resolved into concrete leaf collectors.
//!
//! Precedence per field, strictly: pattern-group explicit > owning-tree
//! explicit > general scope explicit > CLI default. "Unset" is a real state
//! ([`Toggle::Unset`] / `None`), never conflated with `false` or `""`.

use tracing::info;

use crate::collector::FileStatCollector;
use crate::config::{
    ConfigDocument, ConfigError, ExporterConfig, PatternGroupConfig, Toggle, TreeConfig,
};

/// Collection defaults derived from the command line.
///
/// Positional arguments become one implicit pattern group under the general
/// scope; the metric toggles carry the flag values and participate in the
/// merge as the outermost fallback.
#[derive(Debug, Clone, Default)]
pub struct CliDefaults {
    pub patterns: Vec<String>,
    pub enable_crc32_metric: Toggle,
    pub enable_nb_line_metric: Toggle,
    pub tree_name: Option<String>,
    pub tree_root: Option<String>,
}

/// Fully merged collection configuration.
///
/// The aggregate flags are computed once here and never change afterwards:
/// the metric descriptor set derives from them at construction time.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub collectors: Vec<FileStatCollector>,
    pub has_tree_label: bool,
    pub any_crc32: bool,
    pub any_lines: bool,
}

/// Merges the configuration document with CLI defaults and resolves every
/// pattern group into a [`FileStatCollector`].
pub fn merge(doc: ConfigDocument, defaults: &CliDefaults) -> Result<ResolvedConfig, ConfigError> {
    let mut exporter = doc.exporter;

    fill_general_scope(&mut exporter, defaults);

    // Push the general scope toggles down into its own groups before the
    // command-line group is appended: CLI toggles are already final.
    for group in &mut exporter.files {
        group.enable_crc32_metric = group.enable_crc32_metric.or(exporter.enable_crc32_metric);
        group.enable_nb_line_metric = group
            .enable_nb_line_metric
            .or(exporter.enable_nb_line_metric);
    }
    if !defaults.patterns.is_empty() {
        info!("adding pattern group from command line arguments");
        exporter.files.push(PatternGroupConfig {
            patterns: defaults.patterns.clone(),
            enable_crc32_metric: defaults.enable_crc32_metric,
            enable_nb_line_metric: defaults.enable_nb_line_metric,
        });
    }

    let general = TreeConfig {
        tree_name: exporter.tree_name.clone(),
        tree_root: exporter.tree_root.clone(),
        patterns: exporter.patterns.clone(),
        enable_crc32_metric: exporter.enable_crc32_metric,
        enable_nb_line_metric: exporter.enable_nb_line_metric,
        files: Vec::new(),
    };
    for tree in &mut exporter.trees {
        merge_tree(tree, &general);
    }

    // Tree labeling is all-or-nothing: one named tree anywhere means every
    // tree gets a name, defaulting to the empty string.
    let mut general_name = exporter.tree_name.clone();
    let has_tree_label =
        general_name.is_some() || exporter.trees.iter().any(|t| t.tree_name.is_some());
    if has_tree_label {
        if general_name.is_none() {
            info!(tree_name = "", "tree name defaulted for general scope");
        }
        general_name.get_or_insert_with(String::new);
        for tree in &mut exporter.trees {
            tree.tree_name.get_or_insert_with(String::new);
        }
    }

    let mut resolved = ResolvedConfig {
        collectors: Vec::new(),
        has_tree_label,
        any_crc32: false,
        any_lines: false,
    };

    for group in &exporter.files {
        let scope = TreeConfig {
            tree_name: general_name.clone(),
            tree_root: exporter.tree_root.clone(),
            patterns: exporter.patterns.clone(),
            ..TreeConfig::default()
        };
        push_collector(&mut resolved, &scope, group);
    }
    for tree in &exporter.trees {
        for group in &tree.files {
            push_collector(&mut resolved, tree, group);
        }
    }

    if resolved.collectors.is_empty() {
        return Err(ConfigError::NothingToCollect);
    }

    Ok(resolved)
}

/// Fills unset general-scope fields from the command line.
///
/// An empty `--tree-root` counts as unset so that a config-file root is not
/// clobbered by the flag's default value.
fn fill_general_scope(exporter: &mut ExporterConfig, defaults: &CliDefaults) {
    if exporter.tree_name.is_none() {
        if let Some(name) = &defaults.tree_name {
            info!(from = "parameter", tree_name = %name, "config");
            exporter.tree_name = Some(name.clone());
        }
    } else if let Some(name) = &exporter.tree_name {
        info!(from = "config", tree_name = %name, "config");
    }

    if exporter.tree_root.is_none() {
        if let Some(root) = defaults.tree_root.as_deref().filter(|r| !r.is_empty()) {
            info!(from = "parameter", tree_root = %root, "config");
            exporter.tree_root = Some(root.to_string());
        }
    } else if let Some(root) = &exporter.tree_root {
        info!(from = "config", tree_root = %root, "config");
    }

    exporter.enable_crc32_metric = exporter.enable_crc32_metric.or(defaults.enable_crc32_metric);
    exporter.enable_nb_line_metric = exporter
        .enable_nb_line_metric
        .or(defaults.enable_nb_line_metric);
}

/// Fills unset tree fields from the enclosing scope, then pushes the tree's
/// toggles down into its pattern groups.
fn merge_tree(tree: &mut TreeConfig, parent: &TreeConfig) {
    if tree.tree_name.is_none() {
        tree.tree_name = parent.tree_name.clone();
    }
    if tree.tree_root.is_none() {
        tree.tree_root = parent.tree_root.clone();
    }
    tree.enable_crc32_metric = tree.enable_crc32_metric.or(parent.enable_crc32_metric);
    tree.enable_nb_line_metric = tree.enable_nb_line_metric.or(parent.enable_nb_line_metric);

    for group in &mut tree.files {
        group.enable_crc32_metric = group.enable_crc32_metric.or(tree.enable_crc32_metric);
        group.enable_nb_line_metric = group.enable_nb_line_metric.or(tree.enable_nb_line_metric);
    }
}

/// Resolves one pattern group into a leaf collector.
fn push_collector(
    resolved: &mut ResolvedConfig,
    scope: &TreeConfig,
    group: &PatternGroupConfig,
) {
    let mut patterns = group.patterns.clone();
    patterns.extend(scope.patterns.iter().cloned());

    let enable_crc32 = group.enable_crc32_metric.is_enabled();
    let enable_lines = group.enable_nb_line_metric.is_enabled();
    resolved.any_crc32 |= enable_crc32;
    resolved.any_lines |= enable_lines;

    resolved.collectors.push(FileStatCollector {
        tree_name: scope.tree_name.clone(),
        tree_root: scope.tree_root.clone().unwrap_or_default(),
        patterns,
        enable_crc32,
        enable_lines,
    });
}
