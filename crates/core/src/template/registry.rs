//! Template registry loaded from a directory tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::TemplateError;
use super::types::{Template, TemplateSummary};

/// Result of loading a template directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registry: TemplateRegistry,
    /// One entry per skipped or partially loaded template.
    pub warnings: Vec<String>,
}

/// Loaded templates keyed by `(name, version)`.
#[derive(Debug, Default, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<(String, String), Arc<Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a template.
    pub fn insert(&mut self, template: Template) {
        let key = (template.name.clone(), template.version.clone());
        self.templates.insert(key, Arc::new(template));
    }

    pub fn get(&self, name: &str, version: &str) -> Option<Arc<Template>> {
        self.templates
            .get(&(name.to_string(), version.to_string()))
            .cloned()
    }

    /// All templates ordered by name then version.
    pub fn list(&self) -> Vec<Arc<Template>> {
        let mut templates: Vec<_> = self.templates.values().cloned().collect();
        templates.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        templates
    }

    pub fn summaries(&self) -> Vec<TemplateSummary> {
        self.list().iter().map(|t| t.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Loads `<dir>/<name>/<version>/*.json`.
    ///
    /// Only an unreadable `dir` is fatal; every per-template problem becomes
    /// a warning and the template is skipped.
    pub fn load(dir: &Path, supported_types: &[&str]) -> Result<LoadReport, TemplateError> {
        info!("Loading pipeline templates from {}", dir.display());

        let names = sorted_subdirs(dir).map_err(|e| TemplateError::DirectoryUnreadable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut report = LoadReport::default();

        for name_dir in names {
            let Some(name) = file_name(&name_dir) else {
                continue;
            };
            let versions = match sorted_subdirs(&name_dir) {
                Ok(versions) => versions,
                Err(e) => {
                    report
                        .warnings
                        .push(format!("{}: cannot list versions: {}", name, e));
                    continue;
                }
            };

            for version_dir in versions {
                let Some(version) = file_name(&version_dir) else {
                    continue;
                };
                load_version(&name, &version, &version_dir, supported_types, &mut report);
            }
        }

        for warning in &report.warnings {
            warn!("Template load warning: {}", warning);
        }
        info!(
            "Loaded {} pipeline templates ({} warnings)",
            report.registry.len(),
            report.warnings.len()
        );

        Ok(report)
    }
}

fn load_version(
    name: &str,
    version: &str,
    dir: &Path,
    supported_types: &[&str],
    report: &mut LoadReport,
) {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(e) => {
            report
                .warnings
                .push(format!("{}/{}: cannot read directory: {}", name, version, e));
            return;
        }
    };
    files.sort();

    for path in files {
        let value = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(value) => value,
            Err(e) => {
                report
                    .warnings
                    .push(format!("{}/{}: {}: {}", name, version, path.display(), e));
                continue;
            }
        };

        match Template::from_file_value(name, version, value, supported_types) {
            Ok(mut template) => {
                let env_warnings = template.expand_env_defaults(|var| std::env::var(var).ok());
                report.warnings.extend(env_warnings);
                debug!("Loaded template {}/{} ({})", name, version, template.engine_type);
                report.registry.insert(template);
            }
            Err(reason) => {
                report
                    .warnings
                    .push(format!("{}/{}: {}: {}", name, version, path.display(), reason));
            }
        }
    }
}

fn sorted_subdirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}
