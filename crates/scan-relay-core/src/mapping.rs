//! # Mapping Resolution
//!
//! The mapping table correlates repository URLs with the group they belong
//! to and with the application ID the analysis service knows the group by.
//! Several rows may share a group: a logical application is often spread over
//! more than one repository, and all of them are analyzed together.
//!
//! The table is reloaded on every resolution so edits take effect on the next
//! webhook without a restart.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::registry::{ApplicationRegistry, RegistryError};
use crate::GroupId;

// ============================================================================
// Core Types
// ============================================================================

/// One record of the mapping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRow {
    pub application_name: String,
    pub group_id: GroupId,
    pub repository_url: String,

    /// Raw cell content; absent when the cell is empty
    pub external_app_id: Option<String>,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub group_id: GroupId,
    pub application_name: String,
    pub external_app_id: i64,

    /// Every repository of the group in table order, duplicates removed
    pub sibling_urls: Vec<String>,
}

/// Failure to load the mapping table
#[derive(Debug, Error)]
pub enum MappingSourceError {
    #[error("failed to read mapping table {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("mapping table {} has no '{column}' column", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("mapping table load was interrupted: {message}")]
    Interrupted { message: String },
}

/// Failures resolving a repository URL
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("mapping table unavailable: {0}")]
    SourceUnavailable(#[from] MappingSourceError),

    #[error("no mapping row for repository {repository_url}")]
    NoMapping { repository_url: String },

    #[error("mapping row for {repository_url} (group {group_id}) has no application ID")]
    MissingAppId {
        repository_url: String,
        group_id: GroupId,
    },

    #[error("mapping row for {repository_url} (group {group_id}) has non-numeric application ID '{value}'")]
    InvalidAppId {
        repository_url: String,
        group_id: GroupId,
        value: String,
    },

    #[error("application {app_id} (group {group_id}) is not registered with the analysis service")]
    UnknownAppId { app_id: i64, group_id: GroupId },

    #[error("application registry unavailable: {0}")]
    ValidationUnavailable(#[source] RegistryError),

    #[error("application registry timed out: {0}")]
    TimeoutExceeded(#[source] RegistryError),
}

impl From<RegistryError> for ResolutionError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Timeout { .. } => Self::TimeoutExceeded(error),
            other => Self::ValidationUnavailable(other),
        }
    }
}

// ============================================================================
// URL helpers
// ============================================================================

/// Normalize a repository URL for comparison.
///
/// Trims whitespace and strips trailing `.git` suffixes. Comparison after
/// normalization stays case-sensitive. The function is idempotent.
///
/// ```rust
/// use scan_relay_core::normalize_repository_url;
///
/// assert_eq!(
///     normalize_repository_url(" https://example.com/org/repo.git "),
///     "https://example.com/org/repo"
/// );
/// ```
pub fn normalize_repository_url(url: &str) -> String {
    let mut value = url.trim();
    while let Some(stripped) = value.strip_suffix(".git") {
        value = stripped.trim_end();
    }
    value.to_string()
}

/// Directory name a repository is cloned into: the last path segment of the
/// normalized URL.
///
/// Handles both `https://host/org/repo` and scp-like `git@host:org/repo`
/// forms. Returns `None` when no usable segment exists.
pub fn repository_name(url: &str) -> Option<String> {
    let normalized = normalize_repository_url(url);
    let trimmed = normalized.trim_end_matches('/');
    let name = trimmed
        .rsplit(|c: char| c == '/' || c == ':' || c == '\\')
        .next()?;

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

// ============================================================================
// Mapping sources
// ============================================================================

/// Provider of the current mapping table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MappingSource: Send + Sync {
    /// Load every row of the table.
    async fn load(&self) -> Result<Vec<MappingRow>, MappingSourceError>;
}

/// Mapping table stored as a CSV file with one header row
///
/// Recognized headers (case, spaces and underscores are ignored):
///
/// | Field | Accepted headers |
/// |-------|------------------|
/// | application name | `application_name`, `Application Name` |
/// | group | `group_id`, `Group ID` |
/// | repository | `repository_url`, `Repository URL` |
/// | application ID | `external_app_id`, `application_id`, `Application ID` |
#[derive(Debug, Clone)]
pub struct CsvMappingSource {
    path: PathBuf,
}

impl CsvMappingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn header_key(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn find_column(
    headers: &csv::StringRecord,
    path: &Path,
    column: &'static str,
    accepted: &[&str],
) -> Result<usize, MappingSourceError> {
    headers
        .iter()
        .position(|h| accepted.contains(&header_key(h).as_str()))
        .ok_or_else(|| MappingSourceError::MissingColumn {
            path: path.to_path_buf(),
            column,
        })
}

fn read_csv_table(path: &Path) -> Result<Vec<MappingRow>, MappingSourceError> {
    let read_error = |source: csv::Error| MappingSourceError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(read_error)?;

    let headers = reader.headers().map_err(read_error)?.clone();
    let name_col = find_column(&headers, path, "application_name", &["applicationname"])?;
    let group_col = find_column(&headers, path, "group_id", &["groupid", "group"])?;
    let url_col = find_column(&headers, path, "repository_url", &["repositoryurl", "repourl"])?;
    let app_id_col = find_column(
        &headers,
        path,
        "external_app_id",
        &["externalappid", "applicationid", "externalapplicationid", "appid"],
    )?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_error)?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let cell = |index: usize| record.get(index).unwrap_or("").trim();

        // Spreadsheets exported to CSV often end with fully empty lines.
        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        // A half-edited row must not hide the valid ones.
        let group_id = match GroupId::new(cell(group_col)) {
            Ok(group_id) => group_id,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line,
                    repository = cell(url_col),
                    error = %e,
                    "Skipping mapping row with invalid group"
                );
                continue;
            }
        };

        let external_app_id = Some(cell(app_id_col))
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        rows.push(MappingRow {
            application_name: cell(name_col).to_string(),
            group_id,
            repository_url: cell(url_col).to_string(),
            external_app_id,
        });
    }

    Ok(rows)
}

#[async_trait]
impl MappingSource for CsvMappingSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Vec<MappingRow>, MappingSourceError> {
        let path = self.path.clone();
        let rows = tokio::task::spawn_blocking(move || read_csv_table(&path))
            .await
            .map_err(|e| MappingSourceError::Interrupted {
                message: e.to_string(),
            })??;

        debug!(rows = rows.len(), "Loaded mapping table");
        Ok(rows)
    }
}

// ============================================================================
// MappingResolver
// ============================================================================

/// Resolves a repository URL to its group and validated application ID
#[derive(Clone)]
pub struct MappingResolver {
    source: Arc<dyn MappingSource>,
    registry: Arc<dyn ApplicationRegistry>,
}

impl MappingResolver {
    pub fn new(source: Arc<dyn MappingSource>, registry: Arc<dyn ApplicationRegistry>) -> Self {
        Self { source, registry }
    }

    /// Resolve `repository_url` against a freshly loaded mapping table.
    ///
    /// The steps run in a fixed order and the first failure is returned:
    /// load, match, application ID presence, application ID parse, registry
    /// membership. Sibling collection happens only after validation.
    #[instrument(skip(self), fields(repository = %repository_url))]
    pub async fn resolve(&self, repository_url: &str) -> Result<Resolution, ResolutionError> {
        let rows = self.source.load().await?;
        let wanted = normalize_repository_url(repository_url);

        let mut matches = rows
            .iter()
            .filter(|row| normalize_repository_url(&row.repository_url) == wanted);

        let Some(row) = matches.next() else {
            return Err(ResolutionError::NoMapping {
                repository_url: wanted,
            });
        };

        if let Some(other) = matches.find(|other| other.group_id != row.group_id) {
            warn!(
                first_group = %row.group_id,
                other_group = %other.group_id,
                "Repository appears in more than one group; using the first row"
            );
        }

        let raw_app_id =
            row.external_app_id
                .as_deref()
                .ok_or_else(|| ResolutionError::MissingAppId {
                    repository_url: wanted.clone(),
                    group_id: row.group_id.clone(),
                })?;

        let external_app_id = parse_app_id(raw_app_id).ok_or_else(|| {
            ResolutionError::InvalidAppId {
                repository_url: wanted.clone(),
                group_id: row.group_id.clone(),
                value: raw_app_id.to_string(),
            }
        })?;

        let known_ids = self.registry.list_application_ids().await?;
        if !known_ids.contains(&external_app_id) {
            return Err(ResolutionError::UnknownAppId {
                app_id: external_app_id,
                group_id: row.group_id.clone(),
            });
        }

        let mut seen = HashSet::new();
        let sibling_urls: Vec<String> = rows
            .iter()
            .filter(|candidate| candidate.group_id == row.group_id)
            .filter(|candidate| !candidate.repository_url.is_empty())
            .filter(|candidate| seen.insert(normalize_repository_url(&candidate.repository_url)))
            .map(|candidate| candidate.repository_url.clone())
            .collect();

        info!(
            group_id = %row.group_id,
            application = %row.application_name,
            app_id = external_app_id,
            siblings = sibling_urls.len(),
            "Resolved repository"
        );

        Ok(Resolution {
            group_id: row.group_id.clone(),
            application_name: row.application_name.clone(),
            external_app_id,
            sibling_urls,
        })
    }
}

/// Parse an application ID cell.
///
/// Spreadsheet exports sometimes render integers as `42.0`; a zero
/// fractional part is accepted, any other fraction is not.
fn parse_app_id(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(id) = value.parse::<i64>() {
        return Some(id);
    }
    let (integral, fraction) = value.split_once('.')?;
    if fraction.is_empty() || !fraction.chars().all(|c| c == '0') {
        return None;
    }
    integral.parse::<i64>().ok()
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
