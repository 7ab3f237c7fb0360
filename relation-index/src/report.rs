//! Related property availability report.
//!
//! One line per property id found by the relation scan: the bare id when
//! the property is indexed, `"<id> not available in ES"` when it is not.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument};

use crate::AppError;
use relation_index_pipeline::QueryService;

/// Report file written when no path is configured.
pub const DEFAULT_REPORT_PATH: &str = "related-properties-result.txt";

const UNAVAILABLE_SUFFIX: &str = " not available in ES";

/// Whether a related property has any document in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAvailability {
    pub id: String,
    pub available: bool,
}

/// Render report lines, each terminated by a newline.
pub fn format_report(entries: &[PropertyAvailability]) -> String {
    entries
        .iter()
        .map(|entry| {
            if entry.available {
                format!("{}\n", entry.id)
            } else {
                format!("{}{}\n", entry.id, UNAVAILABLE_SUFFIX)
            }
        })
        .collect()
}

/// Check every id against the index, in id order.
pub async fn check_availability(
    ids: &HashSet<String>,
    queries: &QueryService,
) -> Vec<PropertyAvailability> {
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();

    let mut entries = Vec::with_capacity(sorted.len());
    for id in sorted {
        let available = queries.property_exists(id).await;
        entries.push(PropertyAvailability {
            id: id.clone(),
            available,
        });
    }
    entries
}

/// Check availability of `ids` and write the report to `path`.
///
/// # Returns
///
/// * `Ok(entries)` - The entries written, in file order
/// * `Err(AppError::IoError)` - If the file could not be written
#[instrument(skip(ids, queries), fields(ids = ids.len()))]
pub async fn write_property_report(
    path: &Path,
    ids: &HashSet<String>,
    queries: &QueryService,
) -> Result<Vec<PropertyAvailability>, AppError> {
    let entries = check_availability(ids, queries).await;
    tokio::fs::write(path, format_report(&entries)).await?;

    let unavailable = entries.iter().filter(|entry| !entry.available).count();
    info!(
        path = %path.display(),
        properties = entries.len(),
        unavailable,
        "Property report written"
    );
    Ok(entries)
}
