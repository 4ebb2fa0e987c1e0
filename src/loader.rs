//! Definition loading from a directory of JSON files
//!
//! Each `*.json` file holds one object definition:
//!
//! ```json
//! {
//!   "name": "FlightStatus",
//!   "object_id": 249018884,
//!   "fields": [
//!     { "name": "Armed", "type": 7, "numElements": 1 },
//!     { "name": "Switches", "type": "int16", "numElements": 3 }
//!   ]
//! }
//! ```
//!
//! Files are read and registered concurrently. Each file is one load unit, so
//! the manager turns ready after the last file is processed, whether it
//! loaded or not.

use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::manager::ObjectManager;
use crate::registry::LoadUnit;
use crate::types::{ObjectDefinition, RawObjectDefinition};
use crate::{Result, UavTalkError};

const DEFINITION_EXTENSION: &str = "json";

/// Parse one definition record.
pub fn parse_definition(text: &str) -> Result<RawObjectDefinition> {
    parse_with_context(text, "object definition")
}

fn parse_with_context(text: &str, context: impl Into<String>) -> Result<RawObjectDefinition> {
    serde_json::from_str(text).map_err(|source| UavTalkError::Json { context: context.into(), source })
}

/// Outcome of [`load_directory`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Definitions registered, metadata objects not included
    pub loaded: Vec<Arc<ObjectDefinition>>,
    pub failed: Vec<(PathBuf, UavTalkError)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load every definition file in `dir` into `manager`.
///
/// `on_ready` runs once the last file has been processed. A directory that
/// cannot be listed is an error, but still completes the load.
pub async fn load_directory(
    manager: &ObjectManager,
    dir: impl AsRef<Path>,
    on_ready: impl FnOnce() + Send + 'static,
) -> Result<LoadReport> {
    let dir = dir.as_ref();
    let load = manager.begin_load();
    manager.on_ready(on_ready);

    let paths = definition_files(dir).await?;
    debug!("Found {} definition files in {}", paths.len(), dir.display());

    let tasks = paths.iter().map(|path| {
        let unit = manager.load_unit();
        tokio::spawn(load_file(manager.clone(), path.clone(), unit))
    });
    let results = join_all(tasks.collect::<Vec<_>>()).await;

    let mut report = LoadReport::default();
    for (path, result) in paths.into_iter().zip(results) {
        match result {
            Ok(Ok(definition)) => report.loaded.push(definition),
            Ok(Err(e)) => {
                warn!("Skipping {}: {}", path.display(), e);
                report.failed.push((path, e));
            }
            Err(join_error) => {
                warn!("Loader task for {} failed: {}", path.display(), join_error);
                let e = UavTalkError::invalid_definition(path.display().to_string(), join_error.to_string());
                report.failed.push((path, e));
            }
        }
    }

    info!(
        "Loaded {} definitions from {} ({} failed)",
        report.loaded.len(),
        dir.display(),
        report.failed.len()
    );
    load.complete();
    Ok(report)
}

async fn definition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries =
        tokio::fs::read_dir(dir).await.map_err(|e| UavTalkError::io_error(dir.to_path_buf(), e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| UavTalkError::io_error(dir.to_path_buf(), e))? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == DEFINITION_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn load_file(manager: ObjectManager, path: PathBuf, unit: LoadUnit) -> Result<Arc<ObjectDefinition>> {
    let _unit = unit;
    let text = tokio::fs::read_to_string(&path).await.map_err(|e| UavTalkError::io_error(path.clone(), e))?;
    let record = parse_with_context(&text, path.display().to_string())?;
    manager.register(&record)
}
