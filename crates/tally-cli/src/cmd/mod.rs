pub mod init;
pub mod quota;
pub mod schedules;
pub mod snapshot;
pub mod stats;

use anyhow::{Context as _, Result, bail};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tally_core::config::{ProjectConfig, TALLY_DIR};
use tally_core::error::ErrorCode;
use tally_core::lock::InstanceLock;
use tally_core::model::StaffId;
use tally_core::store::{SharedStore, Store};

const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Fail unless `tally init` has run in `project_root`.
pub fn require_initialized(project_root: &Path) -> Result<()> {
    if !project_root.join(TALLY_DIR).is_dir() {
        let code = ErrorCode::NotInitialized;
        bail!(
            "{}: {} ({})",
            code.code(),
            code.message(),
            code.hint().unwrap_or_default()
        );
    }
    Ok(())
}

/// Hold the instance lock for the duration of a mutating command.
pub fn acquire_lock(project_root: &Path) -> Result<InstanceLock> {
    let path = ProjectConfig::lock_path(project_root);
    InstanceLock::acquire(&path, LOCK_TIMEOUT)
        .with_context(|| format!("Failed to lock {}", path.display()))
}

pub fn open_store(project_root: &Path, config: &ProjectConfig) -> Result<SharedStore> {
    require_initialized(project_root)?;
    let path = config.data_path(project_root);
    let store = Store::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(store.into_shared())
}

/// Configured display names by staff id.
pub fn staff_names(config: &ProjectConfig) -> BTreeMap<StaffId, String> {
    config
        .staff
        .members
        .iter()
        .map(|m| (m.id.clone(), m.name.clone()))
        .collect()
}

pub fn display_name(names: &BTreeMap<StaffId, String>, id: &StaffId) -> String {
    names.get(id).cloned().unwrap_or_else(|| id.to_string())
}
