use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::closure::ClosureSettings;
use crate::model::StaffId;
use crate::quota::{DEFAULT_MONTHLY_TARGET, QuotaSettings};

/// Directory under the project root holding state, config and the lock file.
pub const TALLY_DIR: &str = ".tally";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub staff: StaffConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub closure: ClosureConfig,
}

/// State file locations, relative to the project root unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_path")]
    pub data: PathBuf,
    #[serde(default = "default_schedules_path")]
    pub schedules: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data: default_data_path(),
            schedules: default_schedules_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub staff_role_id: Option<String>,
    #[serde(default)]
    pub announcement_channel_id: Option<String>,
    #[serde(default)]
    pub mod_log_channel_id: Option<String>,
}

/// Static roster used where no live platform is available.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaffConfig {
    #[serde(default)]
    pub members: Vec<StaffMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_target")]
    pub default_target: u32,
    #[serde(default = "default_true")]
    pub rollover: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_target: default_target(),
            rollover: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureConfig {
    #[serde(default = "default_solved_tags")]
    pub solved_tags: Vec<String>,
    #[serde(default)]
    pub roster_fallback: bool,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            solved_tags: default_solved_tags(),
            roster_fallback: false,
        }
    }
}

impl ProjectConfig {
    #[must_use]
    pub fn data_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.paths.data)
    }

    #[must_use]
    pub fn schedules_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.paths.schedules)
    }

    #[must_use]
    pub fn lock_path(project_root: &Path) -> PathBuf {
        project_root.join(TALLY_DIR).join("tally.lock")
    }

    #[must_use]
    pub fn quota_settings(&self) -> QuotaSettings {
        QuotaSettings {
            announcement_channel: self.platform.announcement_channel_id.clone(),
            default_target: self.quota.default_target,
        }
    }

    #[must_use]
    pub fn closure_settings(&self) -> ClosureSettings {
        ClosureSettings {
            solved_tags: self.closure.solved_tags.clone(),
            mod_log_channel: self.platform.mod_log_channel_id.clone(),
            roster_fallback: self.closure.roster_fallback,
        }
    }

    /// Ids of the configured staff roster.
    #[must_use]
    pub fn roster_ids(&self) -> Vec<StaffId> {
        self.staff.members.iter().map(|m| m.id.clone()).collect()
    }
}

/// Read `.tally/config.toml`; a missing file means defaults.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(TALLY_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_true() -> bool {
    true
}

const fn default_target() -> u32 {
    DEFAULT_MONTHLY_TARGET
}

fn default_data_path() -> PathBuf {
    PathBuf::from(TALLY_DIR).join("data.json")
}

fn default_schedules_path() -> PathBuf {
    PathBuf::from(TALLY_DIR).join("scheduled_closures.json")
}

fn default_solved_tags() -> Vec<String> {
    vec!["solved".to_string(), "closed".to_string()]
}
