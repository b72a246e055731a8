use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::plan::{PlanTable, FALLBACK_PLAN};

/// Runtime configuration for the quota subsystem.
///
/// Loaded once at process start and handed to [`crate::QuotaService`];
/// nothing in the crate reads the environment after construction.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub data_dir: PathBuf,
    /// Plan assigned to newly provisioned organizations.
    pub default_plan: String,
    pub log_level: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/usage"),
            default_plan: FALLBACK_PLAN.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl QuotaConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(dir) = env::var("QUOTA_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(plan) = env::var("DEFAULT_PLAN") {
            cfg.default_plan = plan;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate(&PlanTable::default())?;
        Ok(cfg)
    }

    pub fn validate(&self, plans: &PlanTable) -> Result<()> {
        ensure_directory(&self.data_dir)?;

        if !plans.contains(&self.default_plan) {
            anyhow::bail!(
                "DEFAULT_PLAN {} is not defined in the plan table",
                self.default_plan
            );
        }

        Ok(())
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}
