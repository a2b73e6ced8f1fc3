use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

use crate::hybrid::HybridConfig;
use crate::mem::tier::TierConfig;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub log_level: String,
    /// Cycle at which verbose per-event tracing starts.
    pub debug_start: u64,
    /// Stop the simulation at this cycle; 0 runs to completion.
    pub run_limit: u64,
    pub num_processes: usize,
    pub stats_json: Option<String>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            debug_start: 0,
            run_limit: 0,
            num_processes: 1,
            stats_json: None,
        }
    }
}

impl Config for TierConfig {}
impl Config for HybridConfig {}

/// The whole simulator configuration, one TOML section per component.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    pub sim: SimConfig,
    pub dram: TierConfig,
    pub pcm: TierConfig,
    pub hybrid: HybridConfig,
}

impl SimulatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let value: Value = text.parse().context("cannot parse configuration")?;
        let table = value
            .as_table()
            .context("configuration root must be a table")?;
        let config = Self {
            sim: SimConfig::from_section(table.get("sim")),
            dram: TierConfig::from_section(table.get("dram")),
            pcm: TierConfig::from_section(table.get("pcm")),
            hybrid: HybridConfig::from_section(table.get("hybrid")),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.dram
            .validate()
            .context("invalid dram tier configuration")?;
        self.pcm
            .validate()
            .context("invalid pcm tier configuration")?;
        ensure!(
            self.dram.block_size == self.pcm.block_size,
            "dram and pcm must share a block size ({} vs {})",
            self.dram.block_size,
            self.pcm.block_size
        );
        let page_size = self.hybrid.page_size;
        ensure!(
            page_size.is_power_of_two(),
            "page_size must be a power of two, got {page_size}"
        );
        ensure!(
            page_size >= self.dram.block_size,
            "page_size {page_size} is smaller than the block size {}",
            self.dram.block_size
        );
        if self.hybrid.pcm_offset != 0 {
            ensure!(
                self.hybrid.pcm_offset == self.dram.total_size(),
                "pcm_offset {:#x} does not match the dram tier size {:#x}",
                self.hybrid.pcm_offset,
                self.dram.total_size()
            );
        }
        if self.hybrid.fixed_pcm_migration_cost {
            ensure!(
                self.hybrid.pcm_migration_cost > 0,
                "fixed_pcm_migration_cost requires a non-zero pcm_migration_cost"
            );
        }
        Ok(())
    }

    /// First PCM address: configured, or derived from the DRAM tier size.
    pub fn pcm_offset(&self) -> u64 {
        if self.hybrid.pcm_offset != 0 {
            self.hybrid.pcm_offset
        } else {
            self.dram.total_size()
        }
    }
}
