//! Builder configuration.
//!
//! One `BuilderMode` applies to the whole build; the per-row escalation flags
//! set by the interference pass are the only exceptions. Settings can come from
//! the environment:
//!
//! * `CONTSTATE_BUILDER_MODE` = `baseline` | `contopt` | `simvgprex`
//! * `CONTSTATE_REPORT_ACCESS_COUNTS` = `1` to log frame accesses per function
//! * `CONTSTATE_VERIFY` = `1` to run layout checks and the IR verifier

use std::str::FromStr;

use enum_display::EnumDisplay;
use thiserror::Error;

pub const MODE_VAR: &str = "CONTSTATE_BUILDER_MODE";
pub const REPORT_ACCESS_COUNTS_VAR: &str = "CONTSTATE_REPORT_ACCESS_COUNTS";
pub const VERIFY_VAR: &str = "CONTSTATE_VERIFY";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown builder mode `{0}` (expected baseline, contopt or simvgprex)")]
    UnknownMode(String),

    #[error("invalid value `{value}` for {var} (expected 0 or 1)")]
    InvalidFlag { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumDisplay)]
pub enum BuilderMode {
    /// No eviction, spill on definition, reload on use.
    #[display("baseline")]
    Baseline,
    /// Same timings as `Baseline`.
    #[default]
    #[display("contopt")]
    ContOpt,
    /// Eviction, spill before the suspend, reload when resuming.
    #[display("simvgprex")]
    SimVgprEx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillTiming {
    OnDef,
    OnSuspend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTiming {
    OnUse,
    OnResume,
}

impl BuilderMode {
    /// Rows are only resident in the suspends they cross.
    pub fn evicts_unused(self) -> bool {
        matches!(self, BuilderMode::SimVgprEx)
    }

    pub fn spill_timing(self) -> SpillTiming {
        match self {
            BuilderMode::Baseline | BuilderMode::ContOpt => SpillTiming::OnDef,
            BuilderMode::SimVgprEx => SpillTiming::OnSuspend,
        }
    }

    pub fn reload_timing(self) -> ReloadTiming {
        match self {
            BuilderMode::Baseline | BuilderMode::ContOpt => ReloadTiming::OnUse,
            BuilderMode::SimVgprEx => ReloadTiming::OnResume,
        }
    }
}

impl FromStr for BuilderMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(BuilderMode::Baseline),
            "contopt" => Ok(BuilderMode::ContOpt),
            "simvgprex" => Ok(BuilderMode::SimVgprEx),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

/// Storage the caller can provide in place of a separately allocated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineStorage {
    pub size: u64,
    pub align: u64,
}

impl InlineStorage {
    pub fn fits(&self, size: u64, align: u64) -> bool {
        size <= self.size && align <= self.align
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuilderConfig {
    pub mode: BuilderMode,
    /// Log spill/reload/frame-address counts after materialization.
    pub report_access_counts: bool,
    /// Run the exhaustive layout checks even in release builds.
    pub verify_layout: bool,
    /// Run the IR verifier on the rewritten function.
    pub verify_ir: bool,
    pub inline_storage: Option<InlineStorage>,
}

impl Default for FrameBuilderConfig {
    fn default() -> Self {
        Self {
            mode: BuilderMode::default(),
            report_access_counts: false,
            verify_layout: cfg!(debug_assertions),
            verify_ir: false,
            inline_storage: None,
        }
    }
}

impl FrameBuilderConfig {
    pub fn with_mode(mode: BuilderMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(mode) = lookup(MODE_VAR) {
            config.mode = mode.parse()?;
        }
        if let Some(value) = lookup(REPORT_ACCESS_COUNTS_VAR) {
            config.report_access_counts = parse_flag(REPORT_ACCESS_COUNTS_VAR, &value)?;
        }
        if let Some(value) = lookup(VERIFY_VAR)
            && parse_flag(VERIFY_VAR, &value)?
        {
            config.verify_layout = true;
            config.verify_ir = true;
        }
        Ok(config)
    }

    /// Layout checks run in debug builds regardless of the flag.
    pub fn checks_layout(&self) -> bool {
        self.verify_layout || cfg!(debug_assertions)
    }
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" | "" => Ok(false),
        other => Err(ConfigError::InvalidFlag {
            var,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "../tests/contstate/t_config.rs"]
mod tests;
