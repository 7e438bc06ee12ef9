use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const MIN_AUDIT_LOG_DAYS: u32 = 1;
pub const MAX_AUDIT_LOG_DAYS: u32 = 365;
pub const DEFAULT_AUDIT_LOG_DAYS: u32 = 90;

/// Caller-supplied export configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub include_photos: bool,
    pub include_audit_logs: bool,
    pub audit_log_days: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_photos: true,
            include_audit_logs: true,
            audit_log_days: DEFAULT_AUDIT_LOG_DAYS,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(MIN_AUDIT_LOG_DAYS..=MAX_AUDIT_LOG_DAYS).contains(&self.audit_log_days) {
            return Err(CoreError::InvalidOptions(format!(
                "auditLogDays must be between {MIN_AUDIT_LOG_DAYS} and {MAX_AUDIT_LOG_DAYS}, got {}",
                self.audit_log_days
            )));
        }
        Ok(())
    }
}

/// How the importer treats an incoming record that collides with a stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Leave the stored record untouched and drop the incoming one.
    Skip,
    /// Overwrite the stored record with the incoming values.
    Replace,
    /// Keep stored values wherever the incoming record is blank.
    Merge,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Replace => "replace",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            _ => Err(CoreError::InvalidOptions(format!("unknown resolution strategy: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts: ExportOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ExportOptions::default());
        assert!(opts.include_photos);
        assert!(opts.include_audit_logs);
        assert_eq!(opts.audit_log_days, 90);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        for days in [1, 365] {
            let opts = ExportOptions { audit_log_days: days, ..Default::default() };
            assert!(opts.validate().is_ok());
        }
        for days in [0, 366] {
            let opts = ExportOptions { audit_log_days: days, ..Default::default() };
            assert!(matches!(opts.validate(), Err(CoreError::InvalidOptions(_))));
        }
    }

    #[test]
    fn strategy_parses_from_wire_names() {
        assert_eq!("merge".parse::<ResolutionStrategy>().unwrap(), ResolutionStrategy::Merge);
        assert!("overwrite".parse::<ResolutionStrategy>().is_err());
        let s: ResolutionStrategy = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(s, ResolutionStrategy::Replace);
    }
}
