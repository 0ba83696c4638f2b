// src/config/validate.rs

use std::str::FromStr;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{KernelgateError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = KernelgateError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_programs(&raw)?;
        let grace_period = validate_grace_period(&raw)?;
        let interrupt_signal = validate_interrupt_signal(&raw)?;
        validate_storage(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, grace_period, interrupt_signal))
    }
}

fn validate_programs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.kernel.effective_program().trim().is_empty() {
        return Err(KernelgateError::ConfigError(
            "[kernel].program must not be empty".to_string(),
        ));
    }
    if cfg.scoring.program.trim().is_empty() {
        return Err(KernelgateError::ConfigError(
            "[scoring].program must not be empty".to_string(),
        ));
    }
    if !cfg.scoring.file_suffix.is_empty() && !cfg.scoring.file_suffix.starts_with('.') {
        return Err(KernelgateError::ConfigError(format!(
            "[scoring].file_suffix must start with '.' (got '{}')",
            cfg.scoring.file_suffix
        )));
    }
    Ok(())
}

fn validate_grace_period(cfg: &RawConfigFile) -> Result<Duration> {
    parse_duration(&cfg.relay.grace_period).map_err(|e| {
        KernelgateError::ConfigError(format!("[relay].grace_period: {e}"))
    })
}

fn validate_interrupt_signal(cfg: &RawConfigFile) -> Result<Signal> {
    let name = cfg.kernel.interrupt_signal.trim().to_uppercase();
    let name = if name.starts_with("SIG") {
        name
    } else {
        format!("SIG{name}")
    };
    Signal::from_str(&name).map_err(|_| {
        KernelgateError::ConfigError(format!(
            "[kernel].interrupt_signal: unknown signal '{}'",
            cfg.kernel.interrupt_signal
        ))
    })
}

fn validate_storage(cfg: &RawConfigFile) -> Result<()> {
    if cfg.storage.progress_db.trim().is_empty() {
        return Err(KernelgateError::ConfigError(
            "[storage].progress_db must not be empty (use \":memory:\" for no file)".to_string(),
        ));
    }
    Ok(())
}
