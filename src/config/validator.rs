use crate::config::{CommandConfig, Config, Timings};
use crate::error::{Error, Result};

/// Validates a single command invocation
pub fn validate_command_config(label: &str, config: &CommandConfig) -> Result<()> {
    if config.command.trim().is_empty() {
        return Err(Error::ConfigInvalid(format!("{} command is empty", label)));
    }

    Ok(())
}

/// Validates the timing knobs
pub fn validate_timings(timings: &Timings) -> Result<()> {
    if timings.poll_interval_ms == 0 {
        return Err(Error::ConfigInvalid(
            "pollIntervalMs must be greater than zero".to_string(),
        ));
    }

    if timings.write_poll_ms == 0 {
        return Err(Error::ConfigInvalid(
            "writePollMs must be greater than zero".to_string(),
        ));
    }

    if timings.port_wait_timeout_ms < timings.poll_interval_ms {
        return Err(Error::ConfigInvalid(format!(
            "portWaitTimeoutMs ({}) is shorter than pollIntervalMs ({})",
            timings.port_wait_timeout_ms, timings.poll_interval_ms
        )));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    if config.artifact.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("artifact path is empty".to_string()));
    }

    if config.port == 0 {
        return Err(Error::ConfigInvalid("port must be non-zero".to_string()));
    }

    validate_command_config("install", &config.install)?;
    validate_command_config("server", &config.server)?;
    validate_timings(&config.timings)?;

    Ok(())
}
