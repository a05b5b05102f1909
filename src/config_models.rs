pub mod cli_args;
pub mod worker_args;

/// Parses a humantime duration such as `250ms` or `1m 30s`, rejecting zero.
pub(crate) fn parse_nonzero_duration(s: &str) -> Result<humantime::Duration, String> {
    let duration: humantime::Duration = s.parse().map_err(|e| format!("{}", e))?;
    if duration.is_zero() {
        return Err("duration must be longer than zero".to_string());
    }
    Ok(duration)
}
