use std::io::Write;

use anyhow::{Context, Result};
use drover::ExecutionConfig;

/// Writes the selected environment, placeholders already resolved, as
/// pretty JSON.
pub fn print_environment(config: &ExecutionConfig, name: Option<&str>, out: &mut impl Write) -> Result<()> {
	let env = config
		.active_environment(name)
		.context("resolving environment")?;
	serde_json::to_writer_pretty(&mut *out, &env)?;
	writeln!(out)?;
	Ok(())
}
