use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use drover::OrchestratorBuilder;
use drover_protocol::Device;
use futures_util::future::join_all;

/// Outcome of a device check.
#[derive(Debug, Default)]
pub struct CheckReport {
	pub started: Vec<String>,
	/// Device name and error message.
	pub failed: Vec<(String, String)>,
}

impl CheckReport {
	pub fn total(&self) -> usize {
		self.started.len() + self.failed.len()
	}

	pub fn is_success(&self) -> bool {
		self.failed.is_empty()
	}
}

fn secs(elapsed: Duration) -> String {
	format!("{:.1}s", elapsed.as_secs_f64())
}

/// Starts a driver for every device of the environment at once, prints
/// one OK/FAIL line per device in declaration order, then quits them all.
pub async fn check_devices(
	builder: OrchestratorBuilder,
	only: Option<&str>,
	out: &mut impl Write,
) -> Result<CheckReport> {
	let run = builder.build().context("preparing environment")?;
	let environment = run.environment().clone();

	let devices: Vec<&Device> = environment
		.devices
		.iter()
		.filter(|d| only.is_none_or(|name| d.name() == name))
		.collect();
	if devices.is_empty() {
		match only {
			Some(name) => bail!("environment '{}' has no device named '{name}'", environment.name),
			None => bail!("environment '{}' declares no devices", environment.name),
		}
	}

	writeln!(out, "checking {} device(s) in '{}'", devices.len(), environment.name)?;
	run.ensure_execution_started().await;
	let pool = run.pool().clone();
	let attempts = join_all(devices.iter().map(|device| {
		let pool = pool.clone();
		async move {
			let started = Instant::now();
			let result = pool.driver(device).await;
			(*device, result, started.elapsed())
		}
	}))
	.await;

	let mut report = CheckReport::default();
	for (device, result, elapsed) in attempts {
		match result {
			Ok(holder) => {
				writeln!(
					out,
					"  {}  {device}  session {}  {}",
					"OK".green().bold(),
					holder.session_id(),
					secs(elapsed)
				)?;
				report.started.push(device.name().to_string());
			}
			Err(err) => {
				let message = err.to_string();
				writeln!(out, "  {}  {device}  {message}", "FAIL".red().bold())?;
				report.failed.push((device.name().to_string(), message));
			}
		}
	}

	run.execution_finished().await;
	Ok(report)
}
