use std::io::Write;

use anyhow::Result;
use drover::ExecutionConfig;
use drover_protocol::{Device, DeviceType, DriverScope};

fn effective_scope(config: &ExecutionConfig, device: &Device) -> DriverScope {
	device.scope().or(config.driver.scope).unwrap_or_default()
}

fn endpoint<'a>(config: &'a ExecutionConfig, device: &'a Device) -> &'a str {
	let fallback = match device.device_type() {
		DeviceType::Web => config.driver.grid_url.as_deref(),
		_ => config.driver.appium_url.as_deref(),
	};
	device.grid_url().or(fallback).unwrap_or("-")
}

/// One line per device, grouped by environment in name order.
pub fn list_devices(config: &ExecutionConfig, out: &mut impl Write) -> Result<()> {
	if config.environments.is_empty() {
		writeln!(out, "no environments configured")?;
		return Ok(());
	}
	for (name, env) in &config.environments {
		writeln!(out, "{name}")?;
		if env.devices.is_empty() {
			writeln!(out, "  (no devices)")?;
		}
		for device in &env.devices {
			writeln!(
				out,
				"  {:<16} {:<8} {:<10} {}",
				device.name(),
				device.device_type().to_string(),
				effective_scope(config, device).to_string(),
				endpoint(config, device)
			)?;
		}
	}
	Ok(())
}
