mod check;
mod devices;
mod env;

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use drover::{ExecutionConfig, Orchestrator};

use crate::cli::{Cli, Commands};

pub use check::{CheckReport, check_devices};
pub use devices::list_devices;
pub use env::print_environment;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let path = ExecutionConfig::locate(cli.config.as_deref());
	let config = ExecutionConfig::load(Some(&path)).with_context(|| format!("loading {}", path.display()))?;
	let mut stdout = io::stdout().lock();

	match cli.command {
		Commands::Env { name } => print_environment(&config, name.as_deref(), &mut stdout),
		Commands::Devices => list_devices(&config, &mut stdout),
		Commands::Check { name, device } => {
			let mut builder = Orchestrator::builder(config);
			if let Some(name) = name {
				builder = builder.environment(name);
			}
			let report = check_devices(builder, device.as_deref(), &mut stdout).await?;
			stdout.flush()?;
			if !report.is_success() {
				bail!("{} of {} devices failed to start", report.failed.len(), report.total());
			}
			Ok(())
		}
	}
}
