use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand};

fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(about = "Inspect test environments and smoke-check their devices")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file (default: $DROVER_CONFIG, then ./drover.json)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Print the resolved environment as JSON
	Env {
		/// Environment name (default: $DROVER_ENV, then the config's choice)
		#[arg(short, long)]
		name: Option<String>,
	},

	/// List every configured device with its type and effective scope
	Devices,

	/// Start a driver for each device of an environment, then quit them all
	Check {
		/// Environment name (default: $DROVER_ENV, then the config's choice)
		#[arg(short, long)]
		name: Option<String>,

		/// Only check this device
		#[arg(short, long, value_name = "DEVICE")]
		device: Option<String>,
	},
}
