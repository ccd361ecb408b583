//! Check-config command - validate and print the effective configuration.

use anyhow::{Context as _, Result};
use clap::Args;

use super::Context;

/// Arguments for the check-config command.
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Print the effective configuration as TOML (secrets masked)
    #[arg(long)]
    pub show: bool,
}

/// Run the check-config command.
pub fn run(args: CheckConfigArgs, ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    let files = loaded.loaded_from();
    if files.is_empty() {
        println!("No config files found, using defaults");
    }
    for path in files {
        println!("Loaded config: {}", path.display());
    }
    if ctx.verbose {
        for source in loaded.sources.iter().filter(|s| !s.loaded) {
            println!("Not found: {}", source.path.display());
        }
    }
    for var in &loaded.env_overrides {
        println!("Overridden by environment: {}", var);
    }

    if args.show {
        let text = loaded
            .config
            .redacted()
            .to_toml()
            .context("failed to render configuration")?;
        println!();
        println!("{}", text);
    }

    loaded.config.validate().context("configuration is invalid")?;
    println!("Configuration OK");
    Ok(())
}
