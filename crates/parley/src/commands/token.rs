//! Token command - mint an access token for local testing.

use anyhow::{Context as _, Result, bail};
use clap::Args;

use parley_server::JwtVerifier;

use super::Context;

/// Arguments for the token command.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// User id to put in the subject claim
    pub user_id: String,

    /// Token lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    pub ttl: i64,
}

/// Run the token command.
pub fn run(args: TokenArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;
    let secret = config
        .auth
        .jwt_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .context("no JWT secret configured; set [auth] jwt_secret or PARLEY_JWT_SECRET")?;

    if args.ttl <= 0 {
        bail!("--ttl must be positive");
    }
    if !config.users.iter().any(|u| u.id == args.user_id) {
        eprintln!("warning: user '{}' is not in [[users]]", args.user_id);
    }

    let token = JwtVerifier::new(secret).sign(&args.user_id, args.ttl)?;
    println!("{}", token);
    Ok(())
}
