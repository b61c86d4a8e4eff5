//! Classify command - show how an endpoint is treated.

use anyhow::Result;
use clap::Args;
use reqwest::Method;

use super::Context;

/// Arguments for the classify command.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// HTTP method (GET, POST, ...)
    pub method: String,

    /// Request path, e.g. /api/brands/42
    pub path: String,
}

/// Run the classify command.
pub fn run(args: ClassifyArgs, ctx: &Context) -> Result<()> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .map_err(|_| anyhow::anyhow!("Invalid HTTP method: {}", args.method))?;

    let access = ctx.config.endpoint_policy().classify(&method, &args.path);

    if ctx.json_output {
        let output = serde_json::json!({
            "method": method.as_str(),
            "path": args.path,
            "access": access.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", access);
    }

    Ok(())
}
