//! Request command - send one call through the pipeline.

use anyhow::{Context as _, Result};
use clap::Args;
use reqwest::Method;
use tollgate_auth::{ApiRequest, ApiResponse, AuthPipeline, Error};

use super::Context;

/// Arguments for the request command.
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, ...)
    pub method: String,

    /// Request path, e.g. /api/profile
    pub path: String,

    /// JSON request body
    #[arg(short, long)]
    pub data: Option<String>,
}

/// Run the request command.
pub async fn run(args: RequestArgs, ctx: &Context) -> Result<()> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .map_err(|_| anyhow::anyhow!("Invalid HTTP method: {}", args.method))?;

    let mut request = ApiRequest::new(method, args.path);
    if let Some(data) = args.data {
        let body: serde_json::Value =
            serde_json::from_str(&data).context("--data must be valid JSON")?;
        request = request.with_json(body);
    }

    let pipeline = AuthPipeline::from_config(&ctx.config, ctx.open_store())?;

    match pipeline.execute(request).await {
        Ok(response) => {
            print_response(&response, ctx.json_output)?;
            if response.is_success() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("Request failed with status {}", response.status()))
            }
        }
        Err(Error::Unauthorized { reason, response }) => {
            print_response(&response, ctx.json_output)?;
            Err(anyhow::anyhow!("Unauthorized: {}", reason))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_response(response: &ApiResponse, json_output: bool) -> Result<()> {
    if json_output {
        let body = response
            .json::<serde_json::Value>()
            .unwrap_or_else(|_| serde_json::Value::String(response.text()));
        let output = serde_json::json!({
            "status": response.status().as_u16(),
            "body": body,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", response.status());
        let text = response.text();
        if !text.is_empty() {
            println!("{}", text);
        }
    }
    Ok(())
}
