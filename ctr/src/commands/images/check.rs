use crate::context::AppContext;
use crate::format::{self, OutputFormat};
use anyhow::{Context, anyhow};
use clap::Args;
use libctr::format::format_size;
use libctr::{CheckResult, Client, PlatformMatcher};
use serde::Serialize;
use std::io::Write;
use tabled::Tabled;
use tracing::{debug, error};

/// Arguments of `ctr images check`
#[derive(Args, Debug, Default)]
pub struct CheckArgs {
    /// Print only the refs of images with all content present
    #[arg(short, long)]
    pub quiet: bool,
    /// Snapshotter to check unpacked state against
    #[arg(long)]
    pub snapshotter: Option<String>,
    /// Output format: pretty, json, yaml
    #[arg(long)]
    pub format: Option<String>,
    /// Filters selecting the images to check
    pub filters: Vec<String>,
}

/// One row of the check table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct CheckRow {
    #[tabled(rename = "REF")]
    #[serde(rename = "ref")]
    pub name: String,

    #[tabled(rename = "TYPE")]
    #[serde(rename = "type")]
    pub media_type: String,

    #[tabled(rename = "DIGEST")]
    pub digest: String,

    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "SIZE")]
    pub size: String,

    #[tabled(rename = "UNPACKED")]
    pub unpacked: bool,

    #[tabled(skip)]
    #[serde(skip)]
    pub complete: bool,
}

/// Status and size columns for a check result
pub fn summarize(result: &CheckResult) -> (String, String) {
    let present = format_size(result.present_size());
    if !result.available {
        return (
            format!("unavailable ({}/?)", result.present.len()),
            format!("{}/?", present),
        );
    }
    let state = if result.missing.is_empty() {
        "complete"
    } else {
        "incomplete"
    };
    (
        format!("{} ({}/{})", state, result.present.len(), result.required.len()),
        format!("{}/{}", present, format_size(result.required_size())),
    )
}

/// Handle the images check command
pub async fn handle_check<W: Write>(
    ctx: &AppContext,
    client: &Client,
    args: &CheckArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let images = client
        .list_images(&args.filters)
        .await
        .context("failed listing images")?;
    if images.is_empty() {
        debug!("no images found");
        return Ok(());
    }

    let snapshotter = args
        .snapshotter
        .as_deref()
        .unwrap_or(ctx.config.snapshotter.as_str());
    let matcher = PlatformMatcher::Default;
    let mut exit_err: Option<anyhow::Error> = None;
    let mut rows = Vec::with_capacity(images.len());

    for image in &images {
        let (status, size, complete) = match client.check(image, &matcher).await {
            Ok(result) => {
                let (status, size) = summarize(&result);
                (status, size, result.is_complete())
            }
            Err(e) => {
                error!("unable to check {}: {}", image.name, e);
                exit_err.get_or_insert_with(|| anyhow!("unable to check {}: {}", image.name, e));
                ("error".to_string(), "-".to_string(), false)
            }
        };

        let unpacked = match client.is_unpacked(image, &matcher, snapshotter).await {
            Ok(unpacked) => unpacked,
            Err(e) => {
                error!("unable to check unpack for {}: {}", image.name, e);
                exit_err.get_or_insert_with(|| {
                    anyhow!("unable to check unpack for {}: {}", image.name, e)
                });
                false
            }
        };

        rows.push(CheckRow {
            name: image.name.clone(),
            media_type: image.target_media_type(),
            digest: image.target_digest().to_string(),
            status,
            size,
            unpacked,
            complete,
        });
    }

    if args.quiet {
        for row in rows.iter().filter(|r| r.complete) {
            writeln!(out, "{}", row.name)?;
        }
    } else {
        let output_format = args
            .format
            .as_deref()
            .map(OutputFormat::from)
            .unwrap_or(ctx.config.style.format);
        writeln!(out, "{}", format::format_rows(&rows, output_format)?)?;
    }

    match exit_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
