use crate::context::AppContext;
use crate::format::{self, OutputFormat};
use anyhow::Context;
use clap::Args;
use libctr::format::format_size;
use libctr::{Client, PlatformMatcher};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use tabled::Tabled;
use tracing::error;

/// Arguments of `ctr images list`
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Print only the image refs
    #[arg(short, long)]
    pub quiet: bool,
    /// Output format: pretty, json, yaml
    #[arg(long)]
    pub format: Option<String>,
    /// Filters, e.g. name==docker.io/library/busybox:latest or labels.pinned==true
    pub filters: Vec<String>,
}

/// One row of the image table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct ImageRow {
    #[tabled(rename = "REF")]
    #[serde(rename = "ref")]
    pub name: String,

    #[tabled(rename = "TYPE")]
    #[serde(rename = "type")]
    pub media_type: String,

    #[tabled(rename = "DIGEST")]
    pub digest: String,

    /// Formatted size (not serialized)
    #[tabled(rename = "SIZE")]
    #[serde(skip)]
    pub size_display: String,

    #[tabled(rename = "PLATFORMS")]
    pub platforms: String,

    #[tabled(rename = "LABELS")]
    pub labels: String,

    /// Raw size in bytes (not displayed)
    #[tabled(skip)]
    #[serde(rename = "size")]
    pub size: u64,
}

/// Handle the images list command
pub async fn handle_list<W: Write>(
    ctx: &AppContext,
    client: &Client,
    args: &ListArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let images = client
        .list_images(&args.filters)
        .await
        .context("failed to list images")?;

    if args.quiet {
        for image in &images {
            writeln!(out, "{}", image.name)?;
        }
        return Ok(());
    }

    let matcher = PlatformMatcher::Default;
    let mut rows = Vec::with_capacity(images.len());
    for image in &images {
        let report = client.size(image, &matcher).await;
        if let Some(e) = &report.error {
            error!("failed calculating size for image {}: {}", image.name, e);
        }

        let platforms = match client.platforms(image).await {
            Ok(platforms) => platforms_column(platforms.iter().map(|p| p.to_string())),
            Err(e) => {
                error!("failed resolving platform for image {}: {}", image.name, e);
                "-".to_string()
            }
        };

        rows.push(ImageRow {
            name: image.name.clone(),
            media_type: image.target_media_type(),
            digest: image.target_digest().to_string(),
            size_display: format_size(report.size),
            platforms,
            labels: format::labels_column(&image.labels),
            size: report.size,
        });
    }

    let output_format = args
        .format
        .as_deref()
        .map(OutputFormat::from)
        .unwrap_or(ctx.config.style.format);
    writeln!(out, "{}", format::format_rows(&rows, output_format)?)?;
    Ok(())
}

/// Deduplicated, sorted platforms joined by `,`, or `-` when there are none
pub fn platforms_column<I: IntoIterator<Item = String>>(platforms: I) -> String {
    let unique: BTreeSet<String> = platforms.into_iter().collect();
    if unique.is_empty() {
        "-".to_string()
    } else {
        unique.into_iter().collect::<Vec<_>>().join(",")
    }
}

#[cfg(test)]
#[path = "list_tests.rs"]
mod tests;
