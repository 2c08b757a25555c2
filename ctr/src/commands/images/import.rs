use crate::context::{AppContext, VerbosityLevel};
use crate::format;
use anyhow::{Context, bail};
use chrono::Local;
use clap::Args;
use libctr::archive::{add_ref_prefix, digest_translator, filter_ref_prefix};
use libctr::{Client, DecryptConfig, Image, ImportOptions, Platform, PlatformMatcher, UnpackOptions};
use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::debug;

/// Arguments of `ctr images import`
#[derive(Args, Debug, Default)]
pub struct ImportArgs {
    /// Base image name for added images, when provided only images with this name prefix are imported
    #[arg(long)]
    pub base_name: Option<String>,
    /// Whether to create digest images
    #[arg(long)]
    pub digests: bool,
    /// Skip applying --digests option to images named in the importing tar (use it in conjunction with --digests)
    #[arg(long)]
    pub skip_digest_for_named: bool,
    /// Image name to keep index as, by default index is discarded
    #[arg(long)]
    pub index_name: Option<String>,
    /// Imports content for all platforms, false by default
    #[arg(long)]
    pub all_platforms: bool,
    /// Imports content for a specific platform
    #[arg(long)]
    pub platform: Option<String>,
    /// Skip unpacking the images, false by default
    #[arg(long)]
    pub no_unpack: bool,
    /// Compress uncompressed blobs when creating manifest (Docker format only)
    #[arg(long)]
    pub compress_blobs: bool,
    /// Snapshotter to unpack into
    #[arg(long)]
    pub snapshotter: Option<String>,
    /// A secret key's filename and an optional password separated by colon
    #[arg(long = "key")]
    pub keys: Vec<String>,
    /// Recipient of the image; used only for PKCS7 and must be an x509 certificate
    #[arg(long = "dec-recipient")]
    pub dec_recipients: Vec<String>,
    /// Archive to import, `-` for stdin
    pub input: String,
}

/// Default ref prefix for unnamed imports
pub fn default_prefix() -> String {
    format!("import-{}", Local::now().format("%Y-%m-%d"))
}

/// Translate the command line flags into import options.
///
/// Returns the options and the explicitly requested platform matcher.
pub fn import_options(args: &ImportArgs) -> anyhow::Result<(ImportOptions, Option<PlatformMatcher>)> {
    let mut opts = ImportOptions::default();

    let prefix = match args.base_name.as_deref().filter(|p| !p.is_empty()) {
        Some(prefix) => {
            // only references under the base name are kept
            opts.ref_translator = Some(filter_ref_prefix(prefix));
            prefix.to_string()
        }
        None => {
            let prefix = default_prefix();
            opts.ref_translator = Some(add_ref_prefix(&prefix));
            prefix
        }
    };

    if args.digests {
        opts.digest_ref = Some(digest_translator(&prefix));
    }
    if args.skip_digest_for_named {
        if !args.digests {
            bail!("--skip-digest-for-named must be specified with --digests option");
        }
        opts.skip_digest_ref = Some(Arc::new(|name: &str| !name.is_empty()));
    }

    opts.index_name = args.index_name.clone().filter(|n| !n.is_empty());
    opts.compress_blobs = args.compress_blobs;
    opts.all_platforms = args.all_platforms;

    let matcher = match args.platform.as_deref().filter(|p| !p.is_empty()) {
        Some(platform) => {
            let platform: Platform = platform.parse()?;
            Some(PlatformMatcher::OnlyStrict(platform))
        }
        None => None,
    };
    opts.platform = matcher.clone();

    Ok((opts, matcher))
}

fn open_input(input: &str) -> anyhow::Result<Box<dyn Read + Send>> {
    if input == "-" {
        return Ok(Box::new(io::stdin()));
    }
    let file = File::open(input).with_context(|| format!("failed to open {}", input))?;
    Ok(Box::new(file))
}

/// Handle the images import command
pub async fn handle_import<W: Write>(
    ctx: &AppContext,
    client: &Client,
    args: &ImportArgs,
    out: &mut W,
) -> anyhow::Result<Vec<Image>> {
    let (opts, matcher) = import_options(args)?;
    let reader = open_input(&args.input)?;

    format::print(
        ctx,
        VerbosityLevel::Verbose,
        &format!("Importing {}...", args.input),
    );
    let images = client.import(reader, opts).await?;

    if args.no_unpack {
        return Ok(images);
    }

    let decrypt = DecryptConfig::from_args(&args.keys, &args.dec_recipients)?;
    let matcher = matcher.unwrap_or(PlatformMatcher::Default);
    let snapshotter = args
        .snapshotter
        .as_deref()
        .unwrap_or(ctx.config.snapshotter.as_str());
    debug!("unpacking {} images", images.len());

    for image in &images {
        write!(out, "unpacking {} ({})...", image.name, image.target_digest())?;
        out.flush()?;
        client
            .unpack(
                image,
                &matcher,
                snapshotter,
                UnpackOptions {
                    decrypt: decrypt.clone(),
                },
            )
            .await?;
        writeln!(out, "done")?;
    }
    Ok(images)
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;
