use crate::context::AppContext;
use crate::format;
use anyhow::anyhow;
use clap::Args;
use libctr::{Client, DeleteOptions};
use std::io::Write;
use tracing::error;

/// Arguments of `ctr images delete`
#[derive(Args, Debug, Default)]
pub struct DeleteArgs {
    /// Synchronously remove the image and all associated resources
    #[arg(long)]
    pub sync: bool,
    /// Image refs to delete
    #[arg(required = true)]
    pub refs: Vec<String>,
}

/// Handle the images delete command
///
/// Each ref is deleted in order. Refs that do not exist only produce a
/// warning; the first other failure is returned once every ref was tried.
pub async fn handle_delete<W: Write>(
    ctx: &AppContext,
    client: &Client,
    args: &DeleteArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let mut exit_err: Option<anyhow::Error> = None;
    let last = args.refs.len().saturating_sub(1);

    for (i, target) in args.refs.iter().enumerate() {
        // --sync only waits on the final delete, which collects for all of them
        let opts = DeleteOptions {
            synchronous: args.sync && i == last,
        };
        match client.delete_image(target, opts).await {
            Ok(()) => writeln!(out, "{}", target)?,
            Err(e) if e.is_not_found() => {
                format::warning(ctx, &format!("{}: image not found", target));
            }
            Err(e) => {
                error!("unable to delete {}: {}", target, e);
                exit_err.get_or_insert_with(|| anyhow!("unable to delete {}: {}", target, e));
            }
        }
    }

    match exit_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "delete_tests.rs"]
mod tests;
