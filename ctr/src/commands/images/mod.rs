//! `ctr images` subcommands.
//!
//! Every handler receives an opened [`Client`] and writes its results to
//! the given writer; warnings and log lines go to stderr.

use crate::context::AppContext;
use clap::Subcommand;
use libctr::Client;
use std::io::Write;

pub mod check;
pub mod delete;
pub mod import;
pub mod label;
pub mod list;

#[cfg(test)]
mod testutil;

#[derive(Subcommand, Debug)]
pub enum ImagesCommand {
    /// List images in the namespace
    #[command(visible_alias = "ls")]
    List(list::ListArgs),
    /// Set and clear labels for an image
    Label(label::LabelArgs),
    /// Check existing images to ensure all content is available locally
    Check(check::CheckArgs),
    /// Remove one or more images by reference
    #[command(visible_aliases = ["del", "remove", "rm"])]
    Delete(delete::DeleteArgs),
    /// Import images
    Import(import::ImportArgs),
}

/// Run an images subcommand against a client opened from `ctx`
pub async fn handle<W: Write>(ctx: &AppContext, command: &ImagesCommand, out: &mut W) -> anyhow::Result<()> {
    let client = ctx.client().await?;
    run(ctx, &client, command, out).await
}

async fn run<W: Write>(
    ctx: &AppContext,
    client: &Client,
    command: &ImagesCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        ImagesCommand::List(args) => list::handle_list(ctx, client, args, out).await,
        ImagesCommand::Label(args) => label::handle_label(client, args, out).await,
        ImagesCommand::Check(args) => check::handle_check(ctx, client, args, out).await,
        ImagesCommand::Delete(args) => delete::handle_delete(ctx, client, args, out).await,
        ImagesCommand::Import(args) => import::handle_import(ctx, client, args, out)
            .await
            .map(|_| ()),
    }
}
