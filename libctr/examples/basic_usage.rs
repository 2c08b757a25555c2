//! Basic usage example for the libctr library.
//!
//! Imports an image archive (`docker save` or OCI layout tar) into a store
//! under a temporary directory, unpacks it and reports what was stored.
//!
//! Run with: cargo run --example basic_usage -- path/to/image.tar

use libctr::archive::add_ref_prefix;
use libctr::format::format_size;
use libctr::{Client, DeleteOptions, ImportOptions, PlatformMatcher, UnpackOptions};
use std::fs::File;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: basic_usage <image.tar>");
        return Ok(());
    };

    let root = tempfile::tempdir()?;
    let client = Client::builder().root(root.path()).build().await?;
    println!("Opened store at {}\n", client.root().display());

    let opts = ImportOptions {
        ref_translator: Some(add_ref_prefix("example")),
        ..Default::default()
    };
    let images = client.import(File::open(&path)?, opts).await?;
    println!("Imported {} images:", images.len());

    let matcher = PlatformMatcher::Default;
    for image in &images {
        let check = client.check(image, &matcher).await?;
        let size = client.size(image, &matcher).await;
        println!(
            "  {} {} ({}, {}/{} blobs present)",
            image.name,
            image.target_digest(),
            format_size(size.size),
            check.present.len(),
            check.required.len()
        );

        let report = client
            .unpack(image, &matcher, "native", UnpackOptions::default())
            .await?;
        println!("    unpacked {} layers, {} already present", report.applied, report.skipped);
    }

    for image in &images {
        client
            .delete_image(&image.name, DeleteOptions { synchronous: true })
            .await?;
    }
    println!("\nDeleted all images, {} blobs left", client.content_store().list()?.len());
    Ok(())
}
