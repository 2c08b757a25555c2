use anyhow::bail;
use clap::Args;
use libctr::Client;
use std::collections::BTreeMap;
use std::io::Write;

/// Arguments of `ctr images label`
#[derive(Args, Debug, Default)]
pub struct LabelArgs {
    /// Replace all labels
    #[arg(short, long)]
    pub replace_all: bool,
    /// Image name
    #[arg(default_value = "")]
    pub name: String,
    /// Labels as <key>=<value>, a key without a value is set to "true"
    pub labels: Vec<String>,
}

/// Parse `key=value` arguments; `key` alone means `key=true`.
///
/// An empty value removes the label when the update is applied.
pub fn parse_labels(args: &[String]) -> BTreeMap<String, String> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (arg.to_string(), "true".to_string()),
        })
        .collect()
}

/// Field paths the update touches
pub fn fieldpaths(labels: &BTreeMap<String, String>, replace_all: bool) -> Vec<String> {
    if replace_all {
        return vec!["labels".to_string()];
    }
    labels.keys().map(|k| format!("labels.{}", k)).collect()
}

/// Handle the images label command
pub async fn handle_label<W: Write>(client: &Client, args: &LabelArgs, out: &mut W) -> anyhow::Result<()> {
    if args.name.is_empty() {
        bail!("please specify an image");
    }
    if args.labels.is_empty() && !args.replace_all {
        bail!("please specify at least one label");
    }

    let labels = parse_labels(&args.labels);
    let paths = fieldpaths(&labels, args.replace_all);

    let mut image = client.get_image(&args.name).await?;
    image.labels = labels;
    let updated = client.update_image(image, &paths).await?;

    let pairs: Vec<String> = updated
        .labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    writeln!(out, "{}", pairs.join(","))?;
    Ok(())
}

#[cfg(test)]
#[path = "label_tests.rs"]
mod tests;
