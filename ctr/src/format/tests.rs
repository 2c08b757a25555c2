use super::*;
use crate::config::Config;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Tabled)]
struct TestRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "VALUE")]
    value: i32,
}

fn rows() -> Vec<TestRow> {
    vec![
        TestRow {
            name: "first".to_string(),
            value: 1,
        },
        TestRow {
            name: "second".to_string(),
            value: 2,
        },
    ]
}

fn ctx_with_color(color: ColorChoice) -> AppContext {
    let mut config = Config::default();
    config.style.color = color;
    AppContext::new(config, VerbosityLevel::Normal)
}

#[test]
fn test_output_format_from_string() {
    assert_eq!(OutputFormat::from("pretty"), OutputFormat::Pretty);
    assert_eq!(OutputFormat::from("json"), OutputFormat::Json);
    assert_eq!(OutputFormat::from("YML"), OutputFormat::Yaml);
    assert_eq!(OutputFormat::from("invalid"), OutputFormat::Pretty);
}

#[test]
fn test_color_choice_from_string() {
    assert_eq!(ColorChoice::from("always"), ColorChoice::Always);
    assert_eq!(ColorChoice::from("Never"), ColorChoice::Never);
    assert_eq!(ColorChoice::from("whatever"), ColorChoice::Auto);
    assert_eq!(ColorChoice::Never.to_string(), "never");
}

#[test]
fn test_should_color_follows_choice() {
    assert!(should_color(&ctx_with_color(ColorChoice::Always)));
    assert!(!should_color(&ctx_with_color(ColorChoice::Never)));
}

#[test]
fn test_table_has_headers_and_rows() {
    let output = table(&rows());
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("NAME"));
    assert!(lines[0].contains("VALUE"));
    assert!(lines[2].contains("second"));
    assert!(!output.contains('|'));
}

#[test]
fn test_format_rows_json() {
    let output = format_rows(&rows(), OutputFormat::Json).unwrap();
    let json: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
    assert_eq!(json[0]["name"], "first");
    assert_eq!(json[1]["value"], 2);
}

#[test]
fn test_format_rows_yaml() {
    let output = format_rows(&rows(), OutputFormat::Yaml).unwrap();
    assert!(output.contains("name: first"));
    assert!(output.contains("value: 2"));
}

#[test]
fn test_format_empty_rows_keeps_header() {
    let output = format_rows::<TestRow>(&[], OutputFormat::Pretty).unwrap();
    assert!(output.contains("NAME"));
}

#[test]
fn test_labels_column() {
    let labels = BTreeMap::from([
        ("b".to_string(), "2".to_string()),
        ("a".to_string(), "1".to_string()),
    ]);
    assert_eq!(labels_column(&labels), "a=1,b=2");
    assert_eq!(labels_column(&BTreeMap::new()), "-");
}

#[test]
fn test_print_does_not_panic() {
    let ctx = AppContext::new(Config::default(), VerbosityLevel::Verbose);
    print(&ctx, VerbosityLevel::Trace, "should not print");
    print(&ctx, VerbosityLevel::Verbose, "should print");
}
