//! Stats reporting: the snapshot flattened to sorted key=value lines, plus an
//! optional JSON dump.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::sim::top::SystemSnapshot;

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten(&join(prefix, key), inner, out);
            }
        }
        Value::Array(items) => {
            for (index, inner) in items.iter().enumerate() {
                flatten(&format!("{prefix}[{index}]"), inner, out);
            }
        }
        other => out.push(format!("{prefix}={other}")),
    }
}

pub fn key_value_lines(snapshot: &SystemSnapshot) -> Vec<String> {
    let value = serde_json::to_value(snapshot).expect("snapshot serializes");
    let mut lines = Vec::new();
    flatten("", &value, &mut lines);
    lines.sort();
    lines
}

pub fn print_report(snapshot: &SystemSnapshot) {
    for line in key_value_lines(snapshot) {
        println!("{line}");
    }
}

pub fn write_json(path: &Path, snapshot: &SystemSnapshot) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create stats file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, snapshot).context("cannot serialize stats")?;
    writeln!(writer).context("cannot write stats")?;
    Ok(())
}
