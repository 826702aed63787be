//! Basket ledger
//!
//! Append-only CSV with one row per closed basket. Opening a file written
//! under an older header rewrites it into the current schema, carrying every
//! old row across column by column.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::types::BasketSummary;

pub const HEADER: [&str; 9] = [
    "open_at",
    "closed_at",
    "basket_id",
    "symbol",
    "direction",
    "levels",
    "max_volume",
    "worst_drawdown",
    "pnl",
];

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone)]
pub struct BasketLedger {
    path: PathBuf,
}

impl BasketLedger {
    /// Open (or create) the ledger, migrating an outdated header in place
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let ledger = Self { path };
        if !ledger.path.exists() {
            ledger.rewrite(&[])?;
            return Ok(ledger);
        }

        let rows = ledger.read_raw()?;
        let Some((header, data)) = rows.split_first() else {
            ledger.rewrite(&[])?;
            return Ok(ledger);
        };
        if header.iter().eq(HEADER.iter().copied()) {
            return Ok(ledger);
        }

        let migrated: Vec<Vec<String>> = data.iter().map(|row| remap_row(header, row)).collect();
        ledger.rewrite(&migrated)?;
        info!(
            "Migrated ledger {} to current schema ({} rows)",
            ledger.path.display(),
            migrated.len()
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one closed basket
    pub fn append(&self, symbol: &str, summary: &BasketSummary) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger: {}", self.path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(format_row(symbol, summary))?;
        writer.flush()?;
        Ok(())
    }

    /// Data rows keyed by column name
    pub fn rows(&self) -> Result<Vec<HashMap<String, String>>> {
        let rows = self.read_raw()?;
        let Some((header, data)) = rows.split_first() else {
            return Ok(Vec::new());
        };
        Ok(data
            .iter()
            .map(|row| {
                header
                    .iter()
                    .zip(row.iter())
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .collect())
    }

    fn read_raw(&self) -> Result<Vec<StringRecord>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;
        reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .context("Malformed ledger row")
    }

    /// Replace the file with the current header plus `rows`, atomically
    fn rewrite(&self, rows: &[Vec<String>]) -> Result<()> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = WriterBuilder::new().from_path(&tmp)?;
            writer.write_record(HEADER)?;
            for row in rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn remap_row(old_header: &StringRecord, row: &StringRecord) -> Vec<String> {
    let old: HashMap<&str, &str> = old_header.iter().zip(row.iter()).collect();
    HEADER
        .iter()
        .map(|col| old.get(col).copied().unwrap_or_default().to_string())
        .collect()
}

/// Fixed precision with trailing zeros dropped, e.g. `0.035000` -> `0.035`
fn trim_decimal(value: f64, precision: usize) -> String {
    let s = format!("{:.*}", precision, value);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn format_row(symbol: &str, s: &BasketSummary) -> Vec<String> {
    vec![
        s.open_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_default(),
        s.closed_at.format(TIME_FORMAT).to_string(),
        s.basket_id.to_string(),
        symbol.to_string(),
        s.direction.to_string(),
        s.levels.to_string(),
        trim_decimal(s.max_volume, 6),
        format!("{:.6}", s.worst_drawdown.abs()),
        s.pnl.map(|p| format!("{:.2}", p)).unwrap_or_default(),
    ]
}
