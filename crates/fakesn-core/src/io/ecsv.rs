//! Minimal Enhanced CSV (ECSV 1.0) tables.
//!
//! A table is a `# %ECSV 1.0` line, a YAML header (every line prefixed with
//! `# `) describing column names and datatypes plus free-form `meta`, and a
//! space-delimited body whose first line names the columns. Rows map to
//! serde structs implementing [`EcsvRecord`].

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FakeSnError, Result};

const ECSV_MAGIC: &str = "# %ECSV 1.0";
const YAML_START: &str = "# ---";

/// A row type with a fixed column layout.
pub trait EcsvRecord: Serialize + DeserializeOwned {
    /// `(name, datatype)` per column, in body order. Names must match the
    /// serialized field names.
    const COLUMNS: &'static [(&'static str, &'static str)];
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EcsvColumn {
    pub name: String,
    pub datatype: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EcsvHeader {
    pub datatype: Vec<EcsvColumn>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_yml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// Rows plus the table-level metadata they were stored with.
#[derive(Clone, Debug)]
pub struct EcsvTable<T> {
    pub rows: Vec<T>,
    pub meta: BTreeMap<String, serde_yml::Value>,
}

impl<T> Default for EcsvTable<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            meta: BTreeMap::new(),
        }
    }
}

pub fn write_table<T: EcsvRecord>(
    path: &Path,
    rows: &[T],
    meta: &BTreeMap<String, serde_yml::Value>,
) -> Result<()> {
    let header = EcsvHeader {
        datatype: T::COLUMNS
            .iter()
            .map(|(name, datatype)| EcsvColumn {
                name: name.to_string(),
                datatype: datatype.to_string(),
            })
            .collect(),
        meta: meta.clone(),
        schema: Some("astropy-2.0".into()),
    };

    let mut out = BufWriter::new(fs::File::create(path)?);
    writeln!(out, "{ECSV_MAGIC}")?;
    writeln!(out, "{YAML_START}")?;
    for line in serde_yml::to_string(&header)?.lines() {
        writeln!(out, "# {line}")?;
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .from_writer(out);
    writer.write_record(T::COLUMNS.iter().map(|(name, _)| *name))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = rows.len(), "wrote ECSV table");
    Ok(())
}

/// Read a table, checking that every declared column is present. Files
/// without the ECSV preamble are accepted as plain space-delimited tables.
pub fn read_table<T: EcsvRecord>(path: &Path) -> Result<EcsvTable<T>> {
    let text = fs::read_to_string(path)?;
    let header = parse_header(&text)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    for (required, _) in T::COLUMNS {
        if !names.iter().any(|n| n == required) {
            return Err(FakeSnError::MissingColumn(required.to_string()));
        }
    }

    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    debug!(path = %path.display(), rows = rows.len(), "read ECSV table");
    Ok(EcsvTable {
        rows,
        meta: header.map(|h| h.meta).unwrap_or_default(),
    })
}

/// YAML header of an ECSV document, `None` for plain tables.
fn parse_header(text: &str) -> Result<Option<EcsvHeader>> {
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim_end().starts_with(ECSV_MAGIC) => {}
        _ => return Ok(None),
    }
    let yaml: String = lines
        .take_while(|l| l.starts_with('#'))
        .filter(|l| l.trim_end() != YAML_START)
        .map(|l| {
            let l = l.strip_prefix('#').unwrap_or(l);
            let l = l.strip_prefix(' ').unwrap_or(l);
            format!("{l}\n")
        })
        .collect();
    if yaml.trim().is_empty() {
        return Err(FakeSnError::Catalog("ECSV file has an empty header".into()));
    }
    Ok(Some(serde_yml::from_str(&yaml)?))
}
