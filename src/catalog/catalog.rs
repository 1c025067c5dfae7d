//! System Catalog for RecStore
//!
//! The catalog is a JSON Lines file with one table definition per line. Rows
//! are appended when a table is created and the file is rewritten without the
//! row when a table is dropped. Row order is table discovery order.

use super::schema::TableDef;
use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::debug;

/// Persistent catalog of table definitions
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    /// Create a catalog bound to a file (the file is created lazily)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every row in order. A missing file is an empty catalog.
    pub fn load(&self) -> Result<Vec<TableDef>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: TableDef = serde_json::from_str(&line).map_err(|e| {
                Error::ParseError(format!(
                    "catalog '{}' line {}: {}",
                    self.path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            rows.push(row);
        }

        debug!(path = %self.path.display(), rows = rows.len(), "loaded catalog");
        Ok(rows)
    }

    /// Append a row
    pub fn append(&self, def: &TableDef) -> Result<()> {
        let mut line = serde_json::to_string(def)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Rewrite the catalog without the rows for `name`
    pub fn remove(&self, name: &str) -> Result<()> {
        let rows: Vec<TableDef> = self
            .load()?
            .into_iter()
            .filter(|row| row.name != name)
            .collect();
        self.rewrite(&rows)
    }

    fn rewrite(&self, rows: &[TableDef]) -> Result<()> {
        let mut contents = String::new();
        for row in rows {
            contents.push_str(&serde_json::to_string(row)?);
            contents.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Field, FieldType};
    use tempfile::tempdir;

    fn def(name: &str) -> TableDef {
        TableDef::new(
            name,
            vec![Field::new("id", FieldType::Integer), Field::any("name")],
            "id",
        )
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new(dir.path().join("catalog.jsonl"));
        assert!(catalog.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load_in_order() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new(dir.path().join("catalog.jsonl"));

        catalog.append(&def("users")).unwrap();
        catalog.append(&def("orders")).unwrap();

        let rows = catalog.load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], def("users"));
        assert_eq!(rows[1].name, "orders");
    }

    #[test]
    fn test_remove_rewrites_without_row() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new(dir.path().join("catalog.jsonl"));

        catalog.append(&def("a")).unwrap();
        catalog.append(&def("b")).unwrap();
        catalog.append(&def("c")).unwrap();

        catalog.remove("b").unwrap();

        let names: Vec<String> = catalog.load().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(!dir.path().join("catalog.tmp").exists());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.jsonl");
        let row = serde_json::to_string(&def("t")).unwrap();
        fs::write(&path, format!("\n{}\n\n", row)).unwrap();

        let rows = Catalog::new(&path).load().unwrap();
        assert_eq!(rows, vec![def("t")]);
    }

    #[test]
    fn test_malformed_row_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.jsonl");
        fs::write(&path, "{not json}\n").unwrap();

        let result = Catalog::new(&path).load();
        assert!(matches!(result, Err(Error::ParseError(_))));
    }
}
