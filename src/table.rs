//! A small string-typed table over delimited files.
//!
//! Every stage of the pipeline exchanges flat files; this type holds one of
//! them in memory as headers plus rows of strings, with the handful of
//! relational operations the joins need. Values stay strings end to end —
//! numeric interpretation happens only where a stage aggregates.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::Path;

pub const TAB: u8 = b'\t';
pub const COMMA: u8 = b',';

#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Table {
            headers,
            rows: Vec::new(),
        }
    }

    /// Loads a delimited file. Ragged rows are padded (or truncated) to the
    /// header width so downstream column indexing stays in bounds.
    pub fn read(path: &Path, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut table = Table::new(headers);
        for record in reader.records() {
            let record = record.with_context(|| format!("reading {}", path.display()))?;
            table.push_row(record.iter().map(|v| v.to_string()).collect());
        }
        Ok(table)
    }

    pub fn write(&self, path: &Path, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("table has no column '{name}'"))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Rewrites every header through `f`.
    pub fn map_headers(&mut self, f: impl Fn(&str) -> String) {
        for h in &mut self.headers {
            *h = f(h);
        }
    }

    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        let idx = self.column_index(name)?;
        self.headers.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        Ok(())
    }

    /// Appends a column; `values` must match the current row count.
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            bail!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            );
        }
        self.headers.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Rewrites one column in place through `f`.
    pub fn map_column(&mut self, name: &str, f: impl Fn(&str) -> String) -> Result<()> {
        let idx = self.column_index(name)?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }

    /// Left-joins `right` on the given key columns.
    ///
    /// Every left row survives; where no right row matches, the joined
    /// columns are empty. The first matching right row wins — the context
    /// layers this pipeline joins are unique per key.
    pub fn left_join(&self, right: &Table, left_keys: &[&str], right_keys: &[&str]) -> Result<Table> {
        if left_keys.len() != right_keys.len() {
            bail!("left_join called with mismatched key lists");
        }
        let left_idx: Vec<usize> = left_keys
            .iter()
            .map(|k| self.column_index(k))
            .collect::<Result<_>>()?;
        let right_idx: Vec<usize> = right_keys
            .iter()
            .map(|k| right.column_index(k))
            .collect::<Result<_>>()?;

        // columns carried over from the right side (keys excluded)
        let carried: Vec<usize> = (0..right.headers.len())
            .filter(|i| !right_idx.contains(i))
            .collect();

        let mut lookup: HashMap<Vec<&str>, &Vec<String>> = HashMap::new();
        for row in &right.rows {
            let key: Vec<&str> = right_idx.iter().map(|&i| row[i].as_str()).collect();
            lookup.entry(key).or_insert(row);
        }

        let mut headers = self.headers.clone();
        headers.extend(carried.iter().map(|&i| right.headers[i].clone()));

        let mut joined = Table::new(headers);
        for row in &self.rows {
            let key: Vec<&str> = left_idx.iter().map(|&i| row[i].as_str()).collect();
            let mut out = row.clone();
            match lookup.get(&key) {
                Some(matched) => out.extend(carried.iter().map(|&i| matched[i].clone())),
                None => out.extend(carried.iter().map(|_| String::new())),
            }
            joined.push_row(out);
        }
        Ok(joined)
    }

    /// Projects onto `columns` in order, replacing empty cells with `fill`.
    /// Errors when a requested column does not exist.
    pub fn project(&self, columns: &[&str], fill: &str) -> Result<Table> {
        let indices: Vec<usize> = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<_>>()?;

        let mut out = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in &self.rows {
            out.push_row(
                indices
                    .iter()
                    .map(|&i| {
                        if row[i].is_empty() {
                            fill.to_string()
                        } else {
                            row[i].clone()
                        }
                    })
                    .collect(),
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(headers.iter().map(|h| h.to_string()).collect());
        for row in rows {
            t.push_row(row.iter().map(|v| v.to_string()).collect());
        }
        t
    }

    #[test]
    fn test_left_join_keeps_unmatched_left_rows() {
        let left = table(
            &["tract", "date", "n"],
            &[&["100", "01-01-2014", "1"], &["200", "01-01-2014", "0"]],
        );
        let right = table(&["tract", "pop"], &[&["100", "5000"]]);

        let joined = left.left_join(&right, &["tract"], &["tract"]).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.headers(), &["tract", "date", "n", "pop"]);
        assert_eq!(joined.rows()[0][3], "5000");
        assert_eq!(joined.rows()[1][3], "");
    }

    #[test]
    fn test_left_join_multi_key() {
        let left = table(
            &["tract", "month"],
            &[&["100", "01-2014"], &["100", "02-2014"]],
        );
        let right = table(
            &["tract", "month", "nbr"],
            &[&["100", "02-2014", "7"]],
        );
        let joined = left
            .left_join(&right, &["tract", "month"], &["tract", "month"])
            .unwrap();
        assert_eq!(joined.rows()[0][2], "");
        assert_eq!(joined.rows()[1][2], "7");
    }

    #[test]
    fn test_project_fills_empty_cells() {
        let t = table(&["a", "b", "c"], &[&["1", "", "x"]]);
        let p = t.project(&["b", "a"], "0").unwrap();
        assert_eq!(p.headers(), &["b", "a"]);
        assert_eq!(p.rows()[0], vec!["0".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_project_missing_column_errors() {
        let t = table(&["a"], &[&["1"]]);
        assert!(t.project(&["nope"], "0").is_err());
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let mut t = Table::new(vec!["a".into(), "b".into()]);
        t.push_row(vec!["1".into()]);
        assert_eq!(t.rows()[0], vec!["1".to_string(), String::new()]);
    }

    #[test]
    fn test_read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let t = table(&["a", "b"], &[&["1", "x,y"], &["2", ""]]);
        t.write(&path, TAB).unwrap();

        let back = Table::read(&path, TAB).unwrap();
        assert_eq!(back.headers(), t.headers());
        assert_eq!(back.rows(), t.rows());
    }

    #[test]
    fn test_map_column() {
        let mut t = table(&["a"], &[&["x"]]);
        t.map_column("a", |v| v.to_uppercase()).unwrap();
        assert_eq!(t.rows()[0][0], "X");
    }
}
