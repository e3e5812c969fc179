//! A sparse row x column table of numbers, written out as CSV with the row keys in the first column.
use fnv::FnvHashMap;
use std::io::Write;

use crate::error::Result;

/// Rows and columns keep the order in which they were first seen.
#[derive(Debug, Default)]
pub struct Pivot {
    rows: Vec<String>,
    cols: Vec<String>,
    row_index: FnvHashMap<String, usize>,
    col_index: FnvHashMap<String, usize>,
    cells: FnvHashMap<(usize, usize), f64>,
}

fn index_of(keys: &mut Vec<String>, index: &mut FnvHashMap<String, usize>, key: &str) -> usize {
    if let Some(&i) = index.get(key) {
        return i;
    }
    keys.push(key.to_owned());
    index.insert(key.to_owned(), keys.len() - 1);
    keys.len() - 1
}

impl Pivot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row even if it never receives a value.
    pub fn add_row(&mut self, row: &str) -> usize {
        index_of(&mut self.rows, &mut self.row_index, row)
    }

    /// Set a cell, replacing any earlier value.
    pub fn insert(&mut self, row: &str, col: &str, value: f64) {
        let r = self.add_row(row);
        let c = index_of(&mut self.cols, &mut self.col_index, col);
        self.cells.insert((r, c), value);
    }

    #[cfg(test)]
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let r = self.row_index.get(row)?;
        let c = self.col_index.get(col)?;
        self.cells.get(&(*r, *c)).copied()
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn cols(&self) -> &[String] {
        &self.cols
    }

    /// Write the table. Empty cells get `fill`.
    pub fn write<W: Write>(&self, wtr: &mut csv::Writer<W>, fill: &str) -> Result<()> {
        let mut header = vec![String::new()];
        header.extend(self.cols.iter().cloned());
        wtr.write_record(&header)?;
        for (r, row) in self.rows.iter().enumerate() {
            let mut record = vec![row.clone()];
            record.extend((0..self.cols.len()).map(|c| match self.cells.get(&(r, c)) {
                Some(v) => v.to_string(),
                None => fill.to_owned(),
            }));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pivot_order_and_fill() {
        let mut p = Pivot::new();
        p.insert("s2", "blaTEM", 0.5);
        p.add_row("s3");
        p.insert("s1", "tetA", 1.0);
        p.insert("s2", "tetA", 0.25);
        p.insert("s2", "tetA", 0.75);
        assert_eq!(p.rows(), ["s2", "s3", "s1"]);
        assert_eq!(p.cols(), ["blaTEM", "tetA"]);
        assert_eq!(p.get("s2", "tetA"), Some(0.75));
        assert_eq!(p.get("s3", "tetA"), None);

        let mut wtr = csv::Writer::from_writer(vec![]);
        p.write(&mut wtr, "0").unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        assert_eq!(text, ",blaTEM,tetA\ns2,0.5,0.75\ns3,0,0\ns1,0,1\n");
    }
}
