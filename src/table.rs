use csv::ReaderBuilder;
use ndarray::{Array1, Array2};
use std::ops::Range;
use std::path::Path;

use crate::error::{Result, TrainError};

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TrainError::Input(format!(
                    "row {} has {} fields, expected {}",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|err| TrainError::Input(format!("failed to open {}: {}", path.display(), err)))?;

        let columns = reader
            .headers()
            .map_err(|err| {
                TrainError::Input(format!("failed to read header of {}: {}", path.display(), err))
            })?
            .iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
        if columns.is_empty() || columns.iter().all(|name| name.is_empty()) {
            return Err(TrainError::Input(format!("{} has no header row", path.display())));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|err| TrainError::Input(format!("failed to parse {}: {}", path.display(), err)))?;
            rows.push(record.iter().map(|field| field.to_string()).collect());
        }

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| TrainError::Input(format!("missing column {:?}", name)))
    }

    pub fn concat(mut self, other: Table) -> Result<Self> {
        if self.columns != other.columns {
            return Err(TrainError::Input(format!(
                "cannot concatenate tables with different columns: {:?} vs {:?}",
                self.columns, other.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(self)
    }

    /// Coerces the selected non-label columns to `f64`. Indexes in `range`
    /// count columns after `label` has been dropped.
    pub fn features(&self, label: &str, range: Range<usize>) -> Result<Array2<f64>> {
        let label_index = self.column_index(label)?;
        let feature_columns = (0..self.columns.len())
            .filter(|index| *index != label_index)
            .collect::<Vec<_>>();
        if range.end > feature_columns.len() {
            return Err(TrainError::Input(format!(
                "expected at least {} feature columns, found {}",
                range.end,
                feature_columns.len()
            )));
        }
        let selected = &feature_columns[range];

        let mut matrix = Array2::<f64>::zeros((self.rows.len(), selected.len()));
        for (row_index, row) in self.rows.iter().enumerate() {
            for (target, column) in selected.iter().enumerate() {
                matrix[[row_index, target]] = parse_float(&row[*column]).ok_or_else(|| {
                    TrainError::Input(format!(
                        "column {:?} row {}: {:?} is not numeric",
                        self.columns[*column], row_index, row[*column]
                    ))
                })?;
            }
        }
        Ok(matrix)
    }

    pub fn labels(&self, label: &str) -> Result<Array1<u8>> {
        let label_index = self.column_index(label)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| {
                let raw = &row[label_index];
                match parse_float(raw) {
                    Some(value) if value == 0.0 => Ok(0),
                    Some(value) if value == 1.0 => Ok(1),
                    _ => Err(TrainError::Input(format!(
                        "label {:?} row {}: {:?} is not 0 or 1",
                        label, row_index, raw
                    ))),
                }
            })
            .collect::<Result<Vec<u8>>>()
            .map(Array1::from)
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    let value = raw.trim().trim_matches('"').parse::<f64>().ok()?;
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn reads_csv_with_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "V1,V2,Class").unwrap();
        writeln!(file, "1.5,2,0").unwrap();
        writeln!(file, "-3,4e1,1").unwrap();

        let table = Table::read_csv(file.path()).unwrap();
        assert_eq!(table.columns(), &["V1", "V2", "Class"]);
        assert_eq!(table.n_rows(), 2);

        let features = table.features("Class", 0..2).unwrap();
        assert_eq!(features[[0, 0]], 1.5);
        assert_eq!(features[[1, 1]], 40.0);
        assert_eq!(table.labels("Class").unwrap().to_vec(), vec![0, 1]);
    }

    #[test]
    fn ragged_rows_are_input_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "V1,V2,Class").unwrap();
        writeln!(file, "1,2").unwrap();

        assert!(matches!(Table::read_csv(file.path()), Err(TrainError::Input(_))));
    }

    #[test]
    fn missing_file_is_input_error() {
        let result = Table::read_csv(Path::new("/definitely/not/here.csv"));
        assert!(matches!(result, Err(TrainError::Input(_))));
    }

    #[test]
    fn features_skip_label_and_respect_range() {
        let table = table(&["Class", "a", "b", "c"], &[&["1", "10", "20", "30"]]);
        let features = table.features("Class", 1..3).unwrap();
        assert_eq!(features.shape(), &[1, 2]);
        assert_eq!(features[[0, 0]], 20.0);
        assert_eq!(features[[0, 1]], 30.0);
    }

    #[test]
    fn text_features_fail_coercion() {
        let table = table(&["a", "Class"], &[&["abc", "0"]]);
        assert!(matches!(table.features("Class", 0..1), Err(TrainError::Input(_))));
    }

    #[test]
    fn too_few_feature_columns_is_an_error() {
        let table = table(&["a", "Class"], &[&["1", "0"]]);
        assert!(table.features("Class", 0..30).is_err());
    }

    #[test]
    fn non_binary_label_is_rejected() {
        let bad = table(&["a", "Class"], &[&["1", "2"]]);
        assert!(bad.labels("Class").is_err());
        let float_label = table(&["a", "Class"], &[&["1", "1.0"]]);
        assert_eq!(float_label.labels("Class").unwrap().to_vec(), vec![1]);
    }

    #[test]
    fn concat_appends_rows_in_order() {
        let first = table(&["a", "Class"], &[&["1", "0"]]);
        let second = table(&["a", "Class"], &[&["2", "1"], &["3", "0"]]);
        let merged = first.concat(second).unwrap();
        assert_eq!(merged.n_rows(), 3);
        let features = merged.features("Class", 0..1).unwrap();
        assert_eq!(features.column(0).to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn concat_rejects_schema_mismatch() {
        let first = table(&["a", "Class"], &[&["1", "0"]]);
        let second = table(&["b", "Class"], &[&["2", "1"]]);
        assert!(first.concat(second).is_err());
    }
}
