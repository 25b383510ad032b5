use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, WriterBuilder};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

pub const YAML_NAME_COLUMN: &str = "transformation_yaml_name";
pub const CODE_COLUMN: &str = "transformation_code";
pub const NAME_COLUMN: &str = "transformation_name";
pub const SUBSECTOR_COLUMN: &str = "subsector";
pub const STRATEGY_PREFIX: &str = "strategy";
/// Worksheet holding the scaling table when the input is a workbook.
pub const DEFAULT_SHEET: &str = "yaml";

const ABSENT_MARKERS: [&str; 6] = ["nan", "na", "n/a", "null", "none", "#n/a"];

/// `{code}_{COLUMN}`: the code a transformation carries once scaled for a strategy column.
pub fn derived_transformation_code(code: &str, column: &str) -> String {
    format!("{}_{}", code, column.to_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Csv,
    Tsv,
    CsvGz,
    TsvGz,
    Workbook,
}

const WORKBOOK_EXTENSIONS: [&str; 5] = [".xlsx", ".xlsm", ".xlsb", ".xls", ".ods"];

impl TableFormat {
    fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        if WORKBOOK_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            TableFormat::Workbook
        } else if name.ends_with(".tsv.gz") {
            TableFormat::TsvGz
        } else if name.ends_with(".csv.gz") {
            TableFormat::CsvGz
        } else if name.ends_with(".tsv") || name.ends_with(".tab") {
            TableFormat::Tsv
        } else {
            TableFormat::Csv
        }
    }

    fn delimiter(self) -> u8 {
        match self {
            TableFormat::Csv | TableFormat::CsvGz | TableFormat::Workbook => b',',
            TableFormat::Tsv | TableFormat::TsvGz => b'\t',
        }
    }

    fn compressed(self) -> bool {
        matches!(self, TableFormat::CsvGz | TableFormat::TsvGz)
    }
}

/// Headers plus string records, exactly as they appear on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawTable {
    pub fn read(path: &Path) -> Result<Self> {
        Self::read_sheet(path, DEFAULT_SHEET)
    }

    /// Reads a delimited file, or the named worksheet when `path` is a workbook.
    /// `sheet` is ignored for delimited files.
    pub fn read_sheet(path: &Path, sheet: &str) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::MissingFile(path.to_path_buf()));
        }
        let format = TableFormat::from_path(path);
        if format == TableFormat::Workbook {
            return Self::from_workbook(path, sheet);
        }
        let file = File::open(path)?;
        if format.compressed() {
            Self::from_reader(MultiGzDecoder::new(file), format.delimiter())
        } else {
            Self::from_reader(file, format.delimiter())
        }
    }

    fn from_workbook(path: &Path, sheet: &str) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)?;
        if !workbook.sheet_names().iter().any(|name| name == sheet) {
            return Err(SyncError::MissingSheet {
                path: path.to_path_buf(),
                sheet: sheet.to_string(),
            });
        }
        let range = workbook.worksheet_range(sheet)?;
        let mut rows = range.rows();
        let headers = rows
            .next()
            .map(|row| row.iter().map(|cell| cell_text(cell).trim().to_string()).collect())
            .unwrap_or_default();
        let records = rows
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        debug!(path = %path.display(), sheet, "read worksheet");
        Ok(Self { headers, records })
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(reader);
        let headers = reader
            .headers()?
            .iter()
            .map(|cell| cell.trim_start_matches('\u{feff}').trim().to_string())
            .collect::<Vec<_>>();
        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record?.iter().map(|cell| cell.to_string()).collect());
        }
        Ok(Self { headers, records })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let format = TableFormat::from_path(path);
        if format == TableFormat::Workbook {
            return Err(SyncError::UnsupportedOutput(path.to_path_buf()));
        }
        let file = File::create(path)?;
        if format.compressed() {
            let mut encoder = GzEncoder::new(file, Compression::default());
            self.write_to(&mut encoder, format.delimiter())?;
            encoder.finish()?;
        } else {
            self.write_to(file, format.delimiter())?;
        }
        Ok(())
    }

    fn write_to<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        writer.write_record(&self.headers)?;
        for record in &self.records {
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.records
            .get(row)
            .and_then(|record| record.get(column))
            .map(String::as_str)
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Columns present on one side only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDiff {
    pub only_in_left: Vec<String>,
    pub only_in_right: Vec<String>,
}

impl ColumnDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_left.is_empty() && self.only_in_right.is_empty()
    }
}

pub fn compare_columns(left: &RawTable, right: &RawTable) -> ColumnDiff {
    let only = |a: &RawTable, b: &RawTable| {
        a.headers
            .iter()
            .filter(|header| !b.headers.contains(header))
            .cloned()
            .collect::<Vec<_>>()
    };
    ColumnDiff {
        only_in_left: only(left, right),
        only_in_right: only(right, left),
    }
}

/// Appends to `target` every column of `source` it lacks. Rows are matched by
/// position; target rows past the end of `source` get empty cells.
pub fn add_missing_columns(source: &RawTable, mut target: RawTable) -> RawTable {
    let missing = source
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| !target.headers.contains(header))
        .map(|(idx, header)| (idx, header.clone()))
        .collect::<Vec<_>>();
    for (source_idx, header) in missing {
        debug!(column = %header, "adding missing column");
        target.headers.push(header);
        for (row_idx, record) in target.records.iter_mut().enumerate() {
            let value = source.cell(row_idx, source_idx).unwrap_or_default();
            record.push(value.to_string());
        }
    }
    target
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarCell {
    Absent,
    Value(f64),
    Invalid(String),
}

impl ScalarCell {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || ABSENT_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
            return ScalarCell::Absent;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => ScalarCell::Value(value),
            _ => ScalarCell::Invalid(trimmed.to_string()),
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, ScalarCell::Absent)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalingRow {
    pub yaml_name: String,
    pub code: String,
    pub name: String,
    pub subsector: String,
    /// One cell per strategy column, in [`ScalingTable::strategy_columns`] order.
    pub scalars: Vec<ScalarCell>,
}

#[derive(Debug, Clone, Default)]
pub struct ScalingTable {
    source: Option<PathBuf>,
    strategy_columns: Vec<String>,
    rows: Vec<ScalingRow>,
}

impl ScalingTable {
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_sheet(path, DEFAULT_SHEET)
    }

    pub fn load_sheet(path: &Path, sheet: &str) -> Result<Self> {
        let raw = RawTable::read_sheet(path, sheet)?;
        let mut table = Self::from_raw(&raw, path)?;
        table.source = Some(path.to_path_buf());
        debug!(
            path = %path.display(),
            rows = table.rows.len(),
            strategies = table.strategy_columns.len(),
            "loaded scaling table"
        );
        Ok(table)
    }

    /// Like [`ScalingTable::load_sheet`], but a failure is logged and yields an empty table.
    pub fn load_or_empty(path: &Path, sheet: &str) -> Self {
        match Self::load_sheet(path, sheet) {
            Ok(table) => table,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to load scaling table");
                Self::default()
            }
        }
    }

    pub fn from_raw(raw: &RawTable, path: &Path) -> Result<Self> {
        let required = |column: &str| {
            raw.column_index(column)
                .ok_or_else(|| SyncError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })
        };
        let yaml_idx = required(YAML_NAME_COLUMN)?;
        let code_idx = required(CODE_COLUMN)?;
        let name_idx = required(NAME_COLUMN)?;
        let subsector_idx = required(SUBSECTOR_COLUMN)?;
        let strategy_idx = raw
            .headers
            .iter()
            .enumerate()
            .filter(|(_, header)| header.starts_with(STRATEGY_PREFIX))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        let mut rows = Vec::with_capacity(raw.records.len());
        for row in 0..raw.records.len() {
            let text = |idx: usize| raw.cell(row, idx).unwrap_or_default().trim().to_string();
            rows.push(ScalingRow {
                yaml_name: text(yaml_idx),
                code: text(code_idx),
                name: text(name_idx),
                subsector: text(subsector_idx),
                scalars: strategy_idx
                    .iter()
                    .map(|&idx| ScalarCell::parse(raw.cell(row, idx).unwrap_or_default()))
                    .collect(),
            });
        }
        Ok(Self {
            source: None,
            strategy_columns: strategy_idx
                .iter()
                .map(|&idx| raw.headers[idx].clone())
                .collect(),
            rows,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn strategy_columns(&self) -> &[String] {
        &self.strategy_columns
    }

    pub fn rows(&self) -> &[ScalingRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// For each strategy column, the derived codes of the rows it uses.
    pub fn transformations_per_strategy(&self) -> IndexMap<String, Vec<String>> {
        self.strategy_columns
            .iter()
            .enumerate()
            .map(|(col_idx, column)| {
                let codes = self
                    .rows
                    .iter()
                    .filter(|row| row.scalars[col_idx].is_present())
                    .map(|row| derived_transformation_code(&row.code, column))
                    .collect();
                (column.clone(), codes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::{tempdir, Builder};

    const SAMPLE: &str = "transformation_yaml_name,transformation_code,transformation_name,subsector,strategy_a,strategy_b,notes\n\
t1.yaml,T1,Test,S,2.0,,x\n\
t2.yaml,T2,Other,S,NaN,0.5,y\n";

    fn sample_table() -> ScalingTable {
        let raw = RawTable::from_reader(SAMPLE.as_bytes(), b',').unwrap();
        ScalingTable::from_raw(&raw, Path::new("sample.csv")).unwrap()
    }

    #[test]
    fn scalar_cells_distinguish_absent_and_invalid() {
        assert_eq!(ScalarCell::parse(""), ScalarCell::Absent);
        assert_eq!(ScalarCell::parse(" NaN "), ScalarCell::Absent);
        assert_eq!(ScalarCell::parse("0"), ScalarCell::Value(0.0));
        assert_eq!(ScalarCell::parse("1.5"), ScalarCell::Value(1.5));
        assert_eq!(
            ScalarCell::parse("lots"),
            ScalarCell::Invalid("lots".to_string())
        );
        assert!(matches!(ScalarCell::parse("inf"), ScalarCell::Invalid(_)));
    }

    #[test]
    fn strategy_columns_keep_header_order() {
        let table = sample_table();
        assert_eq!(table.strategy_columns(), ["strategy_a", "strategy_b"]);
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0].scalars[0], ScalarCell::Value(2.0));
        assert_eq!(table.rows()[0].scalars[1], ScalarCell::Absent);
    }

    #[test]
    fn transformations_per_strategy_skips_absent_scalars() {
        let per_strategy = sample_table().transformations_per_strategy();
        assert_eq!(per_strategy["strategy_a"], vec!["T1_STRATEGY_A"]);
        assert_eq!(per_strategy["strategy_b"], vec!["T2_STRATEGY_B"]);
    }

    #[test]
    fn missing_required_column_is_reported() {
        let raw = RawTable::from_reader("transformation_code,strategy_a\nT1,1\n".as_bytes(), b',')
            .unwrap();
        let err = ScalingTable::from_raw(&raw, Path::new("bad.csv")).unwrap_err();
        assert!(matches!(err, SyncError::MissingColumn { ref column, .. } if column == YAML_NAME_COLUMN));
    }

    #[test]
    fn load_or_empty_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let table = ScalingTable::load_or_empty(&dir.path().join("absent.csv"), DEFAULT_SHEET);
        assert!(table.is_empty());
        assert!(table.strategy_columns().is_empty());
    }

    #[test]
    fn ragged_rows_fail_load_and_empty_load_or_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragged.csv");
        fs::write(
            &path,
            "transformation_yaml_name,transformation_code,transformation_name,subsector,strategy_a\n\
             t1.yaml,T1,Test,S,2.0\n\
             t2.yaml,T2,Other\n",
        )
        .unwrap();
        assert!(matches!(ScalingTable::load(&path), Err(SyncError::Csv(_))));
        let table = ScalingTable::load_or_empty(&path, DEFAULT_SHEET);
        assert!(table.is_empty());
        assert_eq!(table.source(), None);
    }

    fn write_workbook(path: &Path, sheet: &str) {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(sheet).unwrap();
            let headers = [
                YAML_NAME_COLUMN,
                CODE_COLUMN,
                NAME_COLUMN,
                SUBSECTOR_COLUMN,
                "strategy_a",
                "strategy_b",
            ];
            for (col, header) in headers.iter().enumerate() {
                worksheet.write_string(0, col as u16, *header).unwrap();
            }
            for (col, text) in ["t1.yaml", "T1", "Test", "S"].iter().enumerate() {
                worksheet.write_string(1, col as u16, *text).unwrap();
            }
            worksheet.write_number(1, 4, 2.0).unwrap();
            worksheet.write_string(1, 5, "NaN").unwrap();
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn workbook_tables_read_the_named_sheet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scalars.xlsx");
        write_workbook(&path, DEFAULT_SHEET);

        let table = ScalingTable::load(&path).unwrap();
        assert_eq!(table.strategy_columns(), ["strategy_a", "strategy_b"]);
        assert_eq!(table.rows()[0].yaml_name, "t1.yaml");
        assert_eq!(
            table.rows()[0].scalars,
            vec![ScalarCell::Value(2.0), ScalarCell::Absent]
        );
        assert!(matches!(
            ScalingTable::load_sheet(&path, "other"),
            Err(SyncError::MissingSheet { ref sheet, .. }) if sheet == "other"
        ));
    }

    #[test]
    fn workbooks_are_not_written() {
        let dir = tempdir().unwrap();
        let raw = RawTable::from_reader(SAMPLE.as_bytes(), b',').unwrap();
        assert!(matches!(
            raw.write(&dir.path().join("out.xlsx")),
            Err(SyncError::UnsupportedOutput(_))
        ));
    }

    #[test]
    fn tsv_tables_are_detected_by_extension() {
        let mut file = Builder::new().suffix(".tsv").tempfile().unwrap();
        write!(
            file,
            "transformation_yaml_name\ttransformation_code\ttransformation_name\tsubsector\tstrategy_x\nt.yaml\tT\tName\tS\t3\n"
        )
        .unwrap();
        let table = ScalingTable::load(file.path()).unwrap();
        assert_eq!(table.rows()[0].scalars, vec![ScalarCell::Value(3.0)]);
        assert_eq!(table.source(), Some(file.path()));
    }

    #[test]
    fn gzip_tables_round_trip_through_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv.gz");
        let raw = RawTable::from_reader(SAMPLE.as_bytes(), b',').unwrap();
        raw.write(&path).unwrap();
        assert_eq!(RawTable::read(&path).unwrap(), raw);
    }

    #[test]
    fn compare_columns_reports_both_sides() {
        let left = RawTable {
            headers: vec!["a".into(), "b".into(), "c".into()],
            records: vec![],
        };
        let right = RawTable {
            headers: vec!["b".into(), "d".into()],
            records: vec![],
        };
        let diff = compare_columns(&left, &right);
        assert_eq!(diff.only_in_left, vec!["a", "c"]);
        assert_eq!(diff.only_in_right, vec!["d"]);
        assert!(compare_columns(&left, &left).is_empty());
    }

    #[test]
    fn add_missing_columns_copies_by_position() {
        let source = RawTable {
            headers: vec!["id".into(), "extra".into()],
            records: vec![vec!["1".into(), "x".into()]],
        };
        let target = RawTable {
            headers: vec!["id".into()],
            records: vec![vec!["1".into()], vec!["2".into()]],
        };
        let merged = add_missing_columns(&source, target);
        assert_eq!(merged.headers, vec!["id", "extra"]);
        assert_eq!(merged.records[0], vec!["1", "x"]);
        assert_eq!(merged.records[1], vec!["2", ""]);
    }
}
