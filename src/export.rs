//! Dated CSV output.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;

use crate::{Result, config::Config, util::file_component};

/// A record that can be written as one CSV row.
pub trait Tabular {
    const FIELDS: &'static [&'static str];

    fn row(&self) -> Vec<String>;
}

/// Destination for tabular data, one named file per call.
pub trait Sink {
    /// Writes `rows` under `fields` to `file`, replacing any previous content.
    fn write_rows(&mut self, file: &str, fields: &[&str], rows: &[Vec<String>]) -> Result<PathBuf>;
}

/// Writes CSV files into a single directory.
#[derive(Debug, Clone)]
pub struct CsvDir {
    dir: PathBuf,
}

impl CsvDir {
    /// Uses `dir`, creating it when absent.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The day's export directory; a second run on the same day reuses it.
    pub fn dated(config: &Config, today: NaiveDate) -> Result<Self> {
        let dir = config.dated_output_dir(today);
        tracing::info!(target: "export", "using output directory {}", dir.display());
        Self::new(dir)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Sink for CsvDir {
    fn write_rows(&mut self, file: &str, fields: &[&str], rows: &[Vec<String>]) -> Result<PathBuf> {
        let path = self.dir.join(file);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(fields)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        tracing::info!(target: "export", "\x1b[36mwritten {} rows to {}\x1b[0m", rows.len(), path.display());
        Ok(path)
    }
}

pub fn write_records<S, T>(sink: &mut S, file: &str, records: &[T]) -> Result<PathBuf>
where
    S: Sink + ?Sized,
    T: Tabular,
{
    let rows = records.iter().map(Tabular::row).collect::<Vec<_>>();
    sink.write_rows(file, T::FIELDS, &rows)
}

/// Writes `<prefix>_<group>.csv` per group, in first-seen order, then `<prefix>_<combined>.csv`.
pub fn write_grouped<S, T, F>(
    sink: &mut S,
    prefix: &str,
    combined: &str,
    records: &[T],
    group: F,
) -> Result<Vec<PathBuf>>
where
    S: Sink + ?Sized,
    T: Tabular,
    F: Fn(&T) -> &str,
{
    let mut groups = Vec::<(&str, Vec<Vec<String>>)>::new();
    for record in records {
        let key = group(record);
        let row = record.row();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    let mut written = Vec::with_capacity(groups.len() + 1);
    for (key, rows) in &groups {
        let file = format!("{prefix}_{}.csv", file_component(key));
        written.push(sink.write_rows(&file, T::FIELDS, rows)?);
    }
    written.push(write_records(sink, &format!("{prefix}_{combined}.csv"), records)?);
    Ok(written)
}

/// In-memory [`Sink`] for tests; [`MemorySink::rows`] returns the last write to a file.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub files: Vec<(String, Vec<String>, Vec<Vec<String>>)>,
}

impl MemorySink {
    #[must_use]
    pub fn rows(&self, file: &str) -> Option<&[Vec<String>]> {
        self.files
            .iter()
            .rev()
            .find(|(name, ..)| name == file)
            .map(|(_, _, rows)| rows.as_slice())
    }
}

impl Sink for MemorySink {
    fn write_rows(&mut self, file: &str, fields: &[&str], rows: &[Vec<String>]) -> Result<PathBuf> {
        self.files.push((
            file.to_owned(),
            fields.iter().map(|&f| f.to_owned()).collect(),
            rows.to_vec(),
        ));
        Ok(PathBuf::from(file))
    }
}
