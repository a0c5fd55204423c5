//! Report serialization
//!
//! Layout: `{out_dir}/{document location}/{output id}.{parquet|csv}`. The document
//! location keeps its archive-relative path, so reports of `dir/a.sedml` land in
//! `{out_dir}/dir/a.sedml/`.

use super::Dataset;
use crate::config::ReportFormat;
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Writes datasets in the configured formats
#[derive(Debug, Clone)]
pub struct ReportWriter {
    out_dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl ReportWriter {
    /// Create a writer rooted at `out_dir`
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>, formats: Vec<ReportFormat>) -> Self {
        Self {
            out_dir: out_dir.into(),
            formats,
        }
    }

    /// Output root
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Directory holding the reports of one document
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` if the location escapes the output root
    pub fn document_dir(&self, location: &str) -> Result<PathBuf> {
        let relative = Path::new(location);
        let mut dir = self.out_dir.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => dir.push(part),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(Error::InvalidInput(format!(
                        "document location `{location}` must stay inside the archive"
                    )))
                }
            }
        }
        Ok(dir)
    }

    /// Write one dataset in every configured format, returning the written paths
    ///
    /// # Errors
    /// Returns I/O, Arrow or Parquet errors
    pub fn write(&self, location: &str, dataset: &Dataset) -> Result<Vec<PathBuf>> {
        let dir = self.document_dir(location)?;
        std::fs::create_dir_all(&dir)?;

        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let path = dir.join(format!("{}.{}", dataset.output_id(), format.extension()));
            match format {
                ReportFormat::Parquet => write_parquet(&path, dataset.batch())?,
                ReportFormat::Csv => write_csv(&path, dataset.batch())?,
            }
            debug!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = arrow::csv::WriterBuilder::new().with_header(true).build(file);
    writer
        .write(batch)
        .map_err(|e| Error::ReportWriter(format!("{}: {e}", path.display())))?;
    Ok(())
}
