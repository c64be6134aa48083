//! Encoding of records into staged part files.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use load_core::{Record, RecordStream, StageFormat};
use std::io::Write;
use tracing::debug;

/// Rows written to a part file before a new one is started.
pub const DEFAULT_PART_ROWS: usize = 100_000;

/// `part-00000.csv`, with `.gz` appended for compressed parts.
pub fn part_file_name(index: usize, gzip: bool) -> String {
    if gzip {
        format!("part-{index:05}.csv.gz")
    } else {
        format!("part-{index:05}.csv")
    }
}

/// Backslash-escape `text` for an unquoted field: the delimiter, line
/// breaks and the backslash itself.
pub fn escape_field(text: &str, delimiter: u8) -> String {
    let delimiter = delimiter as char;
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c == delimiter || c == '\\' || c == '\n' || c == '\r' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Buffers one part file in memory.
pub struct PartEncoder {
    writer: csv::Writer<Vec<u8>>,
    delimiter: u8,
    escape: bool,
    null_marker: String,
    gzip: bool,
    rows: u64,
}

impl PartEncoder {
    pub fn new(format: &StageFormat) -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder
            .delimiter(format.delimiter)
            .has_headers(false)
            .flexible(true);
        match format.quote {
            Some(quote) => {
                builder.quote(quote).quote_style(csv::QuoteStyle::Necessary);
            }
            None => {
                builder.quote_style(csv::QuoteStyle::Never);
            }
        }

        Self {
            writer: builder.from_writer(Vec::new()),
            delimiter: format.delimiter,
            escape: format.quote.is_none(),
            null_marker: format.null_marker.clone(),
            gzip: format.gzip,
            rows: 0,
        }
    }

    /// Append one record. NULL values are written as the null marker.
    pub fn push(&mut self, record: &Record) -> Result<()> {
        let fields: Vec<String> = record
            .values
            .iter()
            .map(|v| match v.to_delimited() {
                None => self.null_marker.clone(),
                Some(text) if self.escape => escape_field(&text, self.delimiter),
                Some(text) => text,
            })
            .collect();
        self.writer
            .write_record(&fields)
            .context("Failed to encode record")?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Finish the part and return its bytes, gzip-compressed if requested.
    pub fn finish(self) -> Result<Vec<u8>> {
        let data = self
            .writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush part file: {}", e.error()))?;

        if !self.gzip {
            return Ok(data);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&data)
            .context("Failed to compress part file")?;
        encoder.finish().context("Failed to compress part file")
    }
}

/// Destination for finished part files.
#[async_trait::async_trait]
pub(crate) trait PartWriter: Send + Sync {
    /// Store one part under `dir` and return its full location.
    async fn put_part(&self, dir: &str, name: &str, data: Vec<u8>) -> Result<String>;
}

/// Drain `records` into rolling part files of at most `part_rows` rows.
///
/// An empty stream still produces one empty part so the run directory
/// exists for `COPY`.
pub(crate) async fn write_parts<W: PartWriter + ?Sized>(
    writer: &W,
    dir: &str,
    format: &StageFormat,
    part_rows: usize,
    mut records: RecordStream<'_>,
) -> Result<(Vec<String>, u64)> {
    let part_rows = part_rows.max(1) as u64;
    let mut files = Vec::new();
    let mut rows = 0u64;
    let mut encoder = PartEncoder::new(format);

    while let Some(record) = records.next().await {
        let record = record.context("Record source failed while staging")?;
        encoder.push(&record)?;
        if encoder.rows() >= part_rows {
            let part = std::mem::replace(&mut encoder, PartEncoder::new(format));
            rows += part.rows();
            let name = part_file_name(files.len(), format.gzip);
            files.push(writer.put_part(dir, &name, part.finish()?).await?);
        }
    }

    if !encoder.is_empty() || files.is_empty() {
        rows += encoder.rows();
        let name = part_file_name(files.len(), format.gzip);
        files.push(writer.put_part(dir, &name, encoder.finish()?).await?);
    }

    debug!("Staged {} rows in {} part files under {}", rows, files.len(), dir);
    Ok((files, rows))
}
