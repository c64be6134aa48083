//! CSV record source.

use anyhow::Context;
use futures::stream::{self, StreamExt};
use load_core::{FieldType, FieldValue, Fields, Record, RecordSource, RecordStream};
use redshift_load_stage::open_input;
use tracing::debug;

/// Reads records from a local or S3 CSV file.
///
/// Every call to [`RecordSource::produce_records`] re-reads the file, so a
/// retried staging attempt starts from the first row.
#[derive(Debug, Clone)]
pub struct CsvSource {
    uri: String,
    fields: Fields,
    delimiter: u8,
    has_headers: bool,
}

impl CsvSource {
    pub fn new(uri: impl Into<String>, fields: Fields) -> Self {
        Self {
            uri: uri.into(),
            fields,
            delimiter: b',',
            has_headers: true,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Convert one CSV row. Empty cells become NULL; cells under numeric
    /// and boolean fields are parsed, everything else stays text.
    fn convert_row(&self, row: &csv::StringRecord) -> anyhow::Result<Record> {
        let declared = self.fields.as_slice();
        let mut values = Vec::with_capacity(row.len());
        for (i, cell) in row.iter().enumerate() {
            let field_type = declared.get(i).and_then(|f| f.field_type.as_ref());
            values.push(convert_cell(cell, field_type).with_context(|| {
                let name = declared.get(i).map_or("?", |f| f.name.as_str());
                format!("Invalid value '{cell}' for field {name}")
            })?);
        }
        Ok(Record::new(values))
    }
}

fn convert_cell(cell: &str, field_type: Option<&FieldType>) -> anyhow::Result<FieldValue> {
    if cell.is_empty() {
        return Ok(FieldValue::Null);
    }
    let value = match field_type {
        Some(FieldType::SmallInt | FieldType::Integer | FieldType::BigInt) => {
            FieldValue::Int(cell.trim().parse()?)
        }
        Some(FieldType::Boolean) => match cell.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => FieldValue::Bool(true),
            "false" | "f" | "0" | "no" => FieldValue::Bool(false),
            other => anyhow::bail!("not a boolean: {other}"),
        },
        Some(FieldType::Real | FieldType::Double) => FieldValue::Float(cell.trim().parse()?),
        _ => FieldValue::text(cell),
    };
    Ok(value)
}

#[async_trait::async_trait]
impl RecordSource for CsvSource {
    fn fields(&self) -> Fields {
        self.fields.clone()
    }

    async fn produce_records(&self) -> anyhow::Result<RecordStream<'_>> {
        let reader = open_input(&self.uri).await?;
        let csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .flexible(true)
            .from_reader(reader);
        debug!("Reading records from {}", self.uri);

        let records = csv_reader.into_records().map(move |row| {
            let row = row.context("Failed to read CSV row")?;
            self.convert_row(&row)
        });
        Ok(stream::iter(records).boxed())
    }
}
