// src/sink.rs
//! Record sinks. The harvester only sends records down a channel; a writer
//! task drains it into a [`RecordSink`].

use std::fs::File;
use std::path::Path;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::record::ProductRecord;

pub const CSV_HEADER: [&str; 16] = [
    "ID",
    "URL",
    "Title",
    "Description",
    "Price",
    "Product Options",
    "Rating",
    "Number of Votes",
    "Count of Images",
    "Image URLs",
    "Overview",
    "Favorited By",
    "Store Name",
    "Store Location",
    "Return Location",
    "Reviews",
];

pub trait RecordSink {
    fn write(&mut self, record: &ProductRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one CSV row per product. List fields are joined with `; ` and the
/// reviews go in a single JSON column.
pub struct CsvSink<W: std::io::Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Self::new(csv::Writer::from_path(path)?)
    }
}

impl<W: std::io::Write> CsvSink<W> {
    pub fn new(mut writer: csv::Writer<W>) -> Result<Self> {
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer })
    }
}

impl<W: std::io::Write> RecordSink for CsvSink<W> {
    fn write(&mut self, record: &ProductRecord) -> Result<()> {
        self.writer.write_record(&to_csv_record(record)?)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

pub fn to_csv_record(record: &ProductRecord) -> Result<Vec<String>> {
    Ok(vec![
        record.id.clone(),
        record.url.clone(),
        opt(&record.title),
        opt(&record.description),
        record.price.map(|p| format!("{p:.2}")).unwrap_or_default(),
        record.options.join("; "),
        opt(&record.rating),
        opt(&record.review_count),
        opt(&record.image_count),
        record.image_urls.join("; "),
        opt(&record.overview),
        opt(&record.favorited_by),
        opt(&record.store_name),
        opt(&record.store_location),
        opt(&record.return_location),
        serde_json::to_string(&record.reviews)?,
    ])
}

/// Drains `rx` into `sink` until every sender is gone, then finishes it.
/// Returns how many records were written.
pub async fn drain<S: RecordSink>(mut rx: mpsc::Receiver<ProductRecord>, mut sink: S) -> Result<usize> {
    let mut written = 0;
    while let Some(record) = rx.recv().await {
        sink.write(&record)?;
        written += 1;
        debug!(listing = %record.id, written, "record written");
    }
    sink.finish()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Accumulator, FieldValue, RawReview};

    fn sample() -> ProductRecord {
        let mut acc = Accumulator::create("555");
        acc.set_field(FieldValue::Url("https://www.etsy.com/listing/555".into()));
        acc.set_field(FieldValue::Title("Mug".into()));
        acc.set_field(FieldValue::Price(28.0));
        acc.set_field(FieldValue::Options(vec!["Colour: Sand, Slate".into(), "Size: S".into()]));
        acc.append_reviews(vec![RawReview {
            profile: Some("https://www.etsy.com/people/ann".into()),
            rating: Some(5.0),
            content: Some("Lovely".into()),
            ..Default::default()
        }]);
        acc.finalize()
    }

    #[test]
    fn test_row_layout() {
        let row = to_csv_record(&sample()).unwrap();
        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(row[4], "28.00");
        assert_eq!(row[5], "Colour: Sand, Slate; Size: S");
        assert_eq!(row[6], "");
        assert!(row[15].contains("\"seq\":1"));
    }

    #[tokio::test]
    async fn test_drain_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("products.csv");
        let (tx, rx) = mpsc::channel(4);
        tx.send(sample()).await.unwrap();
        tx.send(sample()).await.unwrap();
        drop(tx);

        let written = drain(rx, CsvSink::create(&path).unwrap()).await.unwrap();
        assert_eq!(written, 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), CSV_HEADER.len());
        assert_eq!(reader.records().count(), 2);
    }
}
