use super::dump_type::DumpType;
use super::models::{DumpMetadata, Period};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use flate2::read::GzDecoder;
use std::io::Read;

/// Where dumps are listed and downloaded from.
#[async_trait]
pub trait DumpSource: Send + Sync {
    /// Metadata of the newest published dump of `dump_type`.
    async fn fetch_metadata(&self, dump_type: DumpType) -> Result<DumpMetadata>;

    /// Metadata of every published `dump_type` dump the source can see,
    /// oldest first. Defaults to the newest one only.
    async fn list_dumps(&self, dump_type: DumpType) -> Result<Vec<DumpMetadata>> {
        Ok(vec![self.fetch_metadata(dump_type).await?])
    }

    /// Opens a decompressed byte stream for a locator returned by
    /// `fetch_metadata`. Blocking; call from a blocking worker.
    fn open_stream(&self, locator: &str) -> Result<Box<dyn Read + Send>>;
}

/// A parsed `discogs_YYYYMMDD_<type>s.xml[.gz]` file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpFileName {
    pub published_on: NaiveDate,
    pub dump_type: DumpType,
}

/// Parses a dump file name, ignoring any leading path or key prefix.
pub fn parse_dump_file_name(name: &str) -> Option<DumpFileName> {
    let file_name = name.rsplit('/').next()?;
    let stem = file_name
        .strip_suffix(".xml.gz")
        .or_else(|| file_name.strip_suffix(".xml"))?;
    let mut parts = stem.splitn(3, '_');
    if parts.next()? != "discogs" {
        return None;
    }
    let date = parts.next()?;
    if date.len() != 8 {
        return None;
    }
    let published_on = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    Period::new(published_on.year(), published_on.month()).ok()?;
    let dump_type = DumpType::from_file_stem(parts.next()?)?;
    Some(DumpFileName {
        published_on,
        dump_type,
    })
}

/// Wraps `reader` in a gzip decoder when the locator names a `.gz` file.
pub fn decompress_if_needed(locator: &str, reader: Box<dyn Read + Send>) -> Box<dyn Read + Send> {
    if locator.ends_with(".gz") {
        Box::new(GzDecoder::new(reader))
    } else {
        reader
    }
}
