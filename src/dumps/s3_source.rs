//! Dump source backed by a public S3 bucket listing.

use super::dump_type::DumpType;
use super::models::DumpMetadata;
use super::source::{decompress_if_needed, parse_dump_file_name, DumpSource};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BUCKET_URL: &str = "https://discogs-data-dumps.s3.us-west-2.amazonaws.com";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BucketObject {
    key: String,
    etag: String,
}

#[derive(Debug, Default)]
struct ListPage {
    objects: Vec<BucketObject>,
    next_continuation_token: Option<String>,
}

pub struct S3DumpSource {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    connect_timeout: Duration,
}

impl S3DumpSource {
    pub fn new(base_url: &str, user_agent: &str, timeout_sec: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_sec);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            connect_timeout: timeout,
        })
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<BucketObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/?list-type=2&prefix={}",
                self.base_url,
                urlencoding::encode(prefix)
            );
            if let Some(token) = &continuation {
                url.push_str(&format!("&continuation-token={}", urlencoding::encode(token)));
            }
            debug!("Listing {}", url);

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("Failed to list bucket prefix {}", prefix))?;
            if !response.status().is_success() {
                bail!(
                    "Bucket listing for {} failed with status: {}",
                    prefix,
                    response.status()
                );
            }
            let body = response
                .text()
                .await
                .context("Failed to read bucket listing")?;

            let page = parse_list_bucket_result(&body)?;
            objects.extend(page.objects);
            match page.next_continuation_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(objects)
    }
}

#[async_trait]
impl DumpSource for S3DumpSource {
    async fn fetch_metadata(&self, dump_type: DumpType) -> Result<DumpMetadata> {
        self.list_dumps(dump_type)
            .await?
            .pop()
            .with_context(|| format!("No {} dump listed", dump_type))
    }

    async fn list_dumps(&self, dump_type: DumpType) -> Result<Vec<DumpMetadata>> {
        let current_year = Utc::now().year();
        // Early in January the newest dumps may still sit under last year's prefix.
        let mut listed = Vec::new();
        for year in [current_year - 1, current_year] {
            let objects = self.list_prefix(&format!("data/{}/", year)).await?;
            listed.extend(dumps_of_type(&self.base_url, objects, dump_type));
        }
        if listed.is_empty() {
            bail!(
                "No {} dump listed for {} or {}",
                dump_type,
                current_year - 1,
                current_year
            );
        }
        Ok(listed)
    }

    fn open_stream(&self, locator: &str) -> Result<Box<dyn Read + Send>> {
        // No overall timeout: a full release dump takes far longer than any sane request timeout.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(None)
            .user_agent(self.user_agent.as_str())
            .build()
            .context("Failed to create blocking HTTP client")?;
        let response = client
            .get(locator)
            .send()
            .with_context(|| format!("Failed to download {}", locator))?
            .error_for_status()
            .with_context(|| format!("Download of {} was rejected", locator))?;
        Ok(decompress_if_needed(locator, Box::new(response)))
    }
}

/// Every listed object that names a `dump_type` dump, oldest first.
fn dumps_of_type(base_url: &str, objects: Vec<BucketObject>, dump_type: DumpType) -> Vec<DumpMetadata> {
    let mut dumps: Vec<DumpMetadata> = objects
        .into_iter()
        .filter_map(|o| {
            let parsed = parse_dump_file_name(&o.key)?;
            (parsed.dump_type == dump_type).then(|| DumpMetadata {
                dump_type,
                fingerprint: o.etag,
                published_on: parsed.published_on,
                locator: format!("{}/{}", base_url, o.key),
            })
        })
        .collect();
    dumps.sort_by_key(|m| m.published_on);
    dumps
}

fn parse_list_bucket_result(xml: &str) -> Result<ListPage> {
    let mut reader = Reader::from_str(xml);
    let mut page = ListPage::default();
    let mut current: Option<BucketObject> = None;
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut truncated = false;
    let mut token: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "Contents" {
                    current = Some(BucketObject::default());
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Text(ref e)) => {
                text.push_str(&e.unescape().context("Invalid text in bucket listing")?);
            }
            Ok(Event::End(_)) => {
                let name = path.pop().unwrap_or_default();
                match (name.as_str(), current.as_mut()) {
                    ("Key", Some(object)) => object.key = text.trim().to_string(),
                    ("ETag", Some(object)) => object.etag = text.trim().trim_matches('"').to_string(),
                    ("Contents", Some(_)) => {
                        if let Some(object) = current.take() {
                            page.objects.push(object);
                        }
                    }
                    ("IsTruncated", None) => truncated = text.trim() == "true",
                    ("NextContinuationToken", None) => token = Some(text.trim().to_string()),
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("Bucket listing parse error: {e}"),
            _ => {}
        }
    }

    if truncated {
        page.next_continuation_token = token.filter(|t| !t.is_empty());
    }
    Ok(page)
}
