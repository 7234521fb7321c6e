use super::dump_type::{import_order, DumpType};
use crate::error::ImportError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A publishing period (calendar month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub const MIN_YEAR: i32 = 1900;
    pub const MAX_YEAR: i32 = 9999;

    pub fn new(year: i32, month: u32) -> Result<Self, ImportError> {
        if !(1..=12).contains(&month) {
            return Err(ImportError::invalid_argument(format!(
                "Month must be within 1..=12, got {}",
                month
            )));
        }
        if !(Self::MIN_YEAR..=Self::MAX_YEAR).contains(&year) {
            return Err(ImportError::invalid_argument(format!(
                "Year must be within {}..={}, got {}",
                Self::MIN_YEAR,
                Self::MAX_YEAR,
                year
            )));
        }
        Ok(Period { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Period {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following period, exclusive upper bound for range queries.
    pub fn next_first_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Period::of(date) == *self
    }

    /// Parses the `YYYY-MM` form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, ImportError> {
        let invalid = || ImportError::invalid_argument(format!("Invalid period '{}'", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Period::new(year, month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// What a dump source reports about the newest dump of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpMetadata {
    pub dump_type: DumpType,
    pub fingerprint: String,
    pub published_on: NaiveDate,
    pub locator: String,
}

/// A dump known to the catalog. Identity is the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpRecord {
    pub dump_type: DumpType,
    pub fingerprint: String,
    pub published_on: NaiveDate,
    pub locator: String,
    pub discovered_at: DateTime<Utc>,
    pub imported_at: Option<DateTime<Utc>>,
}

impl DumpRecord {
    pub fn period(&self) -> Period {
        Period::of(self.published_on)
    }

    pub fn is_imported(&self) -> bool {
        self.imported_at.is_some()
    }
}

/// One record per type, all published in the same period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpSet {
    period: Period,
    records: BTreeMap<DumpType, DumpRecord>,
}

impl DumpSet {
    /// Builds the set importable for `target` from `records`.
    ///
    /// Records for types outside `dependencies(target)` are ignored. Fails with
    /// `DumpNotFound` when a required type is missing and `InvalidArgument`
    /// when records disagree on the period or repeat a type.
    pub fn complete_for(
        target: DumpType,
        period: Period,
        records: impl IntoIterator<Item = DumpRecord>,
    ) -> Result<Self, ImportError> {
        let mut set = DumpSet {
            period,
            records: BTreeMap::new(),
        };
        for record in records {
            if !target.depends_on(record.dump_type) {
                continue;
            }
            if !period.contains(record.published_on) {
                return Err(ImportError::invalid_argument(format!(
                    "{} dump {} was published on {}, outside {}",
                    record.dump_type, record.fingerprint, record.published_on, period
                )));
            }
            if let Some(previous) = set.records.get(&record.dump_type) {
                return Err(ImportError::invalid_argument(format!(
                    "Two {} dumps for {}: {} and {}",
                    record.dump_type, period, previous.fingerprint, record.fingerprint
                )));
            }
            set.records.insert(record.dump_type, record);
        }

        let missing = set.missing_for(target);
        if !missing.is_empty() {
            return Err(ImportError::DumpNotFound(format!(
                "{} is missing {:?} for {}",
                period, missing, target
            )));
        }
        Ok(set)
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn get(&self, dump_type: DumpType) -> Option<&DumpRecord> {
        self.records.get(&dump_type)
    }

    pub fn types(&self) -> Vec<DumpType> {
        self.records.keys().copied().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &DumpRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn missing_for(&self, target: DumpType) -> Vec<DumpType> {
        target
            .dependencies()
            .iter()
            .copied()
            .filter(|t| !self.records.contains_key(t))
            .collect()
    }

    pub fn is_complete_for(&self, target: DumpType) -> bool {
        self.missing_for(target).is_empty()
    }

    pub fn import_order(&self) -> Result<Vec<DumpType>, ImportError> {
        import_order(&self.types())
    }
}
