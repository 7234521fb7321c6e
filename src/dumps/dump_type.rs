use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The kinds of dump published each period.
///
/// Variant order is the tie-break order used by [`import_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DumpType {
    Artist,
    Label,
    Master,
    Release,
}

impl DumpType {
    pub const ALL: [DumpType; 4] = [
        DumpType::Artist,
        DumpType::Label,
        DumpType::Master,
        DumpType::Release,
    ];

    /// Types that must be imported before (or together with) this one.
    /// Always contains `self`.
    pub fn dependencies(&self) -> &'static [DumpType] {
        match self {
            DumpType::Artist => &[DumpType::Artist],
            DumpType::Label => &[DumpType::Label],
            DumpType::Master => &[DumpType::Artist, DumpType::Label, DumpType::Master],
            DumpType::Release => &[
                DumpType::Artist,
                DumpType::Label,
                DumpType::Master,
                DumpType::Release,
            ],
        }
    }

    pub fn depends_on(&self, other: DumpType) -> bool {
        self.dependencies().contains(&other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DumpType::Artist => "ARTIST",
            DumpType::Label => "LABEL",
            DumpType::Master => "MASTER",
            DumpType::Release => "RELEASE",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(name: &str) -> Result<Self, ImportError> {
        let trimmed = name.trim();
        DumpType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ImportError::invalid_argument(format!("Unknown dump type '{}'", name)))
    }

    /// Plural form used in dump file names, e.g. `artists`.
    pub fn file_stem(&self) -> &'static str {
        match self {
            DumpType::Artist => "artists",
            DumpType::Label => "labels",
            DumpType::Master => "masters",
            DumpType::Release => "releases",
        }
    }

    pub fn from_file_stem(stem: &str) -> Option<Self> {
        DumpType::ALL.into_iter().find(|t| t.file_stem() == stem)
    }

    /// Name of the record-level XML element inside this type's dump.
    pub fn record_element(&self) -> &'static str {
        match self {
            DumpType::Artist => "artist",
            DumpType::Label => "label",
            DumpType::Master => "master",
            DumpType::Release => "release",
        }
    }
}

impl fmt::Display for DumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DumpType {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DumpType::parse(s)
    }
}

/// Orders `types` so every type comes after its dependencies.
///
/// Kahn's algorithm over the dependency sets with self-edges removed; among
/// ready types the lowest variant goes first, so the result is deterministic.
pub fn import_order(types: &[DumpType]) -> Result<Vec<DumpType>, ImportError> {
    let requested: BTreeSet<DumpType> = types.iter().copied().collect();

    for t in &requested {
        if let Some(missing) = t
            .dependencies()
            .iter()
            .find(|d| !requested.contains(*d))
        {
            return Err(ImportError::invalid_argument(format!(
                "{} requires {}, which is not part of the requested set",
                t, missing
            )));
        }
    }

    let mut remaining = requested;
    let mut ordered = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .copied()
            .find(|t| {
                t.dependencies()
                    .iter()
                    .all(|d| d == t || !remaining.contains(d))
            })
            .ok_or_else(|| {
                ImportError::invalid_argument(format!(
                    "Dependency cycle among {:?}",
                    remaining
                ))
            })?;
        remaining.remove(&next);
        ordered.push(next);
    }
    Ok(ordered)
}
