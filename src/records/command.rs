use super::normalize::{normalize_flag, normalize_integer, NormalizedText};
use crate::dumps::DumpType;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Persisted entity kinds, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    ArtistAlias,
    ArtistNameVariation,
    ArtistUrl,
    ArtistMember,
    ArtistImage,
    Label,
    LabelUrl,
    SubLabel,
    LabelImage,
    Master,
    MasterArtist,
    MasterGenre,
    MasterStyle,
    MasterVideo,
    Release,
    ReleaseArtist,
    ReleaseExtraArtist,
    ReleaseLabel,
    ReleaseFormat,
    ReleaseGenre,
    ReleaseStyle,
    ReleaseTrack,
    ReleaseIdentifier,
    ReleaseVideo,
    ReleaseCompany,
}

impl EntityKind {
    pub const ALL: [EntityKind; 26] = [
        EntityKind::Artist,
        EntityKind::ArtistAlias,
        EntityKind::ArtistNameVariation,
        EntityKind::ArtistUrl,
        EntityKind::ArtistMember,
        EntityKind::ArtistImage,
        EntityKind::Label,
        EntityKind::LabelUrl,
        EntityKind::SubLabel,
        EntityKind::LabelImage,
        EntityKind::Master,
        EntityKind::MasterArtist,
        EntityKind::MasterGenre,
        EntityKind::MasterStyle,
        EntityKind::MasterVideo,
        EntityKind::Release,
        EntityKind::ReleaseArtist,
        EntityKind::ReleaseExtraArtist,
        EntityKind::ReleaseLabel,
        EntityKind::ReleaseFormat,
        EntityKind::ReleaseGenre,
        EntityKind::ReleaseStyle,
        EntityKind::ReleaseTrack,
        EntityKind::ReleaseIdentifier,
        EntityKind::ReleaseVideo,
        EntityKind::ReleaseCompany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::ArtistAlias => "artist_alias",
            EntityKind::ArtistNameVariation => "artist_name_variation",
            EntityKind::ArtistUrl => "artist_url",
            EntityKind::ArtistMember => "artist_member",
            EntityKind::ArtistImage => "artist_image",
            EntityKind::Label => "label",
            EntityKind::LabelUrl => "label_url",
            EntityKind::SubLabel => "sub_label",
            EntityKind::LabelImage => "label_image",
            EntityKind::Master => "master",
            EntityKind::MasterArtist => "master_artist",
            EntityKind::MasterGenre => "master_genre",
            EntityKind::MasterStyle => "master_style",
            EntityKind::MasterVideo => "master_video",
            EntityKind::Release => "release",
            EntityKind::ReleaseArtist => "release_artist",
            EntityKind::ReleaseExtraArtist => "release_extra_artist",
            EntityKind::ReleaseLabel => "release_label",
            EntityKind::ReleaseFormat => "release_format",
            EntityKind::ReleaseGenre => "release_genre",
            EntityKind::ReleaseStyle => "release_style",
            EntityKind::ReleaseTrack => "release_track",
            EntityKind::ReleaseIdentifier => "release_identifier",
            EntityKind::ReleaseVideo => "release_video",
            EntityKind::ReleaseCompany => "release_company",
        }
    }
}

impl EntityKind {
    /// Child kinds owned by this entity, with the child column holding the
    /// owner's id.
    pub fn child_kinds(&self) -> &'static [(EntityKind, &'static str)] {
        use EntityKind::*;
        match self {
            Artist => &[
                (ArtistAlias, "artist_id"),
                (ArtistNameVariation, "artist_id"),
                (ArtistUrl, "artist_id"),
                (ArtistMember, "group_id"),
                (ArtistImage, "artist_id"),
            ],
            Label => &[
                (LabelUrl, "label_id"),
                (SubLabel, "parent_id"),
                (LabelImage, "label_id"),
            ],
            Master => &[
                (MasterArtist, "master_id"),
                (MasterGenre, "master_id"),
                (MasterStyle, "master_id"),
                (MasterVideo, "master_id"),
            ],
            Release => &[
                (ReleaseArtist, "release_id"),
                (ReleaseExtraArtist, "release_id"),
                (ReleaseLabel, "release_id"),
                (ReleaseFormat, "release_id"),
                (ReleaseGenre, "release_id"),
                (ReleaseStyle, "release_id"),
                (ReleaseTrack, "release_id"),
                (ReleaseIdentifier, "release_id"),
                (ReleaseVideo, "release_id"),
                (ReleaseCompany, "release_id"),
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized attribute value. Blank text never reaches `Text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(NormalizedText),
    Integer(i64),
    Absent,
}

impl FieldValue {
    pub fn text(raw: Option<&str>) -> Self {
        NormalizedText::new(raw).map_or(FieldValue::Absent, FieldValue::Text)
    }

    pub fn integer(raw: Option<&str>) -> Self {
        normalize_integer(raw).map_or(FieldValue::Absent, FieldValue::Integer)
    }

    pub fn flag(raw: Option<&str>) -> Self {
        normalize_flag(raw).map_or(FieldValue::Absent, FieldValue::Integer)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(t) => write!(f, "{}", t),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Absent => f.write_str("<absent>"),
        }
    }
}

pub type Fields = Vec<(&'static str, FieldValue)>;

/// Natural key of the entity that owns a child command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerRef {
    pub entity: EntityKind,
    pub key: Fields,
    /// Column of the child holding the owner's id.
    pub column: &'static str,
}

/// The children of one kind an owner still has after conversion.
///
/// Rows of `entity` whose `owner_column` holds the owner's id and whose
/// remaining key value is not in `retained` are stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildScope {
    pub entity: EntityKind,
    pub owner_column: &'static str,
    pub retained: Vec<FieldValue>,
}

/// One idempotent upsert of an entity, addressed by its natural key.
///
/// Only constructed through [`CommandBuilder`], which guarantees every key
/// column holds a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    entity: EntityKind,
    key: Fields,
    fields: Fields,
    owner: Option<OwnerRef>,
    child_scopes: Vec<ChildScope>,
}

impl Command {
    pub fn builder(entity: EntityKind) -> CommandBuilder {
        CommandBuilder {
            entity,
            key: Vec::new(),
            fields: Vec::new(),
            owner: None,
        }
    }

    /// Starts a child of `owner`, copying the owner's key into `owner_column`.
    pub fn child_of(owner: &Command, entity: EntityKind, owner_column: &'static str) -> CommandBuilder {
        let owner_id = owner
            .key
            .first()
            .map(|(_, v)| v.clone())
            .unwrap_or(FieldValue::Absent);
        let mut builder = Command::builder(entity).key(owner_column, owner_id);
        builder.owner = Some(OwnerRef {
            entity: owner.entity,
            key: owner.key.clone(),
            column: owner_column,
        });
        builder
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn key(&self) -> &[(&'static str, FieldValue)] {
        &self.key
    }

    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    pub fn owner(&self) -> Option<&OwnerRef> {
        self.owner.as_ref()
    }

    pub fn child_scopes(&self) -> &[ChildScope] {
        &self.child_scopes
    }

    pub(crate) fn set_child_scopes(&mut self, scopes: Vec<ChildScope>) {
        self.child_scopes = scopes;
    }

    /// Whether this command is a child of `owner`.
    pub fn is_child_of(&self, owner: &Command) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|o| o.entity == owner.entity && o.key == owner.key)
    }

    pub fn key_value(&self, column: &str) -> Option<&FieldValue> {
        self.key.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    pub fn field(&self, column: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }
}

pub struct CommandBuilder {
    entity: EntityKind,
    key: Fields,
    fields: Fields,
    owner: Option<OwnerRef>,
}

impl CommandBuilder {
    pub fn key(mut self, column: &'static str, value: FieldValue) -> Self {
        self.key.push((column, value));
        self
    }

    pub fn field(mut self, column: &'static str, value: FieldValue) -> Self {
        self.fields.push((column, value));
        self
    }

    pub fn build(self) -> Result<Command, SkipReason> {
        if let Some((column, _)) = self.key.iter().find(|(_, v)| v.is_absent()) {
            return Err(SkipReason::MissingKey {
                entity: self.entity,
                column: *column,
            });
        }
        if self.key.is_empty() {
            return Err(SkipReason::MissingKey {
                entity: self.entity,
                column: "<none>",
            });
        }
        Ok(Command {
            entity: self.entity,
            key: self.key,
            fields: self.fields,
            owner: self.owner,
            child_scopes: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("missing or invalid natural key '{column}' for {entity}")]
    MissingKey {
        entity: EntityKind,
        column: &'static str,
    },

    #[error("unexpected element <{found}>, expected <{expected}>")]
    UnexpectedElement {
        expected: &'static str,
        found: String,
    },
}

/// A record that could not be converted. Counted and logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("skipped {dump_type} record{}: {reason}", .record_id.as_ref().map(|id| format!(" {}", id)).unwrap_or_default())]
pub struct RecordSkipped {
    pub dump_type: DumpType,
    pub record_id: Option<String>,
    pub reason: SkipReason,
}
