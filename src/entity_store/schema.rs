//! Database schema for discogs.db.
//!
//! One table per [`EntityKind`]. The first unique constraint of every table is
//! the entity's natural key and is what upserts conflict on. There are no
//! foreign keys: dumps routinely reference entities that are not in any dump.

use crate::records::EntityKind;
use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

macro_rules! audited_columns {
    ($($column:expr),* $(,)?) => {
        &[
            $($column,)*
            sqlite_column!(
                "created_at",
                &SqlType::Integer,
                non_null = true,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
            sqlite_column!(
                "updated_at",
                &SqlType::Integer,
                non_null = true,
                default_value = Some(DEFAULT_TIMESTAMP)
            ),
        ]
    };
}

// =============================================================================
// Artists
// =============================================================================

const ARTIST_TABLE: Table = Table {
    name: "artist",
    columns: audited_columns![
        sqlite_column!("id", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("real_name", &SqlType::Text),
        sqlite_column!("profile", &SqlType::Text),
        sqlite_column!("data_quality", &SqlType::Text),
    ],
    indices: &[("idx_artist_name", "name")],
    unique_constraints: &[&["id"]],
};

const ARTIST_ALIAS_TABLE: Table = Table {
    name: "artist_alias",
    columns: audited_columns![
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("alias_id", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["artist_id", "alias_id"]],
};

const ARTIST_NAME_VARIATION_TABLE: Table = Table {
    name: "artist_name_variation",
    columns: audited_columns![
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["artist_id", "name"]],
};

const ARTIST_URL_TABLE: Table = Table {
    name: "artist_url",
    columns: audited_columns![
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["artist_id", "url"]],
};

const ARTIST_MEMBER_TABLE: Table = Table {
    name: "artist_member",
    columns: audited_columns![
        sqlite_column!("group_id", &SqlType::Integer, non_null = true),
        sqlite_column!("member_id", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text),
    ],
    indices: &[("idx_artist_member_member", "member_id")],
    unique_constraints: &[&["group_id", "member_id"]],
};

const ARTIST_IMAGE_TABLE: Table = Table {
    name: "artist_image",
    columns: audited_columns![
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("type", &SqlType::Text),
        sqlite_column!("width", &SqlType::Integer),
        sqlite_column!("height", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["artist_id", "uri"]],
};

// =============================================================================
// Labels
// =============================================================================

const LABEL_TABLE: Table = Table {
    name: "label",
    columns: audited_columns![
        sqlite_column!("id", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("contact_info", &SqlType::Text),
        sqlite_column!("profile", &SqlType::Text),
        sqlite_column!("data_quality", &SqlType::Text),
        sqlite_column!("parent_label_id", &SqlType::Integer),
        sqlite_column!("parent_label_name", &SqlType::Text),
    ],
    indices: &[("idx_label_name", "name")],
    unique_constraints: &[&["id"]],
};

const LABEL_URL_TABLE: Table = Table {
    name: "label_url",
    columns: audited_columns![
        sqlite_column!("label_id", &SqlType::Integer, non_null = true),
        sqlite_column!("url", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["label_id", "url"]],
};

const SUB_LABEL_TABLE: Table = Table {
    name: "sub_label",
    columns: audited_columns![
        sqlite_column!("parent_id", &SqlType::Integer, non_null = true),
        sqlite_column!("label_id", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["parent_id", "label_id"]],
};

const LABEL_IMAGE_TABLE: Table = Table {
    name: "label_image",
    columns: audited_columns![
        sqlite_column!("label_id", &SqlType::Integer, non_null = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("type", &SqlType::Text),
        sqlite_column!("width", &SqlType::Integer),
        sqlite_column!("height", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["label_id", "uri"]],
};

// =============================================================================
// Masters
// =============================================================================

const MASTER_TABLE: Table = Table {
    name: "master",
    columns: audited_columns![
        sqlite_column!("id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("main_release_id", &SqlType::Integer),
        sqlite_column!("data_quality", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["id"]],
};

const MASTER_ARTIST_TABLE: Table = Table {
    name: "master_artist",
    columns: audited_columns![
        sqlite_column!("master_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_id", &SqlType::Integer),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("anv", &SqlType::Text),
        sqlite_column!("join_relation", &SqlType::Text),
    ],
    indices: &[("idx_master_artist_artist", "artist_id")],
    unique_constraints: &[&["master_id", "position"]],
};

const MASTER_GENRE_TABLE: Table = Table {
    name: "master_genre",
    columns: audited_columns![
        sqlite_column!("master_id", &SqlType::Integer, non_null = true),
        sqlite_column!("genre", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["master_id", "genre"]],
};

const MASTER_STYLE_TABLE: Table = Table {
    name: "master_style",
    columns: audited_columns![
        sqlite_column!("master_id", &SqlType::Integer, non_null = true),
        sqlite_column!("style", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["master_id", "style"]],
};

const MASTER_VIDEO_TABLE: Table = Table {
    name: "master_video",
    columns: audited_columns![
        sqlite_column!("master_id", &SqlType::Integer, non_null = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Integer),
        sqlite_column!("embed", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["master_id", "uri"]],
};

// =============================================================================
// Releases
// =============================================================================

const RELEASE_TABLE: Table = Table {
    name: "release",
    columns: audited_columns![
        sqlite_column!("id", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text),
        sqlite_column!("country", &SqlType::Text),
        // Discogs dates are partial, e.g. 1999-03-00
        sqlite_column!("released", &SqlType::Text),
        sqlite_column!("notes", &SqlType::Text),
        sqlite_column!("data_quality", &SqlType::Text),
        sqlite_column!("master_id", &SqlType::Integer),
        sqlite_column!("is_main_release", &SqlType::Integer),
    ],
    indices: &[("idx_release_master", "master_id")],
    unique_constraints: &[&["id"]],
};

const RELEASE_ARTIST_TABLE: Table = Table {
    name: "release_artist",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_id", &SqlType::Integer),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("anv", &SqlType::Text),
        sqlite_column!("join_relation", &SqlType::Text),
    ],
    indices: &[("idx_release_artist_artist", "artist_id")],
    unique_constraints: &[&["release_id", "position"]],
};

const RELEASE_EXTRA_ARTIST_TABLE: Table = Table {
    name: "release_extra_artist",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("artist_id", &SqlType::Integer),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("anv", &SqlType::Text),
        sqlite_column!("role", &SqlType::Text),
        sqlite_column!("tracks", &SqlType::Text),
    ],
    indices: &[("idx_release_extra_artist_artist", "artist_id")],
    unique_constraints: &[&["release_id", "position"]],
};

const RELEASE_LABEL_TABLE: Table = Table {
    name: "release_label",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("label_id", &SqlType::Integer),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("catalog_number", &SqlType::Text),
    ],
    indices: &[("idx_release_label_label", "label_id")],
    unique_constraints: &[&["release_id", "position"]],
};

const RELEASE_FORMAT_TABLE: Table = Table {
    name: "release_format",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("quantity", &SqlType::Integer),
        sqlite_column!("text", &SqlType::Text),
        sqlite_column!("descriptions", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["release_id", "position"]],
};

const RELEASE_GENRE_TABLE: Table = Table {
    name: "release_genre",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("genre", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["release_id", "genre"]],
};

const RELEASE_STYLE_TABLE: Table = Table {
    name: "release_style",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("style", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["release_id", "style"]],
};

const RELEASE_TRACK_TABLE: Table = Table {
    name: "release_track",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("sequence", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Text),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["release_id", "sequence"]],
};

const RELEASE_IDENTIFIER_TABLE: Table = Table {
    name: "release_identifier",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("kind", &SqlType::Text),
        sqlite_column!("value", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["release_id", "position"]],
};

const RELEASE_VIDEO_TABLE: Table = Table {
    name: "release_video",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("uri", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Integer),
        sqlite_column!("embed", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[&["release_id", "uri"]],
};

const RELEASE_COMPANY_TABLE: Table = Table {
    name: "release_company",
    columns: audited_columns![
        sqlite_column!("release_id", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("company_id", &SqlType::Integer),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("catalog_number", &SqlType::Text),
        sqlite_column!("entity_type", &SqlType::Integer),
        sqlite_column!("entity_type_name", &SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["release_id", "position"]],
};

pub const ENTITY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTIST_TABLE,
        ARTIST_ALIAS_TABLE,
        ARTIST_NAME_VARIATION_TABLE,
        ARTIST_URL_TABLE,
        ARTIST_MEMBER_TABLE,
        ARTIST_IMAGE_TABLE,
        LABEL_TABLE,
        LABEL_URL_TABLE,
        SUB_LABEL_TABLE,
        LABEL_IMAGE_TABLE,
        MASTER_TABLE,
        MASTER_ARTIST_TABLE,
        MASTER_GENRE_TABLE,
        MASTER_STYLE_TABLE,
        MASTER_VIDEO_TABLE,
        RELEASE_TABLE,
        RELEASE_ARTIST_TABLE,
        RELEASE_EXTRA_ARTIST_TABLE,
        RELEASE_LABEL_TABLE,
        RELEASE_FORMAT_TABLE,
        RELEASE_GENRE_TABLE,
        RELEASE_STYLE_TABLE,
        RELEASE_TRACK_TABLE,
        RELEASE_IDENTIFIER_TABLE,
        RELEASE_VIDEO_TABLE,
        RELEASE_COMPANY_TABLE,
    ],
    migration: None,
}];

/// Column mapping for an entity kind: its table and natural key columns.
pub fn table_for(kind: EntityKind) -> &'static Table {
    match kind {
        EntityKind::Artist => &ARTIST_TABLE,
        EntityKind::ArtistAlias => &ARTIST_ALIAS_TABLE,
        EntityKind::ArtistNameVariation => &ARTIST_NAME_VARIATION_TABLE,
        EntityKind::ArtistUrl => &ARTIST_URL_TABLE,
        EntityKind::ArtistMember => &ARTIST_MEMBER_TABLE,
        EntityKind::ArtistImage => &ARTIST_IMAGE_TABLE,
        EntityKind::Label => &LABEL_TABLE,
        EntityKind::LabelUrl => &LABEL_URL_TABLE,
        EntityKind::SubLabel => &SUB_LABEL_TABLE,
        EntityKind::LabelImage => &LABEL_IMAGE_TABLE,
        EntityKind::Master => &MASTER_TABLE,
        EntityKind::MasterArtist => &MASTER_ARTIST_TABLE,
        EntityKind::MasterGenre => &MASTER_GENRE_TABLE,
        EntityKind::MasterStyle => &MASTER_STYLE_TABLE,
        EntityKind::MasterVideo => &MASTER_VIDEO_TABLE,
        EntityKind::Release => &RELEASE_TABLE,
        EntityKind::ReleaseArtist => &RELEASE_ARTIST_TABLE,
        EntityKind::ReleaseExtraArtist => &RELEASE_EXTRA_ARTIST_TABLE,
        EntityKind::ReleaseLabel => &RELEASE_LABEL_TABLE,
        EntityKind::ReleaseFormat => &RELEASE_FORMAT_TABLE,
        EntityKind::ReleaseGenre => &RELEASE_GENRE_TABLE,
        EntityKind::ReleaseStyle => &RELEASE_STYLE_TABLE,
        EntityKind::ReleaseTrack => &RELEASE_TRACK_TABLE,
        EntityKind::ReleaseIdentifier => &RELEASE_IDENTIFIER_TABLE,
        EntityKind::ReleaseVideo => &RELEASE_VIDEO_TABLE,
        EntityKind::ReleaseCompany => &RELEASE_COMPANY_TABLE,
    }
}

pub fn natural_key(table: &Table) -> &'static [&'static str] {
    table.unique_constraints.first().copied().unwrap_or(&[])
}
