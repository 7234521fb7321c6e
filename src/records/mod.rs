//! Conversion of dump XML records into persistence commands.

mod artist;
mod command;
mod element;
mod label;
mod master;
mod normalize;
mod release;

pub use command::{
    ChildScope, Command, CommandBuilder, EntityKind, FieldValue, Fields, OwnerRef, RecordSkipped,
    SkipReason,
};
pub use element::{ElementStream, StreamError, XmlElement};
pub use normalize::{normalize_flag, normalize_integer, NormalizedText};

use crate::dumps::DumpType;
use tracing::trace;

/// Converts one record-level element of a `dump_type` dump.
///
/// The primary command comes first, followed by child commands in document
/// order. Children missing their own key are dropped individually. The
/// primary command lists, per child kind, the children it still owns.
pub fn convert_record(
    dump_type: DumpType,
    element: &XmlElement,
) -> Result<Vec<Command>, RecordSkipped> {
    let skipped = |reason| RecordSkipped {
        dump_type,
        record_id: element
            .attr("id")
            .or_else(|| element.child_text("id"))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        reason,
    };

    let expected = dump_type.record_element();
    if element.name != expected {
        return Err(skipped(SkipReason::UnexpectedElement {
            expected,
            found: element.name.clone(),
        }));
    }

    let converted = match dump_type {
        DumpType::Artist => artist::convert(element),
        DumpType::Label => label::convert(element),
        DumpType::Master => master::convert(element),
        DumpType::Release => release::convert(element),
    };
    converted.map(scope_children).map_err(skipped)
}

fn scope_children(mut commands: Vec<Command>) -> Vec<Command> {
    let Some((primary, children)) = commands.split_first_mut() else {
        return commands;
    };
    let scopes = primary
        .entity()
        .child_kinds()
        .iter()
        .map(|(entity, owner_column)| ChildScope {
            entity: *entity,
            owner_column: *owner_column,
            retained: children
                .iter()
                .filter(|c| c.entity() == *entity && c.is_child_of(primary))
                .filter_map(|c| {
                    let owner = c.owner()?;
                    c.key()
                        .iter()
                        .find(|(column, _)| *column != owner.column)
                        .map(|(_, value)| value.clone())
                })
                .collect(),
        })
        .collect();
    primary.set_child_scopes(scopes);
    commands
}

fn push_child(commands: &mut Vec<Command>, child: CommandBuilder) {
    match child.build() {
        Ok(command) => commands.push(command),
        Err(reason) => trace!("Dropping child: {}", reason),
    }
}

/// `<artists><artist>…</artist></artists>` credit lists, keyed by position.
fn push_artist_credits(
    commands: &mut Vec<Command>,
    owner: &Command,
    entity: EntityKind,
    owner_column: &'static str,
    section: &XmlElement,
) {
    for (index, artist) in section.children_named("artist").enumerate() {
        push_child(
            commands,
            Command::child_of(owner, entity, owner_column)
                .key("position", FieldValue::from(index as i64 + 1))
                .field("artist_id", FieldValue::integer(artist.child_text("id")))
                .field("name", FieldValue::text(artist.child_text("name")))
                .field("anv", FieldValue::text(artist.child_text("anv")))
                .field("join_relation", FieldValue::text(artist.child_text("join"))),
        );
    }
}

/// Genre or style lists, keyed by the tag itself.
fn push_tags(
    commands: &mut Vec<Command>,
    owner: &Command,
    entity: EntityKind,
    owner_column: &'static str,
    section: &XmlElement,
    item: &'static str,
) {
    for tag in section.children_named(item) {
        push_child(
            commands,
            Command::child_of(owner, entity, owner_column).key(item, FieldValue::text(Some(&tag.text))),
        );
    }
}

fn push_videos(
    commands: &mut Vec<Command>,
    owner: &Command,
    entity: EntityKind,
    owner_column: &'static str,
    section: &XmlElement,
) {
    for video in section.children_named("video") {
        push_child(
            commands,
            Command::child_of(owner, entity, owner_column)
                .key("uri", FieldValue::text(video.attr("src")))
                .field("title", FieldValue::text(video.child_text("title")))
                .field(
                    "description",
                    FieldValue::text(video.child_text("description")),
                )
                .field("duration", FieldValue::integer(video.attr("duration")))
                .field("embed", FieldValue::flag(video.attr("embed"))),
        );
    }
}
