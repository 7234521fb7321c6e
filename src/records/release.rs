use super::command::{Command, EntityKind, FieldValue, SkipReason};
use super::element::XmlElement;
use super::{push_artist_credits, push_child, push_tags, push_videos};

pub(super) fn convert(element: &XmlElement) -> Result<Vec<Command>, SkipReason> {
    let master_id = element.child("master_id");
    let release = Command::builder(EntityKind::Release)
        .key("id", FieldValue::integer(element.attr("id")))
        .field("title", FieldValue::text(element.child_text("title")))
        .field("status", FieldValue::text(element.attr("status")))
        .field("country", FieldValue::text(element.child_text("country")))
        .field("released", FieldValue::text(element.child_text("released")))
        .field("notes", FieldValue::text(element.child_text("notes")))
        .field(
            "data_quality",
            FieldValue::text(element.child_text("data_quality")),
        )
        .field(
            "master_id",
            FieldValue::integer(master_id.map(|m| m.text.as_str())),
        )
        .field(
            "is_main_release",
            FieldValue::flag(master_id.and_then(|m| m.attr("is_main_release"))),
        )
        .build()?;

    let mut commands = Vec::new();
    for section in &element.children {
        match section.name.as_str() {
            "artists" => push_artist_credits(
                &mut commands,
                &release,
                EntityKind::ReleaseArtist,
                "release_id",
                section,
            ),
            "extraartists" => push_extra_artists(&mut commands, &release, section),
            "labels" => {
                for (index, label) in section.children_named("label").enumerate() {
                    push_child(
                        &mut commands,
                        Command::child_of(&release, EntityKind::ReleaseLabel, "release_id")
                            .key("position", FieldValue::from(index as i64 + 1))
                            .field("label_id", FieldValue::integer(label.attr("id")))
                            .field("name", FieldValue::text(label.attr("name")))
                            .field("catalog_number", FieldValue::text(label.attr("catno"))),
                    );
                }
            }
            "formats" => {
                for (index, format) in section.children_named("format").enumerate() {
                    let descriptions: Vec<&str> = format
                        .items("descriptions", "description")
                        .map(|d| d.text.trim())
                        .filter(|d| !d.is_empty())
                        .collect();
                    let descriptions = descriptions.join(", ");
                    push_child(
                        &mut commands,
                        Command::child_of(&release, EntityKind::ReleaseFormat, "release_id")
                            .key("position", FieldValue::from(index as i64 + 1))
                            .field("name", FieldValue::text(format.attr("name")))
                            .field("quantity", FieldValue::integer(format.attr("qty")))
                            .field("text", FieldValue::text(format.attr("text")))
                            .field("descriptions", FieldValue::text(Some(&descriptions))),
                    );
                }
            }
            "genres" => push_tags(
                &mut commands,
                &release,
                EntityKind::ReleaseGenre,
                "release_id",
                section,
                "genre",
            ),
            "styles" => push_tags(
                &mut commands,
                &release,
                EntityKind::ReleaseStyle,
                "release_id",
                section,
                "style",
            ),
            "tracklist" => {
                for (index, track) in section.children_named("track").enumerate() {
                    push_child(
                        &mut commands,
                        Command::child_of(&release, EntityKind::ReleaseTrack, "release_id")
                            .key("sequence", FieldValue::from(index as i64 + 1))
                            .field("position", FieldValue::text(track.child_text("position")))
                            .field("title", FieldValue::text(track.child_text("title")))
                            .field("duration", FieldValue::text(track.child_text("duration"))),
                    );
                }
            }
            "identifiers" => {
                for (index, identifier) in section.children_named("identifier").enumerate() {
                    push_child(
                        &mut commands,
                        Command::child_of(&release, EntityKind::ReleaseIdentifier, "release_id")
                            .key("position", FieldValue::from(index as i64 + 1))
                            .field("kind", FieldValue::text(identifier.attr("type")))
                            .field("value", FieldValue::text(identifier.attr("value")))
                            .field(
                                "description",
                                FieldValue::text(identifier.attr("description")),
                            ),
                    );
                }
            }
            "videos" => push_videos(
                &mut commands,
                &release,
                EntityKind::ReleaseVideo,
                "release_id",
                section,
            ),
            "companies" => {
                for (index, company) in section.children_named("company").enumerate() {
                    push_child(
                        &mut commands,
                        Command::child_of(&release, EntityKind::ReleaseCompany, "release_id")
                            .key("position", FieldValue::from(index as i64 + 1))
                            .field("company_id", FieldValue::integer(company.child_text("id")))
                            .field("name", FieldValue::text(company.child_text("name")))
                            .field(
                                "catalog_number",
                                FieldValue::text(company.child_text("catno")),
                            )
                            .field(
                                "entity_type",
                                FieldValue::integer(company.child_text("entity_type")),
                            )
                            .field(
                                "entity_type_name",
                                FieldValue::text(company.child_text("entity_type_name")),
                            ),
                    );
                }
            }
            _ => {}
        }
    }

    commands.insert(0, release);
    Ok(commands)
}

fn push_extra_artists(commands: &mut Vec<Command>, release: &Command, section: &XmlElement) {
    for (index, artist) in section.children_named("artist").enumerate() {
        push_child(
            commands,
            Command::child_of(release, EntityKind::ReleaseExtraArtist, "release_id")
                .key("position", FieldValue::from(index as i64 + 1))
                .field("artist_id", FieldValue::integer(artist.child_text("id")))
                .field("name", FieldValue::text(artist.child_text("name")))
                .field("anv", FieldValue::text(artist.child_text("anv")))
                .field("role", FieldValue::text(artist.child_text("role")))
                .field("tracks", FieldValue::text(artist.child_text("tracks"))),
        );
    }
}
