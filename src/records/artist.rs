use super::command::{Command, EntityKind, FieldValue, SkipReason};
use super::element::XmlElement;
use super::push_child;

pub(super) fn convert(element: &XmlElement) -> Result<Vec<Command>, SkipReason> {
    let artist = Command::builder(EntityKind::Artist)
        .key("id", FieldValue::integer(element.child_text("id")))
        .field("name", FieldValue::text(element.child_text("name")))
        .field("real_name", FieldValue::text(element.child_text("realname")))
        .field("profile", FieldValue::text(element.child_text("profile")))
        .field(
            "data_quality",
            FieldValue::text(element.child_text("data_quality")),
        )
        .build()?;

    let mut commands = Vec::new();
    for section in &element.children {
        match section.name.as_str() {
            "aliases" => {
                for alias in section.children_named("name") {
                    push_child(
                        &mut commands,
                        Command::child_of(&artist, EntityKind::ArtistAlias, "artist_id")
                            .key("alias_id", FieldValue::integer(alias.attr("id")))
                            .field("name", FieldValue::text(Some(&alias.text))),
                    );
                }
            }
            "namevariations" => {
                for variation in section.children_named("name") {
                    push_child(
                        &mut commands,
                        Command::child_of(&artist, EntityKind::ArtistNameVariation, "artist_id")
                            .key("name", FieldValue::text(Some(&variation.text))),
                    );
                }
            }
            "urls" => {
                for url in section.children_named("url") {
                    push_child(
                        &mut commands,
                        Command::child_of(&artist, EntityKind::ArtistUrl, "artist_id")
                            .key("url", FieldValue::text(Some(&url.text))),
                    );
                }
            }
            "members" => {
                for member in section.children_named("name") {
                    push_child(
                        &mut commands,
                        Command::child_of(&artist, EntityKind::ArtistMember, "group_id")
                            .key("member_id", FieldValue::integer(member.attr("id")))
                            .field("name", FieldValue::text(Some(&member.text))),
                    );
                }
            }
            "images" => {
                for image in section.children_named("image") {
                    push_child(
                        &mut commands,
                        Command::child_of(&artist, EntityKind::ArtistImage, "artist_id")
                            .key("uri", FieldValue::text(image.attr("uri")))
                            .field("type", FieldValue::text(image.attr("type")))
                            .field("width", FieldValue::integer(image.attr("width")))
                            .field("height", FieldValue::integer(image.attr("height"))),
                    );
                }
            }
            _ => {}
        }
    }

    commands.insert(0, artist);
    Ok(commands)
}
