use super::command::{Command, EntityKind, FieldValue, SkipReason};
use super::element::XmlElement;
use super::{push_artist_credits, push_tags, push_videos};

pub(super) fn convert(element: &XmlElement) -> Result<Vec<Command>, SkipReason> {
    let master = Command::builder(EntityKind::Master)
        .key("id", FieldValue::integer(element.attr("id")))
        .field("title", FieldValue::text(element.child_text("title")))
        .field("year", FieldValue::integer(element.child_text("year")))
        .field(
            "main_release_id",
            FieldValue::integer(element.child_text("main_release")),
        )
        .field(
            "data_quality",
            FieldValue::text(element.child_text("data_quality")),
        )
        .build()?;

    let mut commands = Vec::new();
    for section in &element.children {
        match section.name.as_str() {
            "artists" => push_artist_credits(
                &mut commands,
                &master,
                EntityKind::MasterArtist,
                "master_id",
                section,
            ),
            "genres" => push_tags(
                &mut commands,
                &master,
                EntityKind::MasterGenre,
                "master_id",
                section,
                "genre",
            ),
            "styles" => push_tags(
                &mut commands,
                &master,
                EntityKind::MasterStyle,
                "master_id",
                section,
                "style",
            ),
            "videos" => push_videos(
                &mut commands,
                &master,
                EntityKind::MasterVideo,
                "master_id",
                section,
            ),
            _ => {}
        }
    }

    commands.insert(0, master);
    Ok(commands)
}
