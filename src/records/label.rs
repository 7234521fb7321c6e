use super::command::{Command, EntityKind, FieldValue, SkipReason};
use super::element::XmlElement;
use super::push_child;

pub(super) fn convert(element: &XmlElement) -> Result<Vec<Command>, SkipReason> {
    let parent = element.child("parentLabel");
    let label = Command::builder(EntityKind::Label)
        .key("id", FieldValue::integer(element.child_text("id")))
        .field("name", FieldValue::text(element.child_text("name")))
        .field(
            "contact_info",
            FieldValue::text(element.child_text("contactinfo")),
        )
        .field("profile", FieldValue::text(element.child_text("profile")))
        .field(
            "data_quality",
            FieldValue::text(element.child_text("data_quality")),
        )
        .field(
            "parent_label_id",
            FieldValue::integer(parent.and_then(|p| p.attr("id"))),
        )
        .field(
            "parent_label_name",
            FieldValue::text(parent.map(|p| p.text.as_str())),
        )
        .build()?;

    let mut commands = Vec::new();
    for section in &element.children {
        match section.name.as_str() {
            "urls" => {
                for url in section.children_named("url") {
                    push_child(
                        &mut commands,
                        Command::child_of(&label, EntityKind::LabelUrl, "label_id")
                            .key("url", FieldValue::text(Some(&url.text))),
                    );
                }
            }
            "sublabels" => {
                for sub in section.children_named("label") {
                    push_child(
                        &mut commands,
                        Command::child_of(&label, EntityKind::SubLabel, "parent_id")
                            .key("label_id", FieldValue::integer(sub.attr("id")))
                            .field("name", FieldValue::text(Some(&sub.text))),
                    );
                }
            }
            "images" => {
                for image in section.children_named("image") {
                    push_child(
                        &mut commands,
                        Command::child_of(&label, EntityKind::LabelImage, "label_id")
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

    commands.insert(0, label);
    Ok(commands)
}
