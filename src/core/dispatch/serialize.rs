//! Per-kind contribution of a node to a page payload.

use crate::api::{
    Attachment, ButtonStyle, ComponentPayload, DividerSpacing, EmbedAuthor, EmbedField,
    EmbedFooter, EmbedPayload, EmojiPayload, GalleryItem, MediaRef, Page, PollAnswerPayload,
    PollPayload, SelectKind, SelectOptionPayload,
};
use crate::core::constants::*;
use crate::core::tree::props::keys;
use crate::core::tree::{Node, NodeKind, PropsExt, Tree, TreeError};
use crate::utils::text::{truncate, truncate_opt};

const ROW_ITEMS: &[NodeKind] = &[NodeKind::Button, NodeKind::Select];
const ACCESSORY_ITEMS: &[NodeKind] = &[NodeKind::Button, NodeKind::Thumbnail];
const SECTION_ACCESSORY: &[NodeKind] = &[NodeKind::Accessory];

/// Serializes one top-level, non-wrapper node into `page`.
pub(crate) fn add_to_page(tree: &Tree, node: &Node, page: &mut Page) -> Result<(), TreeError> {
    match node.kind() {
        NodeKind::Text | NodeKind::RichText => {
            page.push_block(&text_of(tree, node));
        }
        NodeKind::Emoji => page.push_text(&emoji_of(node).markup()),
        NodeKind::Image => add_media(node, page, "image.png"),
        NodeKind::File => add_media(node, page, "file.bin"),
        NodeKind::Embed => {
            let embed = embed_of(tree, node, page)?;
            page.embeds.push(embed);
        }
        NodeKind::Poll => page.poll = Some(poll_of(tree, node)),
        NodeKind::Button => {
            let button = button_of(tree, node)?;
            push_loose_button(page, button);
        }
        NodeKind::Select => {
            let select = select_of(tree, node)?;
            page.components.push(ComponentPayload::ActionRow {
                components: vec![select],
            });
            page.open_row = None;
        }
        NodeKind::ActionRow => {
            if let Some(row) = row_of(tree, node)? {
                page.components.push(row);
            }
            page.open_row = None;
        }
        NodeKind::Container | NodeKind::Section | NodeKind::Divider | NodeKind::Gallery => {
            page.flags.components_v2 = true;
            if let Some(component) = layout_of(tree, node, page)? {
                page.components.push(component);
            }
            page.open_row = None;
        }
        NodeKind::Empty => {}
        other => {
            return Err(TreeError::TypeMismatch {
                parent: None,
                expected: NodeKind::root_accepted(),
                found: other,
            })
        }
    }
    Ok(())
}

/// Whether `node` still fits on `page` without exceeding platform limits.
pub(crate) fn fits(tree: &Tree, node: &Node, page: &Page) -> bool {
    match node.kind() {
        NodeKind::Embed => page.embeds.len() < MAX_EMBEDS,
        NodeKind::Image | NodeKind::File => {
            page.files.len() < MAX_FILES || node.props().media(keys::SRC).and_then(|m| m.url()).is_some()
        }
        NodeKind::Poll => page.poll.is_none(),
        NodeKind::Button if loose_row_has_room(page) => true,
        NodeKind::ActionRow => {
            page.components.len() < MAX_ROWS || tree.visible_children(node).next().is_none()
        }
        NodeKind::Button | NodeKind::Select => page.components.len() < MAX_ROWS,
        NodeKind::Container | NodeKind::Section | NodeKind::Divider | NodeKind::Gallery => {
            page.components.len() < MAX_LAYOUT_COMPONENTS
        }
        _ => true,
    }
}

fn loose_row_has_room(page: &Page) -> bool {
    let Some(index) = page.open_row else {
        return false;
    };
    matches!(
        page.components.get(index),
        Some(ComponentPayload::ActionRow { components }) if components.len() < MAX_ROW_BUTTONS
    )
}

fn push_loose_button(page: &mut Page, button: ComponentPayload) {
    if loose_row_has_room(page) {
        if let Some(ComponentPayload::ActionRow { components }) =
            page.open_row.and_then(|index| page.components.get_mut(index))
        {
            components.push(button);
            return;
        }
    }
    page.components.push(ComponentPayload::ActionRow {
        components: vec![button],
    });
    page.open_row = Some(page.components.len() - 1);
}

/// Flattened text of a text-like node and its visible descendants.
pub(crate) fn text_of(tree: &Tree, node: &Node) -> String {
    match node.kind() {
        NodeKind::Text => node.props().str(keys::CONTENT).unwrap_or_default().to_string(),
        NodeKind::Emoji => emoji_of(node).markup(),
        _ => tree
            .visible_children(node)
            .map(|child| text_of(tree, child))
            .collect(),
    }
}

fn emoji_of(node: &Node) -> EmojiPayload {
    let props = node.props();
    EmojiPayload {
        name: props.str(keys::NAME).unwrap_or_default().to_string(),
        id: props.str(keys::EMOJI_ID).map(str::to_string),
        animated: props.flag(keys::ANIMATED),
    }
}

/// Emoji from an `emoji` prop, falling back to the first visible emoji child.
fn attached_emoji(tree: &Tree, node: &Node) -> Option<EmojiPayload> {
    if let Some(name) = node.props().str(keys::EMOJI) {
        return Some(EmojiPayload {
            name: name.to_string(),
            id: None,
            animated: false,
        });
    }
    tree.visible_children(node)
        .find(|child| child.kind() == NodeKind::Emoji)
        .map(emoji_of)
}

/// Label from the `label` prop, or the text of the node's children.
fn label_of(tree: &Tree, node: &Node) -> Option<String> {
    let label = match node.props().str(keys::LABEL) {
        Some(label) => label.to_string(),
        None => tree
            .visible_children(node)
            .filter(|child| child.kind() == NodeKind::Text)
            .map(|child| text_of(tree, child))
            .collect(),
    };
    (!label.is_empty()).then_some(label)
}

fn attachment_of(node: &Node, fallback: &str) -> Option<Attachment> {
    let props = node.props();
    let source = props.media(keys::SRC)?.clone();
    let name = props
        .str(keys::NAME)
        .map(str::to_string)
        .unwrap_or_else(|| source.guess_name(fallback));
    Some(Attachment {
        name,
        source,
        description: props.str(keys::DESCRIPTION).map(str::to_string),
        spoiler: props.flag(keys::SPOILER),
    })
}

/// Uploads byte sources; remote sources become a link in the content.
fn add_media(node: &Node, page: &mut Page, fallback: &str) {
    let Some(attachment) = attachment_of(node, fallback) else {
        return;
    };
    match attachment.source.url() {
        Some(url) if attachment.spoiler => page.push_block(&format!("||{url}||")),
        Some(url) => page.push_block(url),
        None => {
            page.attach(attachment);
        }
    }
}

fn media_ref(node: &Node, page: &mut Page, fallback: &str) -> Result<MediaRef, TreeError> {
    let attachment = attachment_of(node, fallback).ok_or(TreeError::InvalidProp {
        kind: node.kind(),
        prop: keys::SRC,
    })?;
    Ok(MediaRef {
        url: page.attach(attachment),
    })
}

fn embed_of(tree: &Tree, node: &Node, page: &mut Page) -> Result<EmbedPayload, TreeError> {
    let props = node.props();
    let mut embed = EmbedPayload {
        title: truncate_opt(props.str(keys::TITLE), EMBED_TITLE_LIMIT),
        description: truncate_opt(props.str(keys::DESCRIPTION), EMBED_DESCRIPTION_LIMIT),
        url: props.str(keys::URL).map(str::to_string),
        color: props.int(keys::COLOR).and_then(|c| u32::try_from(c).ok()),
        timestamp: props.time(keys::TIMESTAMP),
        author: props.str(keys::AUTHOR_NAME).map(|name| EmbedAuthor {
            name: truncate(name, EMBED_TITLE_LIMIT),
            url: props.str(keys::AUTHOR_URL).map(str::to_string),
            icon_url: props.str(keys::AUTHOR_ICON).map(str::to_string),
        }),
        footer: props.str(keys::FOOTER_TEXT).map(|text| EmbedFooter {
            text: truncate(text, FOOTER_LIMIT),
            icon_url: props.str(keys::FOOTER_ICON).map(str::to_string),
        }),
        ..EmbedPayload::default()
    };
    for child in tree.visible_children(node) {
        match child.kind() {
            NodeKind::Image => embed.image = Some(media_ref(child, page, "image.png")?),
            NodeKind::Thumbnail => embed.thumbnail = Some(media_ref(child, page, "thumbnail.png")?),
            NodeKind::Field => {
                let props = child.props();
                embed.fields.push(EmbedField {
                    name: truncate(props.str(keys::NAME).unwrap_or_default(), FIELD_NAME_LIMIT),
                    value: truncate(props.str(keys::VALUE).unwrap_or_default(), FIELD_VALUE_LIMIT),
                    inline: props.flag(keys::INLINE),
                });
            }
            other => {
                return Err(TreeError::TypeMismatch {
                    parent: Some(NodeKind::Embed),
                    expected: NodeKind::Embed.accepted(),
                    found: other,
                })
            }
        }
    }
    Ok(embed)
}

fn poll_of(tree: &Tree, node: &Node) -> PollPayload {
    let props = node.props();
    let answers = tree
        .visible_children(node)
        .filter(|child| child.kind() == NodeKind::Answer)
        .take(MAX_POLL_ANSWERS)
        .map(|answer| PollAnswerPayload {
            text: truncate(answer.props().str(keys::TEXT).unwrap_or_default(), POLL_ANSWER_LIMIT),
            emoji: attached_emoji(tree, answer),
        })
        .collect();
    PollPayload {
        question: truncate(props.str(keys::QUESTION).unwrap_or_default(), POLL_QUESTION_LIMIT),
        answers,
        duration_hours: props
            .int(keys::DURATION_HOURS)
            .and_then(|hours| u32::try_from(hours).ok())
            .unwrap_or(DEFAULT_POLL_HOURS),
        allow_multiselect: props.flag(keys::MULTISELECT),
    }
}

fn button_of(tree: &Tree, node: &Node) -> Result<ComponentPayload, TreeError> {
    let props = node.props();
    let style = match props.str(keys::STYLE) {
        Some(style) => ButtonStyle::parse(style).ok_or(TreeError::InvalidProp {
            kind: NodeKind::Button,
            prop: keys::STYLE,
        })?,
        None => ButtonStyle::default(),
    };
    let (custom_id, url) = if style == ButtonStyle::Link {
        let url = props.str(keys::URL).ok_or(TreeError::InvalidProp {
            kind: NodeKind::Button,
            prop: keys::URL,
        })?;
        (None, Some(url.to_string()))
    } else {
        (node.custom_id().map(str::to_string), None)
    };
    Ok(ComponentPayload::Button {
        style,
        label: label_of(tree, node).map(|label| truncate(&label, BUTTON_LABEL_LIMIT)),
        emoji: attached_emoji(tree, node),
        custom_id,
        url,
        disabled: props.flag(keys::DISABLED),
    })
}

fn select_of(tree: &Tree, node: &Node) -> Result<ComponentPayload, TreeError> {
    let props = node.props();
    let kind = match props.str(keys::SELECT_KIND) {
        Some(kind) => SelectKind::parse(kind).ok_or(TreeError::InvalidProp {
            kind: NodeKind::Select,
            prop: keys::SELECT_KIND,
        })?,
        None => SelectKind::String,
    };
    if kind != SelectKind::String {
        return Err(TreeError::NotImplemented(format!(
            "{} select menus",
            kind.as_str()
        )));
    }
    let custom_id = node
        .custom_id()
        .ok_or(TreeError::InvalidProp {
            kind: NodeKind::Select,
            prop: "custom_id",
        })?
        .to_string();
    let options: Vec<SelectOptionPayload> = tree
        .visible_children(node)
        .filter(|child| child.kind() == NodeKind::SelectOption)
        .take(MAX_SELECT_OPTIONS)
        .map(|option| {
            let props = option.props();
            SelectOptionPayload {
                label: truncate(&label_of(tree, option).unwrap_or_default(), OPTION_TEXT_LIMIT),
                value: truncate(props.str(keys::VALUE).unwrap_or_default(), OPTION_TEXT_LIMIT),
                description: truncate_opt(props.str(keys::DESCRIPTION), OPTION_TEXT_LIMIT),
                emoji: attached_emoji(tree, option),
                default: props.flag(keys::DEFAULT),
            }
        })
        .collect();
    let count = u8::try_from(options.len()).unwrap_or(u8::MAX).max(1);
    let bound = |key: &str, fallback: u8| {
        props
            .int(key)
            .and_then(|value| u8::try_from(value).ok())
            .unwrap_or(fallback)
            .min(count)
    };
    Ok(ComponentPayload::StringSelect {
        custom_id,
        placeholder: truncate_opt(props.str(keys::PLACEHOLDER), PLACEHOLDER_LIMIT),
        min_values: bound(keys::MIN_VALUES, 1),
        max_values: bound(keys::MAX_VALUES, 1),
        disabled: props.flag(keys::DISABLED),
        options,
    })
}

/// Row items with whitelist wrappers flattened away.
fn row_items<'t>(tree: &'t Tree, node: &'t Node, out: &mut Vec<&'t Node>) {
    for child in tree.visible_children(node) {
        match child.kind() {
            NodeKind::Whitelist => row_items(tree, child, out),
            NodeKind::Empty => {}
            _ => out.push(child),
        }
    }
}

/// An action row payload; `None` when nothing visible is left in it.
fn row_of(tree: &Tree, node: &Node) -> Result<Option<ComponentPayload>, TreeError> {
    let mut items = Vec::new();
    row_items(tree, node, &mut items);
    let components = items
        .into_iter()
        .map(|item| match item.kind() {
            NodeKind::Button => button_of(tree, item),
            NodeKind::Select => select_of(tree, item),
            other => Err(TreeError::TypeMismatch {
                parent: Some(NodeKind::ActionRow),
                expected: ROW_ITEMS,
                found: other,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((!components.is_empty()).then_some(ComponentPayload::ActionRow { components }))
}

fn gallery_item(node: &Node, page: &mut Page) -> Result<GalleryItem, TreeError> {
    Ok(GalleryItem {
        media: media_ref(node, page, "image.png")?,
        description: node.props().str(keys::DESCRIPTION).map(str::to_string),
        spoiler: node.props().flag(keys::SPOILER),
    })
}

fn section_of(tree: &Tree, node: &Node, page: &mut Page) -> Result<ComponentPayload, TreeError> {
    let mut components = Vec::new();
    let mut accessory = None;
    for child in tree.visible_children(node) {
        match child.kind() {
            NodeKind::Accessory => {
                let item = tree.visible_children(child).next().ok_or(TreeError::MissingChild {
                    parent: NodeKind::Accessory,
                    expected: ACCESSORY_ITEMS,
                })?;
                accessory = Some(match item.kind() {
                    NodeKind::Button => button_of(tree, item)?,
                    NodeKind::Thumbnail => ComponentPayload::Thumbnail {
                        media: media_ref(item, page, "thumbnail.png")?,
                        description: item.props().str(keys::DESCRIPTION).map(str::to_string),
                        spoiler: item.props().flag(keys::SPOILER),
                    },
                    other => {
                        return Err(TreeError::TypeMismatch {
                            parent: Some(NodeKind::Accessory),
                            expected: ACCESSORY_ITEMS,
                            found: other,
                        })
                    }
                });
            }
            _ => components.push(ComponentPayload::TextDisplay {
                content: text_of(tree, child),
            }),
        }
    }
    let accessory = accessory.ok_or(TreeError::MissingChild {
        parent: NodeKind::Section,
        expected: SECTION_ACCESSORY,
    })?;
    Ok(ComponentPayload::Section {
        components,
        accessory: Box::new(accessory),
    })
}

/// Layout (components v2) payload for a node inside or at the top of a page.
fn layout_of(tree: &Tree, node: &Node, page: &mut Page) -> Result<Option<ComponentPayload>, TreeError> {
    let props = node.props();
    let component = match node.kind() {
        NodeKind::Text | NodeKind::RichText => ComponentPayload::TextDisplay {
            content: text_of(tree, node),
        },
        NodeKind::ActionRow => return row_of(tree, node),
        NodeKind::Section => section_of(tree, node, page)?,
        NodeKind::Divider => ComponentPayload::Separator {
            divider: props.get(keys::VISIBLE).is_none() || props.flag(keys::VISIBLE),
            spacing: match props.str(keys::SPACING) {
                Some("large") => DividerSpacing::Large,
                _ => DividerSpacing::Small,
            },
        },
        NodeKind::Gallery => ComponentPayload::MediaGallery {
            items: tree
                .visible_children(node)
                .map(|image| gallery_item(image, page))
                .collect::<Result<_, _>>()?,
        },
        NodeKind::File => ComponentPayload::File {
            file: media_ref(node, page, "file.bin")?,
            spoiler: props.flag(keys::SPOILER),
        },
        NodeKind::Container => {
            let mut components = Vec::new();
            container_items(tree, node, page, &mut components)?;
            ComponentPayload::Container {
                accent_color: props.int(keys::ACCENT_COLOR).and_then(|c| u32::try_from(c).ok()),
                spoiler: props.flag(keys::SPOILER),
                components,
            }
        }
        NodeKind::Empty => return Ok(None),
        other => {
            return Err(TreeError::TypeMismatch {
                parent: Some(NodeKind::Container),
                expected: NodeKind::Container.accepted(),
                found: other,
            })
        }
    };
    Ok(Some(component))
}

fn container_items(
    tree: &Tree,
    node: &Node,
    page: &mut Page,
    out: &mut Vec<ComponentPayload>,
) -> Result<(), TreeError> {
    for child in tree.visible_children(node) {
        if child.kind() == NodeKind::Whitelist {
            container_items(tree, child, page, out)?;
        } else if let Some(component) = layout_of(tree, child, page)? {
            out.push(component);
        }
    }
    Ok(())
}
