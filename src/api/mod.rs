//! Outbound page payloads handed to the chat client.
//!
//! A [`Page`] is the fully serialized content of one platform message. Pages are
//! rebuilt from the committed tree on every dispatch and compared by value, so
//! every type here derives `PartialEq`.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::sync::Arc;

pub mod client;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Where the bytes of an attachment or media reference come from.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// Remote resource, fetched by the platform.
    Url(String),
    /// In-memory bytes uploaded alongside the message.
    Bytes(Arc<[u8]>),
}

impl MediaSource {
    pub fn bytes(data: impl Into<Arc<[u8]>>) -> Self {
        MediaSource::Bytes(data.into())
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            MediaSource::Url(url) => Some(url),
            MediaSource::Bytes(_) => None,
        }
    }

    /// Content fingerprint used by the attachment dedup cache.
    pub fn fingerprint(&self) -> u32 {
        match self {
            MediaSource::Url(url) => crc32fast::hash(url.as_bytes()),
            MediaSource::Bytes(data) => crc32fast::hash(data),
        }
    }

    pub(crate) fn guess_name(&self, fallback: &str) -> String {
        match self {
            MediaSource::Url(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|path| path.rsplit('/').next())
                .filter(|segment| !segment.is_empty())
                .unwrap_or(fallback)
                .to_string(),
            MediaSource::Bytes(_) => fallback.to_string(),
        }
    }
}

impl Serialize for MediaSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MediaSource::Url(url) => serializer.serialize_str(url),
            MediaSource::Bytes(data) => serializer.serialize_u64(data.len() as u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub name: String,
    pub source: MediaSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub spoiler: bool,
}

impl Attachment {
    /// File name as uploaded; spoilers carry the platform's marker prefix.
    pub fn file_name(&self) -> String {
        if self.spoiler {
            format!("SPOILER_{}", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn reference_url(&self) -> String {
        match &self.source {
            MediaSource::Url(url) => url.clone(),
            MediaSource::Bytes(_) => format!("attachment://{}", self.file_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRef {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageFlags {
    #[serde(skip_serializing_if = "is_false")]
    pub ephemeral: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub components_v2: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<EmbedPayload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentPayload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollPayload>,
    pub flags: PageFlags,
    /// Index of the action row that collects loose top-level buttons.
    #[serde(skip)]
    pub(crate) open_row: Option<usize>,
}

impl Page {
    /// A page with nothing to send. Flags alone do not make a message.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.embeds.is_empty()
            && self.components.is_empty()
            && self.files.is_empty()
            && self.poll.is_none()
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        self.content.push_str(text);
    }

    /// Appends a block of text on its own line.
    pub(crate) fn push_block(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str(text);
    }

    /// Registers an upload once per page and returns the URL to reference it by.
    pub(crate) fn attach(&mut self, attachment: Attachment) -> String {
        let url = attachment.reference_url();
        if matches!(attachment.source, MediaSource::Bytes(_))
            && !self.files.iter().any(|f| f.name == attachment.name)
        {
            self.files.push(attachment);
        }
        url
    }

    pub(crate) fn finish(&mut self) {
        self.open_row = None;
        if self.flags.components_v2 && !self.content.is_empty() {
            let content = std::mem::take(&mut self.content);
            self.components
                .insert(0, ComponentPayload::TextDisplay { content });
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<MediaRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "is_false")]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmojiPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub animated: bool,
}

impl EmojiPayload {
    /// Inline markup used when the emoji is part of message text.
    pub fn markup(&self) -> String {
        match &self.id {
            Some(id) if self.animated => format!("<a:{}:{}>", self.name, id),
            Some(id) => format!("<:{}:{}>", self.name, id),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
    Link,
}

impl ButtonStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ButtonStyle::Primary => "primary",
            ButtonStyle::Secondary => "secondary",
            ButtonStyle::Success => "success",
            ButtonStyle::Danger => "danger",
            ButtonStyle::Link => "link",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(ButtonStyle::Primary),
            "secondary" => Some(ButtonStyle::Secondary),
            "success" => Some(ButtonStyle::Success),
            "danger" => Some(ButtonStyle::Danger),
            "link" => Some(ButtonStyle::Link),
            _ => None,
        }
    }
}

/// Which platform entity a select menu offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectKind {
    #[default]
    String,
    User,
    Role,
    Channel,
    Mentionable,
}

impl SelectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectKind::String => "string",
            SelectKind::User => "user",
            SelectKind::Role => "role",
            SelectKind::Channel => "channel",
            SelectKind::Mentionable => "mentionable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(SelectKind::String),
            "user" => Some(SelectKind::User),
            "role" => Some(SelectKind::Role),
            "channel" => Some(SelectKind::Channel),
            "mentionable" => Some(SelectKind::Mentionable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DividerSpacing {
    #[default]
    Small,
    Large,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOptionPayload {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<EmojiPayload>,
    #[serde(skip_serializing_if = "is_false")]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryItem {
    pub media: MediaRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub spoiler: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentPayload {
    ActionRow {
        components: Vec<ComponentPayload>,
    },
    Button {
        style: ButtonStyle,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        emoji: Option<EmojiPayload>,
        #[serde(skip_serializing_if = "Option::is_none")]
        custom_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "is_false")]
        disabled: bool,
    },
    StringSelect {
        custom_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        min_values: u8,
        max_values: u8,
        #[serde(skip_serializing_if = "is_false")]
        disabled: bool,
        options: Vec<SelectOptionPayload>,
    },
    TextDisplay {
        content: String,
    },
    Section {
        components: Vec<ComponentPayload>,
        accessory: Box<ComponentPayload>,
    },
    Thumbnail {
        media: MediaRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "is_false")]
        spoiler: bool,
    },
    MediaGallery {
        items: Vec<GalleryItem>,
    },
    File {
        file: MediaRef,
        #[serde(skip_serializing_if = "is_false")]
        spoiler: bool,
    },
    Separator {
        divider: bool,
        spacing: DividerSpacing,
    },
    Container {
        #[serde(skip_serializing_if = "Option::is_none")]
        accent_color: Option<u32>,
        #[serde(skip_serializing_if = "is_false")]
        spoiler: bool,
        components: Vec<ComponentPayload>,
    },
}

impl ComponentPayload {
    /// Custom ids of every interactive component in this subtree.
    pub fn custom_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_custom_ids(&mut ids);
        ids
    }

    fn collect_custom_ids(&self, ids: &mut Vec<String>) {
        match self {
            ComponentPayload::Button {
                custom_id: Some(id),
                ..
            }
            | ComponentPayload::StringSelect { custom_id: id, .. } => ids.push(id.clone()),
            ComponentPayload::ActionRow { components }
            | ComponentPayload::Container { components, .. } => {
                for component in components {
                    component.collect_custom_ids(ids);
                }
            }
            ComponentPayload::Section {
                components,
                accessory,
            } => {
                for component in components {
                    component.collect_custom_ids(ids);
                }
                accessory.collect_custom_ids(ids);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollAnswerPayload {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<EmojiPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollPayload {
    pub question: String,
    pub answers: Vec<PollAnswerPayload>,
    pub duration_hours: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub allow_multiselect: bool,
}
