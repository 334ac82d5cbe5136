use std::fmt;

/// Every renderable node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    RichText,
    Emoji,
    Button,
    Select,
    SelectOption,
    ActionRow,
    Embed,
    Field,
    Thumbnail,
    Image,
    File,
    Gallery,
    Container,
    Section,
    Accessory,
    Divider,
    Poll,
    Answer,
    Whitelist,
    Ephemeral,
    Message,
    Empty,
}

use NodeKind::*;

const NOTHING: &[NodeKind] = &[];
const INLINE_TEXT: &[NodeKind] = &[Text, Emoji];

/// Kinds allowed directly under the render root (and under page-level wrappers).
const TOP_LEVEL: &[NodeKind] = &[
    Text, RichText, Emoji, Button, Select, ActionRow, Embed, Image, File, Gallery, Container,
    Section, Divider, Poll, Whitelist, Ephemeral, Message, Empty,
];

const SCOPED: &[NodeKind] = &[
    Text, RichText, Emoji, Button, Select, ActionRow, Embed, Image, File, Gallery, Container,
    Section, Divider, Poll, Whitelist, Ephemeral, Empty,
];

const IN_CONTAINER: &[NodeKind] = &[
    Text, RichText, ActionRow, Section, Divider, Gallery, File, Whitelist, Empty,
];

impl NodeKind {
    pub const fn name(self) -> &'static str {
        match self {
            Text => "Text",
            RichText => "RichText",
            Emoji => "Emoji",
            Button => "Button",
            Select => "Select",
            SelectOption => "SelectOption",
            ActionRow => "ActionRow",
            Embed => "Embed",
            Field => "Field",
            Thumbnail => "Thumbnail",
            Image => "Image",
            File => "File",
            Gallery => "Gallery",
            Container => "Container",
            Section => "Section",
            Accessory => "Accessory",
            Divider => "Divider",
            Poll => "Poll",
            Answer => "Answer",
            Whitelist => "Whitelist",
            Ephemeral => "Ephemeral",
            Message => "Message",
            Empty => "Empty",
        }
    }

    /// Child kinds this node may hold.
    pub fn accepted(self) -> &'static [NodeKind] {
        match self {
            RichText | Button | SelectOption => INLINE_TEXT,
            Select => &[SelectOption],
            ActionRow => &[Button, Select, Whitelist, Empty],
            Embed => &[Image, Thumbnail, Field],
            Gallery => &[Image],
            Container => IN_CONTAINER,
            Section => &[Text, RichText, Accessory],
            Accessory => &[Button, Thumbnail],
            Poll => &[Answer],
            Whitelist => SCOPED,
            Ephemeral => SCOPED,
            Message => SCOPED,
            Text | Emoji | Field | Thumbnail | Image | File | Divider | Answer | Empty => NOTHING,
        }
    }

    pub fn accepts(self, child: NodeKind) -> bool {
        self.accepted().contains(&child)
    }

    /// Child kinds the render root accepts.
    pub fn root_accepted() -> &'static [NodeKind] {
        TOP_LEVEL
    }

    pub fn root_accepts(child: NodeKind) -> bool {
        TOP_LEVEL.contains(&child)
    }

    /// Nodes that carry a callback and get a stable custom id.
    pub const fn is_interactive(self) -> bool {
        matches!(self, Button | Select)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
