//! Declarative descriptions of a component tree.
//!
//! Host elements map one-to-one onto retained nodes; component elements are
//! functions of a [`Scope`] evaluated on every render pass.

use super::scope::Scope;
use crate::api::client::ComponentEvent;
use crate::api::{ButtonStyle, DividerSpacing, MediaSource, SelectKind};
use crate::core::tree::props::keys;
use crate::core::tree::{Handler, NodeKind, PropValue, Props};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type RenderFn = Arc<dyn Fn(&mut Scope<'_>) -> Element + Send + Sync>;

#[derive(Clone, Default)]
pub enum Element {
    Host(HostElement),
    Component(ComponentElement),
    Fragment(Vec<Element>),
    #[default]
    Empty,
}

impl Element {
    pub(crate) fn key(&self) -> Option<&str> {
        match self {
            Element::Host(host) => host.key.as_deref(),
            Element::Component(component) => component.key.as_deref(),
            Element::Fragment(_) | Element::Empty => None,
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Host(host) => host.fmt(f),
            Element::Component(component) => write!(f, "<{}>", component.name),
            Element::Fragment(children) => f.debug_list().entries(children).finish(),
            Element::Empty => f.write_str("Empty"),
        }
    }
}

#[derive(Clone)]
pub struct HostElement {
    pub(crate) kind: NodeKind,
    pub(crate) key: Option<String>,
    pub(crate) props: Props,
    pub(crate) hidden: bool,
    pub(crate) children: Vec<Element>,
}

impl fmt::Debug for HostElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.kind.name())
            .field("key", &self.key)
            .field("props", &self.props)
            .field("hidden", &self.hidden)
            .field("children", &self.children)
            .finish()
    }
}

#[derive(Clone)]
pub struct ComponentElement {
    pub(crate) name: &'static str,
    pub(crate) key: Option<String>,
    pub(crate) render: RenderFn,
}

impl ComponentElement {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl From<HostElement> for Element {
    fn from(host: HostElement) -> Self {
        Element::Host(host)
    }
}

impl From<ComponentElement> for Element {
    fn from(component: ComponentElement) -> Self {
        Element::Component(component)
    }
}

impl<T: Into<Element>> From<Vec<T>> for Element {
    fn from(children: Vec<T>) -> Self {
        Element::Fragment(children.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Element>> From<Option<T>> for Element {
    fn from(child: Option<T>) -> Self {
        child.map_or(Element::Empty, Into::into)
    }
}

impl HostElement {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            hidden: false,
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Hides the node without unmounting it.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn prop(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.props.insert(name, value.into());
        self
    }

    fn maybe_prop(self, name: &'static str, value: Option<impl Into<PropValue>>) -> Self {
        match value {
            Some(value) => self.prop(name, value),
            None => self,
        }
    }

    pub fn child(mut self, child: impl Into<Element>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, T>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Element>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    pub fn style(self, style: ButtonStyle) -> Self {
        self.prop(keys::STYLE, style.as_str())
    }

    pub fn disabled(self, disabled: bool) -> Self {
        self.prop(keys::DISABLED, disabled)
    }

    pub fn url(self, url: impl Into<String>) -> Self {
        self.prop(keys::URL, url.into())
    }

    pub fn label(self, label: impl Into<String>) -> Self {
        self.prop(keys::LABEL, label.into())
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.prop(keys::DESCRIPTION, description.into())
    }

    pub fn title(self, title: impl Into<String>) -> Self {
        self.prop(keys::TITLE, title.into())
    }

    pub fn color(self, color: u32) -> Self {
        self.prop(keys::COLOR, color)
    }

    pub fn timestamp(self, timestamp: DateTime<Utc>) -> Self {
        self.prop(keys::TIMESTAMP, timestamp)
    }

    pub fn author(self, name: impl Into<String>, url: Option<String>, icon: Option<String>) -> Self {
        self.prop(keys::AUTHOR_NAME, name.into())
            .maybe_prop(keys::AUTHOR_URL, url)
            .maybe_prop(keys::AUTHOR_ICON, icon)
    }

    pub fn footer(self, text: impl Into<String>, icon: Option<String>) -> Self {
        self.prop(keys::FOOTER_TEXT, text.into())
            .maybe_prop(keys::FOOTER_ICON, icon)
    }

    pub fn inline(self, inline: bool) -> Self {
        self.prop(keys::INLINE, inline)
    }

    pub fn spoiler(self, spoiler: bool) -> Self {
        self.prop(keys::SPOILER, spoiler)
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.prop(keys::NAME, name.into())
    }

    /// Emoji shown on a button, option or poll answer.
    pub fn emoji(self, emoji: impl Into<String>) -> Self {
        self.prop(keys::EMOJI, emoji.into())
    }

    pub fn placeholder(self, placeholder: impl Into<String>) -> Self {
        self.prop(keys::PLACEHOLDER, placeholder.into())
    }

    pub fn values_range(self, min: u8, max: u8) -> Self {
        self.prop(keys::MIN_VALUES, min).prop(keys::MAX_VALUES, max)
    }

    pub fn select_kind(self, kind: SelectKind) -> Self {
        self.prop(keys::SELECT_KIND, kind.as_str())
    }

    pub fn selected(self, selected: bool) -> Self {
        self.prop(keys::DEFAULT, selected)
    }

    pub fn accent_color(self, color: u32) -> Self {
        self.prop(keys::ACCENT_COLOR, color)
    }

    pub fn spacing(self, spacing: DividerSpacing) -> Self {
        let value = match spacing {
            DividerSpacing::Small => "small",
            DividerSpacing::Large => "large",
        };
        self.prop(keys::SPACING, value)
    }

    pub fn line(self, visible: bool) -> Self {
        self.prop(keys::VISIBLE, visible)
    }

    pub fn duration_hours(self, hours: u32) -> Self {
        self.prop(keys::DURATION_HOURS, hours)
    }

    pub fn multiselect(self, multiselect: bool) -> Self {
        self.prop(keys::MULTISELECT, multiselect)
    }

    pub fn on_click<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.prop(keys::ON_CLICK, Handler::new(callback))
    }

    /// Select callback; on an option it fires when that option is picked.
    pub fn on_select<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.prop(keys::ON_SELECT, Handler::new(callback))
    }
}

pub fn text(content: impl Into<String>) -> HostElement {
    HostElement::new(NodeKind::Text).prop(keys::CONTENT, content.into())
}

pub fn rich_text<I, T>(children: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::RichText).children(children)
}

/// Unicode emoji, or a custom one when `id` is set.
pub fn emoji(name: impl Into<String>) -> HostElement {
    HostElement::new(NodeKind::Emoji).prop(keys::NAME, name.into())
}

pub fn custom_emoji(name: impl Into<String>, id: impl Into<String>, animated: bool) -> HostElement {
    emoji(name)
        .prop(keys::EMOJI_ID, id.into())
        .prop(keys::ANIMATED, animated)
}

pub fn button(label: impl Into<String>) -> HostElement {
    HostElement::new(NodeKind::Button).label(label)
}

pub fn link_button(label: impl Into<String>, url: impl Into<String>) -> HostElement {
    button(label).style(ButtonStyle::Link).url(url)
}

pub fn select<I, T>(options: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::Select).children(options)
}

pub fn select_option(label: impl Into<String>, value: impl Into<String>) -> HostElement {
    HostElement::new(NodeKind::SelectOption)
        .label(label)
        .prop(keys::VALUE, value.into())
}

pub fn action_row<I, T>(children: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::ActionRow).children(children)
}

pub fn embed() -> HostElement {
    HostElement::new(NodeKind::Embed)
}

pub fn field(name: impl Into<String>, value: impl Into<String>) -> HostElement {
    HostElement::new(NodeKind::Field)
        .name(name)
        .prop(keys::VALUE, value.into())
}

pub fn thumbnail(src: MediaSource) -> HostElement {
    HostElement::new(NodeKind::Thumbnail).prop(keys::SRC, src)
}

pub fn image(src: MediaSource) -> HostElement {
    HostElement::new(NodeKind::Image).prop(keys::SRC, src)
}

pub fn file(name: impl Into<String>, src: MediaSource) -> HostElement {
    HostElement::new(NodeKind::File)
        .name(name)
        .prop(keys::SRC, src)
}

pub fn gallery<I, T>(images: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::Gallery).children(images)
}

pub fn container<I, T>(children: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::Container).children(children)
}

pub fn section<I, T>(children: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::Section).children(children)
}

pub fn accessory(child: impl Into<Element>) -> HostElement {
    HostElement::new(NodeKind::Accessory).child(child)
}

pub fn divider() -> HostElement {
    HostElement::new(NodeKind::Divider)
}

pub fn poll<I, T>(question: impl Into<String>, answers: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::Poll)
        .prop(keys::QUESTION, question.into())
        .children(answers)
}

pub fn answer(text: impl Into<String>) -> HostElement {
    HostElement::new(NodeKind::Answer).prop(keys::TEXT, text.into())
}

/// Restricts every interactive node below to the listed user ids.
pub fn whitelist<U, S, I, T>(users: U, children: I) -> HostElement
where
    U: IntoIterator<Item = S>,
    S: Into<String>,
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    let users: Vec<String> = users.into_iter().map(Into::into).collect();
    HostElement::new(NodeKind::Whitelist)
        .prop(keys::USERS, users)
        .children(children)
}

pub fn ephemeral<I, T>(children: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::Ephemeral).children(children)
}

/// Forces its children onto a message of their own.
pub fn message<I, T>(children: I) -> HostElement
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    HostElement::new(NodeKind::Message).children(children)
}

pub fn empty() -> HostElement {
    HostElement::new(NodeKind::Empty)
}

pub fn fragment<I, T>(children: I) -> Element
where
    I: IntoIterator<Item = T>,
    T: Into<Element>,
{
    Element::Fragment(children.into_iter().map(Into::into).collect())
}

/// A composable function of its scope. `name` scopes hook state, so two
/// different components at the same position never share it.
pub fn component<F>(name: &'static str, render: F) -> ComponentElement
where
    F: Fn(&mut Scope<'_>) -> Element + Send + Sync + 'static,
{
    ComponentElement {
        name,
        key: None,
        render: Arc::new(render),
    }
}
