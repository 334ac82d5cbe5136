//! Node data payloads and their minimal diff.

use crate::api::client::ComponentEvent;
use crate::api::MediaSource;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Prop names shared by the element builders and the page serializer.
pub mod keys {
    pub const CONTENT: &str = "content";
    pub const LABEL: &str = "label";
    pub const STYLE: &str = "style";
    pub const URL: &str = "url";
    pub const DISABLED: &str = "disabled";
    pub const ON_CLICK: &str = "on_click";
    pub const ON_SELECT: &str = "on_select";
    pub const PLACEHOLDER: &str = "placeholder";
    pub const MIN_VALUES: &str = "min_values";
    pub const MAX_VALUES: &str = "max_values";
    pub const SELECT_KIND: &str = "select_kind";
    pub const VALUE: &str = "value";
    pub const DESCRIPTION: &str = "description";
    pub const DEFAULT: &str = "default";
    pub const NAME: &str = "name";
    pub const EMOJI_ID: &str = "emoji_id";
    pub const ANIMATED: &str = "animated";
    pub const EMOJI: &str = "emoji";
    pub const TITLE: &str = "title";
    pub const COLOR: &str = "color";
    pub const TIMESTAMP: &str = "timestamp";
    pub const AUTHOR_NAME: &str = "author_name";
    pub const AUTHOR_URL: &str = "author_url";
    pub const AUTHOR_ICON: &str = "author_icon";
    pub const FOOTER_TEXT: &str = "footer_text";
    pub const FOOTER_ICON: &str = "footer_icon";
    pub const INLINE: &str = "inline";
    pub const SRC: &str = "src";
    pub const SPOILER: &str = "spoiler";
    pub const ACCENT_COLOR: &str = "accent_color";
    pub const SPACING: &str = "spacing";
    pub const VISIBLE: &str = "visible";
    pub const QUESTION: &str = "question";
    pub const DURATION_HOURS: &str = "duration_hours";
    pub const MULTISELECT: &str = "multiselect";
    pub const TEXT: &str = "text";
    pub const USERS: &str = "users";
}

/// A component callback. Equality is identity, so a closure rebuilt on every
/// render always shows up in the delta.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(ComponentEvent) -> BoxFuture<'static, ()> + Send + Sync>);

impl Handler {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |event| callback(event).boxed()))
    }

    pub fn call(&self, event: ComponentEvent) -> BoxFuture<'static, ()> {
        (self.0)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
    Media(MediaSource),
    Time(DateTime<Utc>),
    Handler(Handler),
}

macro_rules! impl_from_prop {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for PropValue {
            fn from(value: $ty) -> Self {
                PropValue::$variant(value.into())
            }
        })*
    };
}

impl_from_prop! {
    bool => Bool,
    i64 => Int,
    u32 => Int,
    u8 => Int,
    f64 => Float,
    String => Str,
    &str => Str,
    Vec<String> => List,
    MediaSource => Media,
    DateTime<Utc> => Time,
    Handler => Handler,
}

pub type Props = BTreeMap<&'static str, PropValue>;

/// Changed keys only. `None` marks a key the new props no longer carry.
pub type PropDelta = BTreeMap<&'static str, Option<PropValue>>;

/// Computes the minimal delta between two prop sets; `None` when nothing changed.
pub fn diff_props(old: &Props, new: &Props) -> Option<PropDelta> {
    let mut delta = PropDelta::new();
    for (key, old_value) in old {
        match new.get(key) {
            Some(new_value) if new_value == old_value => {}
            Some(new_value) => {
                delta.insert(*key, Some(new_value.clone()));
            }
            None => {
                delta.insert(*key, None);
            }
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            delta.insert(*key, Some(new_value.clone()));
        }
    }
    (!delta.is_empty()).then_some(delta)
}

pub fn apply_delta(props: &mut Props, delta: &PropDelta) {
    for (key, value) in delta {
        match value {
            Some(value) => {
                props.insert(*key, value.clone());
            }
            None => {
                props.remove(key);
            }
        }
    }
}

/// Typed reads over a prop map.
pub trait PropsExt {
    fn str(&self, key: &str) -> Option<&str>;
    fn flag(&self, key: &str) -> bool;
    fn int(&self, key: &str) -> Option<i64>;
    fn list(&self, key: &str) -> Option<&[String]>;
    fn media(&self, key: &str) -> Option<&MediaSource>;
    fn time(&self, key: &str) -> Option<DateTime<Utc>>;
    fn handler(&self, key: &str) -> Option<&Handler>;
}

impl PropsExt for Props {
    fn str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(PropValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(PropValue::Bool(true)))
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(PropValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    fn list(&self, key: &str) -> Option<&[String]> {
        match self.get(key) {
            Some(PropValue::List(values)) => Some(values),
            _ => None,
        }
    }

    fn media(&self, key: &str) -> Option<&MediaSource> {
        match self.get(key) {
            Some(PropValue::Media(media)) => Some(media),
            _ => None,
        }
    }

    fn time(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.get(key) {
            Some(PropValue::Time(time)) => Some(*time),
            _ => None,
        }
    }

    fn handler(&self, key: &str) -> Option<&Handler> {
        match self.get(key) {
            Some(PropValue::Handler(handler)) => Some(handler),
            _ => None,
        }
    }
}
