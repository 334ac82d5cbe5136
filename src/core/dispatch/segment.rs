//! Splitting the committed tree into ordered pages.
//!
//! Top-level nodes are walked in order against a fixed list of stages. The
//! cursor only moves forward within a page: a node whose stage lies behind it,
//! or that no longer fits, closes the page and starts the next one. Wrapper
//! kinds match at any cursor position and forward to their children, and a
//! `Message` wrapper always sits on pages of its own.

use super::serialize::{add_to_page, fits};
use crate::api::Page;
use crate::core::constants::CONTENT_LIMIT;
use crate::core::tree::{Node, NodeKind, Tree, TreeError};
use crate::utils::text::truncate_chars;
use tracing::trace;

pub(crate) struct Stage {
    pub(crate) name: &'static str,
    pub(crate) kinds: &'static [NodeKind],
}

pub(crate) const STAGES: &[Stage] = &[
    Stage {
        name: "text",
        kinds: &[NodeKind::Text, NodeKind::RichText, NodeKind::Emoji],
    },
    Stage {
        name: "attachments",
        kinds: &[NodeKind::Image, NodeKind::File],
    },
    Stage {
        name: "embeds",
        kinds: &[NodeKind::Embed],
    },
    Stage {
        name: "poll",
        kinds: &[NodeKind::Poll],
    },
    Stage {
        name: "components",
        kinds: &[
            NodeKind::ActionRow,
            NodeKind::Button,
            NodeKind::Select,
            NodeKind::Container,
            NodeKind::Section,
            NodeKind::Divider,
            NodeKind::Gallery,
        ],
    },
];

/// Kinds that match at any cursor position.
const UNORDERED: &[NodeKind] = &[NodeKind::Empty, NodeKind::Whitelist, NodeKind::Ephemeral];

/// Kinds that always start and end a page.
const PAGE_BREAKS: &[NodeKind] = &[NodeKind::Message];

pub(crate) fn stage_of(kind: NodeKind) -> Option<usize> {
    STAGES.iter().position(|stage| stage.kinds.contains(&kind))
}

struct Segmenter<'t> {
    tree: &'t Tree,
    pages: Vec<Page>,
    page: Page,
    cursor: usize,
    ephemeral: usize,
}

impl<'t> Segmenter<'t> {
    fn flush(&mut self) {
        let mut page = std::mem::take(&mut self.page);
        self.cursor = 0;
        if page.is_empty() {
            return;
        }
        page.finish();
        page.content = truncate_chars(&page.content, CONTENT_LIMIT);
        self.pages.push(page);
    }

    fn visit_all(&mut self, nodes: impl Iterator<Item = &'t Node>) -> Result<(), TreeError> {
        for node in nodes {
            self.visit(node)?;
        }
        Ok(())
    }

    fn visit(&mut self, node: &'t Node) -> Result<(), TreeError> {
        let kind = node.kind();
        let tree = self.tree;
        if PAGE_BREAKS.contains(&kind) {
            self.flush();
            self.visit_all(tree.visible_children(node))?;
            self.flush();
            return Ok(());
        }
        if UNORDERED.contains(&kind) {
            if kind == NodeKind::Ephemeral {
                self.ephemeral += 1;
                let result = self.visit_all(tree.visible_children(node));
                self.ephemeral -= 1;
                return result;
            }
            return self.visit_all(tree.visible_children(node));
        }
        let stage = stage_of(kind).ok_or(TreeError::TypeMismatch {
            parent: None,
            expected: NodeKind::root_accepted(),
            found: kind,
        })?;
        if stage < self.cursor {
            trace!(stage = STAGES[stage].name, cursor = STAGES[self.cursor].name, "stage behind cursor; new page");
            self.flush();
        } else if !fits(tree, node, &self.page) {
            trace!(%kind, "page full; new page");
            self.flush();
        }
        self.cursor = stage;
        add_to_page(tree, node, &mut self.page)?;
        if self.ephemeral > 0 {
            self.page.flags.ephemeral = true;
        }
        Ok(())
    }
}

/// Recomputes every page from the committed tree. Empty pages are dropped.
pub fn compute_pages(tree: &Tree) -> Result<Vec<Page>, TreeError> {
    let mut segmenter = Segmenter {
        tree,
        pages: Vec::new(),
        page: Page::default(),
        cursor: 0,
        ephemeral: 0,
    };
    segmenter.visit_all(tree.visible_roots())?;
    segmenter.flush();
    Ok(segmenter.pages)
}
