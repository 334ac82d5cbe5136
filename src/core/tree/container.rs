use super::{Mutation, Tree, TreeError};
use crate::api::Attachment;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// The retained render root: the committed tree plus dispatch bookkeeping.
#[derive(Default)]
pub struct Container {
    tree: Tree,
    /// Upload fingerprints keyed by (page index, file name).
    attachments: HashMap<(usize, String), u32>,
    bound: HashSet<String>,
    on_change: Option<ChangeCallback>,
    commits: u64,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("nodes", &self.tree.len())
            .field("bound", &self.bound.len())
            .field("commits", &self.commits)
            .finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_change(on_change: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_change: Some(Box::new(on_change)),
            ..Self::default()
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Applies one render pass atomically and notifies `on_change` once.
    ///
    /// A failing mutation leaves the committed tree untouched. The first commit
    /// always notifies, even when empty, so the dispatcher can acknowledge.
    pub fn commit(&mut self, mutations: Vec<Mutation>) -> Result<usize, TreeError> {
        let count = mutations.len();
        if count > 0 {
            let mut next = self.tree.clone();
            for mutation in mutations {
                next.apply(mutation)?;
            }
            self.tree = next;
        }
        let first = self.commits == 0;
        self.commits += 1;
        if count > 0 || first {
            debug!(mutations = count, commit = self.commits, "tree committed");
            if let Some(on_change) = &self.on_change {
                on_change();
            }
        }
        Ok(count)
    }

    pub fn is_bound(&self, custom_id: &str) -> bool {
        self.bound.contains(custom_id)
    }

    /// Marks a custom id as listened for; false if it already was.
    pub fn bind(&mut self, custom_id: impl Into<String>) -> bool {
        self.bound.insert(custom_id.into())
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    /// Whether the message at `page` already carries this exact file.
    pub fn has_attachment(&self, page: usize, attachment: &Attachment) -> bool {
        self.attachments
            .get(&(page, attachment.name.clone()))
            .is_some_and(|fingerprint| *fingerprint == attachment.source.fingerprint())
    }

    pub fn record_attachments(&mut self, page: usize, attachments: &[Attachment]) {
        self.attachments.retain(|(index, _), _| *index != page);
        for attachment in attachments {
            self.attachments.insert(
                (page, attachment.name.clone()),
                attachment.source.fingerprint(),
            );
        }
    }
}
