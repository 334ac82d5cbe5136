use super::element::Element;
use super::reconcile::{evaluate, Reconciler};
use super::scope::{RenderRequest, RenderRequester, RenderState};
use crate::api::client::Interaction;
use crate::api::Page;
use crate::core::dispatch::{compute_pages, DispatchHandle, Dispatcher};
use crate::core::tree::{Container, Mutation, Tree, TreeError};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A mounted element tree answering one interaction.
///
/// Mounting spawns two tasks on the current tokio runtime: the render loop,
/// which evaluates and commits passes, and the dispatch queue, which turns
/// each commit into platform calls.
pub struct Root {
    container: Arc<Mutex<Container>>,
    requester: RenderRequester,
    ready: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl Root {
    pub fn mount(interaction: Arc<dyn Interaction>, app: impl Into<Element>) -> Self {
        let app = app.into();
        let cancel = CancellationToken::new();
        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let requester = RenderRequester::new(render_tx);

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let notifier = DispatchHandle::new(dispatch_tx);
        let container = Arc::new(Mutex::new(Container::with_on_change(move || {
            notifier.notify();
        })));

        let (ready_tx, ready_rx) = watch::channel(false);
        Dispatcher::new(interaction, container.clone(), requester.clone(), ready_tx)
            .spawn(dispatch_rx, cancel.clone());

        let state = RenderState::new(requester.clone());
        tokio::spawn(run_render_loop(
            app,
            state,
            container.clone(),
            render_rx,
            cancel.clone(),
        ));

        Self {
            container,
            requester,
            ready: ready_rx,
            cancel,
        }
    }

    /// Resolves once the first dispatch task has settled.
    pub async fn ready(&self) {
        let mut ready = self.ready.clone();
        if ready.wait_for(|ready| *ready).await.is_err() {
            debug!("root stopped before its first dispatch");
        }
    }

    pub fn requester(&self) -> RenderRequester {
        self.requester.clone()
    }

    pub fn container(&self) -> Arc<Mutex<Container>> {
        self.container.clone()
    }

    /// Pages the committed tree currently segments into.
    pub async fn pages(&self) -> Result<Vec<Page>, TreeError> {
        let container = self.container.lock().await;
        compute_pages(container.tree())
    }

    /// Stops rendering, dispatching and listening for component events.
    pub fn unmount(&self) {
        self.cancel.cancel();
    }
}

/// Evaluates `app` once into a detached tree, with no client attached.
/// Components that suspend contribute nothing; hooks that spawn work still
/// need a tokio runtime.
pub fn render_once(app: impl Into<Element>) -> Result<Tree, TreeError> {
    let mut container = Container::new();
    container.commit(mount_mutations(&app.into()))?;
    Ok(container.tree().clone())
}

/// The mutation log that mounts `app` onto an empty tree.
pub(crate) fn mount_mutations(app: &Element) -> Vec<Mutation> {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut state = RenderState::new(RenderRequester::new(tx));
    let rendered = evaluate(app, &mut state);
    Reconciler::new().diff(&Tree::new(), &rendered)
}

fn apply_request(state: &mut RenderState, request: RenderRequest) -> bool {
    match request {
        RenderRequest::Render => true,
        RenderRequest::BeginSession => {
            state.begin_session();
            false
        }
        RenderRequest::ResourceReady {
            session,
            key,
            value,
        } => state.resolve(session, key, value),
    }
}

async fn run_render_loop(
    app: Element,
    mut state: RenderState,
    container: Arc<Mutex<Container>>,
    mut requests: mpsc::UnboundedReceiver<RenderRequest>,
    cancel: CancellationToken,
) {
    let mut reconciler = Reconciler::new();
    render_pass(&app, &mut state, &mut reconciler, &container).await;

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        let mut dirty = apply_request(&mut state, request);
        // Coalesce whatever queued up while the last pass ran.
        while let Ok(request) = requests.try_recv() {
            dirty |= apply_request(&mut state, request);
        }
        if dirty {
            render_pass(&app, &mut state, &mut reconciler, &container).await;
        }
    }
    debug!("render loop stopped");
}

async fn render_pass(
    app: &Element,
    state: &mut RenderState,
    reconciler: &mut Reconciler,
    container: &Mutex<Container>,
) {
    let rendered = evaluate(app, state);
    let mut container = container.lock().await;
    let mutations = reconciler.diff(container.tree(), &rendered);
    match container.commit(mutations) {
        Ok(count) => debug!(
            mutations = count,
            suspended = state.suspended_scopes().len(),
            session = %state.session_id(),
            "render pass committed"
        ),
        Err(err) => {
            warn!(error = %err, "render pass aborted");
            if container.commits() == 0 {
                // Still let the dispatcher acknowledge the interaction.
                let _ = container.commit(Vec::new());
            }
        }
    }
}
