use super::segment::{stage_of, STAGES};
use super::*;
use crate::api::client::OutboundMessage;
use crate::api::{ComponentPayload, MediaSource, SelectKind};
use crate::core::constants::CONTENT_LIMIT;
use crate::core::render::element::*;
use crate::core::render::{mount_mutations, render_once, Element, RenderRequester, Root};
use crate::core::tree::props::keys;
use crate::core::tree::{Container, Mutation, Node, NodeKind, PropValue, PropsExt, Tree, TreeError};
use crate::utils::test_utils::{eventually, Call, FakeClient};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

fn pages_of(app: impl Into<Element>) -> Vec<crate::api::Page> {
    let tree = render_once(app).expect("valid tree");
    compute_pages(&tree).expect("serializable tree")
}

fn walk(tree: &Tree) -> Vec<&Node> {
    fn visit<'t>(tree: &'t Tree, ids: &[crate::core::tree::NodeId], out: &mut Vec<&'t Node>) {
        for id in ids {
            if let Some(node) = tree.get(*id) {
                out.push(node);
                visit(tree, node.children(), out);
            }
        }
    }
    let mut out = Vec::new();
    visit(tree, tree.roots(), &mut out);
    out
}

fn custom_id_of(tree: &Tree, label: &str) -> String {
    walk(tree)
        .into_iter()
        .find(|node| node.props().str(keys::LABEL) == Some(label))
        .and_then(|node| node.custom_id())
        .map(str::to_string)
        .expect("labelled interactive node")
}

fn node_with_content(tree: &Tree, content: &str) -> crate::core::tree::NodeId {
    walk(tree)
        .into_iter()
        .find(|node| node.props().str(keys::CONTENT) == Some(content))
        .map(|node| node.id())
        .expect("text node")
}

async fn set_content(container: &Mutex<Container>, from: &str, to: &str) {
    let mut container = container.lock().await;
    let id = node_with_content(container.tree(), from);
    let delta = BTreeMap::from([(keys::CONTENT, Some(PropValue::from(to)))]);
    container.commit(vec![Mutation::Update { id, delta }]).unwrap();
}

fn dispatcher(client: &Arc<FakeClient>, app: impl Into<Element>) -> (Dispatcher, Arc<Mutex<Container>>) {
    let mut container = Container::new();
    container
        .commit(mount_mutations(&app.into()))
        .expect("valid tree");
    let container = Arc::new(Mutex::new(container));
    let (tx, _rx) = mpsc::unbounded_channel();
    let (ready, _) = watch::channel(false);
    let dispatcher = Dispatcher::new(
        client.interaction("alice"),
        container.clone(),
        RenderRequester::new(tx),
        ready,
    );
    (dispatcher, container)
}

#[test]
fn text_and_components_share_a_page() {
    let pages = pages_of(fragment([text("Hello!"), button("Go")]));
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].content, "Hello!");
    assert!(matches!(
        &pages[0].components[..],
        [ComponentPayload::ActionRow { components }] if components.len() == 1
    ));
}

#[test]
fn a_stage_behind_the_cursor_starts_a_new_page() {
    let pages = pages_of(fragment([text("one"), button("b"), text("two")]));
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].content, "one");
    assert_eq!(pages[1].content, "two");
    assert!(pages[1].components.is_empty());
}

#[test]
fn pages_follow_stage_descents_for_every_ordering() {
    fn make(kind: NodeKind, index: usize) -> HostElement {
        match kind {
            NodeKind::Text => text(format!("t{index}")),
            NodeKind::File => file(format!("f{index}.txt"), MediaSource::bytes(vec![index as u8])),
            NodeKind::Embed => embed().title(format!("e{index}")),
            NodeKind::Poll => poll(format!("p{index}"), [answer("yes")]),
            _ => button(format!("b{index}")),
        }
    }
    let kinds = [NodeKind::Text, NodeKind::File, NodeKind::Embed, NodeKind::Button];
    fn permutations(rest: Vec<usize>) -> Vec<Vec<usize>> {
        if rest.is_empty() {
            return vec![Vec::new()];
        }
        let mut out = Vec::new();
        for (i, head) in rest.iter().enumerate() {
            let mut tail = rest.clone();
            tail.remove(i);
            for mut ordering in permutations(tail) {
                ordering.insert(0, *head);
                out.push(ordering);
            }
        }
        out
    }
    let orderings = permutations((0..kinds.len()).collect());
    assert_eq!(orderings.len(), 24);

    for ordering in orderings {
        let stages: Vec<usize> = ordering
            .iter()
            .map(|i| stage_of(kinds[*i]).expect("staged kind"))
            .collect();
        let descents = stages.windows(2).filter(|pair| pair[1] < pair[0]).count();
        let app = fragment(ordering.iter().map(|i| make(kinds[*i], *i)));
        let tree = render_once(app).expect("valid tree");
        let pages = compute_pages(&tree).expect("serializable");
        assert_eq!(pages.len(), descents + 1, "ordering {ordering:?}");
        assert_eq!(compute_pages(&tree).expect("serializable"), pages);
    }
    assert_eq!(STAGES.len(), 5);
}

#[test]
fn forced_boundaries_win_over_stage_order() {
    let pages = pages_of(fragment([
        text("before").into(),
        Element::from(message([text("alone")])),
        text("after").into(),
    ]));
    let contents: Vec<_> = pages.iter().map(|page| page.content.as_str()).collect();
    assert_eq!(contents, vec!["before", "alone", "after"]);

    // Even after the cursor reached the last stage.
    let pages = pages_of(fragment([
        Element::from(button("b")),
        message([text("alone")]).into(),
        button("c").into(),
    ]));
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[1].content, "alone");
}

#[test]
fn capacity_limits_split_pages() {
    let pages = pages_of(fragment((0..11).map(|i| embed().title(format!("e{i}")))));
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].embeds.len(), 10);
    assert_eq!(pages[1].embeds.len(), 1);

    let pages = pages_of(fragment((0..6).map(|i| button(format!("b{i}")))));
    assert_eq!(pages.len(), 1);
    let rows: Vec<usize> = pages[0]
        .components
        .iter()
        .map(|row| match row {
            ComponentPayload::ActionRow { components } => components.len(),
            _ => 0,
        })
        .collect();
    assert_eq!(rows, vec![5, 1]);

    let pages = pages_of(fragment((0..6).map(|i| action_row([button(format!("r{i}"))]))));
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].components.len(), 5);
}

#[test]
fn remote_media_becomes_a_link() {
    let pages = pages_of(fragment([
        image(MediaSource::Url("https://cdn.example/cat.png".into())),
        image(MediaSource::Url("https://cdn.example/secret.png".into())).spoiler(true),
        image(MediaSource::bytes(vec![1, 2, 3])).name("dog.png"),
    ]));
    assert_eq!(pages.len(), 1);
    assert_eq!(
        pages[0].content,
        "https://cdn.example/cat.png\n||https://cdn.example/secret.png||"
    );
    assert_eq!(pages[0].files.len(), 1);
    assert_eq!(pages[0].files[0].name, "dog.png");
}

#[test]
fn layout_pages_move_text_into_a_display_component() {
    let pages = pages_of(fragment([
        text("intro").into(),
        Element::from(container([text("inside")]).accent_color(0xff0000)),
    ]));
    assert_eq!(pages.len(), 1);
    let page = &pages[0];
    assert!(page.flags.components_v2);
    assert!(page.content.is_empty());
    assert_eq!(
        page.components[0],
        ComponentPayload::TextDisplay {
            content: "intro".into()
        }
    );
    assert!(matches!(
        &page.components[1],
        ComponentPayload::Container { accent_color: Some(0xff0000), components, .. }
            if components.len() == 1
    ));
}

#[test]
fn long_content_is_truncated() {
    let pages = pages_of(text("x".repeat(CONTENT_LIMIT + 50)));
    assert_eq!(pages[0].content.chars().count(), CONTENT_LIMIT);
    assert!(pages[0].content.ends_with('…'));
}

#[test]
fn content_limit_counts_chars_not_graphemes() {
    let accented = "e\u{301}".repeat(CONTENT_LIMIT * 3 / 4);
    let pages = pages_of(text(accented));
    let content = &pages[0].content;
    assert!(content.chars().count() <= CONTENT_LIMIT);
    assert!(content.ends_with('…'));
    assert!(content.trim_end_matches('…').ends_with("e\u{301}"));
}

#[test]
fn hidden_and_ephemeral_nodes() {
    let pages = pages_of(fragment([
        text("shown").into(),
        Element::from(text("gone").hidden(true)),
    ]));
    assert_eq!(pages[0].content, "shown");

    let pages = pages_of(ephemeral([text("psst")]));
    assert!(pages[0].flags.ephemeral);
}

#[test]
fn unsupported_select_kinds_are_reported() {
    let tree = render_once(select([select_option("a", "a")]).select_kind(SelectKind::User))
        .expect("valid tree");
    let err = compute_pages(&tree).unwrap_err();
    assert_eq!(err, TreeError::NotImplemented("user select menus".into()));
}

#[test]
fn sections_require_an_accessory() {
    let tree = render_once(section([text("lonely")])).expect("valid tree");
    assert!(matches!(
        compute_pages(&tree),
        Err(TreeError::MissingChild {
            parent: NodeKind::Section,
            ..
        })
    ));
}

#[test]
fn whitelists_are_inherited_through_rows_and_sections() {
    let tree = render_once(fragment([
        whitelist(
            ["a", "b"],
            [action_row([whitelist(["b", "c"], [button("row")])])],
        ),
        whitelist(["a"], [section([text("t"), accessory(button("side"))])]),
        button("open"),
    ]))
    .expect("valid tree");

    let row = find_interactive(&tree, &custom_id_of(&tree, "row")).expect("row button");
    assert_eq!(row.whitelist, Some(vec!["b".to_string()]));
    assert!(row.permits("b"));
    assert!(!row.permits("a"));
    assert!(!row.permits("c"));

    let side = find_interactive(&tree, &custom_id_of(&tree, "side")).expect("accessory button");
    assert!(side.permits("a"));
    assert!(!side.permits("b"));

    let open = find_interactive(&tree, &custom_id_of(&tree, "open")).expect("open button");
    assert!(open.permits("anyone"));
    assert!(find_interactive(&tree, "no-such-id").is_none());
}

#[test]
fn hidden_buttons_are_not_found() {
    let tree = render_once(button("ghost").hidden(true)).expect("valid tree");
    let id = custom_id_of(&tree, "ghost");
    assert!(find_interactive(&tree, &id).is_none());
}

#[tokio::test]
async fn single_text_is_one_reply() {
    let client = FakeClient::new();
    let root = Root::mount(client.interaction("alice"), text("Hello!"));
    root.ready().await;

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Call::Reply(message) => {
            assert_eq!(message.page.content, "Hello!");
            assert!(message.page.components.is_empty());
        }
        other => panic!("expected a reply, got {other:?}"),
    }
    root.unmount();
}

#[tokio::test]
async fn counter_click_edits_in_place() {
    let client = FakeClient::new();
    let app = component("Counter", |scope| {
        let count = scope.use_state(|| 0u32);
        let handle = count.clone();
        fragment([
            text(count.get().to_string()),
            button("+1").on_click(move |_| {
                let handle = handle.clone();
                async move { handle.update(|n| n + 1) }
            }),
        ])
    });
    let root = Root::mount(client.interaction("alice"), app);
    root.ready().await;
    eventually(|| client.has_listener("msg-1")).await;

    let custom_id = client.component_ids("msg-1").pop().expect("button id");
    client.click("msg-1", &custom_id, "alice", &[]);
    eventually(|| client.messages().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let messages = client.messages();
    assert_eq!(messages.len(), 2);
    match &messages[1] {
        Call::Edit { id, message } => {
            assert_eq!(id, "msg-1");
            assert_eq!(message.page.content, "1");
        }
        other => panic!("expected an edit, got {other:?}"),
    }
    assert_eq!(client.acknowledgements(), 1);
    assert_eq!(client.component_ids("msg-1"), vec![custom_id]);
    root.unmount();
}

#[tokio::test]
async fn whitelisted_button_ignores_other_users() {
    let client = FakeClient::new();
    let clicks = Arc::new(AtomicUsize::new(0));
    let counter = clicks.clone();
    let app = whitelist(
        ["A"],
        [button("secret").on_click(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })],
    );
    let root = Root::mount(client.interaction("A"), app);
    root.ready().await;
    eventually(|| client.has_listener("msg-1")).await;
    let commits = root.container().lock().await.commits();

    let custom_id = client.component_ids("msg-1").pop().expect("button id");
    client.click("msg-1", &custom_id, "B", &[]);
    client.click("msg-1", &custom_id, "A", &[]);
    eventually(|| clicks.load(Ordering::SeqCst) > 0).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(clicks.load(Ordering::SeqCst), 1);
    assert_eq!(client.messages().len(), 1);
    assert_eq!(client.acknowledgements(), 1);
    assert_eq!(root.container().lock().await.commits(), commits);
    root.unmount();
}

#[tokio::test]
async fn select_events_reach_the_select_and_the_picked_options() {
    let client = FakeClient::new();
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let (on_select, on_red, on_blue) = (log.clone(), log.clone(), log.clone());
    let app = select([
        select_option("Red", "red").on_select(move |_| {
            let log = on_red.clone();
            async move { log.lock().unwrap().push("red".to_string()) }
        }),
        select_option("Blue", "blue").on_select(move |_| {
            let log = on_blue.clone();
            async move { log.lock().unwrap().push("blue".to_string()) }
        }),
    ])
    .values_range(1, 2)
    .on_select(move |event| {
        let log = on_select.clone();
        async move { log.lock().unwrap().push(format!("select:{}", event.values.join(","))) }
    });
    let root = Root::mount(client.interaction("alice"), app);
    root.ready().await;
    eventually(|| client.has_listener("msg-1")).await;

    let custom_id = client.component_ids("msg-1").pop().expect("select id");
    client.click("msg-1", &custom_id, "alice", &["blue"]);
    eventually(|| client.acknowledgements() == 1).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["select:blue".to_string(), "blue".to_string()]
    );
    root.unmount();
}

#[tokio::test]
async fn an_empty_tree_only_defers() {
    let client = FakeClient::new();
    let (mut dispatcher, _container) = dispatcher(&client, Element::Empty);

    dispatcher.dispatch().await.unwrap();
    dispatcher.dispatch().await.unwrap();
    assert_eq!(client.calls(), vec![Call::Defer { ephemeral: false }]);
}

#[tokio::test]
async fn dispatch_is_idempotent() {
    let client = FakeClient::new();
    let (mut dispatcher, _container) =
        dispatcher(&client, fragment([text("a"), button("b"), text("c")]));

    dispatcher.dispatch().await.unwrap();
    let first = client.calls();
    assert!(matches!(&first[..], [Call::Reply(_), Call::FollowUp(_)]));

    dispatcher.dispatch().await.unwrap();
    assert_eq!(client.calls(), first);
}

#[tokio::test]
async fn only_changed_pages_are_edited_and_known_files_are_not_reuploaded() {
    let client = FakeClient::new();
    let (mut dispatcher, container) = dispatcher(
        &client,
        fragment([
            text("first").into(),
            Element::from(file("notes.txt", MediaSource::bytes(b"hello".to_vec()))),
            message([text("second")]).into(),
        ]),
    );
    dispatcher.dispatch().await.unwrap();
    assert_eq!(client.messages().len(), 2);

    set_content(&container, "first", "first, edited").await;
    dispatcher.dispatch().await.unwrap();

    let messages = client.messages();
    assert_eq!(messages.len(), 3);
    match &messages[2] {
        Call::Edit { id, message } => {
            assert_eq!(id, "msg-1");
            let OutboundMessage {
                page,
                uploads,
                retained,
            } = message;
            assert_eq!(page.content, "first, edited");
            assert!(uploads.is_empty());
            assert_eq!(retained, &vec!["notes.txt".to_string()]);
        }
        other => panic!("expected an edit of the first page, got {other:?}"),
    }
}

#[tokio::test]
async fn a_failed_send_is_retried_on_the_next_task() {
    let client = FakeClient::new();
    let (mut dispatcher, _container) = dispatcher(&client, text("retry me"));
    client.fail_next(1);

    let err = dispatcher.dispatch().await.unwrap_err();
    assert!(matches!(err, DispatchError::Client { index: 0, .. }));
    assert!(client.calls().is_empty());

    dispatcher.dispatch().await.unwrap();
    assert!(matches!(&client.calls()[..], [Call::Reply(_)]));
}

#[tokio::test]
async fn an_answered_interaction_gets_a_channel_message() {
    let client = FakeClient::new();
    client.mark_acknowledged();
    let (mut dispatcher, _container) = dispatcher(&client, text("late"));

    dispatcher.dispatch().await.unwrap();
    assert!(matches!(&client.calls()[..], [Call::Send(_)]));
}

#[tokio::test]
async fn a_tree_that_empties_clears_the_first_message() {
    let client = FakeClient::new();
    let (mut dispatcher, container) = dispatcher(&client, text("Loading..."));
    dispatcher.dispatch().await.unwrap();

    {
        let mut container = container.lock().await;
        let id = container.tree().roots()[0];
        container
            .commit(vec![Mutation::Hide { id, suspended: false }])
            .unwrap();
    }
    dispatcher.dispatch().await.unwrap();

    let messages = client.messages();
    assert_eq!(messages.len(), 2);
    match &messages[1] {
        Call::Edit { id, message } => {
            assert_eq!(id, "msg-1");
            assert!(message.page.is_empty());
        }
        other => panic!("expected the first message to be cleared, got {other:?}"),
    }

    dispatcher.dispatch().await.unwrap();
    assert_eq!(client.messages().len(), 2);
}

#[tokio::test]
async fn a_deleted_message_is_replaced_and_later_pages_still_update() {
    let client = FakeClient::new();
    let (mut dispatcher, container) = dispatcher(
        &client,
        fragment([text("first").into(), Element::from(message([text("second")]))]),
    );
    dispatcher.dispatch().await.unwrap();
    assert!(matches!(&client.calls()[..], [Call::Reply(_), Call::FollowUp(_)]));

    client.delete_message("msg-1");
    set_content(&container, "first", "first, again").await;
    set_content(&container, "second", "second, again").await;
    dispatcher.dispatch().await.unwrap();

    let messages = client.messages();
    assert_eq!(messages.len(), 4);
    match &messages[2] {
        Call::Send(message) => assert_eq!(message.page.content, "first, again"),
        other => panic!("expected a replacement message, got {other:?}"),
    }
    match &messages[3] {
        Call::Edit { id, message } => {
            assert_eq!(id, "msg-2");
            assert_eq!(message.page.content, "second, again");
        }
        other => panic!("expected the second page to be edited, got {other:?}"),
    }

    dispatcher.dispatch().await.unwrap();
    assert_eq!(client.messages().len(), 4);

    set_content(&container, "first, again", "first, third time").await;
    dispatcher.dispatch().await.unwrap();
    assert!(matches!(
        client.messages().last(),
        Some(Call::Edit { id, .. }) if id == "msg-3"
    ));
}

#[tokio::test]
async fn a_failing_edit_does_not_hold_back_later_pages() {
    let client = FakeClient::new();
    let (mut dispatcher, container) = dispatcher(
        &client,
        fragment([text("first").into(), Element::from(message([text("second")]))]),
    );
    dispatcher.dispatch().await.unwrap();

    set_content(&container, "first", "first, again").await;
    set_content(&container, "second", "second, again").await;
    client.fail_next(1);
    let err = dispatcher.dispatch().await.unwrap_err();
    assert!(matches!(err, DispatchError::Client { index: 0, .. }));
    assert!(matches!(
        client.messages().last(),
        Some(Call::Edit { id, message }) if id == "msg-2" && message.page.content == "second, again"
    ));

    dispatcher.dispatch().await.unwrap();
    assert!(matches!(
        client.messages().last(),
        Some(Call::Edit { id, message }) if id == "msg-1" && message.page.content == "first, again"
    ));
}

#[tokio::test]
async fn a_malformed_first_render_still_defers() {
    let client = FakeClient::new();
    let root = Root::mount(client.interaction("alice"), action_row([text("not a component")]));
    root.ready().await;

    assert_eq!(client.calls(), vec![Call::Defer { ephemeral: false }]);
    root.unmount();
}
