//! Screen session scenarios against the in-memory store.
//!
//! Each test drives a [`StreamCoordinator`] the way a screen would (start,
//! scroll, background, stop) while the store changes underneath it, and
//! checks both the rendered collections and the subscriptions left open.

use std::sync::Arc;

use chatsync_app::{CoordinatorConfig, Lifecycle, SessionUpdate, StreamCoordinator};
use chatsync_core::{
    ChatKind, EntityKind, Query, StoreError, StorePath, Subscription, SubscriptionKey, WindowPhase,
    path,
};
use chatsync_harness::{InvariantRegistry, MemoryStore, SessionSnapshot};
use serde_json::json;

fn session(config: CoordinatorConfig) -> (Arc<MemoryStore>, StreamCoordinator<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = StreamCoordinator::new(Arc::clone(&store), "me", config).unwrap();
    (store, coordinator)
}

fn seed_messages(store: &MemoryStore, chat_id: &str, count: i64) {
    for ts in 1..=count {
        store.seed(
            &path::message(chat_id, &format!("m{ts:02}")),
            json!({ "sender": "u1", "text": format!("text {ts}"), "timestamp": ts }),
        );
    }
}

fn timestamps(coordinator: &StreamCoordinator<MemoryStore>, chat_id: &str) -> Vec<i64> {
    coordinator.messages(chat_id).unwrap().iter().map(|m| m.timestamp_millis).collect()
}

fn last_query(store: &MemoryStore) -> Query {
    match store.history().pop() {
        Some(Subscription::Children(query)) => query,
        other => panic!("expected a child subscription, got {other:?}"),
    }
}

fn message_window(chat_id: &str, n: usize) -> Query {
    Query::at(path::messages(chat_id)).order_by_child("timestamp").limit_to_last(n)
}

fn assert_invariants(store: &MemoryStore, coordinator: &StreamCoordinator<MemoryStore>) {
    let snapshot = SessionSnapshot::capture(coordinator).with_store_live(store.live_count());
    InvariantRegistry::standard().assert_all(&snapshot, "after scenario step");
}

fn render(coordinator: &StreamCoordinator<MemoryStore>) -> String {
    coordinator
        .chats()
        .iter()
        .map(|c| format!("{}({})", c.id, c.timestamp_millis))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn initial_attach_renders_last_ten_by_timestamp() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 15);

    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();

    assert_eq!(store.history().len(), 1);
    assert_eq!(last_query(&store), message_window("c1", 10));
    assert_eq!(timestamps(&coordinator, "c1"), (6..=15).collect::<Vec<_>>());
    assert_invariants(&store, &coordinator);
}

#[test]
fn empty_chat_is_told_apart_from_loading() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    assert!(coordinator.pump().is_empty());
    assert!(coordinator.messages("c1").is_none());

    coordinator.start_or_stop(EntityKind::MessagesState, "c1", Lifecycle::Start).unwrap();
    let updates = coordinator.pump();

    assert_eq!(updates, [SessionUpdate::MessagesStateChanged { chat_id: "c1".into() }]);
    assert_eq!(coordinator.is_chat_empty("c1"), Some(true));
    assert!(coordinator.messages("c1").unwrap().is_empty());
    let stream = SubscriptionKey::new(EntityKind::Messages, "c1").unwrap();
    assert_eq!(coordinator.tracker(&stream).unwrap().phase(), WindowPhase::Loaded);

    seed_messages(&store, "c1", 1);
    let updates = coordinator.pump();
    assert!(updates.contains(&SessionUpdate::MessagesStateChanged { chat_id: "c1".into() }));
    assert_eq!(coordinator.is_chat_empty("c1"), Some(false));
    assert_eq!(timestamps(&coordinator, "c1"), [1]);
    assert_eq!(store.live_count(), 2);
    assert_invariants(&store, &coordinator);
}

#[test]
fn added_then_changed_updates_in_place() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    store.seed(&path::message("c1", "m1"), json!({ "sender": "u1", "text": "hi", "timestamp": 1 }));

    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();

    store.seed(
        &path::message("c1", "m1"),
        json!({ "sender": "u1", "text": "hi there", "timestamp": 1, "edited": true }),
    );
    let updates = coordinator.pump();

    assert_eq!(updates, [SessionUpdate::MessagesChanged { chat_id: "c1".into() }]);
    let messages = coordinator.messages("c1").unwrap();
    assert_eq!(messages.len(), 1);
    let entry = messages.get("m1").unwrap();
    assert_eq!(entry.text, "hi there");
    assert!(entry.edited);
}

#[test]
fn scrolling_to_edge_grows_ten_to_twenty() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 25);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();

    coordinator.load_more(EntityKind::Messages, "c1", Some(9)).unwrap();
    coordinator.pump();
    assert_eq!(last_query(&store), message_window("c1", 20));
    assert_eq!(timestamps(&coordinator, "c1"), (6..=25).collect::<Vec<_>>());
    assert_eq!(store.live_count(), 1);

    // Not at the edge of the new window yet.
    coordinator.load_more(EntityKind::Messages, "c1", Some(10)).unwrap();
    assert_eq!(store.history().len(), 2);
    assert_invariants(&store, &coordinator);
}

#[test]
fn resume_resubscribes_at_thirty() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 40);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();
    coordinator.load_more(EntityKind::Messages, "c1", Some(9)).unwrap();
    coordinator.pump();
    coordinator.load_more(EntityKind::Messages, "c1", Some(19)).unwrap();
    coordinator.pump();

    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Resume).unwrap();
    coordinator.pump();

    assert_eq!(last_query(&store), message_window("c1", 30));
    assert_eq!(store.live_count(), 1);
    assert_eq!(coordinator.messages("c1").unwrap().len(), 30);
    assert_invariants(&store, &coordinator);
}

#[test]
fn stop_then_start_requests_an_equal_query() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 25);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();
    coordinator.load_more(EntityKind::Messages, "c1", Some(9)).unwrap();
    coordinator.pump();
    let before = last_query(&store);

    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Stop).unwrap();
    assert_eq!(store.live_count(), 0);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();

    assert_eq!(last_query(&store), before);
    assert_eq!(store.live_count(), 1);
}

#[test]
fn stop_all_without_retaining_resets_to_first_page() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 25);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();
    coordinator.load_more(EntityKind::Messages, "c1", Some(9)).unwrap();
    coordinator.pump();

    coordinator.stop_all(false);
    assert_eq!(store.live_count(), 0);

    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    assert_eq!(last_query(&store), message_window("c1", 10));
}

#[test]
fn window_shift_drops_oldest_message() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 10);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();

    store.seed(&path::message("c1", "m11"), json!({ "sender": "u2", "text": "new", "timestamp": 11 }));
    coordinator.pump();

    assert_eq!(timestamps(&coordinator, "c1"), (2..=11).collect::<Vec<_>>());
}

#[test]
fn chat_list_sorts_newest_first_ties_by_id() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    for (chat_id, timestamp) in [("a", 5), ("b", 3), ("c", 3)] {
        store.seed(&path::user_chat("me", ChatKind::Private, chat_id), json!(true));
        store.seed(
            &path::private_chat("me", chat_id),
            json!({ "title": chat_id.to_uppercase(), "timestamp": timestamp, "type": "private" }),
        );
    }

    coordinator
        .start_or_stop(EntityKind::Memberships(ChatKind::Private), "me", Lifecycle::Start)
        .unwrap();
    coordinator.pump();

    insta::assert_snapshot!(render(&coordinator), @"a(5) c(3) b(3)");
    assert_eq!(store.live_count(), 4);
    assert_invariants(&store, &coordinator);
}

#[test]
fn new_last_message_moves_chat_to_top() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    for (chat_id, timestamp) in [("a", 5), ("b", 3)] {
        store.seed(&path::user_chat("me", ChatKind::Private, chat_id), json!(true));
        store.seed(&path::private_chat("me", chat_id), json!({ "title": "t", "timestamp": timestamp }));
    }
    coordinator
        .start_or_stop(EntityKind::Memberships(ChatKind::Private), "me", Lifecycle::Start)
        .unwrap();
    coordinator.pump();

    store.seed(&path::private_chat("me", "b").child("lastMessage"), json!("ping"));
    store.seed(&path::private_chat("me", "b").child("timestamp"), json!(9));
    coordinator.pump();

    insta::assert_snapshot!(render(&coordinator), @"b(9) a(5)");
    assert_eq!(coordinator.chat("b").unwrap().last_message_excerpt, "ping");
}

#[test]
fn deleted_chats_follow_configuration() {
    for show_deleted_chats in [false, true] {
        let config = CoordinatorConfig { show_deleted_chats, ..CoordinatorConfig::default() };
        let (store, mut coordinator) = session(config);
        store.seed(&path::user_chat("me", ChatKind::Public, "gone"), json!(true));
        store.seed(&path::user_chat("me", ChatKind::Public, "live"), json!(true));
        store.seed(&path::public_chat("live"), json!({ "title": "Reading", "timestamp": 2 }));

        coordinator
            .start_or_stop(EntityKind::Memberships(ChatKind::Public), "me", Lifecycle::Start)
            .unwrap();
        coordinator.pump();

        let titles: Vec<_> = coordinator.chats().iter().map(|c| c.display_title().to_owned()).collect();
        if show_deleted_chats {
            assert_eq!(titles, ["Reading", "Deleted chat"]);
        } else {
            assert_eq!(titles, ["Reading"]);
        }
        assert!(coordinator.chat("gone").unwrap().is_deleted());
        assert_invariants(&store, &coordinator);
    }
}

#[test]
fn leaving_a_chat_drops_row_and_subscription() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    store.seed(&path::user_chat("me", ChatKind::Public, "p1"), json!(true));
    store.seed(&path::public_chat("p1"), json!({ "title": "Reading" }));
    coordinator
        .start_or_stop(EntityKind::Memberships(ChatKind::Public), "me", Lifecycle::Start)
        .unwrap();
    coordinator.pump();
    assert_eq!(store.live_count(), 2);

    store.seed(&path::user_chats("me", ChatKind::Public), json!({ "other": true }));
    store.seed(&path::public_chat("other"), json!({ "title": "Breathing" }));
    coordinator.pump();

    let ids: Vec<_> = coordinator.chats().iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, ["other"]);
    assert!(coordinator.chat("p1").is_none());
    assert_eq!(store.live_count(), 2);
    assert_invariants(&store, &coordinator);
}

#[test]
fn cancellation_keeps_data_until_restarted() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 3);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();

    store.deny(&path::messages("c1"), StoreError::PermissionDenied { path: "/messages/c1".into() });
    let updates = coordinator.pump();

    assert!(matches!(updates.as_slice(), [SessionUpdate::Error { .. }]));
    assert_eq!(coordinator.error_message(), Some("permission denied at /messages/c1"));
    assert_eq!(coordinator.messages("c1").unwrap().len(), 3);
    assert!(coordinator.registry().is_empty());

    store.allow_all();
    coordinator.dismiss_error();
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();
    assert_eq!(store.live_count(), 1);
    assert!(coordinator.error_message().is_none());
    assert_invariants(&store, &coordinator);
}

#[test]
fn subscription_to_denied_path_is_cancelled() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    store.deny(&StorePath::parse("admins"), StoreError::PermissionDenied { path: "/admins".into() });

    coordinator.start_or_stop(EntityKind::Admin, "p1", Lifecycle::Start).unwrap();
    coordinator.pump();

    assert_eq!(coordinator.error_message(), Some("permission denied at /admins"));
    assert!(coordinator.registry().is_empty());
}

#[test]
fn members_bring_names_and_pictures() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    store.seed(&path::members("p1"), json!({ "u1": true, "u2": true }));
    store.seed(&path::username("u1"), json!("ann"));
    store.seed(&path::username("u2"), json!("bob"));
    store.seed(&path::profile_picture("u1"), json!("1700000000000"));

    coordinator.start_or_stop(EntityKind::Members, "p1", Lifecycle::Start).unwrap();
    coordinator.pump();

    let members: Vec<_> = coordinator.members("p1").unwrap().iter().collect();
    assert_eq!(members, [("u1", Some("ann")), ("u2", Some("bob"))]);
    assert_eq!(coordinator.profile_picture("u1"), Some("1700000000000"));
    assert_eq!(coordinator.profile_picture("u2"), None);
    assert_eq!(store.live_count(), 5);

    store.seed(&path::username("u2"), json!("robert"));
    let updates = coordinator.pump();
    assert!(updates.contains(&SessionUpdate::UsernameChanged { user_id: "u2".into() }));
    assert_eq!(coordinator.username("u2"), Some("robert"));

    store.seed(&path::members("p1"), json!({ "u1": true }));
    coordinator.pump();
    assert_eq!(coordinator.members("p1").unwrap().len(), 1);
    assert_eq!(store.live_count(), 3);

    coordinator.start_or_stop(EntityKind::Members, "p1", Lifecycle::Stop).unwrap();
    assert_eq!(store.live_count(), 0);
}

#[test]
fn sender_names_are_late_bound() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    seed_messages(&store, "c1", 2);
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
    coordinator.pump();
    assert!(coordinator.messages("c1").unwrap().iter().all(|m| m.sender_username.is_none()));

    store.seed(&path::username("u1"), json!("ann"));
    coordinator.start_or_stop(EntityKind::Username, "u1", Lifecycle::Start).unwrap();
    let updates = coordinator.pump();

    assert!(updates.contains(&SessionUpdate::MessagesChanged { chat_id: "c1".into() }));
    let names: Vec<_> =
        coordinator.messages("c1").unwrap().iter().map(|m| m.sender_username.clone()).collect();
    assert_eq!(names, [Some("ann".to_owned()), Some("ann".to_owned())]);

    // A re-delivered record without a name keeps the one already known.
    coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Resume).unwrap();
    coordinator.pump();
    let first = coordinator.messages("c1").unwrap().get("m01").unwrap();
    assert_eq!(first.sender_username.as_deref(), Some("ann"));
}

#[test]
fn public_chat_status_streams() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    store.seed(&path::admin("p1"), json!("me"));
    store.seed(&path::member_count("p1"), json!(2));
    store.seed(&path::member("p1", "me"), json!(true));

    for kind in [EntityKind::Admin, EntityKind::MemberCount, EntityKind::MemberFlag] {
        coordinator.start_or_stop(kind, "p1", Lifecycle::Start).unwrap();
    }
    coordinator.pump();

    assert!(coordinator.is_admin("p1"));
    assert_eq!(coordinator.member_count("p1"), 2);
    assert_eq!(coordinator.is_member("p1"), Some(true));

    store.seed(&path::members("p1"), json!({ "someone": true }));
    store.seed(&path::member_count("p1"), json!(1));
    coordinator.pump();
    assert_eq!(coordinator.is_member("p1"), Some(false));
    assert_eq!(coordinator.member_count("p1"), 1);
}

#[test]
fn directory_pages_by_key() {
    let config = CoordinatorConfig { first_page_size: 2, page_size: 2, ..CoordinatorConfig::default() };
    let (store, mut coordinator) = session(config);
    for (chat_id, timestamp) in [("p1", 1), ("p2", 3), ("p3", 2)] {
        store.seed(&path::public_chat(chat_id), json!({ "title": chat_id, "timestamp": timestamp }));
    }

    coordinator.start_or_stop(EntityKind::PublicDirectory, "me", Lifecycle::Start).unwrap();
    coordinator.pump();
    assert_eq!(last_query(&store), Query::at(path::public_chats()).limit_to_first(2));
    let ids: Vec<_> = coordinator.directory().iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, ["p2", "p1"]);

    coordinator.load_more(EntityKind::PublicDirectory, "me", Some(1)).unwrap();
    coordinator.pump();
    let ids: Vec<_> = coordinator.directory().iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, ["p2", "p3", "p1"]);
    assert_invariants(&store, &coordinator);
}

#[test]
fn explicit_key_survives_parent_release() {
    let (store, mut coordinator) = session(CoordinatorConfig::default());
    store.seed(&path::members("p1"), json!({ "u1": true }));
    coordinator.start_or_stop(EntityKind::Username, "u1", Lifecycle::Start).unwrap();
    coordinator.start_or_stop(EntityKind::Members, "p1", Lifecycle::Start).unwrap();
    coordinator.pump();

    coordinator.start_or_stop(EntityKind::Members, "p1", Lifecycle::Stop).unwrap();

    let key = SubscriptionKey::new(EntityKind::Username, "u1").unwrap();
    assert!(coordinator.registry().is_attached(&key));
    assert_eq!(store.live_count(), 1);
    assert_eq!(store.get(&path::members("p1")), Some(json!({ "u1": true })));
}
