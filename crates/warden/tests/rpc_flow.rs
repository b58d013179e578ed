//! End-to-end request handling through a running bunker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use warden::core::{Event, Keys, Scheme};
use warden::perms::Package;
use warden::rpc::{
    ApprovalBridge, ApprovalOutcome, ChannelConfig, HandleOutcome, MemoryRelay, QueuedApproval,
    Response, Transport,
};
use warden::store::{GrantValue, MemoryStore, SqliteStore, Store};
use warden::{Bunker, BunkerConfig};
use warden_testkit::{unsigned_event_json, ScriptedApproval, TestFixture};

type TestBunker = Bunker<MemoryStore, MemoryRelay>;

fn bunker(
    keys: Keys,
    relay: &Arc<MemoryRelay>,
    approval: Arc<dyn ApprovalBridge>,
    config: BunkerConfig,
) -> TestBunker {
    Bunker::new(
        keys,
        Arc::new(MemoryStore::new()),
        Arc::clone(relay),
        approval,
        config,
    )
}

async fn responses(relay: &MemoryRelay, app: &TestFixture, n: usize) -> Vec<Response> {
    for _ in 0..300 {
        let got = app.responses_in(&relay.published().await);
        if got.len() >= n {
            return got;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} responses", n);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn connect_acks_without_creating_grant() {
    init_tracing();
    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([]));
    let bunker = bunker(Keys::generate(), &relay, approval.clone(), BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    relay.publish(app.request(&holder, "c1", "connect", &[])).await.unwrap();

    let got = responses(&relay, &app, 1).await;
    assert_eq!(got, vec![Response::ok("c1", "ack")]);
    assert!(bunker.grants_for(&app.public_key()).await.unwrap().is_empty());
    assert!(approval.asked().is_empty());

    let history = bunker.history_for(&app.public_key()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].allowed);
    handle.shutdown();
}

#[tokio::test]
async fn connect_acks_regardless_of_prior_denials() {
    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([]));
    let bunker = bunker(Keys::generate(), &relay, approval.clone(), BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    bunker
        .grant(&app.public_key(), "connect", GrantValue::Deny)
        .await
        .unwrap();
    bunker
        .grant(&app.public_key(), "basic", GrantValue::Deny)
        .await
        .unwrap();
    let before = bunker.grants_for(&app.public_key()).await.unwrap();

    relay.publish(app.request(&holder, "c2", "connect", &[])).await.unwrap();

    let got = responses(&relay, &app, 1).await;
    assert_eq!(got, vec![Response::ok("c2", "ack")]);
    assert!(approval.asked().is_empty());
    assert_eq!(bunker.grants_for(&app.public_key()).await.unwrap(), before);
    assert_eq!(before.len(), 2);
    handle.shutdown();
}

#[tokio::test]
async fn basic_package_signs_listed_kinds_and_asks_for_others() {
    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([ApprovalOutcome::deny()]));
    let bunker = bunker(Keys::generate(), &relay, approval.clone(), BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    bunker
        .connect_app(app.public_key(), Some("client".into()), None, Some(Package::Basic))
        .await
        .unwrap();

    let note = unsigned_event_json(1, "hello");
    relay
        .publish(app.request(&holder, "k1", "sign_event", &[note.as_str()]))
        .await
        .unwrap();
    let got = responses(&relay, &app, 1).await;
    let signed = Event::from_json(&got[0].result).unwrap();
    signed.verify().unwrap();
    assert_eq!(signed.pubkey, holder);
    assert_eq!(signed.content, "hello");

    let dm = unsigned_event_json(4, "secret");
    relay
        .publish(app.request(&holder, "k4", "sign_event", &[dm.as_str()]))
        .await
        .unwrap();
    let got = responses(&relay, &app, 2).await;
    assert_eq!(got[1], Response::error("k4", "Not authorized"));
    assert_eq!(approval.asked_ids(), vec!["k4"]);
    handle.shutdown();
}

#[tokio::test]
async fn exact_deny_beats_package_allow() {
    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([]));
    let bunker = bunker(Keys::generate(), &relay, approval.clone(), BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    bunker
        .connect_app(app.public_key(), None, None, Some(Package::Basic))
        .await
        .unwrap();
    bunker
        .grant(&app.public_key(), "sign_event:1", GrantValue::Deny)
        .await
        .unwrap();

    let note = unsigned_event_json(1, "nope");
    relay
        .publish(app.request(&holder, "x", "sign_event", &[note.as_str()]))
        .await
        .unwrap();
    let got = responses(&relay, &app, 1).await;
    assert_eq!(got, vec![Response::error("x", "Not authorized")]);
    assert!(approval.asked().is_empty());
    handle.shutdown();
}

#[tokio::test]
async fn remembered_approval_answers_next_request_without_asking() {
    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([ApprovalOutcome::allow().remembered()]));
    let bunker = bunker(Keys::generate(), &relay, approval.clone(), BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    let peer = Keys::generate().public_key().to_hex();

    relay
        .publish(app.request(&holder, "e1", "nip44_encrypt", &[peer.as_str(), "one"]))
        .await
        .unwrap();
    responses(&relay, &app, 1).await;
    relay
        .publish(app.request(&holder, "e2", "nip44_encrypt", &[peer.as_str(), "two"]))
        .await
        .unwrap();
    let got = responses(&relay, &app, 2).await;

    assert!(got.iter().all(|r| !r.is_error()));
    assert_eq!(approval.asked_ids(), vec!["e1"]);
    let grants = bunker.grants_for(&app.public_key()).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].verb, "nip44_encrypt");
    assert_eq!(grants[0].value, GrantValue::Allow);
    handle.shutdown();
}

#[tokio::test]
async fn redelivery_after_resolution_publishes_nothing() {
    let relay = MemoryRelay::new();
    let bunker = bunker(
        Keys::generate(),
        &relay,
        Arc::new(ScriptedApproval::new([])),
        BunkerConfig::default(),
    );
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    bunker
        .grant(&app.public_key(), "ping", GrantValue::Allow)
        .await
        .unwrap();

    let event = app.request(&holder, "p1", "ping", &[]);
    relay.publish(event.clone()).await.unwrap();
    assert_eq!(responses(&relay, &app, 1).await, vec![Response::ok("p1", "pong")]);

    relay.redeliver(&event).await;
    relay.redeliver(&event).await;
    settle().await;
    assert_eq!(app.responses_in(&relay.published().await).len(), 1);
    handle.shutdown();
}

#[tokio::test]
async fn approvals_resolve_in_any_order() {
    let relay = MemoryRelay::new();
    let (queued, mut prompts) = QueuedApproval::new(8);
    let bunker = bunker(Keys::generate(), &relay, Arc::new(queued), BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    relay.publish(app.request(&holder, "a", "ping", &[])).await.unwrap();
    relay.publish(app.request(&holder, "b", "ping", &[])).await.unwrap();

    let first = prompts.recv().await.unwrap();
    let second = prompts.recv().await.unwrap();
    let (pa, pb) = if first.context.id == "a" {
        (first, second)
    } else {
        (second, first)
    };

    pb.respond(ApprovalOutcome::allow());
    let got = responses(&relay, &app, 1).await;
    assert_eq!(got, vec![Response::ok("b", "pong")]);

    pa.respond(ApprovalOutcome::deny());
    let got = responses(&relay, &app, 2).await;
    assert_eq!(got[1], Response::error("a", "Not authorized"));
    handle.shutdown();
}

#[tokio::test]
async fn result_override_replaces_handler_result() {
    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([
        ApprovalOutcome::allow().with_result("edited"),
    ]));
    let bunker = bunker(Keys::generate(), &relay, approval, BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    relay.publish(app.request(&holder, "o1", "ping", &[])).await.unwrap();
    assert_eq!(
        responses(&relay, &app, 1).await,
        vec![Response::ok("o1", "edited")]
    );
    handle.shutdown();
}

#[tokio::test]
async fn ignored_request_gets_no_response() {
    let relay = MemoryRelay::new();
    let bunker = bunker(
        Keys::generate(),
        &relay,
        Arc::new(ScriptedApproval::new([ApprovalOutcome::ignore()])),
        BunkerConfig::default(),
    );
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    relay.publish(app.request(&holder, "i1", "ping", &[])).await.unwrap();

    for _ in 0..300 {
        if !bunker.history_for(&app.public_key()).await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let history = bunker.history_for(&app.public_key()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].allowed);
    assert!(app.responses_in(&relay.published().await).is_empty());
    handle.shutdown();
}

#[tokio::test]
async fn unknown_method_is_unsupported_without_asking() {
    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([]));
    let bunker = bunker(Keys::generate(), &relay, approval.clone(), BunkerConfig::default());
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    relay
        .publish(app.request(&holder, "u1", "describe", &[]))
        .await
        .unwrap();
    assert_eq!(
        responses(&relay, &app, 1).await,
        vec![Response::error("u1", "Unsupported method")]
    );
    assert!(approval.asked().is_empty());
    handle.shutdown();
}

#[tokio::test]
async fn legacy_envelope_is_answered_in_kind() {
    let relay = MemoryRelay::new();
    let bunker = bunker(
        Keys::generate(),
        &relay,
        Arc::new(ScriptedApproval::new([])),
        BunkerConfig::default(),
    );
    let holder = bunker.identity().unwrap();
    let handle = bunker.start().await.unwrap();

    let app = TestFixture::new();
    relay
        .publish(app.request_event(&holder, "l1", "connect", &[], Scheme::Nip04))
        .await
        .unwrap();
    assert_eq!(responses(&relay, &app, 1).await, vec![Response::ok("l1", "ack")]);

    let reply = relay
        .published()
        .await
        .into_iter()
        .find(|e| e.pubkey == holder)
        .unwrap();
    assert_eq!(Scheme::detect(&reply.content), Scheme::Nip04);
    handle.shutdown();
}

#[tokio::test]
async fn stale_requests_expire() {
    init_tracing();
    let relay = MemoryRelay::new();
    let (queued, _prompts) = QueuedApproval::new(8);
    let config = BunkerConfig {
        channel: ChannelConfig {
            pending_ttl: Some(Duration::from_secs(30)),
        },
        ..BunkerConfig::default()
    };
    let bunker = bunker(Keys::generate(), &relay, Arc::new(queued), config);
    let holder = bunker.identity().unwrap();

    let app = TestFixture::new();
    let outcome = bunker
        .channel()
        .handle_event(app.request(&holder, "s1", "ping", &[]))
        .await;
    assert_eq!(outcome, HandleOutcome::Deferred);

    assert_eq!(bunker.channel().expire_pending(Instant::now()).await, 0);
    let later = Instant::now() + Duration::from_secs(31);
    assert_eq!(bunker.channel().expire_pending(later).await, 1);

    assert_eq!(
        app.responses_in(&relay.published().await),
        vec![Response::error("s1", "Request expired")]
    );
    assert!(!bunker.channel().resolve("s1", ApprovalOutcome::allow()).await);
    assert!(bunker.store().list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn reply_from_another_instance_settles_local_approval() {
    init_tracing();
    let relay = MemoryRelay::new();
    let keys = Keys::generate();

    let fast = bunker(
        keys.clone(),
        &relay,
        Arc::new(ScriptedApproval::new([])),
        BunkerConfig::default(),
    );
    let (queued, mut prompts) = QueuedApproval::new(8);
    let slow = bunker(keys, &relay, Arc::new(queued), BunkerConfig::default());
    let holder = fast.identity().unwrap();

    let app = TestFixture::new();
    fast.grant(&app.public_key(), "ping", GrantValue::Allow)
        .await
        .unwrap();

    let slow_handle = slow.start().await.unwrap();
    relay.publish(app.request(&holder, "w1", "ping", &[])).await.unwrap();
    let prompt = prompts.recv().await.unwrap();
    assert_eq!(slow.channel().outstanding(), vec!["w1".to_string()]);

    let fast_handle = fast.start().await.unwrap();
    assert_eq!(responses(&relay, &app, 1).await, vec![Response::ok("w1", "pong")]);

    for _ in 0..300 {
        if slow.channel().outstanding().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(slow.channel().outstanding().is_empty());
    let history = slow.history_for(&app.public_key()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].allowed);

    prompt.respond(ApprovalOutcome::deny());
    settle().await;
    assert_eq!(app.responses_in(&relay.published().await).len(), 1);

    slow_handle.shutdown();
    fast_handle.shutdown();
}

#[tokio::test]
async fn app_records_are_scoped_to_holder() {
    let relay = MemoryRelay::new();
    let bunker = bunker(
        Keys::generate(),
        &relay,
        Arc::new(ScriptedApproval::new([])),
        BunkerConfig::default(),
    );
    let app = TestFixture::new();

    let first = bunker
        .connect_app(app.public_key(), Some("one".into()), None, Some(Package::Basic))
        .await
        .unwrap();
    let second = bunker
        .connect_app(app.public_key(), Some("two".into()), None, None)
        .await
        .unwrap();
    assert_eq!(first.created_at, second.created_at);

    let apps = bunker.apps().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].name.as_deref(), Some("two"));
    assert_eq!(bunker.grants_for(&app.public_key()).await.unwrap().len(), 1);

    assert!(bunker.disconnect_app(&app.public_key()).await.unwrap());
    assert!(bunker.apps().await.unwrap().is_empty());
    assert!(bunker.grants_for(&app.public_key()).await.unwrap().is_empty());
}

#[tokio::test]
async fn grants_survive_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.db");
    let keys = Keys::generate();
    let app = TestFixture::new();

    {
        let bunker = Bunker::new(
            keys.clone(),
            Arc::new(SqliteStore::open(&path).unwrap()),
            MemoryRelay::new(),
            Arc::new(ScriptedApproval::new([])),
            BunkerConfig::default(),
        );
        bunker
            .connect_app(app.public_key(), None, None, Some(Package::Basic))
            .await
            .unwrap();
    }

    let relay = MemoryRelay::new();
    let approval = Arc::new(ScriptedApproval::new([]));
    let bunker = Bunker::new(
        keys,
        Arc::new(SqliteStore::open(&path).unwrap()),
        relay.clone(),
        approval.clone(),
        BunkerConfig::default(),
    );
    let holder = bunker.identity().unwrap();

    let outcome = bunker
        .channel()
        .handle_event(app.request(&holder, "g1", "get_public_key", &[]))
        .await;
    assert_eq!(outcome, HandleOutcome::Responded);
    assert_eq!(
        app.responses_in(&relay.published().await),
        vec![Response::ok("g1", holder.to_hex())]
    );
    assert!(approval.asked().is_empty());
    assert_eq!(bunker.apps().await.unwrap().len(), 1);
}
