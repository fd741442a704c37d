//! End-to-end conversation tests over the JSON file store.
//!
//! Each test drives a `ConversationRouter` with synthetic events and then
//! inspects what actually landed on disk.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;
use tokio::time::timeout;

use profile_intake::channels::{
    CallbackAction, Channel, Command, EventKind, EventStream, InboundEvent, Reply,
};
use profile_intake::error::ChannelError;
use profile_intake::parser::FilenameParser;
use profile_intake::profiles::{DraftStatus, MANUAL_UPDATE_SOURCE};
use profile_intake::router::ConversationRouter;
use profile_intake::store::{JsonFileStore, ProfileStore};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn setup() -> (Arc<ConversationRouter>, JsonFileStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("profiles.json"));
    let parser = FilenameParser::with_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    let router = ConversationRouter::new(Arc::new(store.clone()), Arc::new(parser));
    (Arc::new(router), store, dir)
}

fn document(user: &str, name: &str) -> InboundEvent {
    InboundEvent::new(
        user,
        EventKind::Document {
            name: name.into(),
            mime_type: None,
            size: None,
        },
    )
}

fn press(user: &str, action: CallbackAction) -> InboundEvent {
    InboundEvent::new(user, EventKind::Button(action))
}

fn text(user: &str, body: &str) -> InboundEvent {
    InboundEvent::new(user, EventKind::Text(body.into()))
}

fn command(user: &str, command: Command) -> InboundEvent {
    InboundEvent::new(user, EventKind::Command(command))
}

#[tokio::test]
async fn full_intake_lifecycle() {
    let (router, store, _dir) = setup();
    let user = "42";

    router.handle(&document(user, "jane_doe.pdf")).await.unwrap();
    router
        .handle(&press(user, CallbackAction::EditField("email".into())))
        .await
        .unwrap();
    router.handle(&text(user, "jane@example.org")).await.unwrap();
    let replies = router
        .handle(&press(user, CallbackAction::Confirm))
        .await
        .unwrap();
    assert_eq!(
        replies[0].text,
        "Profile saved as version 1. Use /my_profile to view or update."
    );

    // Second round: update from the saved profile via manual mode
    router
        .handle(&press(user, CallbackAction::StartUpdate))
        .await
        .unwrap();
    router.handle(&press(user, CallbackAction::Manual)).await.unwrap();
    router
        .handle(&text(user, "phone: +1 202 555 0199\nlinkedin: jane-doe"))
        .await
        .unwrap();
    router.handle(&command(user, Command::Done)).await.unwrap();
    router
        .handle(&press(user, CallbackAction::Confirm))
        .await
        .unwrap();

    let db = store.load().await.unwrap();
    let record = db.record(user).unwrap();
    assert!(record.draft.is_none());
    assert_eq!(record.profiles.len(), 2);

    let v1 = &record.profiles[0];
    assert_eq!(v1.version, 1);
    assert_eq!(v1.fields["full_name"], "jane doe");
    assert_eq!(v1.fields["email"], "jane@example.org");
    assert_eq!(v1.fields["phone"], "+1-555-0100");

    let v2 = &record.profiles[1];
    assert_eq!(v2.version, 2);
    assert_eq!(v2.fields["email"], "jane@example.org");
    assert_eq!(v2.fields["phone"], "+1 202 555 0199");
    assert_eq!(v2.fields["linkedin"], "jane-doe");
    assert!(v2.confirmed_at >= v1.confirmed_at);

    let replies = router.handle(&command(user, Command::MyProfile)).await.unwrap();
    assert!(replies[0].text.starts_with("Latest profile (v2):"));
    assert!(replies[0].text.contains("Linkedin: jane-doe"));
}

#[tokio::test]
async fn state_survives_a_new_router() {
    let (router, store, _dir) = setup();
    router.handle(&document("7", "cv.pdf")).await.unwrap();
    drop(router);

    let parser = FilenameParser::with_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    let reopened = ConversationRouter::new(Arc::new(store.clone()), Arc::new(parser));
    reopened
        .handle(&press("7", CallbackAction::Confirm))
        .await
        .unwrap();

    let db = store.load().await.unwrap();
    assert_eq!(db.record("7").unwrap().profiles.len(), 1);
}

#[tokio::test]
async fn update_draft_keeps_history_until_confirmed() {
    let (router, store, _dir) = setup();
    router.handle(&document("9", "cv.pdf")).await.unwrap();
    router.handle(&press("9", CallbackAction::Confirm)).await.unwrap();
    router
        .handle(&press("9", CallbackAction::StartUpdate))
        .await
        .unwrap();

    let db = store.load().await.unwrap();
    let record = db.record("9").unwrap();
    let draft = record.draft.as_ref().unwrap();
    assert_eq!(draft.status, DraftStatus::Review);
    assert_eq!(draft.source_name, MANUAL_UPDATE_SOURCE);
    assert_eq!(draft.fields, record.profiles[0].fields);

    router.handle(&press("9", CallbackAction::Discard)).await.unwrap();
    let db = store.load().await.unwrap();
    assert!(db.record("9").unwrap().draft.is_none());
    assert_eq!(db.record("9").unwrap().profiles.len(), 1);
}

#[tokio::test]
async fn legacy_file_name_key_is_accepted() {
    let (router, store, _dir) = setup();
    std::fs::write(
        store.path(),
        r#"{"5": {"draft": {"status": "review", "file_name": "old.pdf", "fields": {"email": "a@b.c"}}, "profiles": []}}"#,
    )
    .unwrap();

    router.handle(&press("5", CallbackAction::Confirm)).await.unwrap();

    let db = store.load().await.unwrap();
    let record = db.record("5").unwrap();
    assert_eq!(record.profiles[0].fields["email"], "a@b.c");
}

#[tokio::test]
async fn concurrent_users_do_not_lose_updates() {
    let (router, store, _dir) = setup();

    let mut handles = Vec::new();
    for i in 0..16 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            let user = format!("user-{i}");
            router
                .handle(&document(&user, &format!("cv_{i}.pdf")))
                .await
                .unwrap();
            router
                .handle(&press(&user, CallbackAction::Confirm))
                .await
                .unwrap();
        }));
    }
    timeout(TEST_TIMEOUT, futures::future::try_join_all(handles))
        .await
        .expect("timed out")
        .unwrap();

    let db = store.load().await.unwrap();
    assert_eq!(db.len(), 16);
    for i in 0..16 {
        let record = db.record(&format!("user-{i}")).unwrap();
        assert_eq!(record.profiles.len(), 1, "user-{i}");
        assert_eq!(record.profiles[0].fields["full_name"], format!("cv {i}"));
    }
}

#[tokio::test]
async fn concurrent_manual_edits_on_one_draft_all_land() {
    let (router, store, _dir) = setup();
    router.handle(&document("1", "cv.pdf")).await.unwrap();
    router.handle(&press("1", CallbackAction::Manual)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            router
                .handle(&text("1", &format!("extra_{i}: value {i}")))
                .await
                .unwrap();
        }));
    }
    timeout(TEST_TIMEOUT, futures::future::try_join_all(handles))
        .await
        .expect("timed out")
        .unwrap();

    let db = store.load().await.unwrap();
    let fields = &db.record("1").unwrap().draft.as_ref().unwrap().fields;
    for i in 0..20 {
        assert_eq!(fields[format!("extra_{i}").as_str()], format!("value {i}"));
    }
}

#[tokio::test]
async fn discard_cannot_split_document_intake() {
    for _ in 0..10 {
        let (router, store, _dir) = setup();

        let upload = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.handle(&document("2", "cv.pdf")).await })
        };
        let discard = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.handle(&press("2", CallbackAction::Discard)).await })
        };
        let upload_replies = timeout(TEST_TIMEOUT, upload)
            .await
            .expect("timed out")
            .unwrap()
            .unwrap();
        let discard_replies = timeout(TEST_TIMEOUT, discard)
            .await
            .expect("timed out")
            .unwrap()
            .unwrap();

        // The upload always completes as a unit, whichever event ran first.
        assert_eq!(upload_replies.len(), 2);
        assert!(upload_replies[1].text.starts_with("I extracted the following fields."));

        let draft = store.load().await.unwrap().record("2").unwrap().draft.clone();
        if discard_replies[0].text == "Draft discarded." {
            assert!(draft.is_none());
        } else {
            assert_eq!(draft.unwrap().status, DraftStatus::Review);
        }
    }
}

// ── Serve loop ──────────────────────────────────────────────────────

/// Channel that replays a fixed script and records every delivery.
struct ScriptedChannel {
    events: Mutex<Vec<InboundEvent>>,
    delivered: Arc<Mutex<Vec<Vec<Reply>>>>,
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn deliver(
        &self,
        _event: &InboundEvent,
        replies: Vec<Reply>,
    ) -> Result<(), ChannelError> {
        self.delivered.lock().unwrap().push(replies);
        Ok(())
    }
}

#[tokio::test]
async fn serve_processes_events_in_order() {
    let (router, store, _dir) = setup();
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let channel = ScriptedChannel {
        events: Mutex::new(vec![
            command("3", Command::Start),
            document("3", "ada_lovelace.pdf"),
            press("3", CallbackAction::Confirm),
            text("3", "stray message"),
        ]),
        delivered: Arc::clone(&delivered),
    };

    timeout(
        TEST_TIMEOUT,
        router.serve(&channel, std::future::pending::<()>()),
    )
    .await
    .expect("timed out")
    .unwrap();

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 4);
    assert!(delivered[0][0].text.starts_with("Send me your CV"));
    assert_eq!(delivered[1].len(), 2);
    assert!(delivered[2][0].text.starts_with("Profile saved as version 1."));
    assert!(delivered[3].is_empty());

    let db = store.load().await.unwrap();
    assert_eq!(
        db.record("3").unwrap().profiles[0].fields["full_name"],
        "ada lovelace"
    );
}

#[tokio::test]
async fn serve_stops_on_corrupt_store() {
    let (router, store, _dir) = setup();
    std::fs::write(store.path(), "{ broken").unwrap();
    let channel = ScriptedChannel {
        events: Mutex::new(vec![document("3", "cv.pdf")]),
        delivered: Arc::new(Mutex::new(Vec::new())),
    };

    let result = timeout(
        TEST_TIMEOUT,
        router.serve(&channel, std::future::pending::<()>()),
    )
    .await
    .expect("timed out");

    assert!(result.is_err());
}
