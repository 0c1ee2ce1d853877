use chrono::{DateTime, Duration, Utc};
use tempfile::NamedTempFile;

use remind_bot::admission::AdmissionGuard;
use remind_bot::error::RemindBotError;
use remind_bot::recurrence::{RecurrenceKind, RecurrenceRule};
use remind_bot::reminders::{ReminderChanges, ReminderStore};

const CHAT: i64 = 42;

async fn make_store(file: &NamedTempFile) -> ReminderStore {
    ReminderStore::new(file.path().to_str().unwrap()).await.unwrap()
}

async fn make_store_with_guard(file: &NamedTempFile, guard: AdmissionGuard) -> ReminderStore {
    ReminderStore::with_guard(file.path().to_str().unwrap(), guard)
        .await
        .unwrap()
}

fn minute_rule(interval: u32, ends_at: Option<DateTime<Utc>>) -> RecurrenceRule {
    RecurrenceRule {
        kind: RecurrenceKind::Minute,
        interval,
        weekdays: None,
        ends_at,
    }
}

#[tokio::test]
async fn create_rejects_past_fire_time() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let now = Utc::now();
    let err = store
        .create(CHAT, "water plants", None, now - Duration::seconds(1), None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, RemindBotError::Validation(_)));
}

#[tokio::test]
async fn create_rejects_out_of_bounds_interval() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let now = Utc::now();
    let rule = minute_rule(2000, None);
    let err = store
        .create(CHAT, "hydrate", None, now + Duration::hours(1), Some(&rule), now)
        .await
        .unwrap_err();
    assert!(matches!(err, RemindBotError::Validation(_)));
}

#[tokio::test]
async fn edit_supersedes_without_touching_prior_version() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let now = Utc::now();
    let fire_at = now + Duration::hours(2);

    let v1 = store
        .create(CHAT, "call dentist", Some("call the dentist tomorrow"), fire_at, None, now)
        .await
        .unwrap();
    let v2 = store
        .edit(
            v1,
            CHAT,
            ReminderChanges {
                task: Some("call dentist and reschedule".to_string()),
                fire_at: Some(fire_at + Duration::hours(1)),
                ..ReminderChanges::default()
            },
            now,
        )
        .await
        .unwrap();
    assert_ne!(v1, v2);

    // Listing surfaces only the current version.
    let upcoming = store.list_upcoming(CHAT, 7, now).await.unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].id, v2);
    assert_eq!(upcoming[0].version, 2);
    assert_eq!(upcoming[0].original_id, Some(v1));

    // The prior version is only reachable through history, unmodified apart
    // from its current flag.
    assert!(store.get_current(v1, CHAT).await.unwrap().is_none());
    let history = store.version_history(v1).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, v1);
    assert_eq!(history[0].task, "call dentist");
    assert_eq!(history[0].fire_at.timestamp(), fire_at.timestamp());
    assert!(!history[0].is_current_version);
    assert!(history[1].is_current_version);
}

#[tokio::test]
async fn edit_of_missing_or_deleted_reminder_is_not_found() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let now = Utc::now();

    let err = store
        .edit(999, CHAT, ReminderChanges::default(), now)
        .await
        .unwrap_err();
    assert!(matches!(err, RemindBotError::NotFound(_)));

    let id = store
        .create(CHAT, "pay rent", None, now + Duration::days(1), None, now)
        .await
        .unwrap();
    assert!(store.soft_delete(id, CHAT, Some("tester"), now).await.unwrap());
    let err = store
        .edit(id, CHAT, ReminderChanges::default(), now)
        .await
        .unwrap_err();
    assert!(matches!(err, RemindBotError::NotFound(_)));
}

#[tokio::test]
async fn soft_delete_is_idempotent() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let now = Utc::now();
    let id = store
        .create(CHAT, "buy milk", None, now + Duration::hours(1), None, now)
        .await
        .unwrap();

    assert!(store.soft_delete(id, CHAT, Some("alice"), now).await.unwrap());
    assert!(!store.soft_delete(id, CHAT, Some("alice"), now).await.unwrap());
    assert!(!store.soft_delete(7777, CHAT, None, now).await.unwrap());

    // Deleted rows vanish from every scheduling read but stay in history.
    assert!(store.due_reminders(now + Duration::days(1)).await.unwrap().is_empty());
    assert!(store.list_upcoming(CHAT, 7, now).await.unwrap().is_empty());
    let history = store.version_history(id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].deleted);
    assert_eq!(history[0].deleted_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn bulk_delete_skips_fired_and_already_deleted() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let now = Utc::now();
    let later = now + Duration::hours(3);

    let keep_fired = store.create(CHAT, "a", None, later, None, now).await.unwrap();
    let gone_first = store.create(CHAT, "b", None, later, None, now).await.unwrap();
    let pending = store.create(CHAT, "c", None, later, None, now).await.unwrap();
    let rule = minute_rule(5, None);
    let recurring = store
        .create(CHAT, "d", None, later, Some(&rule), now)
        .await
        .unwrap();
    // Another chat is untouched.
    let other = store.create(CHAT + 1, "e", None, later, None, now).await.unwrap();

    store.mark_fired_oneshot(keep_fired).await.unwrap();
    assert!(store.soft_delete(gone_first, CHAT, Some("bob"), now).await.unwrap());

    // Unfired one-shot + recurring-between-occurrences are eligible; the
    // fired and the already-deleted rows are not re-processed.
    let count = store.bulk_soft_delete(CHAT, Some("bob"), now).await.unwrap();
    assert_eq!(count, 2);

    assert!(store.get_current(pending, CHAT).await.unwrap().is_none());
    assert!(store.get_current(recurring, CHAT).await.unwrap().is_none());
    assert!(store.get_current(keep_fired, CHAT).await.unwrap().is_some());
    assert!(store.get_current(other, CHAT + 1).await.unwrap().is_some());
}

#[tokio::test]
async fn due_returns_overdue_items_in_fire_order() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    // Create in a shifted past so the items are already overdue when queried
    // with the real current time.
    let base = Utc::now() - Duration::minutes(30);

    let second = store
        .create(CHAT, "later", None, base + Duration::minutes(10), None, base)
        .await
        .unwrap();
    let first = store
        .create(CHAT, "sooner", None, base + Duration::minutes(5), None, base)
        .await
        .unwrap();
    let future = store
        .create(CHAT, "tomorrow", None, Utc::now() + Duration::days(1), None, base)
        .await
        .unwrap();

    let due = store.due_reminders(Utc::now()).await.unwrap();
    let ids: Vec<i32> = due.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(!ids.contains(&future));
}

#[tokio::test]
async fn due_excludes_recurring_already_notified_for_occurrence() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let base = Utc::now() - Duration::minutes(30);
    let rule = minute_rule(10, None);
    let id = store
        .create(CHAT, "stretch", None, base + Duration::minutes(1), Some(&rule), base)
        .await
        .unwrap();

    let now = Utc::now();
    assert_eq!(store.due_reminders(now).await.unwrap().len(), 1);

    // Advancing to a future occurrence removes it until that time passes.
    let next = now + Duration::minutes(10);
    store.advance_recurring(id, Some(next), now).await.unwrap();
    assert!(store.due_reminders(now).await.unwrap().is_empty());

    let current = store.get_current(id, CHAT).await.unwrap().unwrap();
    assert!(!current.fired);
    assert!(current.last_fired_at.is_some());
    assert_eq!(current.fire_at.timestamp(), next.timestamp());

    // Once the clock passes the new occurrence it is due again.
    assert_eq!(
        store
            .due_reminders(next + Duration::seconds(1))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn finalized_recurring_reminder_leaves_due() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let base = Utc::now() - Duration::minutes(5);
    let rule = minute_rule(1, Some(base + Duration::minutes(2)));
    let id = store
        .create(CHAT, "med", None, base + Duration::minutes(1), Some(&rule), base)
        .await
        .unwrap();

    let now = Utc::now();
    store.advance_recurring(id, None, now).await.unwrap();
    assert!(store.due_reminders(now).await.unwrap().is_empty());
    let current = store.get_current(id, CHAT).await.unwrap().unwrap();
    assert!(current.fired);
}

#[tokio::test]
async fn mark_fired_oneshot_is_idempotent() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let base = Utc::now() - Duration::minutes(5);
    let id = store
        .create(CHAT, "ring", None, base + Duration::minutes(1), None, base)
        .await
        .unwrap();

    store.mark_fired_oneshot(id).await.unwrap();
    let after_first = store.get_current(id, CHAT).await.unwrap().unwrap();
    store.mark_fired_oneshot(id).await.unwrap();
    let after_second = store.get_current(id, CHAT).await.unwrap().unwrap();

    assert!(after_first.fired);
    assert_eq!(after_first.fired, after_second.fired);
    assert_eq!(after_first.last_fired_at, after_second.last_fired_at);
    assert!(store.due_reminders(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn create_denied_at_active_ceiling() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store_with_guard(&file, AdmissionGuard::new(3, 100, 60)).await;
    let now = Utc::now();
    let later = now + Duration::hours(1);

    for i in 0..3 {
        store
            .create(CHAT, &format!("task {i}"), None, later, None, now)
            .await
            .unwrap();
    }
    let err = store
        .create(CHAT, "one too many", None, later, None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, RemindBotError::AdmissionDenied(_)));

    // Deleting one frees a slot again.
    let upcoming = store.list_upcoming(CHAT, 7, now).await.unwrap();
    store
        .soft_delete(upcoming[0].id, CHAT, None, now)
        .await
        .unwrap();
    store
        .create(CHAT, "fits now", None, later, None, now)
        .await
        .unwrap();
}

#[tokio::test]
async fn create_denied_at_rate_ceiling() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store_with_guard(&file, AdmissionGuard::new(100, 5, 60)).await;
    let now = Utc::now();
    let later = now + Duration::hours(1);

    for i in 0..5 {
        store
            .create(CHAT, &format!("burst {i}"), None, later, None, now)
            .await
            .unwrap();
    }
    let err = store
        .create(CHAT, "too fast", None, later, None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, RemindBotError::AdmissionDenied(_)));

    // The window slides: a minute later creation is admitted again.
    let minute_later = now + Duration::seconds(61);
    store
        .create(CHAT, "calm again", None, later, None, minute_later)
        .await
        .unwrap();
}

#[tokio::test]
async fn list_upcoming_honors_horizon() {
    let file = NamedTempFile::new().unwrap();
    let store = make_store(&file).await;
    let now = Utc::now();

    let near = store
        .create(CHAT, "near", None, now + Duration::days(2), None, now)
        .await
        .unwrap();
    store
        .create(CHAT, "far", None, now + Duration::days(30), None, now)
        .await
        .unwrap();
    let rule = minute_rule(30, None);
    let recurring = store
        .create(CHAT, "loop", None, now + Duration::hours(1), Some(&rule), now)
        .await
        .unwrap();

    let upcoming = store.list_upcoming(CHAT, 7, now).await.unwrap();
    let ids: Vec<i32> = upcoming.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![recurring, near]);
}
