//! Staff-gated tagging and notes, and their cleanup on close.

mod common;

use std::sync::Arc;

use common::{CREATOR, FakePlatform, STAFF_A, protocol, settings, user};
use tally_core::error::TallyError;
use tally_core::model::{Category, PriorityLevel};
use tally_core::store::lock;
use tally_core::tags;

#[tokio::test]
async fn only_staff_may_annotate() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(FakePlatform::new());
    let closure = protocol(dir.path(), Arc::clone(&platform), settings());
    let ticket = platform.open_thread("1", CREATOR);

    let err = tags::set_priority(
        closure.store(),
        platform.as_ref(),
        &ticket,
        &user(CREATOR),
        "urgent",
        "please",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TallyError::NotStaff(_)));

    let err = tags::add_note(closure.store(), platform.as_ref(), &ticket, &user(CREATOR), "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::NotStaff(_)));
    assert!(lock(closure.store()).notes(&ticket).is_empty());
}

#[tokio::test]
async fn unknown_values_are_rejected_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(FakePlatform::new());
    let closure = protocol(dir.path(), Arc::clone(&platform), settings());
    let ticket = platform.open_thread("1", CREATOR);

    let err = tags::set_priority(
        closure.store(),
        platform.as_ref(),
        &ticket,
        &user(STAFF_A),
        "critical",
        "",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TallyError::InvalidTag(_)));

    let err = tags::set_category(
        closure.store(),
        platform.as_ref(),
        &ticket,
        &user(STAFF_A),
        "billing",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TallyError::InvalidTag(_)));

    let tag = tags::set_category(
        closure.store(),
        platform.as_ref(),
        &ticket,
        &user(STAFF_A),
        "Refund",
    )
    .await
    .unwrap();
    assert_eq!(tag.category, Category::Refund);
}

#[tokio::test]
async fn closing_drops_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(FakePlatform::new());
    let closure = protocol(dir.path(), Arc::clone(&platform), settings());
    let ticket = platform.open_thread("1", CREATOR);
    let staff = user(STAFF_A);

    tags::set_priority(closure.store(), platform.as_ref(), &ticket, &staff, "high", "outage")
        .await
        .unwrap();
    tags::set_category(closure.store(), platform.as_ref(), &ticket, &staff, "server")
        .await
        .unwrap();
    tags::add_note(closure.store(), platform.as_ref(), &ticket, &staff, "asked for logs")
        .await
        .unwrap();
    {
        let store = lock(closure.store());
        assert_eq!(store.data().priorities[&ticket].level, PriorityLevel::High);
        assert_eq!(store.notes(&ticket).len(), 1);
    }

    closure
        .staff_close(&ticket, &staff, None, None, Some(staff.clone()))
        .await
        .unwrap();

    let store = lock(closure.store());
    assert!(!store.data().priorities.contains_key(&ticket));
    assert!(!store.data().categories.contains_key(&ticket));
    assert!(store.notes(&ticket).is_empty());
    assert_eq!(store.tag_statistics().untagged, 0);
}
