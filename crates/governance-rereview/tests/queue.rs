use governance_audit::{ActivityAction, ActivityLog};
use governance_rereview::{RereviewQueue, RereviewTrigger};
use marketplace_catalog::{AppId, UserId};

const TASK_USER: UserId = UserId(4043307);

fn trigger(message: &str) -> RereviewTrigger {
    RereviewTrigger {
        action: ActivityAction::RereviewManifestChange,
        version: None,
        user: TASK_USER,
        message: Some(message.into()),
    }
}

#[test]
fn flag_is_idempotent_per_app() {
    let log = ActivityLog::new();
    let queue = RereviewQueue::new(log.clone());

    assert!(queue.flag(AppId(1), trigger("first")).unwrap());
    assert!(!queue.flag(AppId(1), trigger("second")).unwrap());
    assert_eq!(queue.len(), 1);
    // every trigger is still audited
    assert_eq!(log.for_app(AppId(1)).len(), 2);

    assert!(queue.flag(AppId(2), trigger("other")).unwrap());
    assert_eq!(queue.len(), 2);
}

#[test]
fn clearing_opens_a_new_review_cycle() {
    let log = ActivityLog::new();
    let queue = RereviewQueue::new(log.clone());
    queue.flag(AppId(3), trigger("changed")).unwrap();

    assert!(queue.clear(AppId(3), UserId(1)).unwrap());
    assert!(!queue.contains(AppId(3)));
    assert!(!queue.clear(AppId(3), UserId(1)).unwrap());

    assert!(queue.flag(AppId(3), trigger("changed again")).unwrap());
    let actions: Vec<_> = log.for_app(AppId(3)).iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            ActivityAction::RereviewManifestChange,
            ActivityAction::RereviewCleared,
            ActivityAction::RereviewManifestChange,
        ]
    );
}

#[test]
fn restores_outstanding_entries() {
    let log = ActivityLog::new();
    let queue = RereviewQueue::new(log.clone());
    queue.flag(AppId(9), trigger("changed")).unwrap();

    let restored = RereviewQueue::from_entries(queue.entries(), log);
    assert!(restored.contains(AppId(9)));
    assert!(!restored.flag(AppId(9), trigger("again")).unwrap());
}
