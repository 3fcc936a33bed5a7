use std::io::Cursor;

use governance_audit::{ActivityAction, ActivityLog, AuditError, NewActivity};
use marketplace_catalog::{AppId, UserId, VersionId};
use serde_json::json;

fn activity(app: u64, action: ActivityAction, details: serde_json::Value) -> NewActivity {
    NewActivity {
        action,
        app: AppId(app),
        version: Some(VersionId(1)),
        user: UserId(4043307),
        details,
    }
}

#[test]
fn filters_entries_by_app() {
    let log = ActivityLog::new();
    log.record(activity(1, ActivityAction::ManifestUpdated, json!({"version": "1.0"})))
        .unwrap();
    log.record(activity(
        2,
        ActivityAction::RereviewManifestChange,
        json!({"comments": "Manifest name changed"}),
    ))
    .unwrap();
    log.record(activity(1, ActivityAction::ManifestUpdated, json!({"version": "1.1"})))
        .unwrap();

    assert_eq!(log.len(), 3);
    assert_eq!(log.for_app(AppId(1)).len(), 2);
    let other = log.for_app(AppId(2));
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].comments(), Some("Manifest name changed"));
    assert!(log.for_app(AppId(3)).is_empty());
}

#[test]
fn jsonl_export_round_trips_entries() {
    let log = ActivityLog::new();
    log.record(activity(
        5,
        ActivityAction::RereviewManifestChange,
        json!({"comments": "Please fix your manifest at http://test/en-US/developers/upload"}),
    ))
    .unwrap();

    let mut buf = Vec::new();
    log.export_jsonl(&mut buf).unwrap();
    let text = String::from_utf8(buf.clone()).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("rereview_manifest_change"));

    let restored = ActivityLog::import_jsonl(Cursor::new(buf)).unwrap();
    assert_eq!(restored.all(), log.all());
    assert!(restored.all()[0]
        .details_text()
        .contains("/en-US/developers/upload"));
}

#[test]
fn import_reports_malformed_line() {
    let err = ActivityLog::import_jsonl(Cursor::new("\nnot json\n")).unwrap_err();
    assert!(matches!(err, AuditError::Malformed { line: 2, .. }));
}
