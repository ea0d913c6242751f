//! End-to-end status ingestion tests
//!
//! Feeds realistic recorder status sequences through the dispatcher and
//! asserts on the reconciled entity store.

use radiobridge_ingest::{Disposition, EntityStore, StatusDispatcher, import_talkgroups};
use std::sync::Arc;

fn dispatcher() -> StatusDispatcher {
    StatusDispatcher::new(Arc::new(EntityStore::new()))
}

fn handled(dispatcher: &StatusDispatcher, raw: &str) -> usize {
    match dispatcher.handle(raw.as_bytes()) {
        Disposition::Handled { events, .. } => events,
        Disposition::Skipped { reason } => panic!("unexpected skip: {reason}"),
    }
}

#[test]
fn test_recorder_session_reconciles_into_store() {
    let d = dispatcher();

    // A typical session: config, systems, recorders, rates, then calls
    handled(
        &d,
        r#"{"type": "config", "config": {"captureDir": "/captures", "systems": [{"shortName": "metro"}]}}"#,
    );
    handled(
        &d,
        r#"{"type": "systems", "systems": [
            {"shortName": "metro", "sysNum": 1, "type": "p25", "wacn": 781824, "nac": 659,
             "controlChannels": [851012500], "currentControlChannel": 851012500},
            {"shortName": "county", "type": "smartnet"}
        ]}"#,
    );
    handled(
        &d,
        r#"{"type": "recorders", "recorders": [
            {"id": "0_0", "shortName": "metro", "srcNum": 0, "recNum": 0, "state": "RECORDING"},
            {"id": "0_1", "shortName": "metro", "srcNum": 0, "recNum": 1, "state": "IDLE"}
        ]}"#,
    );
    handled(
        &d,
        r#"{"type": "rates", "rates": [{"id": "0_0", "shortName": "metro", "decodeRate": 38.5}]}"#,
    );
    handled(
        &d,
        r#"{"type": "calls_active", "calls": [
            {"talkgroup": 13050, "callNum": 77, "shortName": "metro", "freq": 851200000, "startTime": 1594255860}
        ]}"#,
    );
    handled(
        &d,
        r#"{"type": "call_end", "call": {
            "talkgroup": 13050, "callNum": 77, "shortName": "metro", "freq": 851200000,
            "startTime": 1594255860, "stopTime": 1594255872, "elapsed": 12, "length": 9.4,
            "filename": "/captures/13050-1594255860_851200000.wav"
        }}"#,
    );

    let store = d.store();
    assert_eq!(store.system_count(), 2);
    assert_eq!(store.recorder_count(), 2);

    let metro = store.system("metro").unwrap();
    assert_eq!(metro.wacn, Some(781_824));

    let recorder = store.recorder("metro", "0_0").unwrap();
    assert!((recorder.decode_rate - 38.5).abs() < f64::EPSILON);

    // The call's talkgroup was synthesized as a placeholder
    let talkgroup = store.talkgroup("metro", 13050).unwrap();
    assert!(talkgroup.is_placeholder());

    let call = store.call(13050, 77).unwrap();
    assert!(call.ended);
    assert_eq!(
        call.audio_path.as_deref(),
        Some("/captures/13050-1594255860_851200000.wav")
    );
}

#[test]
fn test_end_before_start_synthesizes_completed_call() {
    let d = dispatcher();

    handled(
        &d,
        r#"{"type": "call_end", "call": {
            "talkgroup": 200, "callNum": 9, "shortName": "metro",
            "freq": 852000000, "startTime": 1594255860, "stopTime": 1594255865
        }}"#,
    );

    let store = d.store();
    let call = store.call(200, 9).unwrap();
    assert!(call.ended);
    // Owning system and talkgroup were synthesized too
    assert!(store.system("metro").is_some());
    assert!(store.talkgroup("metro", 200).is_some());
}

#[test]
fn test_garbage_lines_are_skipped_not_fatal() {
    let d = dispatcher();

    for raw in [
        "not json at all",
        r#"{"missing": "type"}"#,
        r#"{"type": "plugin_status"}"#,
        r#"{"type": "calls_active", "calls": "nope"}"#,
    ] {
        assert!(matches!(
            d.handle(raw.as_bytes()),
            Disposition::Skipped { .. }
        ));
    }

    // The dispatcher still works afterwards
    handled(
        &d,
        r#"{"type": "systems", "systems": [{"shortName": "metro"}]}"#,
    );
    assert_eq!(d.store().system_count(), 1);
    assert_eq!(d.stats().skipped, 4);
}

#[test]
fn test_replayed_messages_are_idempotent() {
    let d = dispatcher();
    let raw = r#"{"type": "systems", "systems": [
        {"shortName": "metro", "sysNum": 1, "type": "p25", "wacn": 781824}
    ]}"#;

    handled(&d, raw);
    let first = d.store().system("metro").unwrap();
    handled(&d, raw);
    let second = d.store().system("metro").unwrap();

    assert_eq!(d.store().system_count(), 1);
    assert_eq!(first.key, second.key);
    assert_eq!(second.wacn, Some(781_824));

    // A later sparse update never clears known fields
    handled(&d, r#"{"type": "systems", "systems": [{"shortName": "metro"}]}"#);
    assert_eq!(d.store().system("metro").unwrap().wacn, Some(781_824));
}

#[test]
fn test_roster_import_enriches_live_talkgroups() {
    let d = dispatcher();

    // A call arrives first and synthesizes a placeholder talkgroup
    handled(
        &d,
        r#"{"type": "calls_active", "calls": [
            {"talkgroup": 13050, "callNum": 1, "shortName": "metro", "freq": 851200000, "startTime": 1594255860}
        ]}"#,
    );
    assert!(d.store().talkgroup("metro", 13050).unwrap().is_placeholder());

    let roster = "\
# metro talkgroup roster
13050,32FA,D,PD Disp,Police Dispatch,Law Dispatch,Public Safety,1,police|all-calls
13051,32FB,DE,PD Tac 1,Police Tactical 1,Law Tac,Public Safety,2,
Decimal,Hex,Mode,Alpha Tag,Description,Tag,Category,Priority,Streams
";
    let summary = import_talkgroups(d.store(), "metro", roster.as_bytes()).unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 1);

    let enriched = d.store().talkgroup("metro", 13050).unwrap();
    assert!(!enriched.is_placeholder());
    assert_eq!(enriched.alpha_tag, "PD Disp");
    assert_eq!(enriched.streams, vec!["police", "all-calls"]);
    assert_eq!(d.store().stream_count(), 2);
}
