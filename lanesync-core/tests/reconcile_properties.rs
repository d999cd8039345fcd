use std::sync::Arc;

use lanesync_core::storage::memory::MemoryHost;
use lanesync_core::{
    detect_movements_in_text, parse, reconcile_text, sync_board, DocumentId, MarkerPolicy, Movement, PassStatus,
    PolicyEntry, Reconciler, SyncSettings,
};

fn settings(policy: &[(&str, &str)]) -> SyncSettings {
    SyncSettings {
        policy: policy
            .iter()
            .map(|(column, marker)| PolicyEntry {
                column: column.to_string(),
                marker: marker.to_string(),
            })
            .collect(),
        ..SyncSettings::default()
    }
}

fn tracked(policy: &[(&str, &str)], id: &DocumentId, baseline: &str) -> (Arc<MemoryHost>, Reconciler<Arc<MemoryHost>>) {
    let host = Arc::new(MemoryHost::new());
    host.insert(id, baseline);
    let reconciler = Reconciler::new(host.clone(), settings(policy));
    reconciler.track(id, baseline);
    (host, reconciler)
}

#[test]
fn test_sync_board_is_idempotent() {
    let policy = MarkerPolicy::default()
        .with("Todo", "[ ]")
        .with("Doing", "[/]")
        .with("Done", "[x]");
    let inputs = [
        "## Todo\n- [x] a\n- [/] b\n## Doing\n- [ ] c\n  note\n## Done\n- [ ] d\n",
        "## Review\n* [?] e\r\n* plain\r\n## Done\r\n- [x] f",
        "intro\n- [x] before any column\n## Doing\n",
    ];
    for input in inputs {
        let once = sync_board(&parse(input), input, &policy).into_owned();
        let twice = sync_board(&parse(&once), &once, &policy);
        assert_eq!(twice, once.as_str(), "not idempotent for {:?}", input);
    }
}

#[tokio::test(start_paused = true)]
async fn test_texts_without_markers_pass_through() {
    let id = DocumentId::from("plain");
    let previous = "## Todo\n- Foo\n- Bar\n## Done\n";
    let current = "## Todo\n- Bar\n## Done\n- Foo\n";
    let (host, reconciler) = tracked(&[("Done", "[x]")], &id, previous);

    let outcome = reconciler.reconcile(&id, current).await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.text, current);
    assert_eq!(host.write_count(), 0);

    let prose = "Just some notes.\nNothing to see here.\n";
    let outcome = reconciler.reconcile(&id, prose).await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.text, prose);
}

#[test]
fn test_parse_round_trips_byte_for_byte() {
    let inputs = [
        "",
        "---\nkanban-plugin: basic\n---\n\n## Todo\n\n- [ ] a\n\n## Done\n- [x] b\n",
        "## Todo\r\n- [ ] crlf\r\n  continued\r\n## Done\r\n",
        "## Todo\n- [ ] no trailing newline",
        "## Todo\n- [ ] a\n## todo\n- [x] merged heading\n%% comment %%\n",
    ];
    for input in inputs {
        assert_eq!(parse(input).to_text(), input);
    }
}

#[test]
fn test_single_move_yields_one_movement() {
    let movements = detect_movements_in_text("## A\n- [ ] Foo\n## B\n", "## A\n## B\n- [ ] Foo\n");
    assert_eq!(
        movements,
        vec![Movement {
            identity: "Foo".to_string(),
            source: "A".to_string(),
            destination: "B".to_string(),
            index: 0,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_moved_card_takes_destination_marker() {
    let id = DocumentId::from("move");
    let previous = "## A\n- [ ] Foo\n    detail line\n    - [ ] not a card\n## B\n";
    let current = "## A\n## B\n- [ ] Foo\n    detail line\n    - [ ] not a card\n";
    let (host, reconciler) = tracked(&[("A", "[ ]"), ("B", "[/]")], &id, previous);

    let outcome = reconciler.reconcile(&id, current).await.unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.text, "## A\n## B\n- [/] Foo\n    detail line\n    - [ ] not a card\n");
    assert_eq!(host.get(&id).as_deref(), Some(outcome.text.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_normalized_marker_is_restored() {
    let id = DocumentId::from("protect");
    let previous = "## B\n- [/] Foo\n";
    let (_host, reconciler) = tracked(&[("B", "[/]")], &id, previous);

    let outcome = reconciler.reconcile(&id, "## B\n- [x] Foo\n").await.unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.text, previous);
    assert_eq!(
        outcome.status,
        PassStatus::Written {
            movements: 0,
            restored: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_fixed_board_reconciles_to_itself() {
    let text = "## Todo\n- [ ] Task A\n## Done\n- [x] Task B\n";
    let policy = [("Todo", "[ ]"), ("Done", "[x]")];

    let pass = reconcile_text(text, text, &settings(&policy).marker_policy(), true);
    assert!(!pass.changed);
    assert_eq!(pass.text, text);

    let id = DocumentId::from("fixed");
    let host = Arc::new(MemoryHost::new());
    let reconciler = Reconciler::new(host.clone(), settings(&policy));
    let first = reconciler.reconcile(&id, text).await.unwrap();
    assert_eq!(first.status, PassStatus::Baseline);
    let second = reconciler.reconcile(&id, text).await.unwrap();
    assert!(!second.changed);
    assert_eq!(second.text, text);
    assert_eq!(host.write_count(), 0);
}
