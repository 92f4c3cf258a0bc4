use hopperlog::{
    core::store::LedgerStore,
    operation::{OperationDraft, OperationFilter},
    types::{OperationId, OperationType, OperatorId},
};

fn draft(hopper_id: u64, operator_id: OperatorId, operation_type: OperationType) -> OperationDraft {
    let (before, added) = match operation_type {
        OperationType::Fill => (Some(0.0), Some(1.0)),
        OperationType::Install => (None, Some(1.0)),
        OperationType::Remove => (Some(1.0), None),
        OperationType::Clean => (None, None),
    };
    OperationDraft {
        hopper_id,
        operation_type,
        ingredient_id: if operation_type == OperationType::Clean {
            None
        } else {
            Some(3)
        },
        quantity_before: before,
        quantity_added: added,
        quantity_after: None,
        operator_id,
        machine_id: Some(1),
        photos: vec![],
        notes: None,
    }
}

fn ids(records: &[hopperlog::operation::HopperOperation]) -> Vec<OperationId> {
    records.iter().map(|r| r.id).collect()
}

#[test]
fn query_orders_by_created_at_then_id() {
    let mut store = LedgerStore::new();
    // Same timestamp for all three: the id tie-break decides.
    for _ in 0..3 {
        store.submit_at(draft(1, 1, OperationType::Fill), 1000).unwrap();
    }
    store.submit_at(draft(1, 1, OperationType::Fill), 2000).unwrap();

    let all = store.query_cloned(&OperationFilter::default());
    assert_eq!(ids(&all), vec![1, 2, 3, 4]);

    let keys: Vec<(u64, OperationId)> = all.iter().map(|r| (r.created_at_ms, r.id)).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn created_at_never_moves_backwards() {
    let mut store = LedgerStore::new();
    store.submit_at(draft(1, 1, OperationType::Fill), 5000).unwrap();
    // A lagging clock still yields a non-decreasing acceptance timestamp.
    let (id, _) = store.submit_at(draft(1, 1, OperationType::Fill), 4000).unwrap();
    assert_eq!(store.get(id).unwrap().created_at_ms, 5000);
}

#[test]
fn filters_are_conjunctive() {
    let mut store = LedgerStore::new();
    store.submit_at(draft(1, 1, OperationType::Fill), 100).unwrap();
    store.submit_at(draft(1, 2, OperationType::Fill), 200).unwrap();
    store.submit_at(draft(2, 1, OperationType::Remove), 300).unwrap();
    store.submit_at(draft(1, 1, OperationType::Clean), 400).unwrap();

    let filter = OperationFilter {
        hopper_id: Some(1),
        operator_id: Some(1),
        operation_type: Some(OperationType::Fill),
        ..OperationFilter::default()
    };
    assert_eq!(ids(&store.query_cloned(&filter)), vec![1]);

    let by_hopper = OperationFilter {
        hopper_id: Some(1),
        ..OperationFilter::default()
    };
    assert_eq!(ids(&store.query_cloned(&by_hopper)), vec![1, 2, 4]);
}

#[test]
fn time_range_is_half_open() {
    let mut store = LedgerStore::new();
    for ts in [100u64, 200, 300] {
        store.submit_at(draft(1, 1, OperationType::Fill), ts).unwrap();
    }

    let filter = OperationFilter {
        created_from_ms: Some(100),
        created_to_ms: Some(300),
        ..OperationFilter::default()
    };
    // 100 included, 300 excluded.
    assert_eq!(ids(&store.query_cloned(&filter)), vec![1, 2]);
}

#[test]
fn requery_without_writes_is_deterministic() {
    let mut store = LedgerStore::new();
    for i in 0..20u64 {
        store
            .submit_at(draft(i % 3, (i % 2) as u32 + 1, OperationType::Fill), 100 + i)
            .unwrap();
    }

    let filter = OperationFilter {
        hopper_id: Some(1),
        ..OperationFilter::default()
    };
    let first = store.query_cloned(&filter);
    let second = store.query_cloned(&filter);
    assert_eq!(first, second);
}

#[test]
fn pagination_resumes_without_overlap() {
    let mut store = LedgerStore::new();
    for i in 0..10u64 {
        store.submit_at(draft(1, 1, OperationType::Fill), 100 + i).unwrap();
    }

    let filter = OperationFilter::default();
    let mut cursor = None;
    let mut seen = Vec::new();
    loop {
        let page = store.page(&filter, cursor, 3);
        seen.extend(ids(&page.records));
        match page.next {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }

    assert_eq!(seen, (1..=10).collect::<Vec<_>>());
}

#[test]
fn pagination_cursor_survives_timestamp_ties() {
    let mut store = LedgerStore::new();
    for _ in 0..6 {
        store.submit_at(draft(1, 1, OperationType::Fill), 500).unwrap();
    }

    let filter = OperationFilter::default();
    let first = store.page(&filter, None, 4);
    assert_eq!(ids(&first.records), vec![1, 2, 3, 4]);

    let second = store.page(&filter, first.next, 4);
    assert_eq!(ids(&second.records), vec![5, 6]);
    assert!(second.next.is_none());
}
