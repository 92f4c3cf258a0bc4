use hopperlog::{
    core::store::LedgerStore,
    error::LedgerError,
    operation::OperationDraft,
    types::OperationType,
};

fn fill(hopper_id: u64, before: f64, added: f64) -> OperationDraft {
    OperationDraft {
        hopper_id,
        operation_type: OperationType::Fill,
        ingredient_id: Some(5),
        quantity_before: Some(before),
        quantity_added: Some(added),
        quantity_after: None,
        operator_id: 1,
        machine_id: Some(1),
        photos: vec![],
        notes: None,
    }
}

#[test]
fn submit_yields_monotonic_ids_and_seqs() {
    let mut store = LedgerStore::new();
    let (id1, op1) = store.submit(fill(1, 0.0, 1.0)).unwrap();
    let (id2, op2) = store.submit(fill(1, 1.0, 1.0)).unwrap();
    let (id3, op3) = store.submit(fill(2, 0.0, 1.0)).unwrap();

    assert_eq!((id1, id2, id3), (1, 2, 3));
    assert_eq!((op1.seq, op2.seq, op3.seq), (1, 2, 3));
}

#[test]
fn fill_computes_after_from_before_plus_added() {
    let mut store = LedgerStore::new();
    let (id, _) = store.submit(fill(1, 2.0, 3.0)).unwrap();

    let rec = store.get(id).unwrap();
    let q = rec.quantities.unwrap();
    assert!((q.after - 5.0).abs() < 1e-6);
    assert_eq!(q.before, 2.0);
    assert_eq!(q.added, 3.0);
}

#[test]
fn fill_cross_checks_supplied_after() {
    let mut store = LedgerStore::new();

    let ok = OperationDraft {
        quantity_after: Some(5.0),
        ..fill(1, 2.0, 3.0)
    };
    assert!(store.submit(ok).is_ok());

    let bad = OperationDraft {
        quantity_after: Some(4.5),
        ..fill(1, 2.0, 3.0)
    };
    assert!(matches!(
        store.submit(bad),
        Err(LedgerError::InvariantViolation(_))
    ));
}

#[test]
fn negative_quantity_is_rejected_before_any_state_change() {
    let mut store = LedgerStore::new();
    let err = store.submit(fill(1, -1.0, 3.0)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidQuantity(_)));

    // Nothing was assigned or persisted by the rejected draft.
    assert!(store.ordered_ids().is_empty());
    assert!(store.drain_pending_ops().is_empty());
    let (id, _) = store.submit(fill(1, 0.0, 1.0)).unwrap();
    assert_eq!(id, 1);
}

#[test]
fn remove_forces_added_and_after_to_zero() {
    let mut store = LedgerStore::new();
    let draft = OperationDraft {
        operation_type: OperationType::Remove,
        quantity_before: Some(4.2),
        quantity_added: Some(9.9),
        quantity_after: None,
        ..fill(1, 0.0, 0.0)
    };

    let (id, _) = store.submit(draft).unwrap();
    let q = store.get(id).unwrap().quantities.unwrap();
    assert_eq!(q.before, 4.2);
    assert_eq!(q.added, 0.0);
    assert_eq!(q.after, 0.0);
}

#[test]
fn install_requires_empty_hopper() {
    let mut store = LedgerStore::new();
    let draft = OperationDraft {
        operation_type: OperationType::Install,
        quantity_before: Some(1.0),
        quantity_added: Some(3.0),
        ..fill(1, 0.0, 0.0)
    };
    assert!(matches!(
        store.submit(draft),
        Err(LedgerError::InvariantViolation(_))
    ));

    let ok = OperationDraft {
        operation_type: OperationType::Install,
        quantity_before: None,
        quantity_added: Some(3.0),
        quantity_after: None,
        ..fill(1, 0.0, 0.0)
    };
    let (id, _) = store.submit(ok).unwrap();
    let q = store.get(id).unwrap().quantities.unwrap();
    assert_eq!((q.before, q.added, q.after), (0.0, 3.0, 3.0));
}

#[test]
fn clean_carries_no_quantities_or_ingredient() {
    let mut store = LedgerStore::new();
    let clean = OperationDraft {
        hopper_id: 1,
        operation_type: OperationType::Clean,
        ingredient_id: None,
        quantity_before: None,
        quantity_added: None,
        quantity_after: None,
        operator_id: 1,
        machine_id: None,
        photos: vec![],
        notes: Some("weekly rinse".to_string()),
    };
    let (id, _) = store.submit(clean.clone()).unwrap();
    assert!(store.get(id).unwrap().quantities.is_none());

    let with_quantity = OperationDraft {
        quantity_added: Some(1.0),
        ..clean.clone()
    };
    assert!(matches!(
        store.submit(with_quantity),
        Err(LedgerError::InvariantViolation(_))
    ));

    let with_ingredient = OperationDraft {
        ingredient_id: Some(5),
        ..clean
    };
    assert!(matches!(
        store.submit(with_ingredient),
        Err(LedgerError::InvariantViolation(_))
    ));
}

#[test]
fn submitted_record_round_trips_with_pending_sync() {
    let mut store = LedgerStore::new();
    let draft = OperationDraft {
        photos: vec!["ref-a".to_string(), "ref-b".to_string()],
        notes: Some("topped up".to_string()),
        ..fill(7, 1.0, 2.0)
    };
    let (id, _) = store.submit(draft.clone()).unwrap();

    let rec = store.get(id).unwrap();
    assert_eq!(rec.hopper_id, draft.hopper_id);
    assert_eq!(rec.ingredient_id, draft.ingredient_id);
    assert_eq!(rec.photos, draft.photos);
    assert_eq!(rec.notes, draft.notes);
    assert!(!rec.sync.telegram);
    assert!(!rec.sync.web);
    assert!(!rec.sync.mobile);
    assert!(!rec.sync.fully_synced());
}
