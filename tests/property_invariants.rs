use proptest::prelude::*;

use hopperlog::{
    core::store::LedgerStore,
    operation::{OperationDraft, OperationFilter},
    types::{Channel, HopperId, OperationId, OperationType},
};

#[derive(Debug, Clone)]
enum Action {
    Fill { hopper: u8, added: u16, ts: u16 },
    Install { hopper: u8, added: u16, ts: u16 },
    Remove { hopper: u8, before: u16, ts: u16 },
    Clean { hopper: u8, ts: u16 },
    Acknowledge { target: u8, channel: u8 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..6, 0u16..1000, 0u16..5000)
            .prop_map(|(hopper, added, ts)| Action::Fill { hopper, added, ts }),
        (0u8..6, 0u16..1000, 0u16..5000)
            .prop_map(|(hopper, added, ts)| Action::Install { hopper, added, ts }),
        (0u8..6, 0u16..1000, 0u16..5000)
            .prop_map(|(hopper, before, ts)| Action::Remove { hopper, before, ts }),
        (0u8..6, 0u16..5000).prop_map(|(hopper, ts)| Action::Clean { hopper, ts }),
        (0u8..32, 0u8..3).prop_map(|(target, channel)| Action::Acknowledge { target, channel }),
    ]
}

fn draft_for(action: &Action) -> Option<(OperationDraft, u64)> {
    match *action {
        Action::Fill { hopper, added, ts } => Some((
            OperationDraft {
                hopper_id: u64::from(hopper),
                operation_type: OperationType::Fill,
                ingredient_id: Some(u64::from(hopper) % 3),
                quantity_before: Some(1.0),
                quantity_added: Some(f64::from(added) / 10.0),
                quantity_after: None,
                operator_id: u32::from(hopper % 2),
                machine_id: Some(u64::from(hopper) % 2),
                photos: vec![],
                notes: None,
            },
            u64::from(ts),
        )),
        Action::Install { hopper, added, ts } => Some((
            OperationDraft {
                hopper_id: u64::from(hopper),
                operation_type: OperationType::Install,
                ingredient_id: Some(u64::from(hopper) % 3),
                quantity_before: None,
                quantity_added: Some(f64::from(added) / 10.0),
                quantity_after: None,
                operator_id: u32::from(hopper % 2),
                machine_id: Some(u64::from(hopper) % 2),
                photos: vec![],
                notes: None,
            },
            u64::from(ts),
        )),
        Action::Remove { hopper, before, ts } => Some((
            OperationDraft {
                hopper_id: u64::from(hopper),
                operation_type: OperationType::Remove,
                ingredient_id: Some(u64::from(hopper) % 3),
                quantity_before: Some(f64::from(before) / 10.0),
                quantity_added: None,
                quantity_after: None,
                operator_id: u32::from(hopper % 2),
                machine_id: Some(u64::from(hopper) % 2),
                photos: vec![],
                notes: None,
            },
            u64::from(ts),
        )),
        Action::Clean { hopper, ts } => Some((
            OperationDraft {
                hopper_id: u64::from(hopper),
                operation_type: OperationType::Clean,
                ingredient_id: None,
                quantity_before: None,
                quantity_added: None,
                quantity_after: None,
                operator_id: u32::from(hopper % 2),
                machine_id: None,
                photos: vec![],
                notes: None,
            },
            u64::from(ts),
        )),
        Action::Acknowledge { .. } => None,
    }
}

fn channel_of(idx: u8) -> Channel {
    Channel::ALL[usize::from(idx) % Channel::ALL.len()]
}

fn full_scan_by_hopper(store: &LedgerStore, hopper: HopperId) -> Vec<OperationId> {
    store
        .ordered_ids()
        .iter()
        .copied()
        .filter(|id| store.get(*id).is_some_and(|r| r.hopper_id == hopper))
        .collect()
}

fn by_hopper_ids(store: &LedgerStore, hopper: HopperId) -> Vec<OperationId> {
    store.by_hopper(hopper).into_iter().map(|r| r.id).collect()
}

proptest! {
    #[test]
    fn random_sequences_preserve_order_indices_and_sync_monotonicity(
        actions in prop::collection::vec(action_strategy(), 1..200)
    ) {
        let mut store = LedgerStore::new();

        for action in actions {
            match &action {
                Action::Acknowledge { target, channel } => {
                    let ids = store.ordered_ids().to_vec();
                    if ids.is_empty() {
                        continue;
                    }
                    let id = ids[usize::from(*target) % ids.len()];
                    let channel = channel_of(*channel);
                    let was_acked = store.get(id).unwrap().sync.is_acknowledged(channel);
                    let (_, stored) = store.acknowledge(id, channel).unwrap();

                    // Flags only ever gain; a repeat queues no journal op.
                    prop_assert!(store.get(id).unwrap().sync.is_acknowledged(channel));
                    prop_assert_eq!(was_acked, stored.is_none());
                }
                other => {
                    let (draft, ts) = draft_for(other).unwrap();
                    let accepted = store.submit_at(draft, ts);
                    prop_assert!(accepted.is_ok(), "draft rejected: {:?}", accepted);

                    let (id, _) = accepted.unwrap();
                    let rec = store.get(id).unwrap();
                    if let Some(q) = rec.quantities {
                        prop_assert!(q.before >= 0.0 && q.added >= 0.0 && q.after >= 0.0);
                        match rec.operation_type {
                            OperationType::Fill => {
                                prop_assert!((q.after - (q.before + q.added)).abs() < 1e-6);
                            }
                            OperationType::Remove => {
                                prop_assert_eq!(q.after, 0.0);
                                prop_assert_eq!(q.added, 0.0);
                            }
                            OperationType::Install => {
                                prop_assert_eq!(q.before, 0.0);
                            }
                            OperationType::Clean => {}
                        }
                    } else {
                        prop_assert_eq!(rec.operation_type, OperationType::Clean);
                    }
                }
            }

            // Global order stays sorted by (created_at_ms, id).
            let keys: Vec<(u64, OperationId)> = store
                .ordered_ids()
                .iter()
                .filter_map(|id| store.get(*id))
                .map(|r| (r.created_at_ms, r.id))
                .collect();
            prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));

            for hopper in 0u64..6 {
                prop_assert_eq!(by_hopper_ids(&store, hopper), full_scan_by_hopper(&store, hopper));
            }
        }

        // Snapshot round-trip reproduces records, order, and sync flags.
        let snapshot = store.export_snapshot();
        let restored = LedgerStore::from_snapshot(snapshot.clone()).unwrap();
        prop_assert_eq!(restored.export_snapshot(), snapshot);
        prop_assert_eq!(
            restored.query_cloned(&OperationFilter::default()),
            store.query_cloned(&OperationFilter::default())
        );
    }
}
