//! Windowed consumption-rate aggregation over the ledger.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    core::store::LedgerStore,
    error::LedgerError,
    types::{IngredientId, MachineId, OperationType},
};

const MS_PER_DAY: u64 = 86_400_000;

/// Per-ingredient usage within the analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientConsumption {
    /// Ingredient the refills were recorded against.
    pub ingredient_id: IngredientId,
    /// Sum of quantity added across matching operations.
    pub total_added: f64,
    /// Number of matching operations.
    pub operations: u32,
    /// Mean gap between consecutive operations; `None` below two.
    pub avg_interval_ms: Option<f64>,
    /// Derived consumption rate: total added per day of window.
    pub rate_per_day: f64,
}

/// Aggregated ingredient usage for one machine over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionReport {
    /// Machine the report covers.
    pub machine_id: MachineId,
    /// Window length in days.
    pub period_days: u32,
    /// The `now` the window was anchored to.
    pub generated_at_ms: u64,
    /// Per-ingredient rows, ascending by ingredient id.
    pub entries: Vec<IngredientConsumption>,
    /// Total matching operations across all ingredients.
    pub total_operations: u32,
}

/// Builds a consumption report for `machine_id` over the trailing
/// `period_days` ending at `now_ms`.
///
/// Counts fill and install operations whose `created_at_ms` falls in the
/// half-open window `[now - period_days, now)`, so an operation sitting
/// exactly on a prior window boundary is never double-counted by repeated
/// calls. An empty window yields an empty report, not an error.
pub fn analyze(
    store: &LedgerStore,
    machine_id: MachineId,
    period_days: u32,
    now_ms: u64,
) -> Result<ConsumptionReport, LedgerError> {
    if period_days == 0 {
        return Err(LedgerError::InvalidArgument(
            "period_days must be positive".to_string(),
        ));
    }

    let window_start = now_ms.saturating_sub(u64::from(period_days) * MS_PER_DAY);

    struct Acc {
        total_added: f64,
        timestamps: Vec<u64>,
    }
    let mut groups: HashMap<IngredientId, Acc> = HashMap::new();
    let mut total_operations = 0u32;

    for rec in store.by_machine(machine_id) {
        if !matches!(
            rec.operation_type,
            OperationType::Fill | OperationType::Install
        ) {
            continue;
        }
        if rec.created_at_ms < window_start || rec.created_at_ms >= now_ms {
            continue;
        }
        let Some(ingredient_id) = rec.ingredient_id else {
            continue;
        };
        let added = rec.quantities.map(|q| q.added).unwrap_or(0.0);

        let acc = groups.entry(ingredient_id).or_insert(Acc {
            total_added: 0.0,
            timestamps: Vec::new(),
        });
        acc.total_added += added;
        acc.timestamps.push(rec.created_at_ms);
        total_operations += 1;
    }

    let mut entries: Vec<IngredientConsumption> = groups
        .into_iter()
        .map(|(ingredient_id, mut acc)| {
            acc.timestamps.sort_unstable();
            let count = acc.timestamps.len();
            let avg_interval_ms = if count >= 2 {
                let span = acc.timestamps[count - 1] - acc.timestamps[0];
                Some(span as f64 / (count - 1) as f64)
            } else {
                None
            };
            IngredientConsumption {
                ingredient_id,
                total_added: acc.total_added,
                operations: count as u32,
                avg_interval_ms,
                rate_per_day: acc.total_added / f64::from(period_days),
            }
        })
        .collect();
    entries.sort_unstable_by_key(|e| e.ingredient_id);

    Ok(ConsumptionReport {
        machine_id,
        period_days,
        generated_at_ms: now_ms,
        entries,
        total_operations,
    })
}
