//! Quantity reconciliation rules per operation type.

use crate::{error::LedgerError, operation::Quantities, types::OperationType};

/// Floating tolerance when cross-checking a caller-supplied `after` value.
pub const EPSILON: f64 = 1e-6;

/// Reconciles raw draft quantities into the stored [`Quantities`] triple.
///
/// Returns `None` for clean operations, which carry no quantities. The
/// caller-supplied `after` value, when present, is cross-checked against
/// the computed one within [`EPSILON`].
///
/// Rules:
/// - fill: `after = before + added`, both inputs required
/// - install: `before` must be absent or zero, `after = added`
/// - remove: `added` and `after` forced to zero, `before` defaults to zero
/// - clean: all quantity inputs must be absent
pub fn resolve(
    operation_type: OperationType,
    before: Option<f64>,
    added: Option<f64>,
    supplied_after: Option<f64>,
) -> Result<Option<Quantities>, LedgerError> {
    for (name, value) in [
        ("quantity_before", before),
        ("quantity_added", added),
        ("quantity_after", supplied_after),
    ] {
        if let Some(v) = value {
            // Rejects NaN as well.
            if !(v >= 0.0) {
                return Err(LedgerError::InvalidQuantity(format!("{name} = {v}")));
            }
        }
    }

    let computed = match operation_type {
        OperationType::Fill => {
            let before = require(before, "quantity_before")?;
            let added = require(added, "quantity_added")?;
            Quantities {
                before,
                added,
                after: before + added,
            }
        }
        OperationType::Install => {
            if let Some(b) = before {
                if b > EPSILON {
                    return Err(LedgerError::InvariantViolation(format!(
                        "install requires an empty hopper, got quantity_before = {b}"
                    )));
                }
            }
            let added = require(added, "quantity_added")?;
            Quantities {
                before: 0.0,
                added,
                after: added,
            }
        }
        OperationType::Remove => Quantities {
            before: before.unwrap_or(0.0),
            added: 0.0,
            after: 0.0,
        },
        OperationType::Clean => {
            if before.is_some() || added.is_some() || supplied_after.is_some() {
                return Err(LedgerError::InvariantViolation(
                    "clean operations carry no quantities".to_string(),
                ));
            }
            return Ok(None);
        }
    };

    if operation_type != OperationType::Remove {
        if let Some(supplied) = supplied_after {
            if (supplied - computed.after).abs() > EPSILON {
                return Err(LedgerError::InvariantViolation(format!(
                    "quantity_after = {supplied} disagrees with computed {}",
                    computed.after
                )));
            }
        }
    }

    Ok(Some(computed))
}

fn require(value: Option<f64>, name: &str) -> Result<f64, LedgerError> {
    value.ok_or_else(|| LedgerError::InvalidQuantity(format!("{name} is required")))
}
