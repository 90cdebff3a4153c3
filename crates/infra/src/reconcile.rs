//! Offline reconciliation: replay the ledger and compare with stored balances.
//!
//! Reads only. Safe to run against a live store, but results for items that
//! are being moved concurrently can be transiently inconsistent.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, instrument, warn};

use stockledger_core::ItemId;
use stockledger_inventory::Reconciliation;

use crate::store::{ItemRegistry, StockStore, StoreError};

/// Result of reconciling a set of items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    pub checked: Vec<Reconciliation>,
}

impl ReconciliationReport {
    pub fn mismatches(&self) -> impl Iterator<Item = &Reconciliation> {
        self.checked.iter().filter(|r| !r.is_consistent())
    }

    pub fn is_consistent(&self) -> bool {
        self.mismatches().next().is_none()
    }
}

/// Replay one item's ledger and compare it with its stored balance.
#[instrument(skip(store), fields(item_id = %item_id))]
pub async fn reconcile_item<S>(store: &S, item_id: ItemId) -> Result<Reconciliation, StoreError>
where
    S: StockStore + ?Sized,
{
    let stored = store.balance(item_id).await?.map(|b| b.quantity);
    let movements = store.movements(item_id).await?;
    let result = Reconciliation::check(item_id, stored, &movements);
    if !result.is_consistent() {
        warn!(
            stored = result.stored,
            replayed = result.replayed,
            movement_count = result.movement_count,
            "balance does not match ledger"
        );
    }
    Ok(result)
}

/// Reconcile every registered item plus any item that has a balance row.
///
/// Balance rows for items no longer in the registry are still checked.
#[instrument(skip_all)]
pub async fn reconcile_all<R, S>(registry: &R, store: &S) -> Result<ReconciliationReport, StoreError>
where
    R: ItemRegistry + ?Sized,
    S: StockStore + ?Sized,
{
    let mut ids: BTreeSet<ItemId> = registry
        .list_items()
        .await?
        .into_iter()
        .map(|item| item.id)
        .collect();
    ids.extend(store.balances().await?.into_iter().map(|b| b.item_id));

    let mut report = ReconciliationReport::default();
    for item_id in ids {
        report.checked.push(reconcile_item(store, item_id).await?);
    }

    info!(
        checked = report.checked.len(),
        mismatches = report.mismatches().count(),
        "reconciliation finished"
    );
    Ok(report)
}
