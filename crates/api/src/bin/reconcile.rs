//! Replays every item's ledger and compares it with the stored balance.
//!
//! Exits non-zero when any item drifted.

use std::process::ExitCode;

use anyhow::{bail, Context};
use stockledger_infra::{
    config::{LedgerConfig, Persistence},
    reconcile::reconcile_all,
    store::{PostgresItemRegistry, PostgresStockStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    stockledger_observability::init_with_default("warn");

    let config = LedgerConfig::from_env().context("invalid configuration")?;
    let Persistence::Postgres { database_url } = &config.persistence else {
        bail!("reconciliation needs USE_PERSISTENT_STORES=true and DATABASE_URL");
    };

    let store = PostgresStockStore::connect(database_url, config.lock_timeout)
        .await
        .context("failed to connect to Postgres")?;
    let registry = PostgresItemRegistry::new(store.pool().clone());

    let report = reconcile_all(&registry, &store)
        .await
        .context("reconciliation failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_consistent() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{} item(s) do not match their ledger", report.mismatches().count());
        Ok(ExitCode::FAILURE)
    }
}
