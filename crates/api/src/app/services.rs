use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use stockledger_core::{ItemId, MovementError};
use stockledger_infra::{
    config::{LedgerConfig, Persistence},
    coordinator::{AppliedMovement, MovementCoordinator},
    store::{InMemoryItemRegistry, InMemoryStockStore, PostgresItemRegistry, PostgresStockStore},
};
use stockledger_inventory::{Balance, Item, Movement, MovementRequest, StockLevel};

type InMemoryCoordinator = MovementCoordinator<Arc<InMemoryItemRegistry>, InMemoryStockStore>;
type PersistentCoordinator = MovementCoordinator<PostgresItemRegistry, PostgresStockStore>;

/// The coordinator behind the HTTP handlers, for whichever backend is configured.
#[derive(Clone)]
pub enum AppServices {
    InMemory {
        coordinator: Arc<InMemoryCoordinator>,
    },
    Persistent {
        coordinator: Arc<PersistentCoordinator>,
    },
}

impl AppServices {
    /// In-memory backend with the given items registered.
    pub fn in_memory(items: impl IntoIterator<Item = Item>, lock_timeout: std::time::Duration) -> Self {
        let registry = Arc::new(InMemoryItemRegistry::with_items(items));
        let coordinator = MovementCoordinator::new(
            registry.clone(),
            InMemoryStockStore::with_registry(registry.clone()),
            lock_timeout,
        );
        Self::InMemory {
            coordinator: Arc::new(coordinator),
        }
    }

    pub async fn apply_movement(
        &self,
        request: MovementRequest,
    ) -> Result<AppliedMovement, MovementError> {
        match self {
            Self::InMemory { coordinator } => coordinator.apply_movement(request).await,
            Self::Persistent { coordinator } => coordinator.apply_movement(request).await,
        }
    }

    pub async fn balance(&self, item_id: ItemId) -> Result<Balance, MovementError> {
        match self {
            Self::InMemory { coordinator } => coordinator.balance(item_id).await,
            Self::Persistent { coordinator } => coordinator.balance(item_id).await,
        }
    }

    pub async fn movements(&self, item_id: ItemId) -> Result<Vec<Movement>, MovementError> {
        match self {
            Self::InMemory { coordinator } => coordinator.movements(item_id).await,
            Self::Persistent { coordinator } => coordinator.movements(item_id).await,
        }
    }

    pub async fn stock_levels(&self) -> Result<Vec<StockLevel>, MovementError> {
        match self {
            Self::InMemory { coordinator } => coordinator.stock_levels().await,
            Self::Persistent { coordinator } => coordinator.stock_levels().await,
        }
    }
}

/// Wire the configured backend.
///
/// Persistent mode connects to Postgres and applies the schema; in-memory mode
/// loads the optional seed items into the registry.
pub async fn build_services(config: &LedgerConfig) -> anyhow::Result<AppServices> {
    match &config.persistence {
        Persistence::InMemory => {
            let items = config.load_seed_items()?;
            info!(items = items.len(), "using in-memory stores");
            Ok(AppServices::in_memory(items, config.lock_timeout))
        }
        Persistence::Postgres { database_url } => {
            let store = PostgresStockStore::connect(database_url, config.lock_timeout)
                .await
                .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply the stock ledger schema")?;
            let registry = PostgresItemRegistry::new(store.pool().clone());
            info!("using Postgres stores");
            Ok(AppServices::Persistent {
                coordinator: Arc::new(MovementCoordinator::new(
                    registry,
                    store,
                    config.lock_timeout,
                )),
            })
        }
    }
}
