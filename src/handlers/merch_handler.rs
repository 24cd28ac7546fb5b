//! Merch Handler
//!
//! Creates catalog items and changes their price.

use crate::cache::CacheKey;
use crate::domain::{LedgerError, OperationContext, Price};

use super::engine::{Committed, EngineContext};
use super::{UpsertMerchCommand, UpsertMerchResult, UpsertOutcome};

pub struct UpsertMerchHandler {
    engine: EngineContext,
}

impl UpsertMerchHandler {
    pub fn new(engine: EngineContext) -> Self {
        Self { engine }
    }

    /// Execute the upsert command
    ///
    /// Re-submitting the current price is rejected with `NoChange` and
    /// writes nothing.
    pub async fn execute(
        &self,
        command: UpsertMerchCommand,
        context: &OperationContext,
    ) -> Result<UpsertMerchResult, LedgerError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::InvalidItemName);
        }
        let price = Price::new(command.price).map_err(LedgerError::InvalidPrice)?;

        let result = self
            .engine
            .run_unit("upsert_merch", context, move |mut unit| async move {
                let existing = unit.lock_merch(&name).await?;
                let result = match existing {
                    Some(existing) if existing.price == price => {
                        return Err(LedgerError::NoChange(name));
                    }
                    Some(mut existing) => {
                        existing.price = price;
                        unit.update_merch_price(&existing).await?;
                        UpsertMerchResult {
                            outcome: UpsertOutcome::Updated,
                            item: existing,
                        }
                    }
                    None => UpsertMerchResult {
                        outcome: UpsertOutcome::Created,
                        item: unit.insert_merch(&name, price).await?,
                    },
                };
                unit.commit().await?;

                Ok(Committed::new(result, vec![CacheKey::Merch]))
            })
            .await?;

        tracing::info!(
            item = %result.item.name,
            price = %result.item.price,
            outcome = ?result.outcome,
            "Catalog item saved"
        );

        Ok(result)
    }
}
