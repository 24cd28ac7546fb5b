//! Purchase Handler
//!
//! Debits a buyer's wallet for one catalog item.

use crate::cache::CacheKey;
use crate::domain::{LedgerError, OperationContext};

use super::engine::{Committed, EngineContext};
use super::{PurchaseCommand, PurchaseResult};

pub struct PurchaseHandler {
    engine: EngineContext,
}

impl PurchaseHandler {
    pub fn new(engine: EngineContext) -> Self {
        Self { engine }
    }

    /// Execute the purchase command
    ///
    /// The buyer's wallet is locked; the item price is a snapshot read inside
    /// the same unit and recorded as `price_paid`.
    pub async fn execute(
        &self,
        command: PurchaseCommand,
        context: &OperationContext,
    ) -> Result<PurchaseResult, LedgerError> {
        let PurchaseCommand { buyer_id, item } = command;

        let result = self
            .engine
            .run_unit("purchase", context, move |mut unit| async move {
                let buyer = unit
                    .find_user(buyer_id)
                    .await?
                    .ok_or(LedgerError::BuyerNotFound)?;
                let mut wallet = unit
                    .lock_wallet(buyer.id)
                    .await?
                    .ok_or(LedgerError::WalletNotFound)?;
                let merch = unit
                    .find_merch(&item)
                    .await?
                    .ok_or_else(|| LedgerError::ItemNotFound(item.clone()))?;

                let price = merch.price.value();
                if !wallet.coins.covers(price) {
                    return Err(LedgerError::insufficient_funds(price, wallet.coins.value()));
                }

                wallet.coins = wallet
                    .coins
                    .debit(price)
                    .map_err(LedgerError::InvalidAmount)?;
                unit.set_wallet_balance(&wallet).await?;
                unit.insert_purchase(buyer.id, merch.id, price).await?;
                unit.commit().await?;

                Ok(Committed::new(
                    PurchaseResult {
                        balance: wallet.coins.value(),
                        item: merch.name,
                        nickname: buyer.username,
                    },
                    vec![CacheKey::Wallet(buyer.id), CacheKey::Inventory(buyer.id)],
                ))
            })
            .await?;

        tracing::info!(
            buyer = %result.nickname,
            item = %result.item,
            balance = result.balance,
            correlation_id = ?context.correlation_id,
            "Purchase committed"
        );

        Ok(result)
    }
}
