//! Admin Credit Handler
//!
//! Adds coins to an employee's wallet. This is the only operation that puts
//! new coins into circulation.

use crate::cache::CacheKey;
use crate::domain::{Amount, CreditEntry, LedgerError, OperationContext};

use super::engine::{Committed, EngineContext};
use super::AdminCreditCommand;

pub struct AdminCreditHandler {
    engine: EngineContext,
}

impl AdminCreditHandler {
    pub fn new(engine: EngineContext) -> Self {
        Self { engine }
    }

    /// Execute the credit command
    pub async fn execute(
        &self,
        command: AdminCreditCommand,
        context: &OperationContext,
    ) -> Result<CreditEntry, LedgerError> {
        let amount = Amount::new(command.amount).map_err(LedgerError::InvalidAmount)?;
        let AdminCreditCommand {
            admin_id,
            recipient,
            ..
        } = command;

        let entry = self
            .engine
            .run_unit("admin_credit", context, move |mut unit| async move {
                let receiver = unit
                    .find_user_by_username(&recipient)
                    .await?
                    .ok_or_else(|| LedgerError::RecipientNotFound(recipient.clone()))?;
                let mut wallet = unit
                    .lock_wallet(receiver.id)
                    .await?
                    .ok_or_else(|| LedgerError::RecipientWalletNotFound(recipient.clone()))?;

                wallet.coins = wallet
                    .coins
                    .credit(amount.value())
                    .map_err(LedgerError::InvalidAmount)?;
                unit.set_wallet_balance(&wallet).await?;
                let entry = unit
                    .insert_credit(receiver.id, admin_id, amount.value())
                    .await?;
                unit.commit().await?;

                Ok(Committed::new(entry, vec![CacheKey::Wallet(receiver.id)]))
            })
            .await?;

        tracing::info!(
            credit_id = %entry.id,
            user_id = %entry.user_id,
            credited_by = %entry.credited_by,
            amount = entry.amount,
            "Admin credit committed"
        );

        Ok(entry)
    }
}
