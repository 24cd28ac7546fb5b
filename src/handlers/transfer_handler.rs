//! Transfer Handler
//!
//! Moves coins between two employees' wallets.

use crate::cache::CacheKey;
use crate::domain::{Amount, LedgerError, OperationContext, TransferEntry};

use super::engine::{Committed, EngineContext};
use super::TransferCommand;

/// Handler for peer-to-peer transfers
pub struct TransferHandler {
    engine: EngineContext,
}

impl TransferHandler {
    pub fn new(engine: EngineContext) -> Self {
        Self { engine }
    }

    /// Execute the transfer command
    ///
    /// Both wallets are locked in ascending owner-id order, so two transfers
    /// over the same pair of wallets never wait on each other in a cycle.
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> Result<TransferEntry, LedgerError> {
        let amount = Amount::new(command.amount).map_err(LedgerError::InvalidAmount)?;
        let TransferCommand {
            sender_id,
            recipient,
            ..
        } = command;

        let entry = self
            .engine
            .run_unit("transfer", context, move |mut unit| async move {
                let sender = unit
                    .find_user(sender_id)
                    .await?
                    .ok_or(LedgerError::SenderWalletNotFound)?;
                let receiver = unit
                    .find_user_by_username(&recipient)
                    .await?
                    .ok_or_else(|| LedgerError::RecipientNotFound(recipient.clone()))?;

                if sender.username == receiver.username {
                    return Err(LedgerError::SelfTransferRejected);
                }
                if !receiver.role.has_wallet() {
                    return Err(LedgerError::RecipientWalletNotFound(recipient));
                }

                let (first, second) = if sender.id < receiver.id {
                    (sender.id, receiver.id)
                } else {
                    (receiver.id, sender.id)
                };
                let first_wallet = unit.lock_wallet(first).await?;
                let second_wallet = unit.lock_wallet(second).await?;
                let (sender_wallet, receiver_wallet) = if first == sender.id {
                    (first_wallet, second_wallet)
                } else {
                    (second_wallet, first_wallet)
                };

                let mut sender_wallet = sender_wallet.ok_or(LedgerError::SenderWalletNotFound)?;
                let mut receiver_wallet = receiver_wallet
                    .ok_or_else(|| LedgerError::RecipientWalletNotFound(recipient.clone()))?;

                if !sender_wallet.coins.covers(amount.value()) {
                    return Err(LedgerError::insufficient_funds(
                        amount.value(),
                        sender_wallet.coins.value(),
                    ));
                }

                sender_wallet.coins = sender_wallet
                    .coins
                    .debit(amount.value())
                    .map_err(LedgerError::InvalidAmount)?;
                receiver_wallet.coins = receiver_wallet
                    .coins
                    .credit(amount.value())
                    .map_err(LedgerError::InvalidAmount)?;

                unit.set_wallet_balance(&sender_wallet).await?;
                unit.set_wallet_balance(&receiver_wallet).await?;
                let entry = unit
                    .insert_transfer(sender.id, receiver.id, amount.value())
                    .await?;
                unit.commit().await?;

                Ok(Committed::new(
                    entry,
                    vec![
                        CacheKey::Wallet(sender.id),
                        CacheKey::Sent(sender.id),
                        CacheKey::Wallet(receiver.id),
                        CacheKey::Received(receiver.id),
                    ],
                ))
            })
            .await?;

        tracing::info!(
            transfer_id = %entry.id,
            from_user = %entry.from_user,
            to_user = %entry.to_user,
            amount = entry.amount,
            correlation_id = ?context.correlation_id,
            "Transfer committed"
        );

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_transfer_command() {
        let sender = Uuid::new_v4();
        let cmd = TransferCommand::new(sender, "CoolTiger1234", 30);

        assert_eq!(cmd.sender_id, sender);
        assert_eq!(cmd.recipient, "CoolTiger1234");
        assert_eq!(cmd.amount, 30);
    }
}
