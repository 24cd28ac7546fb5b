//! User Handlers
//!
//! First-sign-in provisioning (user plus starting wallet) and bearer token
//! revocation.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::cache::CacheKey;
use crate::domain::{Balance, LedgerError, NewUser, OperationContext, Role};
use crate::store::{StoreError, USERS_EMAIL_KEY};

use super::engine::{Committed, EngineContext};
use super::{ProvisionUserCommand, ProvisionUserResult};

const ADJECTIVES: &[&str] = &[
    "Fast", "Crazy", "Cool", "Brave", "Smart", "Lucky", "Wild", "Slowed", "Bad", "Good", "Sick",
    "Punished", "Elite", "Sweet",
];

const NOUNS: &[&str] = &[
    "Tiger", "Eagle", "Wolf", "Shark", "Panther", "Hawk", "Dragon", "Chicken", "Pow", "Dog", "Cat",
    "Pig", "Lion",
];

/// Handle candidates tried before giving up
const USERNAME_ATTEMPTS: usize = 16;

pub const DEFAULT_STARTING_BALANCE: i64 = 1000;
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@admin";

/// Generate a handle of the form `<Adjective><Noun><1000..=9999>`
pub fn generate_username<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let number: u16 = rng.gen_range(1000..=9999);
    format!("{adjective}{noun}{number}")
}

/// SHA-256 hex fingerprint under which a revoked token is stored
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// =========================================================================
// ProvisionUserHandler
// =========================================================================

/// Provisioning settings taken from configuration
#[derive(Debug, Clone)]
pub struct ProvisioningPolicy {
    pub starting_balance: Balance,
    pub admin_email: String,
}

impl Default for ProvisioningPolicy {
    fn default() -> Self {
        Self {
            starting_balance: Balance::new(DEFAULT_STARTING_BALANCE).unwrap_or_default(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
        }
    }
}

/// Handler for user provisioning
pub struct ProvisionUserHandler {
    engine: EngineContext,
    policy: ProvisioningPolicy,
}

impl ProvisionUserHandler {
    pub fn new(engine: EngineContext, policy: ProvisioningPolicy) -> Self {
        Self { engine, policy }
    }

    /// Execute the provisioning command
    ///
    /// The user and, for employees, a wallet holding the starting grant are
    /// written in one unit.
    pub async fn execute(
        &self,
        command: ProvisionUserCommand,
        context: &OperationContext,
    ) -> Result<ProvisionUserResult, LedgerError> {
        let email = command.email.trim().to_string();
        if email.is_empty() {
            return Err(LedgerError::InvalidEmail);
        }

        let role = if email == self.policy.admin_email {
            Role::Admin
        } else {
            Role::Employee
        };
        let starting_balance = self.policy.starting_balance;
        let credential_hash = command.credential_hash;

        let candidates: Vec<String> = {
            let mut rng = rand::thread_rng();
            (0..USERNAME_ATTEMPTS)
                .map(|_| generate_username(&mut rng))
                .collect()
        };

        let result = self
            .engine
            .run_unit("provision_user", context, move |mut unit| async move {
                let mut username = None;
                for candidate in candidates {
                    if !unit.username_taken(&candidate).await? {
                        username = Some(candidate);
                        break;
                    }
                }
                let username = username.ok_or_else(|| {
                    LedgerError::Persistence("no free username after retries".to_string())
                })?;

                let new_user = NewUser {
                    id: uuid::Uuid::new_v4(),
                    username,
                    email: email.clone(),
                    role,
                    credential_hash,
                };
                let user = unit
                    .insert_user(new_user)
                    .await
                    .map_err(|e| email_conflict(e, &email))?;

                let wallet = if role.has_wallet() {
                    Some(unit.insert_wallet(user.id, starting_balance).await?)
                } else {
                    None
                };

                unit.commit().await.map_err(|e| email_conflict(e, &email))?;

                Ok(Committed::new(
                    ProvisionUserResult { user, wallet },
                    vec![CacheKey::Employees],
                ))
            })
            .await?;

        tracing::info!(
            user_id = %result.user.id,
            username = %result.user.username,
            role = %result.user.role,
            "User provisioned"
        );

        Ok(result)
    }
}

fn email_conflict(err: StoreError, email: &str) -> LedgerError {
    if err.is_unique_violation_of(USERS_EMAIL_KEY) {
        LedgerError::UserAlreadyExists(email.to_string())
    } else {
        err.into()
    }
}

// =========================================================================
// LogoutHandler
// =========================================================================

/// Handler for bearer token revocation
pub struct LogoutHandler {
    engine: EngineContext,
}

impl LogoutHandler {
    pub fn new(engine: EngineContext) -> Self {
        Self { engine }
    }

    /// Record `token` as revoked. Revoking twice is a no-op.
    pub async fn execute(
        &self,
        token: &str,
        context: &OperationContext,
    ) -> Result<(), LedgerError> {
        if context.is_cancelled() {
            return Err(LedgerError::Canceled);
        }

        self.engine
            .store()
            .revoke_token(&token_fingerprint(token))
            .await?;

        tracing::info!(user_id = ?context.request_user_id, "Token revoked");
        Ok(())
    }

    pub async fn is_revoked(&self, token: &str) -> Result<bool, LedgerError> {
        Ok(self
            .engine
            .store()
            .is_token_revoked(&token_fingerprint(token))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_username_shape() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let name = generate_username(&mut rng);
            let adjective = ADJECTIVES
                .iter()
                .find(|a| name.starts_with(*a))
                .unwrap();
            let rest = &name[adjective.len()..];
            let noun = NOUNS.iter().find(|n| rest.starts_with(*n)).unwrap();
            let number: u16 = rest[noun.len()..].parse().unwrap();
            assert!((1000..=9999).contains(&number));
        }
    }

    #[test]
    fn test_token_fingerprint() {
        let fingerprint = token_fingerprint("abc");
        assert_eq!(
            fingerprint,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(fingerprint, token_fingerprint("abd"));
    }

    #[test]
    fn test_default_policy() {
        let policy = ProvisioningPolicy::default();
        assert_eq!(policy.starting_balance.value(), 1000);
        assert_eq!(policy.admin_email, "admin@admin");
    }
}
