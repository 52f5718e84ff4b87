use std::sync::Arc;

use anyhow::Result;
use lexy_common::{CreditAccount, Membership};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::account::AccountStore;
use crate::error::GateDenial;
use crate::identity::Identity;
use crate::notice::{Notice, NoticeAction, Notifier};
use crate::store::{keys, LocalStore, StorageKey};

const ANON_CREDITS: StorageKey<i64> = StorageKey::fixed(keys::ANON_CREDITS);

/// Guards every paid action.
///
/// Signed-in users are checked against the live account document; anonymous
/// users against a counter in local storage. Checks happen before any
/// network call; the decrement happens only after the action succeeded.
pub struct CreditGate {
    identity: Identity,
    accounts: Arc<dyn AccountStore>,
    local: LocalStore,
    anon_credits: i64,
    notifier: Arc<dyn Notifier>,
    live: Option<watch::Receiver<CreditAccount>>,
}

impl CreditGate {
    pub async fn connect(
        identity: Identity,
        accounts: Arc<dyn AccountStore>,
        local: LocalStore,
        anon_credits: i64,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let live = match identity.email() {
            Some(email) => Some(accounts.subscribe(email).await?),
            None => None,
        };

        Ok(Self {
            identity,
            accounts,
            local,
            anon_credits,
            notifier,
            live,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Receiver for the signed-in account, `None` when anonymous.
    pub fn watch(&self) -> Option<watch::Receiver<CreditAccount>> {
        self.live.clone()
    }

    pub fn account(&self) -> CreditAccount {
        match &self.live {
            Some(rx) => *rx.borrow(),
            None => CreditAccount::new(
                self.local.get(&ANON_CREDITS).unwrap_or(self.anon_credits),
                Membership::Free,
            ),
        }
    }

    /// Fails with an upgrade notice when no credits remain.
    pub fn check(&self) -> Result<(), GateDenial> {
        let account = self.account();
        if account.can_spend() {
            return Ok(());
        }
        debug!(credits = account.credits, membership = %account.membership, "Paid action blocked");
        self.notifier.notify(
            Notice::warning("You have no credits left. Upgrade your plan to continue.")
                .with_action(NoticeAction::Upgrade),
        );
        Err(GateDenial::OutOfCredits)
    }

    /// The caller's email, or a sign-in notice when anonymous.
    pub fn require_email(&self) -> Result<String, GateDenial> {
        match self.identity.email() {
            Some(email) => Ok(email.to_string()),
            None => {
                self.notifier.notify(
                    Notice::warning("Please sign in to use AI analysis.")
                        .with_action(NoticeAction::SignIn),
                );
                Err(GateDenial::SignInRequired)
            }
        }
    }

    /// Spend one credit after a successful action. Fire-and-forget: a failed
    /// decrement is logged and the already-shown result stands.
    pub async fn consume(&self) {
        let account = self.account();
        if account.is_unlimited() {
            return;
        }

        match self.identity.email() {
            Some(email) => {
                if let Err(e) = self.accounts.decrement_credit(email).await {
                    warn!(error = %e, "Credit decrement failed");
                }
            }
            None => {
                let remaining = (account.credits - 1).max(0);
                if let Err(e) = self.local.set(&ANON_CREDITS, &remaining) {
                    warn!(error = %e, "Failed to store anonymous credits");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::MemoryAccountStore;
    use crate::testing::RecordingNotifier;

    async fn gate_for(
        identity: Identity,
        accounts: Arc<MemoryAccountStore>,
        notifier: Arc<RecordingNotifier>,
    ) -> CreditGate {
        CreditGate::connect(identity, accounts, LocalStore::in_memory(), 2, notifier)
            .await
            .unwrap()
    }

    fn user() -> Identity {
        Identity::from_email(Some("a@b.c"))
    }

    #[tokio::test]
    async fn exhausted_free_account_is_denied_with_upgrade_notice() {
        let accounts = Arc::new(
            MemoryAccountStore::default().with_account("a@b.c", CreditAccount::new(0, Membership::Free)),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate_for(user(), accounts, notifier.clone()).await;

        assert_eq!(gate.check(), Err(GateDenial::OutOfCredits));
        assert_eq!(notifier.notices()[0].action, Some(NoticeAction::Upgrade));
    }

    #[tokio::test]
    async fn pro_account_is_never_charged() {
        let accounts = Arc::new(
            MemoryAccountStore::default().with_account("a@b.c", CreditAccount::new(0, Membership::Pro)),
        );
        let gate = gate_for(user(), accounts.clone(), Arc::default()).await;

        assert!(gate.check().is_ok());
        gate.consume().await;
        assert_eq!(accounts.account("a@b.c").credits, 0);
    }

    #[tokio::test]
    async fn consume_tracks_live_account() {
        let accounts = Arc::new(
            MemoryAccountStore::default().with_account("a@b.c", CreditAccount::new(1, Membership::Basic)),
        );
        let gate = gate_for(user(), accounts, Arc::default()).await;

        gate.consume().await;
        assert_eq!(gate.account().credits, 0);
        assert!(gate.check().is_err());
    }

    #[tokio::test]
    async fn anonymous_counter_is_local_and_floors_at_zero() {
        let accounts = Arc::new(MemoryAccountStore::default());
        let gate = gate_for(Identity::Anonymous, accounts, Arc::default()).await;

        assert_eq!(gate.account().credits, 2);
        for _ in 0..3 {
            gate.consume().await;
        }
        assert_eq!(gate.account().credits, 0);
        assert!(gate.watch().is_none());
    }

    #[tokio::test]
    async fn anonymous_caller_must_sign_in() {
        let notifier = Arc::new(RecordingNotifier::default());
        let gate = gate_for(Identity::Anonymous, Arc::default(), notifier.clone()).await;

        assert_eq!(gate.require_email(), Err(GateDenial::SignInRequired));
        assert_eq!(notifier.notices()[0].action, Some(NoticeAction::SignIn));
    }
}
