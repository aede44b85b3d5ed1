//! Local view of accounts and transactions, updated before the store
//! confirms.

use std::collections::{BTreeMap, BTreeSet};

use api_types::{
    account::AccountView,
    ledger::{TransactionKind, TransactionStatus},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    ids::{LocalId, TempId},
    store::{StateStore, load_versioned, save_versioned},
};

pub const CACHE_SCHEMA_VERSION: u32 = 1;
const CACHE_KEY: &str = "cache";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTransaction {
    pub id: LocalId,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub description: String,
    pub amount_minor: i64,
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// The other leg of a transfer.
    pub linked_id: Option<LocalId>,
    /// The template of a series instance.
    pub parent_id: Option<LocalId>,
    pub is_template: bool,
}

impl CachedTransaction {
    /// What this row adds to its account balance.
    pub fn balance_effect(&self) -> i64 {
        if self.status == TransactionStatus::Completed && !self.is_template {
            self.amount_minor
        } else {
            0
        }
    }

    fn rewrite(&mut self, from: &LocalId, to: &LocalId) {
        for slot in [&mut self.id]
            .into_iter()
            .chain(self.linked_id.as_mut())
            .chain(self.parent_id.as_mut())
        {
            if slot == from {
                *slot = to.clone();
            }
        }
    }
}

/// Pre-mutation copy of the rows an intent touches. `None` marks a row that
/// did not exist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    accounts: Vec<(Uuid, Option<AccountView>)>,
    transactions: Vec<(LocalId, Option<CachedTransaction>)>,
}

impl Snapshot {
    pub fn account_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.accounts.iter().map(|(id, _)| *id)
    }

    fn rewrite(&mut self, from: &LocalId, to: &LocalId) {
        for (id, row) in &mut self.transactions {
            if id == from {
                *id = to.clone();
            }
            if let Some(row) = row {
                row.rewrite(from, to);
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    accounts: Vec<AccountView>,
    transactions: Vec<CachedTransaction>,
    rollbacks: Vec<(Uuid, Snapshot)>,
}

#[derive(Debug, Default, Clone)]
pub struct OptimisticCache {
    accounts: BTreeMap<Uuid, AccountView>,
    transactions: BTreeMap<LocalId, CachedTransaction>,
    /// Snapshots of queued operations, restored if the store rejects them.
    rollbacks: BTreeMap<Uuid, Snapshot>,
}

impl OptimisticCache {
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        let Some(document) =
            load_versioned::<CacheDocument>(store, CACHE_KEY, CACHE_SCHEMA_VERSION)?
        else {
            return Ok(Self::default());
        };
        Ok(Self {
            accounts: document
                .accounts
                .into_iter()
                .map(|account| (account.id, account))
                .collect(),
            transactions: document
                .transactions
                .into_iter()
                .map(|row| (row.id.clone(), row))
                .collect(),
            rollbacks: document.rollbacks.into_iter().collect(),
        })
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        save_versioned(
            store,
            CACHE_KEY,
            &CacheDocument {
                version: CACHE_SCHEMA_VERSION,
                accounts: self.accounts.values().cloned().collect(),
                transactions: self.transactions.values().cloned().collect(),
                rollbacks: self
                    .rollbacks
                    .iter()
                    .map(|(id, snapshot)| (*id, snapshot.clone()))
                    .collect(),
            },
        )
    }

    pub fn snapshot(&self, accounts: &[Uuid], transactions: &[LocalId]) -> Snapshot {
        Snapshot {
            accounts: accounts
                .iter()
                .map(|id| (*id, self.accounts.get(id).cloned()))
                .collect(),
            transactions: transactions
                .iter()
                .map(|id| (id.clone(), self.transactions.get(id).cloned()))
                .collect(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        for (id, account) in snapshot.accounts {
            match account {
                Some(account) => {
                    self.accounts.insert(id, account);
                }
                None => {
                    self.accounts.remove(&id);
                }
            }
        }
        for (id, row) in snapshot.transactions {
            match row {
                Some(row) => {
                    self.transactions.insert(id, row);
                }
                None => {
                    self.transactions.remove(&id);
                }
            }
        }
    }

    /// Puts back everything recorded in `snapshot`.
    ///
    /// Rows are restored as they were. An account is restored too unless its
    /// balance has moved for another reason since the snapshot was taken:
    /// another queued intent still holds it, or a confirmed intent's balance
    /// was held back. Such an account only loses the effect of the rows being
    /// restored.
    pub fn rollback(&mut self, snapshot: Snapshot) {
        let in_flight = self.accounts_in_flight();
        let mut own: BTreeMap<Uuid, i64> = BTreeMap::new();
        for (id, before) in snapshot.transactions {
            if let Some(current) = self.transactions.remove(&id) {
                *own.entry(current.account_id).or_default() += current.balance_effect();
            }
            if let Some(before) = before {
                *own.entry(before.account_id).or_default() -= before.balance_effect();
                self.transactions.insert(id, before);
            }
        }

        for (id, before) in snapshot.accounts {
            let effect = own.remove(&id).unwrap_or(0);
            let untouched = !in_flight.contains(&id)
                && match (self.accounts.get(&id), &before) {
                    (Some(current), Some(before)) => {
                        current.balance_minor - effect == before.balance_minor
                    }
                    (None, None) => true,
                    _ => false,
                };
            match before {
                Some(before) if untouched => {
                    self.accounts.insert(id, before);
                }
                None if untouched => {
                    self.accounts.remove(&id);
                }
                _ => self.adjust_balance(id, -effect),
            }
        }
        for (id, effect) in own {
            self.adjust_balance(id, -effect);
        }
    }

    pub fn account(&self, id: Uuid) -> Option<&AccountView> {
        self.accounts.get(&id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountView> {
        self.accounts.values()
    }

    pub fn upsert_account(&mut self, account: AccountView) {
        self.accounts.insert(account.id, account);
    }

    pub fn set_balance(&mut self, account_id: Uuid, balance_minor: i64) {
        if let Some(account) = self.accounts.get_mut(&account_id) {
            account.balance_minor = balance_minor;
        }
    }

    /// Unknown accounts are left alone; their balance arrives with the next
    /// refresh.
    pub fn adjust_balance(&mut self, account_id: Uuid, delta_minor: i64) {
        if let Some(account) = self.accounts.get_mut(&account_id) {
            account.balance_minor += delta_minor;
        }
    }

    pub fn transaction(&self, id: &LocalId) -> Option<&CachedTransaction> {
        self.transactions.get(id)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &CachedTransaction> {
        self.transactions.values()
    }

    pub fn account_transactions(&self, account_id: Uuid) -> Vec<&CachedTransaction> {
        self.transactions
            .values()
            .filter(|row| row.account_id == account_id && !row.is_template)
            .collect()
    }

    pub fn children_of(&self, parent: &LocalId) -> Vec<&CachedTransaction> {
        self.transactions
            .values()
            .filter(|row| row.parent_id.as_ref() == Some(parent))
            .collect()
    }

    pub fn upsert(&mut self, row: CachedTransaction) {
        self.transactions.insert(row.id.clone(), row);
    }

    pub fn remove(&mut self, id: &LocalId) -> Option<CachedTransaction> {
        self.transactions.remove(id)
    }

    /// Re-keys a row under its authoritative id and rewrites every reference
    /// to the temporary one, pending rollback snapshots included.
    pub fn reconcile_id(&mut self, temp: &TempId, real: Uuid) {
        let from = LocalId::Temp(temp.clone());
        let to = LocalId::Real(real);
        if let Some(mut row) = self.transactions.remove(&from) {
            row.id = to.clone();
            self.transactions.insert(to.clone(), row);
        }
        for row in self.transactions.values_mut() {
            row.rewrite(&from, &to);
        }
        for snapshot in self.rollbacks.values_mut() {
            snapshot.rewrite(&from, &to);
        }
    }

    pub fn remember_rollback(&mut self, op_id: Uuid, snapshot: Snapshot) {
        self.rollbacks.insert(op_id, snapshot);
    }

    pub fn take_rollback(&mut self, op_id: Uuid) -> Option<Snapshot> {
        self.rollbacks.remove(&op_id)
    }

    /// Accounts whose cached balance still carries unconfirmed effects.
    pub fn accounts_in_flight(&self) -> BTreeSet<Uuid> {
        self.rollbacks
            .values()
            .flat_map(Snapshot::account_ids)
            .collect()
    }

    pub fn pending_rollbacks(&self) -> usize {
        self.rollbacks.len()
    }
}

#[cfg(test)]
mod tests {
    use api_types::ledger::AccountKind;

    use super::*;
    use crate::store::MemoryStore;

    fn account(balance_minor: i64) -> AccountView {
        AccountView {
            id: Uuid::from_u128(7),
            name: "Checking".to_string(),
            kind: AccountKind::Ordinary,
            balance_minor,
            credit_limit_minor: None,
            archived: false,
        }
    }

    fn row(id: LocalId, amount_minor: i64) -> CachedTransaction {
        CachedTransaction {
            id,
            account_id: Uuid::from_u128(7),
            category_id: None,
            description: "Coffee".to_string(),
            amount_minor,
            date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
            kind: TransactionKind::Expense,
            status: TransactionStatus::Completed,
            linked_id: None,
            parent_id: None,
            is_template: false,
        }
    }

    #[test]
    fn restore_undoes_projection() {
        let mut cache = OptimisticCache::default();
        cache.upsert_account(account(1000));
        let id = LocalId::Temp(TempId::new());

        let snapshot = cache.snapshot(&[Uuid::from_u128(7)], &[id.clone()]);
        let projected = row(id.clone(), -250);
        cache.adjust_balance(projected.account_id, projected.balance_effect());
        cache.upsert(projected);
        assert_eq!(cache.account(Uuid::from_u128(7)).unwrap().balance_minor, 750);

        cache.restore(snapshot);
        assert_eq!(cache.account(Uuid::from_u128(7)).unwrap().balance_minor, 1000);
        assert!(cache.transaction(&id).is_none());
    }

    #[test]
    fn reconcile_rekeys_row_and_references() {
        let mut cache = OptimisticCache::default();
        let out = TempId::new();
        let incoming = out.incoming_leg();
        let mut out_row = row(LocalId::Temp(out.clone()), -300);
        out_row.linked_id = Some(LocalId::Temp(incoming.clone()));
        let mut in_row = row(LocalId::Temp(incoming.clone()), 300);
        in_row.linked_id = Some(LocalId::Temp(out.clone()));
        cache.upsert(out_row);
        cache.upsert(in_row);
        cache.remember_rollback(
            Uuid::nil(),
            cache.snapshot(&[], &[LocalId::Temp(out.clone())]),
        );

        let real_out = Uuid::new_v4();
        let real_in = Uuid::new_v4();
        cache.reconcile_id(&out, real_out);
        cache.reconcile_id(&incoming, real_in);

        assert_eq!(cache.transactions().count(), 2);
        let stored = cache.transaction(&LocalId::Real(real_in)).unwrap();
        assert_eq!(stored.linked_id, Some(LocalId::Real(real_out)));
        let rollback = cache.take_rollback(Uuid::nil()).unwrap();
        assert_eq!(rollback.transactions[0].0, LocalId::Real(real_out));
    }

    #[test]
    fn persisted_with_rollbacks() {
        let store = MemoryStore::new();
        let mut cache = OptimisticCache::default();
        cache.upsert_account(account(10));
        cache.upsert(row(LocalId::Temp(TempId::new()), -5));
        cache.remember_rollback(Uuid::nil(), Snapshot::default());
        cache.save(&store).unwrap();

        let loaded = OptimisticCache::load(&store).unwrap();
        assert_eq!(loaded.transactions().count(), 1);
        assert_eq!(loaded.account(Uuid::from_u128(7)).unwrap().balance_minor, 10);
        assert_eq!(loaded.pending_rollbacks(), 1);
    }

    #[test]
    fn templates_never_move_balances() {
        let mut template = row(LocalId::Real(Uuid::nil()), -800);
        template.is_template = true;
        assert_eq!(template.balance_effect(), 0);
        let mut pending = row(LocalId::Real(Uuid::nil()), -800);
        pending.status = TransactionStatus::Pending;
        assert_eq!(pending.balance_effect(), 0);
    }

    #[test]
    fn rollback_restores_the_snapshot() {
        let mut cache = OptimisticCache::default();
        cache.upsert_account(account(1000));
        let edited = row(LocalId::Real(Uuid::from_u128(1)), -100);
        cache.upsert(edited.clone());
        let id = LocalId::Temp(TempId::new());
        let snapshot = cache.snapshot(&[Uuid::from_u128(7)], &[edited.id.clone(), id.clone()]);

        cache.upsert(row(edited.id.clone(), -400));
        cache.upsert(row(id.clone(), -250));
        cache.adjust_balance(Uuid::from_u128(7), -550);
        cache.rollback(snapshot);

        assert_eq!(cache.account(Uuid::from_u128(7)), Some(&account(1000)));
        assert_eq!(cache.transaction(&edited.id), Some(&edited));
        assert!(cache.transaction(&id).is_none());
    }

    #[test]
    fn rollback_keeps_balance_moved_by_a_confirmed_intent() {
        let mut cache = OptimisticCache::default();
        cache.upsert_account(account(1000));
        let id = LocalId::Temp(TempId::new());
        let snapshot = cache.snapshot(&[Uuid::from_u128(7)], &[id.clone()]);
        cache.upsert(row(id.clone(), -250));
        cache.adjust_balance(Uuid::from_u128(7), -250);
        cache.remember_rollback(Uuid::nil(), snapshot);
        assert!(cache.accounts_in_flight().contains(&Uuid::from_u128(7)));

        // another intent on the account was confirmed meanwhile
        cache.set_balance(Uuid::from_u128(7), 650);
        let snapshot = cache.take_rollback(Uuid::nil()).unwrap();
        cache.rollback(snapshot);

        assert_eq!(cache.account(Uuid::from_u128(7)).unwrap().balance_minor, 900);
        assert!(cache.transaction(&id).is_none());
        assert!(cache.accounts_in_flight().is_empty());
    }

    #[test]
    fn rollback_leaves_other_queued_intents_in_place() {
        let mut cache = OptimisticCache::default();
        cache.upsert_account(account(1000));
        let first = LocalId::Temp(TempId::new());
        let second = LocalId::Temp(TempId::new());

        let snapshot = cache.snapshot(&[Uuid::from_u128(7)], &[first.clone()]);
        cache.upsert(row(first.clone(), -250));
        cache.adjust_balance(Uuid::from_u128(7), -250);
        cache.remember_rollback(Uuid::from_u128(1), snapshot);
        let snapshot = cache.snapshot(&[Uuid::from_u128(7)], &[second.clone()]);
        cache.upsert(row(second.clone(), -100));
        cache.adjust_balance(Uuid::from_u128(7), -100);
        cache.remember_rollback(Uuid::from_u128(2), snapshot);

        let snapshot = cache.take_rollback(Uuid::from_u128(1)).unwrap();
        cache.rollback(snapshot);

        assert_eq!(cache.account(Uuid::from_u128(7)).unwrap().balance_minor, 900);
        assert!(cache.transaction(&first).is_none());
        assert!(cache.transaction(&second).is_some());
    }
}
