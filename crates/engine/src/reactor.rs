//! Provision (envelope) reactor and balance effects.
//!
//! Both are pure functions of the row state before and after a write. The
//! write path in [`crate::Engine`] applies their output inside the same
//! database transaction as the row write itself.
//!
//! Only realized ordinary spend or income moves an envelope: a row qualifies
//! when it is `completed`, not fixed, not a provision, template or transfer
//! leg, and has a category. A qualifying row contributes `-amount` to the
//! envelope of its `(owner, category, month)`, so an expense of `-1500` takes
//! an envelope of `-5000` to `-3500`.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{EngineError, Period, ResultEngine, Transaction, TransactionRole};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvelopeKey {
    pub owner_id: String,
    pub category_id: Uuid,
    pub period: Period,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeDelta {
    pub key: EnvelopeKey,
    pub delta_minor: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceDelta {
    pub account_id: Uuid,
    pub delta_minor: i64,
}

fn overflow() -> EngineError {
    EngineError::InvalidInput("amount overflow".to_string())
}

fn envelope_contribution(tx: &Transaction) -> ResultEngine<Option<(EnvelopeKey, i64)>> {
    let qualifies = tx.is_completed()
        && !tx.is_fixed
        && matches!(tx.role, TransactionRole::Ordinary | TransactionRole::Instance);
    let Some(category_id) = tx.category_id.filter(|_| qualifies) else {
        return Ok(None);
    };
    let amount = tx.amount_minor.checked_neg().ok_or_else(overflow)?;
    Ok(Some((
        EnvelopeKey {
            owner_id: tx.owner_id.clone(),
            category_id,
            period: tx.period(),
        },
        amount,
    )))
}

fn balance_contribution(tx: &Transaction) -> Option<(Uuid, i64)> {
    (tx.is_completed() && !tx.is_template()).then_some((tx.account_id, tx.amount_minor))
}

/// Subtracts the old contributions from the new ones, per key, dropping zeros.
fn diff<K: Ord>(old: Option<(K, i64)>, new: Option<(K, i64)>) -> ResultEngine<Vec<(K, i64)>> {
    let mut merged: BTreeMap<K, i64> = BTreeMap::new();
    if let Some((key, value)) = old {
        let slot = merged.entry(key).or_default();
        *slot = slot.checked_sub(value).ok_or_else(overflow)?;
    }
    if let Some((key, value)) = new {
        let slot = merged.entry(key).or_default();
        *slot = slot.checked_add(value).ok_or_else(overflow)?;
    }
    Ok(merged.into_iter().filter(|(_, delta)| *delta != 0).collect())
}

/// Envelope adjustments caused by moving a row from `old` to `new`.
///
/// `None` on the old side is an insert, `None` on the new side a delete.
pub fn envelope_effects(
    old: Option<&Transaction>,
    new: Option<&Transaction>,
) -> ResultEngine<Vec<EnvelopeDelta>> {
    let old = old.map(envelope_contribution).transpose()?.flatten();
    let new = new.map(envelope_contribution).transpose()?.flatten();
    Ok(diff(old, new)?
        .into_iter()
        .map(|(key, delta_minor)| EnvelopeDelta { key, delta_minor })
        .collect())
}

/// Account balance adjustments caused by moving a row from `old` to `new`.
pub fn balance_effects(
    old: Option<&Transaction>,
    new: Option<&Transaction>,
) -> ResultEngine<Vec<BalanceDelta>> {
    Ok(diff(
        old.and_then(balance_contribution),
        new.and_then(balance_contribution),
    )?
    .into_iter()
    .map(|(account_id, delta_minor)| BalanceDelta {
        account_id,
        delta_minor,
    })
    .collect())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{TransactionKind, TransactionStatus};

    fn expense(amount: i64, status: TransactionStatus) -> Transaction {
        let mut tx = Transaction::new(
            "alice".to_string(),
            Uuid::from_u128(1),
            TransactionKind::Expense,
            amount,
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            "Groceries".to_string(),
            status,
        );
        tx.category_id = Some(Uuid::from_u128(7));
        tx
    }

    #[test]
    fn completed_insert_deducts_envelope() {
        let tx = expense(-1500, TransactionStatus::Completed);
        let effects = envelope_effects(None, Some(&tx)).unwrap();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].delta_minor, 1500);
        assert_eq!(effects[0].key.period, Period::new(2026, 3).unwrap());
        // -5000 envelope + 1500 = -3500
        assert_eq!(-5000 + effects[0].delta_minor, -3500);
    }

    #[test]
    fn delete_refunds_envelope() {
        let tx = expense(-1500, TransactionStatus::Completed);
        let effects = envelope_effects(Some(&tx), None).unwrap();
        assert_eq!(effects[0].delta_minor, -1500);
    }

    #[test]
    fn pending_rows_are_ignored() {
        let tx = expense(-1500, TransactionStatus::Pending);
        assert!(envelope_effects(None, Some(&tx)).unwrap().is_empty());
        assert!(balance_effects(None, Some(&tx)).unwrap().is_empty());
    }

    #[test]
    fn status_transitions() {
        let pending = expense(-1500, TransactionStatus::Pending);
        let completed = Transaction {
            status: TransactionStatus::Completed,
            ..pending.clone()
        };
        assert_eq!(
            envelope_effects(Some(&pending), Some(&completed)).unwrap()[0].delta_minor,
            1500
        );
        assert_eq!(
            envelope_effects(Some(&completed), Some(&pending)).unwrap()[0].delta_minor,
            -1500
        );
    }

    #[test]
    fn month_change_moves_between_envelopes() {
        let before = expense(-1500, TransactionStatus::Completed);
        let after = Transaction {
            date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            ..before.clone()
        };
        let effects = envelope_effects(Some(&before), Some(&after)).unwrap();
        assert_eq!(effects.len(), 2);
        let march = effects
            .iter()
            .find(|e| e.key.period == Period::new(2026, 3).unwrap())
            .unwrap();
        let april = effects
            .iter()
            .find(|e| e.key.period == Period::new(2026, 4).unwrap())
            .unwrap();
        assert_eq!(march.delta_minor, -1500);
        assert_eq!(april.delta_minor, 1500);
    }

    #[test]
    fn unchanged_row_has_no_effects() {
        let tx = expense(-1500, TransactionStatus::Completed);
        assert!(envelope_effects(Some(&tx), Some(&tx)).unwrap().is_empty());
        assert!(balance_effects(Some(&tx), Some(&tx)).unwrap().is_empty());
    }

    #[test]
    fn fixed_and_structural_rows_never_touch_envelopes() {
        let mut fixed = expense(-1500, TransactionStatus::Completed);
        fixed.is_fixed = true;
        fixed.role = TransactionRole::Instance;
        assert!(envelope_effects(None, Some(&fixed)).unwrap().is_empty());
        assert_eq!(balance_effects(None, Some(&fixed)).unwrap()[0].delta_minor, -1500);

        for role in [
            TransactionRole::Provision,
            TransactionRole::Template,
            TransactionRole::TransferLeg,
        ] {
            let mut row = expense(-1500, TransactionStatus::Completed);
            row.role = role;
            assert!(envelope_effects(None, Some(&row)).unwrap().is_empty());
        }
    }

    #[test]
    fn templates_never_touch_balances() {
        let mut template = expense(-1500, TransactionStatus::Completed);
        template.role = TransactionRole::Template;
        assert!(balance_effects(None, Some(&template)).unwrap().is_empty());
    }

    #[test]
    fn unnegatable_amount_is_rejected() {
        let tx = expense(i64::MIN, TransactionStatus::Completed);
        assert!(matches!(
            envelope_effects(None, Some(&tx)),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
