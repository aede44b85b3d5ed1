//! Deletion planning for recurring series.
//!
//! Completed children are realized history and are never removed by a
//! series-wide scope.

use api_types::ledger::DeleteScope;
use uuid::Uuid;

use crate::Transaction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateAction {
    Keep,
    /// Stop generating: `is_fixed = false`, the row stays a template.
    Retire,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesPlan {
    pub remove: Vec<Uuid>,
    pub template: TemplateAction,
}

/// Plans a deletion inside a series.
///
/// `target` is the child the user acted on; `None` means the template itself
/// was targeted, which behaves as [`DeleteScope::All`].
pub fn plan_deletion(
    children: &[Transaction],
    target: Option<&Transaction>,
    scope: DeleteScope,
) -> SeriesPlan {
    let scope = if target.is_none() {
        DeleteScope::All
    } else {
        scope
    };

    let remove: Vec<Uuid> = match (scope, target) {
        (DeleteScope::Current, Some(target)) => vec![target.id],
        (DeleteScope::CurrentAndRemaining, Some(target)) => children
            .iter()
            .filter(|child| !child.is_completed() && child.date >= target.date)
            .map(|child| child.id)
            .collect(),
        _ => children
            .iter()
            .filter(|child| !child.is_completed())
            .map(|child| child.id)
            .collect(),
    };

    let left = children
        .iter()
        .filter(|child| !remove.contains(&child.id))
        .count();

    let template = match scope {
        _ if left == 0 => TemplateAction::Delete,
        DeleteScope::Current => TemplateAction::Keep,
        // The series was cut short; regenerating would resurrect removed months.
        DeleteScope::CurrentAndRemaining | DeleteScope::All => TemplateAction::Retire,
    };

    SeriesPlan { remove, template }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{TransactionKind, TransactionRole, TransactionStatus};

    fn series(completed: u32, pending: u32) -> Vec<Transaction> {
        (0..completed + pending)
            .map(|i| {
                let status = if i < completed {
                    TransactionStatus::Completed
                } else {
                    TransactionStatus::Pending
                };
                let mut tx = Transaction::new(
                    "alice".to_string(),
                    Uuid::from_u128(1),
                    TransactionKind::Expense,
                    -1000,
                    NaiveDate::from_ymd_opt(2026, i + 1, 1).unwrap(),
                    "Rent".to_string(),
                    status,
                );
                tx.role = TransactionRole::Instance;
                tx.is_fixed = true;
                tx
            })
            .collect()
    }

    #[test]
    fn all_with_completed_history_retires_template() {
        let children = series(3, 9);
        let plan = plan_deletion(&children, Some(&children[5]), DeleteScope::All);
        assert_eq!(plan.remove.len(), 9);
        assert!(plan.remove.iter().all(|id| children[3..].iter().any(|c| c.id == *id)));
        assert_eq!(plan.template, TemplateAction::Retire);
    }

    #[test]
    fn all_without_history_deletes_template() {
        let children = series(0, 12);
        let plan = plan_deletion(&children, Some(&children[0]), DeleteScope::All);
        assert_eq!(plan.remove.len(), 12);
        assert_eq!(plan.template, TemplateAction::Delete);
    }

    #[test]
    fn targeting_template_behaves_as_all() {
        let children = series(2, 4);
        let plan = plan_deletion(&children, None, DeleteScope::Current);
        assert_eq!(plan.remove.len(), 4);
        assert_eq!(plan.template, TemplateAction::Retire);
    }

    #[test]
    fn current_and_remaining_keeps_earlier_pending() {
        let children = series(1, 5);
        let plan = plan_deletion(&children, Some(&children[3]), DeleteScope::CurrentAndRemaining);
        assert_eq!(plan.remove, vec![children[3].id, children[4].id, children[5].id]);
        assert_eq!(plan.template, TemplateAction::Retire);
    }

    #[test]
    fn current_on_last_child_collects_template() {
        let children = series(0, 1);
        let plan = plan_deletion(&children, Some(&children[0]), DeleteScope::Current);
        assert_eq!(plan.remove, vec![children[0].id]);
        assert_eq!(plan.template, TemplateAction::Delete);
    }

    #[test]
    fn current_keeps_template_with_siblings() {
        let children = series(1, 2);
        let plan = plan_deletion(&children, Some(&children[0]), DeleteScope::Current);
        assert_eq!(plan.remove, vec![children[0].id]);
        assert_eq!(plan.template, TemplateAction::Keep);
    }
}
