//! Account hierarchy aggregation.
//!
//! Turns the flat account list plus per-account debit/credit totals into a
//! forest of [`AccountNode`]s where every node also carries the totals of its
//! whole subtree. The tree is rebuilt per request; nothing here is cached.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Account, EngineError, ResultEngine, checked_account_balance};

/// Debit and credit sums posted directly to one account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTotals {
    pub debits_minor: i64,
    pub credits_minor: i64,
}

impl AccountTotals {
    #[must_use]
    pub fn new(debits_minor: i64, credits_minor: i64) -> Self {
        Self {
            debits_minor,
            credits_minor,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountNode {
    pub account: Account,
    pub debits_minor: i64,
    pub credits_minor: i64,
    /// Balance of the account alone, signed by its kind.
    pub balance_minor: i64,
    pub total_debits_minor: i64,
    pub total_credits_minor: i64,
    /// Balance of the account plus all its descendants.
    pub total_balance_minor: i64,
    pub children: Vec<AccountNode>,
}

/// Builds the aggregated account forest.
///
/// Accounts whose parent is missing from `accounts`, or whose ancestry loops
/// back onto themselves, become roots instead of being dropped. Siblings and
/// roots are sorted by name. Fails with `InvalidInput` when a balance or a
/// subtree total does not fit in `i64`.
pub fn build_account_tree(
    accounts: &[Account],
    totals: &HashMap<Uuid, AccountTotals>,
) -> ResultEngine<Vec<AccountNode>> {
    let by_id: HashMap<Uuid, &Account> = accounts.iter().map(|a| (a.id, a)).collect();

    let mut children: HashMap<Uuid, Vec<&Account>> = HashMap::new();
    let mut roots: Vec<&Account> = Vec::new();
    for account in accounts {
        match resolved_parent(account, &by_id) {
            Some(parent_id) => children.entry(parent_id).or_default().push(account),
            None => roots.push(account),
        }
    }

    sort_by_name(&mut roots);
    for siblings in children.values_mut() {
        sort_by_name(siblings);
    }

    roots
        .into_iter()
        .map(|root| build_node(root, &children, totals))
        .collect()
}

/// Parent id if it exists and does not lead back to `account`.
fn resolved_parent(account: &Account, by_id: &HashMap<Uuid, &Account>) -> Option<Uuid> {
    let parent_id = account.parent_id?;
    if !by_id.contains_key(&parent_id) {
        return None;
    }

    let mut seen = HashSet::from([account.id]);
    let mut cursor = Some(parent_id);
    while let Some(id) = cursor {
        if id == account.id {
            return None;
        }
        if !seen.insert(id) {
            // Loop further up that does not include this account.
            break;
        }
        cursor = by_id.get(&id).and_then(|a| a.parent_id);
    }
    Some(parent_id)
}

fn sort_by_name(accounts: &mut [&Account]) {
    accounts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

fn overflow(account: &Account) -> EngineError {
    EngineError::InvalidInput(format!("totals of account {} overflow", account.name))
}

fn build_node(
    account: &Account,
    children: &HashMap<Uuid, Vec<&Account>>,
    totals: &HashMap<Uuid, AccountTotals>,
) -> ResultEngine<AccountNode> {
    let own = totals.get(&account.id).copied().unwrap_or_default();
    let balance_minor =
        checked_account_balance(account.kind, own.debits_minor, own.credits_minor)
            .ok_or_else(|| overflow(account))?;

    let child_nodes = match children.get(&account.id) {
        Some(list) => list
            .iter()
            .map(|child| build_node(child, children, totals))
            .collect::<ResultEngine<Vec<_>>>()?,
        None => Vec::new(),
    };

    let mut node = AccountNode {
        account: account.clone(),
        debits_minor: own.debits_minor,
        credits_minor: own.credits_minor,
        balance_minor,
        total_debits_minor: own.debits_minor,
        total_credits_minor: own.credits_minor,
        total_balance_minor: balance_minor,
        children: Vec::new(),
    };
    for child in &child_nodes {
        node.total_debits_minor = node
            .total_debits_minor
            .checked_add(child.total_debits_minor)
            .ok_or_else(|| overflow(account))?;
        node.total_credits_minor = node
            .total_credits_minor
            .checked_add(child.total_credits_minor)
            .ok_or_else(|| overflow(account))?;
        node.total_balance_minor = node
            .total_balance_minor
            .checked_add(child.total_balance_minor)
            .ok_or_else(|| overflow(account))?;
    }
    node.children = child_nodes;
    Ok(node)
}

/// All accounts below `root_id`, breadth first. `root_id` itself is not
/// included.
#[must_use]
pub fn descendant_ids(accounts: &HashMap<Uuid, Account>, root_id: Uuid) -> Vec<Uuid> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for account in accounts.values() {
        if let Some(parent_id) = account.parent_id {
            children.entry(parent_id).or_default().push(account.id);
        }
    }

    let mut out = Vec::new();
    let mut visited = HashSet::from([root_id]);
    let mut queue = VecDeque::from([root_id]);
    while let Some(id) = queue.pop_front() {
        for child in children.get(&id).into_iter().flatten() {
            if visited.insert(*child) {
                out.push(*child);
                queue.push_back(*child);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountKind, calculate_account_balance};

    fn account(name: &str, kind: AccountKind, parent: Option<&Account>) -> Account {
        let mut account = Account::new("alice", name, kind);
        if let Some(parent) = parent {
            account.parent_id = Some(parent.id);
            account.level = parent.level + 1;
        }
        account
    }

    #[test]
    fn rollup_equals_sum_of_own_balances() {
        let food = account("Food", AccountKind::Expense, None);
        let groceries = account("Groceries", AccountKind::Expense, Some(&food));
        let restaurants = account("Restaurants", AccountKind::Expense, Some(&food));
        let veggies = account("Vegetables", AccountKind::Expense, Some(&groceries));

        let totals = HashMap::from([
            (food.id, AccountTotals::new(100, 0)),
            (groceries.id, AccountTotals::new(6_000, 500)),
            (restaurants.id, AccountTotals::new(2_500, 0)),
            (veggies.id, AccountTotals::new(1_200, 0)),
        ]);
        let accounts = vec![
            veggies.clone(),
            restaurants.clone(),
            groceries.clone(),
            food.clone(),
        ];

        let roots = build_account_tree(&accounts, &totals).unwrap();

        assert_eq!(roots.len(), 1);
        let root = &roots[0];
        let expected: i64 = totals
            .values()
            .map(|t| {
                calculate_account_balance(AccountKind::Expense, t.debits_minor, t.credits_minor)
            })
            .sum();
        assert_eq!(root.total_balance_minor, expected);
        assert_eq!(root.total_debits_minor, 9_800);
        assert_eq!(root.total_credits_minor, 500);
        assert_eq!(root.balance_minor, 100);

        let names: Vec<&str> = root.children.iter().map(|c| c.account.name.as_str()).collect();
        assert_eq!(names, vec!["Groceries", "Restaurants"]);
        assert_eq!(root.children[0].total_balance_minor, 6_700);
        assert_eq!(root.children[0].children[0].account.id, veggies.id);
    }

    #[test]
    fn credit_normal_kinds_roll_up_positive() {
        let salary = account("Salary", AccountKind::Income, None);
        let bonus = account("Bonus", AccountKind::Income, Some(&salary));
        let totals = HashMap::from([
            (salary.id, AccountTotals::new(0, 300_000)),
            (bonus.id, AccountTotals::new(0, 50_000)),
        ]);

        let roots = build_account_tree(&[salary, bonus], &totals).unwrap();

        assert_eq!(roots[0].balance_minor, 300_000);
        assert_eq!(roots[0].total_balance_minor, 350_000);
    }

    #[test]
    fn orphans_and_cycles_are_promoted_to_roots() {
        let mut orphan = account("Orphan", AccountKind::Asset, None);
        orphan.parent_id = Some(Uuid::new_v4());

        let mut a = account("A", AccountKind::Asset, None);
        let mut b = account("B", AccountKind::Asset, None);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);

        let roots = build_account_tree(&[orphan, b, a], &HashMap::new()).unwrap();

        let names: Vec<&str> = roots.iter().map(|r| r.account.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "Orphan"]);
        assert!(roots.iter().all(|r| r.total_balance_minor == 0));
    }

    #[test]
    fn overflowing_subtree_is_rejected() {
        let assets = account("Assets", AccountKind::Asset, None);
        let bank = account("Bank", AccountKind::Asset, Some(&assets));
        let totals = HashMap::from([
            (assets.id, AccountTotals::new(i64::MAX, 0)),
            (bank.id, AccountTotals::new(1, 0)),
        ]);

        let err = build_account_tree(&[assets, bank], &totals).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));

        let lopsided = account("Loan", AccountKind::Liability, None);
        let totals = HashMap::from([(lopsided.id, AccountTotals::new(i64::MAX, -2))]);
        assert!(build_account_tree(&[lopsided], &totals).is_err());
    }

    #[test]
    fn accounts_without_totals_are_zero() {
        let bank = account("Bank", AccountKind::Asset, None);
        let roots = build_account_tree(std::slice::from_ref(&bank), &HashMap::new()).unwrap();
        assert_eq!(roots[0].balance_minor, 0);
        assert!(roots[0].children.is_empty());
    }

    #[test]
    fn descendants_are_breadth_first() {
        let root = account("Assets", AccountKind::Asset, None);
        let bank = account("Bank", AccountKind::Asset, Some(&root));
        let checking = account("Checking", AccountKind::Asset, Some(&bank));
        let other = account("Other", AccountKind::Asset, None);

        let map: HashMap<Uuid, Account> = [&root, &bank, &checking, &other]
            .into_iter()
            .map(|a| (a.id, a.clone()))
            .collect();

        assert_eq!(descendant_ids(&map, root.id), vec![bank.id, checking.id]);
        assert_eq!(descendant_ids(&map, checking.id), Vec::<Uuid>::new());
    }
}
