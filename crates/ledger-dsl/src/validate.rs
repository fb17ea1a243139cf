//! C5 — DSL Validator & Plan Builder.
//!
//! Converts a parsed transfer AST into a validated [`Plan`]. All five rules
//! in §4.5 must hold or the plan is rejected with a typed business error;
//! none of them are retryable.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use ledger_core::{AliasKey, LedgerError, Money, Plan, TransactionEntry};

use crate::ast::{AstEntry, TransferAst};

fn to_entry(e: &AstEntry) -> TransactionEntry {
    TransactionEntry {
        alias: e.alias.clone(),
        key: e.key.clone(),
        amount: e.amount,
        asset_code: e.asset_code.clone(),
    }
}

fn reject_duplicates(side: &[AstEntry], side_name: &str) -> Result<(), LedgerError> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for e in side {
        let k = (e.alias.0.clone(), e.key.0.clone());
        if !seen.insert(k) {
            return Err(LedgerError::ValidationError(format!(
                "alias {}#{} appears twice on the {} side",
                e.alias.0, e.key.0, side_name
            )));
        }
    }
    Ok(())
}

pub fn validate_plan(ast: &TransferAst) -> Result<Plan, LedgerError> {
    // Rule 1: a transfer's sources and destinations are both non-empty or
    // both empty — a plan made up only of HOLD/RELEASE legs has neither.
    let has_transfer = !ast.sources.is_empty() || !ast.destinations.is_empty();
    if has_transfer && ast.sources.is_empty() {
        return Err(LedgerError::ValidationError("sources must not be empty".into()));
    }
    if has_transfer && ast.destinations.is_empty() {
        return Err(LedgerError::ValidationError(
            "destinations must not be empty".into(),
        ));
    }
    if !has_transfer && ast.holds.is_empty() && ast.releases.is_empty() {
        return Err(LedgerError::ValidationError("plan must contain at least one leg".into()));
    }

    // Rule 3: all amounts >= 0.
    for e in ast.sources.iter().chain(ast.destinations.iter()).chain(ast.holds.iter()).chain(ast.releases.iter()) {
        if e.amount.is_sign_negative() {
            return Err(LedgerError::ValidationError(format!(
                "amount for {}#{} must not be negative",
                e.alias.0, e.key.0
            )));
        }
    }

    // Rule 4: no alias appears twice with the same key on the same side.
    reject_duplicates(&ast.sources, "source")?;
    reject_duplicates(&ast.destinations, "destination")?;
    reject_duplicates(&ast.holds, "hold")?;
    reject_duplicates(&ast.releases, "release")?;

    let source_assets: BTreeSet<&str> = ast.sources.iter().map(|e| e.asset_code.0.as_str()).collect();
    let dest_assets: BTreeSet<&str> = ast.destinations.iter().map(|e| e.asset_code.0.as_str()).collect();

    if source_assets == dest_assets {
        // Rule 2: per asset code, Σ sources == Σ destinations exactly.
        let mut totals: BTreeMap<&str, Money> = BTreeMap::new();
        for e in &ast.sources {
            *totals.entry(e.asset_code.0.as_str()).or_insert(Money::ZERO) -= e.amount;
        }
        for e in &ast.destinations {
            *totals.entry(e.asset_code.0.as_str()).or_insert(Money::ZERO) += e.amount;
        }
        for (asset, net) in &totals {
            if !net.is_zero() {
                return Err(LedgerError::DoubleEntryBroken(asset.to_string()));
            }
        }
    } else {
        // Rule 5: cross-asset — an explicit rate is required, and the
        // scaled equivalent must reconcile exactly.
        let rate = ast.rate.as_ref().ok_or_else(|| {
            LedgerError::ValidationError(
                "cross-asset transfer requires an explicit asset rate".into(),
            )
        })?;
        if source_assets.len() != 1 || dest_assets.len() != 1 {
            return Err(LedgerError::ValidationError(
                "cross-asset transfers support exactly one source asset and one destination asset"
                    .into(),
            ));
        }
        let src_asset = *source_assets.iter().next().unwrap();
        let dst_asset = *dest_assets.iter().next().unwrap();
        if rate.from.0 != src_asset || rate.to.0 != dst_asset {
            return Err(LedgerError::ValidationError(format!(
                "asset rate {}/{} does not match transfer {}/{}",
                rate.from.0, rate.to.0, src_asset, dst_asset
            )));
        }

        let source_total: Money = ast.sources.iter().map(|e| e.amount).sum();
        let dest_total: Money = ast.destinations.iter().map(|e| e.amount).sum();
        let scaled = source_total * rate.rate;
        if scaled != dest_total {
            return Err(LedgerError::DoubleEntryBroken(format!(
                "{src_asset}->{dst_asset} at rate {}: {source_total} scaled to {scaled}, destinations total {dest_total}",
                rate.rate
            )));
        }
    }

    let mut aliases_to_lock = BTreeSet::new();
    let mut per_alias_delta: BTreeMap<AliasKey, Money> = BTreeMap::new();
    let mut per_alias_hold_delta: BTreeMap<AliasKey, Money> = BTreeMap::new();

    for e in &ast.sources {
        let ak = AliasKey::compose(&e.alias, &e.key);
        aliases_to_lock.insert(ak.clone());
        *per_alias_delta.entry(ak).or_insert(Money::ZERO) -= e.amount;
    }
    for e in &ast.destinations {
        let ak = AliasKey::compose(&e.alias, &e.key);
        aliases_to_lock.insert(ak.clone());
        *per_alias_delta.entry(ak).or_insert(Money::ZERO) += e.amount;
    }
    for e in &ast.holds {
        let ak = AliasKey::compose(&e.alias, &e.key);
        aliases_to_lock.insert(ak.clone());
        *per_alias_hold_delta.entry(ak).or_insert(Money::ZERO) += e.amount;
    }
    for e in &ast.releases {
        let ak = AliasKey::compose(&e.alias, &e.key);
        aliases_to_lock.insert(ak.clone());
        *per_alias_hold_delta.entry(ak).or_insert(Money::ZERO) -= e.amount;
    }

    Ok(Plan {
        sources: ast.sources.iter().map(to_entry).collect(),
        destinations: ast.destinations.iter().map(to_entry).collect(),
        holds: ast.holds.iter().map(to_entry).collect(),
        releases: ast.releases.iter().map(to_entry).collect(),
        aliases_to_lock,
        per_alias_delta,
        per_alias_hold_delta,
        description: ast.description.clone(),
        metadata: ast.metadata.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_transfer_dsl;

    #[test]
    fn simple_transfer_builds_a_balanced_plan() {
        let ast = parse_transfer_dsl("send 30 USD from @a\nto 30 USD to @b\n").unwrap();
        let plan = validate_plan(&ast).unwrap();
        assert_eq!(plan.aliases_to_lock.len(), 2);
        assert_eq!(plan.per_alias_delta.len(), 2);
    }

    #[test]
    fn rejects_empty_sources() {
        let ast = TransferAst::default();
        assert!(matches!(
            validate_plan(&ast),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_unbalanced_amounts() {
        let ast = parse_transfer_dsl("send 30 USD from @a\nto 29 USD to @b\n").unwrap();
        assert!(matches!(
            validate_plan(&ast),
            Err(LedgerError::DoubleEntryBroken(_))
        ));
    }

    #[test]
    fn rejects_duplicate_alias_on_same_side() {
        let ast =
            parse_transfer_dsl("send 10 USD from @a\nsend 10 USD from @a\nto 20 USD to @b\n")
                .unwrap();
        assert!(matches!(
            validate_plan(&ast),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn cross_asset_requires_rate() {
        let ast = parse_transfer_dsl("send 10 USD from @a\nto 9 EUR to @b\n").unwrap();
        assert!(matches!(
            validate_plan(&ast),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_amount_leg_is_accepted() {
        let ast = parse_transfer_dsl("send 0 USD from @a\nto 0 USD to @b\n").unwrap();
        let plan = validate_plan(&ast).unwrap();
        assert_eq!(plan.per_alias_delta.len(), 2);
    }

    #[test]
    fn hold_produces_a_positive_hold_delta() {
        let ast = parse_transfer_dsl("send 10 USD from @a\nto 10 USD to @b\nhold 5 USD on @a\n").unwrap();
        let plan = validate_plan(&ast).unwrap();
        let ak = AliasKey::compose(&ledger_core::Alias::new("@a"), &ledger_core::BalanceKey::default_key());
        assert_eq!(plan.per_alias_hold_delta.get(&ak), Some(&Money::new(5, 0)));
        assert!(plan.aliases_to_lock.contains(&ak));
    }

    #[test]
    fn release_produces_a_negative_hold_delta() {
        let ast = parse_transfer_dsl("send 10 USD from @a\nto 10 USD to @b\nrelease 5 USD on @a\n").unwrap();
        let plan = validate_plan(&ast).unwrap();
        let ak = AliasKey::compose(&ledger_core::Alias::new("@a"), &ledger_core::BalanceKey::default_key());
        assert_eq!(plan.per_alias_hold_delta.get(&ak), Some(&Money::new(-5, 0)));
    }

    #[test]
    fn cross_asset_with_matching_rate_succeeds() {
        let ast =
            parse_transfer_dsl("send 10 USD from @a\nto 9 EUR to @b\nrate USD/EUR 0.9\n").unwrap();
        let plan = validate_plan(&ast).unwrap();
        assert_eq!(plan.sources.len(), 1);
        assert_eq!(plan.destinations.len(), 1);
    }
}
