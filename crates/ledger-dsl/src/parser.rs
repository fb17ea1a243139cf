//! A minimal line-oriented transfer DSL, parsed to a [`TransferAst`].
//!
//! ```text
//! send 30 USD from @a#default
//! to   30 USD to   @b#default
//! rate USD/EUR 0.92   ; optional, only required for cross-asset plans
//! ```
//!
//! Not the hard part (§1): this grammar exists only so the plan builder
//! (§4.5) has something concrete to validate in tests. `;` starts a
//! line comment; blank lines are ignored.

use ledger_core::{Alias, AssetCode, BalanceKey, LedgerError, Money};

use crate::ast::{AssetRate, AstEntry, TransferAst};

fn split_alias_key(raw: &str) -> (Alias, BalanceKey) {
    match raw.split_once('#') {
        Some((alias, key)) => (Alias::new(alias), BalanceKey(key.to_string())),
        None => (Alias::new(raw), BalanceKey::default_key()),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

pub fn parse_transfer_dsl(input: &str) -> Result<TransferAst, LedgerError> {
    let mut ast = TransferAst::default();

    for (lineno, raw_line) in input.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let err = |msg: &str| {
            LedgerError::ValidationError(format!("dsl: line {}: {}", lineno + 1, msg))
        };

        match tokens.first().copied() {
            Some("send") => {
                // send <amount> <asset> from <alias>[#<key>]
                if tokens.len() != 5 || tokens[3] != "from" {
                    return Err(err("expected 'send <amount> <asset> from <alias>[#<key>]'"));
                }
                let amount: Money = tokens[1]
                    .parse()
                    .map_err(|_| err("invalid amount"))?;
                let (alias, key) = split_alias_key(tokens[4]);
                ast.sources.push(AstEntry {
                    alias,
                    key,
                    amount,
                    asset_code: AssetCode::new(tokens[2]),
                });
            }
            Some("to") => {
                // to <amount> <asset> to <alias>[#<key>]
                if tokens.len() != 5 || tokens[3] != "to" {
                    return Err(err("expected 'to <amount> <asset> to <alias>[#<key>]'"));
                }
                let amount: Money = tokens[1]
                    .parse()
                    .map_err(|_| err("invalid amount"))?;
                let (alias, key) = split_alias_key(tokens[4]);
                ast.destinations.push(AstEntry {
                    alias,
                    key,
                    amount,
                    asset_code: AssetCode::new(tokens[2]),
                });
            }
            Some("hold") => {
                // hold <amount> <asset> on <alias>[#<key>]
                if tokens.len() != 5 || tokens[3] != "on" {
                    return Err(err("expected 'hold <amount> <asset> on <alias>[#<key>]'"));
                }
                let amount: Money = tokens[1]
                    .parse()
                    .map_err(|_| err("invalid amount"))?;
                let (alias, key) = split_alias_key(tokens[4]);
                ast.holds.push(AstEntry {
                    alias,
                    key,
                    amount,
                    asset_code: AssetCode::new(tokens[2]),
                });
            }
            Some("release") => {
                // release <amount> <asset> on <alias>[#<key>]
                if tokens.len() != 5 || tokens[3] != "on" {
                    return Err(err("expected 'release <amount> <asset> on <alias>[#<key>]'"));
                }
                let amount: Money = tokens[1]
                    .parse()
                    .map_err(|_| err("invalid amount"))?;
                let (alias, key) = split_alias_key(tokens[4]);
                ast.releases.push(AstEntry {
                    alias,
                    key,
                    amount,
                    asset_code: AssetCode::new(tokens[2]),
                });
            }
            Some("rate") => {
                // rate <asset>/<asset> <decimal>
                if tokens.len() != 3 {
                    return Err(err("expected 'rate <asset>/<asset> <decimal>'"));
                }
                let (from, to) = tokens[1]
                    .split_once('/')
                    .ok_or_else(|| err("expected '<asset>/<asset>'"))?;
                let rate: Money = tokens[2].parse().map_err(|_| err("invalid rate"))?;
                ast.rate = Some(AssetRate {
                    from: AssetCode::new(from),
                    to: AssetCode::new(to),
                    rate,
                });
            }
            Some(other) => return Err(err(&format!("unknown directive '{other}'"))),
            None => unreachable!(),
        }
    }

    Ok(ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_transfer() {
        let ast = parse_transfer_dsl("send 30 USD from @a#default\nto 30 USD to @b#default\n").unwrap();
        assert_eq!(ast.sources.len(), 1);
        assert_eq!(ast.destinations.len(), 1);
        assert_eq!(ast.sources[0].alias.0, "@a");
        assert_eq!(ast.destinations[0].alias.0, "@b");
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let ast = parse_transfer_dsl("; a comment\n\nsend 10 USD from @a\nto 10 USD to @b\n").unwrap();
        assert_eq!(ast.sources.len(), 1);
        assert_eq!(ast.destinations.len(), 1);
    }

    #[test]
    fn parses_rate_directive() {
        let ast = parse_transfer_dsl(
            "send 10 USD from @a\nto 9 EUR to @b\nrate USD/EUR 0.9\n",
        )
        .unwrap();
        let rate = ast.rate.expect("rate parsed");
        assert_eq!(rate.from.0, "USD");
        assert_eq!(rate.to.0, "EUR");
    }

    #[test]
    fn parses_hold_and_release_directives() {
        let ast = parse_transfer_dsl("hold 10 USD on @a#default\nrelease 4 USD on @a#default\n").unwrap();
        assert_eq!(ast.holds.len(), 1);
        assert_eq!(ast.releases.len(), 1);
        assert_eq!(ast.holds[0].alias.0, "@a");
    }

    #[test]
    fn rejects_unknown_directive() {
        let err = parse_transfer_dsl("burn 10 USD from @a\n").unwrap_err();
        assert!(matches!(err, LedgerError::ValidationError(_)));
    }
}
