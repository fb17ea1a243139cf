use serde::{Deserialize, Serialize};

use crate::balance::AccountType;
use crate::types::{Alias, LedgerId, OrgId, RouteId, Timestamp};

/// A rule matching on alias or `accountType`, used to expand a routing
/// identifier into concrete source/destination aliases (C9).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Selector {
    ByAlias(Alias),
    ByAccountType(AccountType),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteRecord {
    pub id: RouteId,
    pub organization_id: OrgId,
    pub ledger_id: LedgerId,
    pub source_selector: Selector,
    pub destination_selector: Selector,
    pub updated_at: Timestamp,
}
