use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Arbitrary-precision signed decimal. Never a float: invariant §8.3 of the
/// ledger spec (non-negativity after commit) is only checkable exactly.
pub type Money = rust_decimal::Decimal;

/// Wall-clock timestamp, monotonic ordering only within one process.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(u: Uuid) -> Self {
                Self(u)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

uuid_id!(OrgId, "Organization identifier, scopes every ledger.");
uuid_id!(LedgerId, "Ledger identifier, scopes every account/balance.");
uuid_id!(AccountId, "Account identifier within a ledger.");
uuid_id!(BalanceId, "Stable identity of one balance row.");
uuid_id!(TransactionId, "Identity of a committed (or pending) transaction.");
uuid_id!(OperationId, "Identity of one debit/credit/hold/release operation.");
uuid_id!(RouteId, "Identity of a routing rule record.");

/// Opaque currency tag. Never crossed without an explicit asset rate.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetCode(pub String);

impl AssetCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_ascii_uppercase())
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetCode({})", self.0)
    }
}

/// Partition within an account. `"default"` is mandatory and canonical —
/// invariant §3.2: a non-default key may exist only once `default` does.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey(pub String);

pub const DEFAULT_KEY: &str = "default";

impl BalanceKey {
    pub fn default_key() -> Self {
        Self(DEFAULT_KEY.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_KEY
    }
}

impl Default for BalanceKey {
    fn default() -> Self {
        Self::default_key()
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BalanceKey({})", self.0)
    }
}

/// Human-readable account handle, always prefixed `@`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alias(pub String);

impl Alias {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with('@') {
            Self(raw)
        } else {
            Self(format!("@{raw}"))
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `"alias#key"` composite, the unit C2/C5 lock and address by.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct AliasKey(pub String);

impl AliasKey {
    pub fn compose(alias: &Alias, key: &BalanceKey) -> Self {
        Self(format!("{}#{}", alias.0, key.0))
    }
}

impl fmt::Display for AliasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AliasKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
