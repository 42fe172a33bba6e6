//! Field addresses.
//!
//! A plain address is a field id, optionally dotted (`email`, `address.city`). A composite address
//! points at one field inside one instance of a repeatable group: `items[k3].name`. The `k3` part is
//! an [`ItemKey`], allocated once per item and never reused until the owning form is reset.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("invalid item key '{0}'")]
    InvalidKey(String),
    #[error("malformed composite address '{0}'")]
    Malformed(String),
}

/// Stable key of one repeatable item, rendered as `k<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey(u64);

impl ItemKey {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

impl FromStr for ItemKey {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.strip_prefix('k')
            .and_then(|digits| digits.parse::<u64>().ok())
            .map(ItemKey)
            .ok_or_else(|| AddressError::InvalidKey(raw.to_string()))
    }
}

/// Parsed form of an address string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldAddress {
    Field(String),
    Item {
        repeatable: String,
        key: ItemKey,
        field: String,
    },
}

impl FieldAddress {
    pub fn field(id: impl Into<String>) -> Self {
        FieldAddress::Field(id.into())
    }

    pub fn item(repeatable: impl Into<String>, key: ItemKey, field: impl Into<String>) -> Self {
        FieldAddress::Item {
            repeatable: repeatable.into(),
            key,
            field: field.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        raw.parse()
    }

    /// Repeatable id and key when this is a composite address.
    pub fn item_scope(&self) -> Option<(&str, ItemKey)> {
        match self {
            FieldAddress::Field(_) => None,
            FieldAddress::Item {
                repeatable, key, ..
            } => Some((repeatable.as_str(), *key)),
        }
    }

    /// Field id without any repeatable prefix.
    pub fn field_id(&self) -> &str {
        match self {
            FieldAddress::Field(id) => id,
            FieldAddress::Item { field, .. } => field,
        }
    }
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldAddress::Field(id) => f.write_str(id),
            FieldAddress::Item {
                repeatable,
                key,
                field,
            } => write!(f, "{}[{}].{}", repeatable, key, field),
        }
    }
}

impl FromStr for FieldAddress {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        let Some(open) = raw.find('[') else {
            return Ok(FieldAddress::Field(raw.to_string()));
        };
        let close = raw[open..]
            .find(']')
            .map(|offset| open + offset)
            .ok_or_else(|| AddressError::Malformed(raw.to_string()))?;
        let repeatable = &raw[..open];
        let key: ItemKey = raw[open + 1..close].parse()?;
        let field = raw[close + 1..]
            .strip_prefix('.')
            .filter(|field| !field.is_empty())
            .ok_or_else(|| AddressError::Malformed(raw.to_string()))?;
        if repeatable.is_empty() {
            return Err(AddressError::Malformed(raw.to_string()));
        }
        Ok(FieldAddress::item(repeatable, key, field))
    }
}

/// Prefix shared by every address of one repeatable item, e.g. `items[k3].`.
pub fn item_prefix(repeatable: &str, key: ItemKey) -> String {
    format!("{}[{}].", repeatable, key)
}

/// Composite address string for one field of one item.
pub fn item_address(repeatable: &str, key: ItemKey, field: &str) -> String {
    format!("{}[{}].{}", repeatable, key, field)
}

/// True when `address` belongs to the repeatable `repeatable`, whatever the item.
pub fn is_within_repeatable(address: &str, repeatable: &str) -> bool {
    address
        .strip_prefix(repeatable)
        .is_some_and(|rest| rest.starts_with('['))
}
