//! Block diff and state-key grammar.
//!
//! The ingestion collaborator delivers, per processed block, an ordered
//! list of raw key/value pairs plus the contract function that produced
//! them. Keys follow one of three shapes:
//!
//! ```text
//! {id}.{field}
//! {id}.{field}:{subkey}     (also '#' as subkey separator)
//! {id}:{field}
//! ```
//!
//! `StateKey::parse` splits a raw key into those parts without copying.
//! Keys outside the grammar yield `None`; the router treats them as
//! unknown and skips them (forward compatible, not an error).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single raw key/value pair from a block diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: Value,
}

/// One processed block's worth of state changes.
///
/// `fn_name` is the contract function that produced the diff. The
/// projector inspects it for the designated full-exit operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDiff {
    pub state: Vec<KvPair>,
    #[serde(rename = "fn")]
    pub fn_name: String,
    pub contract: String,
    pub timestamp: i64,
    pub hash: String,
}

/// A parsed state key: owning entity id, field name, optional subkey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateKey<'a> {
    /// The program (or AMM) contract name the key belongs to.
    pub id: &'a str,
    /// Field name on that entity.
    pub field: &'a str,
    /// Subkey for map-shaped fields (`Epochs:0`, `Deposits:{vk}`, ...).
    pub subkey: Option<&'a str>,
}

impl<'a> StateKey<'a> {
    /// Parses a raw key into its parts. Returns `None` for keys outside
    /// the grammar (missing id or field, no separator at all).
    pub fn parse(raw: &'a str) -> Option<Self> {
        if let Some((id, rest)) = raw.split_once('.') {
            let (field, subkey) = match rest.find([':', '#']) {
                Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
                None => (rest, None),
            };
            if id.is_empty() || field.is_empty() {
                return None;
            }
            if let Some(sub) = subkey {
                if sub.is_empty() {
                    return None;
                }
            }
            return Some(StateKey { id, field, subkey });
        }

        // `{id}:{field}` shape, e.g. `con_staking:CurrentEpochIndex`.
        if let Some((id, field)) = raw.split_once(':') {
            if id.is_empty() || field.is_empty() {
                return None;
            }
            return Some(StateKey { id, field, subkey: None });
        }

        None
    }
}
