//! The candidate on-chain interaction a caller wants to authorize, and the
//! concrete call a UserOperation ultimately performs.

use alloy_primitives::{Address, Bytes, U256};

/// A candidate on-chain interaction a caller wants authorized by some
/// delegation. Matched against a delegation's caveats by
/// [`crate::caveat::matches_action`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub to: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

impl Action {
    pub fn new(to: Address) -> Self {
        Self {
            to,
            value: None,
            data: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// `action.value ?? 0`, per the `valueLte` rule.
    pub fn value_or_zero(&self) -> U256 {
        self.value.unwrap_or(U256::ZERO)
    }

    /// The first 4 bytes of `data`, if present and long enough to contain a
    /// selector.
    pub fn selector(&self) -> Option<[u8; 4]> {
        let data = self.data.as_ref()?;
        if data.len() < 4 {
            return None;
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[0..4]);
        Some(selector)
    }
}

/// A concrete on-chain call -- what a UserOperation actually performs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub target: Address,
    pub value: U256,
    pub call_data: Bytes,
}

impl Execution {
    pub fn new(target: Address, value: U256, call_data: impl Into<Bytes>) -> Self {
        Self {
            target,
            value,
            call_data: call_data.into(),
        }
    }
}
