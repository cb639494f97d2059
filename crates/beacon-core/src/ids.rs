//! Identity newtypes.
//!
//! A [`ClientId`] is the verified numeric identity of a caller, supplied by the
//! identity provider. A [`SessionId`] names one physical connection and is
//! assigned by the hub, so two connections made by the same client can be told
//! apart after one has superseded the other.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw numeric value.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Authenticated identity of a connected client.
    ClientId
);

numeric_id!(
    /// Hub-assigned identifier of a single connection.
    SessionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_serializes_as_bare_number() {
        let id = ClientId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: ClientId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_is_numeric() {
        assert_eq!(SessionId::new(7).to_string(), "7");
    }

    #[test]
    fn ordering_follows_value() {
        let mut ids = vec![ClientId::new(3), ClientId::new(1), ClientId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ClientId::new(1), ClientId::new(2), ClientId::new(3)]);
    }

    #[test]
    fn negative_number_rejected() {
        assert!(serde_json::from_str::<ClientId>("-1").is_err());
    }
}
