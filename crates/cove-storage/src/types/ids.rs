//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).
//!
//! All ids are UUID v7: time-ordered, so sorting by id is creation order.
//! Every id round-trips through its string form (`Display`/`FromStr`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new time-ordered id.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

entity_id!(
    /// User identifier.
    UserId
);
entity_id!(
    /// Team identifier.
    TeamId
);
entity_id!(
    /// Project identifier.
    ProjectId
);
entity_id!(
    /// Variable identifier.
    VariableId
);
