//! Three-valued permission outcome

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a permission lookup.
///
/// `Undefined` means no node made a decision either way; callers treat it
/// according to their own default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tristate {
    True,
    False,
    Undefined,
}

impl Tristate {
    /// Converts a boolean to the corresponding defined state
    pub fn of(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }

    /// Returns `Some(bool)` for defined states, `None` for `Undefined`
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Tristate::True => Some(true),
            Tristate::False => Some(false),
            Tristate::Undefined => None,
        }
    }

    /// Returns `true` only for `Tristate::True`
    pub fn as_bool_or_false(self) -> bool {
        matches!(self, Tristate::True)
    }

    /// Whether a decision was made
    pub fn is_defined(self) -> bool {
        self != Tristate::Undefined
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        Tristate::of(value)
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        value.map(Tristate::of).unwrap_or(Tristate::Undefined)
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tristate::True => write!(f, "true"),
            Tristate::False => write!(f, "false"),
            Tristate::Undefined => write!(f, "undefined"),
        }
    }
}
