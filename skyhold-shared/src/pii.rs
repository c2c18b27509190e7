use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Wraps passenger and card data so it never shows up in `Debug`/`Display` output.
///
/// Serialization passes the real value through: API responses need it, log lines don't.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Masked<String> {
    /// Last four characters, for receipts and log lines (`**** 4242`).
    pub fn last_four(&self) -> &str {
        let len = self.0.len();
        if len <= 4 {
            return &self.0;
        }
        match self.0.char_indices().nth_back(3) {
            Some((idx, _)) => &self.0[idx..],
            None => &self.0,
        }
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}
