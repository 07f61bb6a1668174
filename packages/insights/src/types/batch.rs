//! Persisted progress of a resumable index batch.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::symbol::Symbol;

/// Progress through one index's symbol list, one row per index name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchState {
    pub index_name: String,
    pub cursor: usize,
    pub chunk_size: usize,
    pub total_symbols: usize,

    /// SHA-256 over the sorted symbol list this state was built for
    pub fingerprint: String,

    pub completed: bool,

    /// Last attempt (epoch milliseconds)
    pub last_run: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl BatchState {
    /// A state at the start of a new cycle.
    pub fn fresh(
        index_name: impl Into<String>,
        chunk_size: usize,
        total_symbols: usize,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            cursor: 0,
            chunk_size,
            total_symbols,
            fingerprint: fingerprint.into(),
            completed: false,
            last_run: 0,
            last_error: None,
        }
    }

    /// Symbols still to process.
    pub fn remaining(&self) -> usize {
        self.total_symbols.saturating_sub(self.cursor)
    }
}

/// Fingerprint of a sorted, de-duplicated symbol list.
pub fn fingerprint(symbols: &[Symbol]) -> String {
    let mut hasher = Sha256::new();
    for symbol in symbols {
        hasher.update(symbol.as_str().as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(list: &[&str]) -> Vec<Symbol> {
        list.iter().map(|s| Symbol::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_fingerprint_stable_and_distinct() {
        let a = fingerprint(&syms(&["INFY", "TCS"]));
        let b = fingerprint(&syms(&["INFY", "TCS"]));
        let c = fingerprint(&syms(&["INFY", "TCS", "WIPRO"]));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_not_ambiguous_on_concatenation() {
        assert_ne!(
            fingerprint(&syms(&["AB", "C"])),
            fingerprint(&syms(&["A", "BC"]))
        );
    }

    #[test]
    fn test_remaining() {
        let mut state = BatchState::fresh("NIFTY 50", 2, 5, "fp");
        assert_eq!(state.remaining(), 5);
        state.cursor = 4;
        assert_eq!(state.remaining(), 1);
    }
}
