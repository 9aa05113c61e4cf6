//! Vocabulary: a token ↔ id bijection built once from the training split.
//!
//! Reserved ids: `<unk>` = 0, `<eos>` = 1. Corpus tokens follow in order of
//! descending frequency, ties broken lexicographically, so the mapping is
//! deterministic for a given corpus. Lookups of unseen tokens yield `<unk>`.

use std::collections::HashMap;

/// Out-of-vocabulary token, always id 0.
pub const UNK_TOKEN: &str = "<unk>";
/// End-of-line token appended to every corpus line.
pub const EOS_TOKEN: &str = "<eos>";

pub struct Vocab {
    idx_to_token: Vec<String>,
    token_to_idx: HashMap<String, u32>,
}

impl Vocab {
    /// Build from a token stream (normally the training split).
    pub fn build(tokens: &[String]) -> Self {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for token in tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        counts.remove(UNK_TOKEN);
        counts.remove(EOS_TOKEN);

        let mut ordered: Vec<(&str, u64)> = counts.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut idx_to_token = vec![UNK_TOKEN.to_string(), EOS_TOKEN.to_string()];
        idx_to_token.extend(ordered.into_iter().map(|(t, _)| t.to_string()));
        let token_to_idx = idx_to_token
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self {
            idx_to_token,
            token_to_idx,
        }
    }

    pub fn len(&self) -> usize {
        self.idx_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx_to_token.is_empty()
    }

    /// Id for `token`; unseen tokens map to `<unk>`.
    pub fn id(&self, token: &str) -> u32 {
        self.token_to_idx.get(token).copied().unwrap_or(0)
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.idx_to_token.get(id as usize).map(String::as_str)
    }

    /// Map a token stream to its id stream.
    pub fn to_ids(&self, tokens: &[String]) -> Vec<u32> {
        tokens.iter().map(|t| self.id(t)).collect()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
