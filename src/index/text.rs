//! Bigram and word index over transaction descriptions.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use core::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::models::{Transaction, TransactionId};

/// Number of leading characters forming a bigram.
const BIGRAM_LEN: usize = 2;

/// Lowercases and collapses whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the leading bigram of an already normalized string.
#[must_use]
pub fn bigram(normalized: &str) -> Option<String> {
    if normalized.is_empty() {
        return None;
    }
    Some(normalized.chars().take(BIGRAM_LEN).collect())
}

/// Search keys derived from one description.
#[derive(Debug, Default)]
struct Tokens {
    /// Bigram of the whole normalized description.
    bigram: Option<String>,
    /// Distinct normalized words.
    words: BTreeSet<String>,
}

impl Tokens {
    /// Tokenizes a raw description.
    fn of(description: &str) -> Self {
        let normalized = normalize(description);
        Self {
            bigram: bigram(&normalized),
            words: normalized
                .split(' ')
                .filter(|word| !word.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// `bigram → {id}`, `word → {id}` and `word bigram → {word}` maps.
///
/// Keys whose bucket becomes empty are deleted rather than left behind,
/// and buckets are shared between clones until written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextIndex {
    /// Description bigram → ids.
    bigrams: BTreeMap<String, Arc<BTreeSet<TransactionId>>>,
    /// Word → ids.
    words: BTreeMap<String, Arc<BTreeSet<TransactionId>>>,
    /// Word bigram → words.
    word_bigrams: BTreeMap<String, Arc<BTreeSet<String>>>,
}

impl TextIndex {
    /// Builds an index from scratch.
    #[inline]
    #[must_use]
    pub fn from_transactions<'item, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'item Transaction>,
    {
        let mut index = Self::default();
        index.set_transactions(transactions);
        index
    }

    /// Replaces the whole index with the given transactions.
    #[inline]
    pub fn set_transactions<'item, I>(&mut self, transactions: I)
    where
        I: IntoIterator<Item = &'item Transaction>,
    {
        self.bigrams.clear();
        self.words.clear();
        self.word_bigrams.clear();
        for transaction in transactions {
            self.add(&transaction.id, &transaction.description);
        }
    }

    /// Indexes a description under `id`.
    pub fn add(&mut self, id: &TransactionId, description: &str) {
        let tokens = Tokens::of(description);
        if let Some(key) = tokens.bigram {
            let _inserted = Arc::make_mut(self.bigrams.entry(key).or_default()).insert(id.clone());
        }
        for word in tokens.words {
            if let Some(key) = bigram(&word) {
                let _inserted =
                    Arc::make_mut(self.word_bigrams.entry(key).or_default()).insert(word.clone());
            }
            let _inserted = Arc::make_mut(self.words.entry(word).or_default()).insert(id.clone());
        }
    }

    /// Removes a description previously indexed under `id`.
    pub fn remove(&mut self, id: &TransactionId, description: &str) {
        let tokens = Tokens::of(description);
        if let Some(key) = tokens.bigram {
            let _removed = remove_from_bucket(&mut self.bigrams, &key, id);
        }
        for word in tokens.words {
            let word_gone = remove_from_bucket(&mut self.words, &word, id);
            if word_gone && let Some(key) = bigram(&word) {
                let _removed = remove_from_bucket(&mut self.word_bigrams, &key, &word);
            }
        }
    }

    /// Re-indexes a transaction whose description or id changed.
    #[inline]
    pub fn update(&mut self, old: &Transaction, new: &Transaction) {
        if old.id == new.id && old.description == new.description {
            return;
        }
        self.remove(&old.id, &old.description);
        self.add(&new.id, &new.description);
    }

    /// Returns ids whose description shares the query's bigram.
    ///
    /// A query shorter than a bigram matches every bigram it starts.
    /// This is a coarse candidate set; callers filter false positives.
    #[must_use]
    pub fn search_bigrams(&self, query: &str) -> BTreeSet<TransactionId> {
        let Some(key) = bigram(&normalize(query)) else {
            return BTreeSet::new();
        };
        if key.chars().count() < BIGRAM_LEN {
            return prefixed(&self.bigrams, &key)
                .flat_map(|ids| ids.iter().cloned())
                .collect();
        }
        self.bigrams
            .get(&key)
            .map(|ids| ids.as_ref().clone())
            .unwrap_or_default()
    }

    /// Returns ids whose description contains, for every query word, a
    /// word starting with it.
    #[must_use]
    pub fn search_words(&self, query: &str) -> BTreeSet<TransactionId> {
        let normalized = normalize(query);
        let mut result: Option<BTreeSet<TransactionId>> = None;
        for term in normalized.split(' ').filter(|term| !term.is_empty()) {
            let matches = self.word_prefix_matches(term);
            result = Some(match result {
                Some(acc) => acc.intersection(&matches).cloned().collect(),
                None => matches,
            });
        }
        result.unwrap_or_default()
    }

    /// Returns ids of every word starting with `term`.
    fn word_prefix_matches(&self, term: &str) -> BTreeSet<TransactionId> {
        if term.chars().count() < BIGRAM_LEN {
            return prefixed(&self.words, term)
                .flat_map(|ids| ids.iter().cloned())
                .collect();
        }
        let Some(key) = bigram(term) else {
            return BTreeSet::new();
        };
        let Some(words) = self.word_bigrams.get(&key) else {
            return BTreeSet::new();
        };
        words
            .iter()
            .filter(|word| word.starts_with(term))
            .filter_map(|word| self.words.get(word))
            .flat_map(|ids| ids.iter().cloned())
            .collect()
    }

    /// Returns `true` if a word bucket exists for `word`.
    #[inline]
    #[must_use]
    pub fn has_word(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    /// Returns `true` if `word` is listed under its bigram.
    #[inline]
    #[must_use]
    pub fn has_word_bigram_entry(&self, word: &str) -> bool {
        bigram(word)
            .and_then(|key| self.word_bigrams.get(&key))
            .is_some_and(|words| words.contains(word))
    }

    /// Returns `true` if nothing is indexed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bigrams.is_empty() && self.words.is_empty() && self.word_bigrams.is_empty()
    }
}

/// Returns the buckets whose key starts with `prefix`.
fn prefixed<'map, V>(
    map: &'map BTreeMap<String, V>,
    prefix: &'map str,
) -> impl Iterator<Item = &'map V> + 'map {
    map.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |entry| entry.0.starts_with(prefix))
        .map(|entry| entry.1)
}

/// Removes `value` from the bucket at `key`, deleting the key when the
/// bucket empties. Returns `true` if the key was deleted.
fn remove_from_bucket<V: Ord + Clone>(
    map: &mut BTreeMap<String, Arc<BTreeSet<V>>>,
    key: &str,
    value: &V,
) -> bool {
    let Some(bucket) = map.get_mut(key) else {
        return false;
    };
    if !bucket.contains(value) {
        return false;
    }
    let set = Arc::make_mut(bucket);
    let _removed = set.remove(value);
    if set.is_empty() {
        let _bucket = map.remove(key);
        return true;
    }
    false
}
