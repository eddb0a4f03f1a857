//! Bi-gram and tri-gram expansion of token sequences.

/// Phrase lengths appended after the unigrams, in output order.
pub const PHRASE_ORDERS: [usize; 2] = [2, 3];

/// Contiguous `n`-token windows joined by a single space.
///
/// Windows that would run past the end of `tokens` are discarded, so a
/// sequence of length `L` yields `L - n + 1` phrases (none when `L < n`).
pub fn ngrams<S: AsRef<str>>(tokens: &[S], n: usize) -> Vec<String> {
    if n == 0 || tokens.len() < n {
        return Vec::new();
    }
    tokens
        .windows(n)
        .map(|window| {
            window
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<&str>>()
                .join(" ")
        })
        .collect()
}

/// Space-joined corpus of the unigrams followed by every bi-gram and then every
/// tri-gram.
///
/// Order is positional and repeated phrases are kept; repetition is what
/// raises a phrase's term frequency.
pub fn expand<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut parts: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
    for n in PHRASE_ORDERS {
        parts.extend(ngrams(tokens, n));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn window_counts_follow_sequence_length() {
        let words = ["a", "b", "c", "d", "e", "f"];
        for len in 0..=words.len() {
            let tokens = &words[..len];
            assert_eq!(ngrams(tokens, 2).len(), len.saturating_sub(1), "bigrams for {len}");
            assert_eq!(ngrams(tokens, 3).len(), len.saturating_sub(2), "trigrams for {len}");
        }
    }

    #[test]
    fn last_window_is_included() {
        assert_eq!(ngrams(&["red", "blue", "green"], 2), vec!["red blue", "blue green"]);
        assert_eq!(ngrams(&["red", "blue", "green"], 3), vec!["red blue green"]);
    }

    #[test]
    fn expand_orders_unigrams_bigrams_trigrams() {
        assert_eq!(
            expand(&["buy", "red", "widget"]),
            "buy red widget buy red red widget buy red widget"
        );
    }

    #[test]
    fn expand_keeps_repeated_phrases() {
        assert_eq!(expand(&["go", "go", "go"]), "go go go go go go go go go go");
    }

    #[test]
    fn short_sequences_do_not_panic() {
        let empty: [&str; 0] = [];
        assert_eq!(expand(&empty), "");
        assert_eq!(expand(&["solo"]), "solo");
        assert!(ngrams(&["solo"], 0).is_empty());
    }
}
