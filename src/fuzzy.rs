//! String similarity scorers on a 0..=100 scale.
//!
//! All three scorers are built on the indel distance (insertions and deletions
//! only), which for two strings of lengths `n` and `m` is `n + m - 2 * lcs`.
use clap::ValueEnum;
use fnv::FnvHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scorer {
    /// Normalized indel similarity of the two whole strings.
    #[clap(name = "ratio")]
    Ratio,
    /// Like `ratio`, but 0 when either string is empty.
    #[clap(name = "QRatio")]
    QRatio,
    /// Best `ratio` of the shorter string against any window of the longer one.
    #[clap(name = "partial_ratio")]
    PartialRatio,
}

impl Scorer {
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        self.score_chars(&a, &b)
    }

    fn score_chars(&self, a: &[char], b: &[char]) -> f64 {
        match self {
            Scorer::Ratio => ratio(a, b),
            Scorer::QRatio => {
                if a.is_empty() || b.is_empty() {
                    0.0
                } else {
                    ratio(a, b)
                }
            }
            Scorer::PartialRatio => partial_ratio(a, b),
        }
    }

    /// Upper bound of `score_chars(a, b)` given the size of their character multiset intersection.
    fn upper_bound(&self, a_len: usize, b_len: usize, shared: usize) -> f64 {
        match self {
            Scorer::Ratio | Scorer::QRatio => {
                if a_len + b_len == 0 {
                    100.0
                } else {
                    200.0 * shared as f64 / (a_len + b_len) as f64
                }
            }
            Scorer::PartialRatio => {
                let short = a_len.min(b_len);
                if short == 0 || shared == 0 {
                    // only the empty/empty case can score here
                    if a_len + b_len == 0 {
                        100.0
                    } else {
                        0.0
                    }
                } else {
                    200.0 * shared as f64 / (short + shared) as f64
                }
            }
        }
    }
}

/// Length of the longest common subsequence.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Best ratio of `short` against the windows of `long`, including the partial
/// windows that hang off either end of `long`.
fn best_window(short: &[char], long: &[char]) -> f64 {
    let (s, l) = (short.len(), long.len());
    let mut best: f64 = 0.0;
    let mut consider = |window: &[char]| {
        let r = ratio(short, window);
        if r > best {
            best = r;
        }
        best >= 100.0
    };
    for end in 1..s {
        if consider(&long[..end]) {
            return 100.0;
        }
    }
    for start in 0..=(l - s) {
        if consider(&long[start..start + s]) {
            return 100.0;
        }
    }
    for start in (l - s + 1)..l {
        if consider(&long[start..]) {
            return 100.0;
        }
    }
    best
}

fn partial_ratio(a: &[char], b: &[char]) -> f64 {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }
    let forward = best_window(short, long);
    if short.len() == long.len() && forward < 100.0 {
        forward.max(best_window(long, short))
    } else {
        forward
    }
}

/// Character counts of a query, with a flat table for code points below 256.
struct CharCounts {
    low: [u32; 256],
    high: FnvHashMap<char, u32>,
}

impl CharCounts {
    fn new(chars: &[char]) -> Self {
        let mut counts = CharCounts {
            low: [0; 256],
            high: FnvHashMap::default(),
        };
        for &c in chars {
            match u8::try_from(c) {
                Ok(b) => counts.low[b as usize] += 1,
                Err(_) => *counts.high.entry(c).or_insert(0) += 1,
            }
        }
        counts
    }

    /// Size of the multiset intersection with `chars`.
    fn shared(&self, chars: &[char]) -> usize {
        let mut low = self.low;
        // most taxon names are plain ASCII, so the map is usually empty
        let mut high = if self.high.is_empty() {
            None
        } else {
            Some(self.high.clone())
        };
        let mut shared = 0;
        for &c in chars {
            let slot = match u8::try_from(c) {
                Ok(b) => Some(&mut low[b as usize]),
                Err(_) => high.as_mut().and_then(|h| h.get_mut(&c)),
            };
            if let Some(n) = slot {
                if *n > 0 {
                    *n -= 1;
                    shared += 1;
                }
            }
        }
        shared
    }
}

/// Best scoring choice for `query`.
///
/// Ties go to the earliest choice. Returns `None` only when `choices` is empty.
/// Choices are skipped without scoring when a length bound, then a character
/// count bound, shows they cannot beat the current best.
pub fn extract_one<'a, T, I>(query: &str, choices: I, scorer: Scorer) -> Option<(&'a str, T, f64)>
where
    I: IntoIterator<Item = (&'a str, T)>,
{
    let query_chars: Vec<char> = query.chars().collect();
    let query_counts = CharCounts::new(&query_chars);
    let mut choice_chars: Vec<char> = Vec::new();
    let mut best: Option<(&'a str, T, f64)> = None;

    for (choice, value) in choices {
        choice_chars.clear();
        choice_chars.extend(choice.chars());
        if let Some((_, _, best_score)) = &best {
            if *best_score >= 100.0 {
                break;
            }
            let (q_len, c_len) = (query_chars.len(), choice_chars.len());
            if scorer.upper_bound(q_len, c_len, q_len.min(c_len)) <= *best_score {
                continue;
            }
            let shared = query_counts.shared(&choice_chars);
            if scorer.upper_bound(q_len, c_len, shared) <= *best_score {
                continue;
            }
        }
        let score = scorer.score_chars(&query_chars, &choice_chars);
        let better = match &best {
            Some((_, _, best_score)) => score > *best_score,
            None => true,
        };
        if better {
            best = Some((choice, value, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_ratio_known_values() {
        assert!(close(Scorer::Ratio.score("this is a test", "this is a test!"), 2800.0 / 29.0));
        assert!(close(Scorer::Ratio.score("kitten", "sitting"), 800.0 / 13.0));
        assert!(close(Scorer::Ratio.score("Escherichia coli", "Escherichia coli"), 100.0));
        assert!(close(Scorer::Ratio.score("", ""), 100.0));
        assert!(close(Scorer::Ratio.score("abc", ""), 0.0));
    }

    #[test]
    fn test_qratio_empty() {
        assert!(close(Scorer::QRatio.score("", ""), 0.0));
        assert!(close(Scorer::QRatio.score("", "abc"), 0.0));
        assert!(close(Scorer::QRatio.score("kitten", "sitting"), 800.0 / 13.0));
    }

    #[test]
    fn test_partial_ratio_substring() {
        assert!(close(Scorer::PartialRatio.score("this is a test", "this is a test!"), 100.0));
        assert!(close(Scorer::PartialRatio.score("abc", "xxabcxx"), 100.0));
        assert!(close(Scorer::PartialRatio.score("xxabcxx", "abc"), 100.0));
        assert!(close(Scorer::PartialRatio.score("Bacillus", "Bacillus subtilis"), 100.0));
        assert!(close(Scorer::PartialRatio.score("", ""), 100.0));
        assert!(close(Scorer::PartialRatio.score("", "abc"), 0.0));
    }

    #[test]
    fn test_partial_ratio_end_windows() {
        // full window "bde" gives 4/6, the trailing window "de" gives 4/5
        assert!(close(Scorer::PartialRatio.score("cde", "abde"), 80.0));
        assert!(Scorer::PartialRatio.score("zzz", "abcdef") < 1e-9);
    }

    #[test]
    fn test_scores_are_bounded() {
        let pairs = [("Firmicutes", "Bacillota"), ("E. coli", "Escherichia coli"), ("a", "b")];
        for scorer in [Scorer::Ratio, Scorer::QRatio, Scorer::PartialRatio] {
            for (a, b) in pairs {
                let s = scorer.score(a, b);
                assert!((0.0..=100.0).contains(&s), "{:?} {} {} {}", scorer, a, b, s);
            }
        }
    }

    #[test]
    fn test_upper_bound_never_below_score() {
        let words = ["Escherichia", "Enterobacterales", "coli", "Bacillus subtilis", "Fungi", ""];
        for scorer in [Scorer::Ratio, Scorer::QRatio, Scorer::PartialRatio] {
            for a in words {
                for b in words {
                    let ac: Vec<char> = a.chars().collect();
                    let bc: Vec<char> = b.chars().collect();
                    let shared = CharCounts::new(&ac).shared(&bc);
                    let bound = scorer.upper_bound(ac.len(), bc.len(), shared);
                    assert!(bound + 1e-9 >= scorer.score(a, b), "{:?} {} {}", scorer, a, b);
                }
            }
        }
    }

    #[test]
    fn test_char_counts_shared() {
        let chars = |s: &str| s.chars().collect::<Vec<char>>();
        let counts = CharCounts::new(&chars("Escherichia"));
        assert_eq!(counts.shared(&chars("Escherichia")), 11);
        // at most two of each of 'i' and 'c'
        assert_eq!(counts.shared(&chars("iiicc")), 4);
        assert_eq!(counts.shared(&chars("")), 0);

        let counts = CharCounts::new(&chars("Ωmega Straße é"));
        assert_eq!(counts.shared(&chars("ΩΩ ßé")), 4);
        assert_eq!(counts.shared(&chars("Ψ")), 0);
    }

    #[test]
    fn test_extract_one_skips_do_not_change_result() {
        let choices = vec![
            ("Bacteroides", 816),
            ("Bacteroidota", 976),
            ("Bacillus", 1386),
            ("Bacillota", 1239),
            ("Straße", 1),
        ];
        for scorer in [Scorer::Ratio, Scorer::QRatio, Scorer::PartialRatio] {
            for query in ["Bacilota", "Bacteroidetes", "Strasse", "Bac"] {
                let (name, _, score) = extract_one(query, choices.clone(), scorer).unwrap();
                let best = choices
                    .iter()
                    .map(|(c, _)| scorer.score(query, c))
                    .fold(0.0, f64::max);
                assert!(close(score, best), "{:?} {} {}", scorer, query, name);
                let first = choices
                    .iter()
                    .find(|(c, _)| close(scorer.score(query, c), best))
                    .unwrap();
                assert_eq!(name, first.0);
            }
        }
    }

    #[test]
    fn test_extract_one_best_and_ties() {
        let choices = vec![("Escherichia", 561), ("Escherichia coli", 562), ("Escherichia coli", 999)];
        let (name, txid, score) =
            extract_one("Escherichia coli", choices.clone(), Scorer::Ratio).unwrap();
        assert_eq!((name, txid), ("Escherichia coli", 562));
        assert!(close(score, 100.0));

        // both score 100 with partial_ratio; the first one wins
        let (name, txid, _) =
            extract_one("Escherichia", choices, Scorer::PartialRatio).unwrap();
        assert_eq!((name, txid), ("Escherichia", 561));
    }

    #[test]
    fn test_extract_one_empty() {
        let choices: Vec<(&str, u32)> = vec![];
        assert!(extract_one("anything", choices, Scorer::Ratio).is_none());
    }
}
