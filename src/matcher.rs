//! Cross-store identity matching: given an Android listing name and the iOS
//! listings already scraped in the batch, find the iOS app most likely to be
//! the same product and borrow its category.

use std::collections::HashSet;

use strsim::jaro_winkler;

/// Score above which a candidate is considered the same app. Strictly
/// exceeded, never met, so marginal matches stay unmatched.
pub const MATCH_THRESHOLD: f64 = 0.3;

/// Outcome of a successful identity match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub ios_name: String,
    pub category: String,
    pub score: f64,
}

/// Lowercase, strip parenthesized qualifiers (both ASCII and fullwidth),
/// collapse whitespace. Store listings decorate names with taglines in
/// brackets; identity lives in what remains.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' | '（' => depth += 1,
            ')' | '）' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                for lc in c.to_lowercase() {
                    out.push(lc);
                }
            }
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a normalized name into whitespace-delimited keyword tokens,
/// preserving order of first appearance. Punctuation stays attached to its
/// token, so `line:` and `line` are different keywords.
pub fn keywords(normalized: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    normalized
        .split_whitespace()
        .filter_map(|t| {
            let t = t.to_string();
            seen.insert(t.clone()).then_some(t)
        })
        .collect()
}

fn keyword_overlap(a: &[String], b: &[String]) -> f64 {
    let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}

/// Blended similarity between an Android name and an iOS name, both raw.
///
/// 0.6 * whole-string similarity + 0.4 * keyword Jaccard, plus a flat 0.2
/// bonus when any Android keyword longer than three characters appears
/// verbatim inside the iOS name. The bonus applies once, so the result may
/// exceed 1.0; the comparison is relative, not a probability.
pub fn similarity_score(android_name: &str, ios_name: &str) -> f64 {
    let a_norm = normalize_name(android_name);
    let i_norm = normalize_name(ios_name);
    let a_kw = keywords(&a_norm);
    let i_kw = keywords(&i_norm);

    let mut score = 0.6 * jaro_winkler(&a_norm, &i_norm) + 0.4 * keyword_overlap(&a_kw, &i_kw);
    if a_kw
        .iter()
        .any(|kw| kw.chars().count() > 3 && i_norm.contains(kw.as_str()))
    {
        score += 0.2;
    }
    score
}

/// Pick the best iOS candidate for an Android name.
///
/// `candidates` pairs each iOS listing name with its category, in the order
/// the listings were scraped. Ties keep the earliest candidate; a winner must
/// score strictly above [`MATCH_THRESHOLD`].
pub fn best_match(android_name: &str, candidates: &[(String, String)]) -> Option<MatchResult> {
    let mut best: Option<MatchResult> = None;
    for (ios_name, category) in candidates {
        let score = similarity_score(android_name, ios_name);
        if score <= MATCH_THRESHOLD {
            continue;
        }
        let better = best.as_ref().map(|b| score > b.score).unwrap_or(true);
        if better {
            best = Some(MatchResult {
                ios_name: ios_name.clone(),
                category: category.clone(),
                score,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_brackets_and_case() {
        assert_eq!(normalize_name("LINE（免費通話）"), "line");
        assert_eq!(normalize_name("Spotify - Music (Free)"), "spotify - music");
        assert_eq!(normalize_name("  A   B  "), "a b");
    }

    #[test]
    fn keywords_split_on_whitespace_and_dedupe_in_order() {
        assert_eq!(
            keywords("line: 免費通話文字"),
            vec!["line:".to_string(), "免費通話文字".to_string()]
        );
        // punctuation is not a token boundary
        assert_eq!(keywords("a-b a-b c"), vec!["a-b", "c"]);
    }

    #[test]
    fn decorated_name_still_matches_plain_listing() {
        let candidates = vec![
            ("天氣預報".to_string(), "天氣".to_string()),
            ("LINE".to_string(), "社交".to_string()),
        ];
        let m = best_match("LINE: 免費通話文字", &candidates).unwrap();
        assert_eq!(m.ios_name, "LINE");
        assert_eq!(m.category, "社交");
        assert!(m.score > MATCH_THRESHOLD);
    }

    #[test]
    fn substring_bonus_requires_more_than_three_chars() {
        // "app" is only three chars, no bonus; scores stay symmetric
        let without = similarity_score("app: tool", "unrelated thing");
        assert!(without < 0.2 + 0.6); // no flat bonus path
        let with = similarity_score("linepay wallet", "linepay");
        assert!(with > similarity_score("pay wallet", "linepay"));
    }

    #[test]
    fn weak_candidates_stay_unmatched() {
        let candidates = vec![("完全不同的程式".to_string(), "工具".to_string())];
        assert!(best_match("Stellar Charts Pro", &candidates).is_none());
        assert!(best_match("anything", &[]).is_none());
    }

    #[test]
    fn ties_keep_the_first_scraped_candidate() {
        let candidates = vec![
            ("Chat".to_string(), "社交".to_string()),
            ("Chat".to_string(), "工具".to_string()),
        ];
        let m = best_match("Chat", &candidates).unwrap();
        assert_eq!(m.category, "社交");
    }

    #[test]
    fn scoring_is_deterministic() {
        let a = similarity_score("LINE: 免費通話文字", "LINE");
        for _ in 0..10 {
            assert_eq!(similarity_score("LINE: 免費通話文字", "LINE"), a);
        }
    }
}
