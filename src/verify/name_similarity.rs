//! Payer-name similarity scoring.

use unicode_normalization::char::decompose_canonical;

const THRESHOLD: f64 = 0.3;

pub fn is_match(a: &str, b: &str) -> bool {
    score(a, b) >= THRESHOLD
}

/// Equal → 1.0; one contains the other → 0.8; otherwise token overlap
/// over tokens longer than 2 chars: `matches / max(|tokens(a)|, |tokens(b)|)`.
pub fn score(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);

    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    if na.contains(&nb) || nb.contains(&na) {
        return 0.8;
    }

    let tokens_a = tokens(&na);
    let tokens_b = tokens(&nb);
    let max_len = tokens_a.len().max(tokens_b.len());
    if max_len == 0 {
        return 0.0;
    }

    let matches = tokens_a.iter().filter(|t| tokens_b.contains(t)).count();
    matches as f64 / max_len as f64
}

fn tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|t| t.len() > 2).collect()
}

/// Lower-case, strip diacritics (NFD decomposition, drop combining
/// marks), strip non-alphanumeric, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut stripped = String::with_capacity(s.len());
    for ch in s.chars() {
        decompose_canonical(ch, |c| {
                if !is_combining_mark(c) {
                    stripped.push(c);
                }
            });
    }

    let lowered: String = stripped.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = true;
    for ch in lowered.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(score("Juan Perez", "juan perez"), 1.0);
    }

    #[test]
    fn diacritics_are_stripped() {
        assert_eq!(score("José Ñandú", "jose nandu"), 1.0);
    }

    #[test]
    fn containment_scores_point_eight() {
        assert_eq!(score("Juan Perez Garcia", "Juan Perez"), 0.8);
    }

    #[test]
    fn token_overlap_partial_match() {
        let s = score("Maria Lopez Garcia", "Maria Fernanda Lopez");
        assert!(s > 0.3 && s < 1.0, "expected partial overlap, got {s}");
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(score("Juan Perez", "Roberto Gomez") < 0.3);
    }

    #[test]
    fn empty_input_never_matches() {
        assert_eq!(score("", "Juan Perez"), 0.0);
    }
}
