use std::cmp::Ordering;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum CharClass {
    Number,
    Period,
    Text,
}

fn classify(c: char) -> CharClass {
    if c == '.' {
        CharClass::Period
    } else if c.is_ascii_digit() {
        CharClass::Number
    } else {
        CharClass::Text
    }
}

/// Splits `1.20rc3` into `["1", ".", "20", "rc", "3"]`. Every period is its
/// own segment so `..` yields an empty component between two periods.
fn split_segments(version: &str) -> Vec<&str> {
    let trimmed = version.trim();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut prev: Option<CharClass> = None;
    for (idx, c) in trimmed.char_indices() {
        let class = classify(c);
        if let Some(p) = prev {
            if p != class || p == CharClass::Period {
                segments.push(&trimmed[start..idx]);
                start = idx;
            }
        }
        prev = Some(class);
    }
    if !trimmed.is_empty() {
        segments.push(&trimmed[start..]);
    }
    segments
}

fn segment_class(segment: &str) -> CharClass {
    segment.chars().next().map(classify).unwrap_or(CharClass::Text)
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compares two dotted version strings segment by segment.
///
/// Numeric segments compare numerically (`1.10 > 1.9`), text segments
/// lexically, and a release beats a pre-release with the same prefix
/// (`1.2.0 > 1.2rc1`, `1.5 > 1.5b3`).
pub fn compare_version(a: &str, b: &str) -> Ordering {
    let parts_a = split_segments(a);
    let parts_b = split_segments(b);
    let common = parts_a.len().min(parts_b.len());

    for i in 0..common {
        let (sa, sb) = (parts_a[i], parts_b[i]);
        let (ta, tb) = (segment_class(sa), segment_class(sb));
        if ta == tb {
            let ord = match ta {
                CharClass::Text => sa.cmp(sb),
                CharClass::Number => compare_numeric(sa, sb),
                CharClass::Period => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
            continue;
        }
        return match (ta, tb) {
            (_, CharClass::Text) => Ordering::Greater,
            (CharClass::Text, _) => Ordering::Less,
            (CharClass::Number, _) => Ordering::Greater,
            _ => Ordering::Less,
        };
    }

    if parts_a.len() == parts_b.len() {
        return Ordering::Equal;
    }

    let (missing, longer_wins) = if parts_a.len() > parts_b.len() {
        (segment_class(parts_a[common]), Ordering::Greater)
    } else {
        (segment_class(parts_b[common]), Ordering::Less)
    };
    if missing == CharClass::Text {
        longer_wins.reverse()
    } else {
        longer_wins
    }
}

/// `true` when `candidate` is strictly newer than `installed`.
pub fn is_newer(candidate: &str, installed: &str) -> bool {
    compare_version(candidate, installed) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_compare_numerically() {
        assert_eq!(compare_version("1.8", "1.9"), Ordering::Less);
        assert_eq!(compare_version("2.0", "1.99"), Ordering::Greater);
        assert_eq!(compare_version("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_version("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_version("01.2", "1.2"), Ordering::Equal);
    }

    #[test]
    fn longer_numeric_version_wins() {
        assert_eq!(compare_version("1.5.1", "1.5"), Ordering::Greater);
        assert_eq!(compare_version("1.5", "1.5.1"), Ordering::Less);
    }

    #[test]
    fn release_beats_prerelease() {
        assert_eq!(compare_version("1.2.0", "1.2rc1"), Ordering::Greater);
        assert_eq!(compare_version("1.5", "1.5b3"), Ordering::Greater);
        assert_eq!(compare_version("1.5b3", "1.5"), Ordering::Less);
        assert_eq!(compare_version("1.2rc1", "1.2rc2"), Ordering::Less);
    }

    #[test]
    fn ordering_is_transitive_over_a_sorted_sample() {
        let sorted = ["0.9", "1.0", "1.2rc1", "1.2", "1.2.1", "1.10", "2.0"];
        for i in 0..sorted.len() {
            for j in 0..sorted.len() {
                assert_eq!(
                    compare_version(sorted[i], sorted[j]),
                    i.cmp(&j),
                    "{} vs {}",
                    sorted[i],
                    sorted[j]
                );
            }
        }
    }

    #[test]
    fn equal_is_not_newer() {
        assert!(!is_newer("1.0", "1.0"));
        assert!(is_newer("1.1", "1.0"));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(compare_version(" 1.2 ", "1.2"), Ordering::Equal);
        assert_eq!(compare_version("", ""), Ordering::Equal);
    }
}
