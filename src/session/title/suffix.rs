//! Deterministic title naming for split conversations.

/// Separator between a title's base and its numeric suffix.
const SUFFIX_SEPARATOR: &str = " - ";

/// Next title in a split chain.
///
/// A title ending in `" - <digits>"` has that number incremented; any other title gets
/// `" - 2"` appended. Only the trailing suffix is recognised: earlier hyphens and digits
/// are part of the opaque base.
#[must_use]
pub fn derive_next_title(title: &str) -> String {
    if let Some((base, digits)) = title.rsplit_once(SUFFIX_SEPARATOR)
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
    {
        let next = digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_add(1))
            .map_or_else(|| increment_decimal(digits), |n| n.to_string());
        return format!("{base}{SUFFIX_SEPARATOR}{next}");
    }
    format!("{title}{SUFFIX_SEPARATOR}2")
}

/// Advance `candidate` along the suffix chain until `taken` rejects it.
#[must_use]
pub fn unique_title(candidate: String, taken: impl Fn(&str) -> bool) -> String {
    let mut title = candidate;
    while taken(&title) {
        title = derive_next_title(&title);
    }
    title
}

/// Add one to an arbitrarily long decimal string.
fn increment_decimal(digits: &str) -> String {
    let mut out: Vec<u8> = digits.bytes().collect();
    for byte in out.iter_mut().rev() {
        if *byte == b'9' {
            *byte = b'0';
        } else {
            *byte += 1;
            return String::from_utf8_lossy(&out).into_owned();
        }
    }
    out.insert(0, b'1');
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_title_gets_two() {
        assert_eq!(derive_next_title("Chat A"), "Chat A - 2");
        assert_eq!(derive_next_title(""), " - 2");
    }

    #[test]
    fn test_suffix_is_incremented() {
        assert_eq!(derive_next_title("Chat A - 1"), "Chat A - 2");
        assert_eq!(derive_next_title("Chat A - 2"), "Chat A - 3");
        assert_eq!(derive_next_title("Chat A - 9"), "Chat A - 10");
        assert_eq!(derive_next_title("Chat A - 99"), "Chat A - 100");
    }

    #[test]
    fn test_only_trailing_suffix_counts() {
        assert_eq!(derive_next_title("Rust - 2021 edition"), "Rust - 2021 edition - 2");
        assert_eq!(derive_next_title("a - 1 - 2"), "a - 1 - 3");
        assert_eq!(derive_next_title("x-y-z - 7"), "x-y-z - 8");
        assert_eq!(derive_next_title("Top 10 - tips"), "Top 10 - tips - 2");
        assert_eq!(derive_next_title("2024 - 12"), "2024 - 13");
    }

    #[test]
    fn test_malformed_suffixes_append() {
        assert_eq!(derive_next_title("Chat A-3"), "Chat A-3 - 2");
        assert_eq!(derive_next_title("Chat A -3"), "Chat A -3 - 2");
        assert_eq!(derive_next_title("Chat A - "), "Chat A -  - 2");
        assert_eq!(derive_next_title("Chat A - 3x"), "Chat A - 3x - 2");
        assert_eq!(derive_next_title("Chat A - -3"), "Chat A - -3 - 2");
        assert_eq!(derive_next_title("Chat A - 3 "), "Chat A - 3  - 2");
    }

    #[test]
    fn test_suffix_beyond_u64() {
        assert_eq!(
            derive_next_title("Chat - 18446744073709551615"),
            "Chat - 18446744073709551616"
        );
        assert_eq!(
            derive_next_title("Chat - 99999999999999999999"),
            "Chat - 100000000000000000000"
        );
    }

    #[test]
    fn test_leading_zeros_follow_integer_value() {
        assert_eq!(derive_next_title("Chat - 007"), "Chat - 8");
    }

    #[test]
    fn test_unique_title_skips_taken() {
        let taken = ["Chat A - 2", "Chat A - 3"];
        assert_eq!(
            unique_title("Chat A - 2".to_string(), |t| taken.contains(&t)),
            "Chat A - 4"
        );
        assert_eq!(unique_title("Fresh".to_string(), |_| false), "Fresh");
    }
}
