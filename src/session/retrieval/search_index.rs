//! Fuzzy title search.
//!
//! Matches are ranked by tier: exact title, case-insensitive equality, prefix, substring,
//! then typo-tolerant approximate substring. Within a tier, smaller edit distance wins and
//! remaining ties keep the input order.

/// Match quality, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Exact,
    Equal,
    Prefix,
    Substring,
    Approximate,
}

/// Index over an ordered title list; results are indices into that list.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    titles: Vec<String>,
    folded: Vec<Vec<char>>,
}

impl SearchIndex {
    /// Build the index over `titles`, most recent first.
    #[must_use]
    pub fn build(titles: &[String]) -> Self {
        Self {
            titles: titles.to_vec(),
            folded: titles.iter().map(|title| fold(title)).collect(),
        }
    }

    /// Indices of matching titles, most relevant first.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<usize> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let needle = fold(query);
        let budget = allowed_distance(needle.len());

        let mut ranked: Vec<(Tier, usize, usize)> = self
            .titles
            .iter()
            .zip(&self.folded)
            .enumerate()
            .filter_map(|(index, (title, folded))| {
                let (tier, distance) = classify(query, &needle, title, folded, budget)?;
                Some((tier, distance, index))
            })
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, _, index)| index).collect()
    }
}

fn classify(
    query: &str,
    needle: &[char],
    title: &str,
    folded: &[char],
    budget: usize,
) -> Option<(Tier, usize)> {
    if title == query {
        return Some((Tier::Exact, 0));
    }
    if folded == needle {
        return Some((Tier::Equal, 0));
    }
    if folded.starts_with(needle) {
        return Some((Tier::Prefix, 0));
    }
    if folded.windows(needle.len()).any(|window| window == needle) {
        return Some((Tier::Substring, 0));
    }
    let distance = substring_distance(needle, folded);
    (distance <= budget).then_some((Tier::Approximate, distance))
}

fn fold(text: &str) -> Vec<char> {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Typos tolerated for a query of `len` characters.
const fn allowed_distance(len: usize) -> usize {
    match len {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Smallest edit distance between `needle` and any substring of `haystack`.
fn substring_distance(needle: &[char], haystack: &[char]) -> usize {
    // Row 0 is all zeros: a match may start anywhere in the haystack.
    let mut previous = vec![0usize; haystack.len() + 1];
    let mut current = vec![0usize; haystack.len() + 1];

    for (i, &n) in needle.iter().enumerate() {
        current[0] = i + 1;
        for (j, &h) in haystack.iter().enumerate() {
            let substitution = previous[j] + usize::from(n != h);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous.into_iter().min().unwrap_or(needle.len())
}
