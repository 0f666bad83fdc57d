use std::collections::BTreeSet;

/// Canonical tag form: comma-split, trimmed, lowercase, no empties, deduplicated, sorted.
///
/// Every element is split on commas as well, so `["Dog,dog"]` and `"Dog,dog"` agree.
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .flat_map(|item| {
            item.as_ref()
                .split(',')
                .map(|tag| tag.trim().to_lowercase())
                .collect::<Vec<_>>()
        })
        .filter(|tag| !tag.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn normalize_tag_string(raw: &str) -> Vec<String> {
    normalize_tags(std::iter::once(raw))
}

/// Storage form of an already normalized tag list.
pub fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}
