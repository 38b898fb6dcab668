//! URL slugs and accent folding for Vietnamese text

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Lowercase and strip diacritics (`đ` folds to `d`)
pub fn fold_diacritics(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' | 'Đ' => 'd',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Turn a display name into a URL slug
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in fold_diacritics(input).chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Slug used when the plain one is already taken
pub fn with_suffix(slug: &str, unix_ms: i64) -> String {
    format!("{}-{}", slug, unix_ms)
}

/// Slug given to a soft-deleted product so the original can be reused
pub fn deleted_slug(slug: &str, unix_ms: i64) -> String {
    format!("deleted-{}-{}", unix_ms, slug)
}
