use std::collections::HashSet;

use rslug::slugify;

pub const SLUG_MAX_LEN: usize = 200;
pub const SLUG_COLUMN_LIMIT: usize = 255;

const FALLBACK_SLUG: &str = "untitled";

pub fn slug_for(text: &str) -> String {
    let transliterated = slugify!(text);

    let mut out = String::with_capacity(transliterated.len());
    let mut pending_separator = false;
    for ch in transliterated.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('-');
            }
            pending_separator = false;
            out.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_separator = true;
        }
    }

    truncate_slug(&mut out, SLUG_MAX_LEN);
    if out.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    out
}

pub fn audiobook_slug(name: &str, external_id: i64) -> String {
    let id_part = external_id.unsigned_abs().to_string();
    let mut name_part = slug_for(name);
    truncate_slug(&mut name_part, SLUG_MAX_LEN - id_part.len() - 1);
    format!("{name_part}-{id_part}")
}

fn truncate_slug(slug: &mut String, max_len: usize) {
    // slugs are ASCII, byte and char offsets agree
    if slug.len() > max_len {
        slug.truncate(max_len);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
}

#[derive(Debug)]
pub struct SlugRegistry {
    used: HashSet<String>,
    column_limit: usize,
}

impl Default for SlugRegistry {
    fn default() -> Self {
        Self::new(SLUG_COLUMN_LIMIT)
    }
}

impl SlugRegistry {
    pub fn new(column_limit: usize) -> Self {
        Self {
            used: HashSet::new(),
            column_limit,
        }
    }

    pub fn with_existing<I>(existing: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut registry = Self::default();
        registry.used.extend(existing);
        registry
    }

    pub fn claim(&mut self, text: &str) -> String {
        self.claim_base(slug_for(text))
    }

    pub fn claim_base(&mut self, base: String) -> String {
        let mut base = base;
        truncate_slug(&mut base, self.column_limit);
        if self.used.insert(base.clone()) {
            return base;
        }

        let mut counter: u64 = 1;
        loop {
            let suffix = format!("-{counter}");
            if base.len() + suffix.len() > self.column_limit {
                truncate_slug(&mut base, self.column_limit.saturating_sub(suffix.len()));
            }

            let candidate = format!("{base}{suffix}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}
