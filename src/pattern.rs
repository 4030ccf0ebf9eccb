// Secrets Engine — Name glob matcher
//
// One metacharacter: `*`, matching any run of characters except `.`.
// Everything else matches literally, so dotted namespaces stay opaque to a
// single star. Anchored at both ends; `**` is not special.

use regex::Regex;

/// A compiled glob over secret names.
pub struct GlobMatcher {
    regex: Regex,
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> Self {
        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for (i, literal) in pattern.split('*').enumerate() {
            if i > 0 {
                source.push_str("[^.]*");
            }
            source.push_str(&regex::escape(literal));
        }
        source.push('$');

        // escaped literal runs joined by a fixed character class always parse
        let regex = Regex::new(&source).expect("glob compiles to a valid regex");
        Self { regex }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
