//! Name-pattern matching for hook filters
//!
//! Patterns are the source contract, not regex: an exact name, a `*`
//! wildcard form, or a `a|b|c` alternation of either. Matching is
//! case-insensitive.

/// Check whether a subject name matches a hook pattern
pub fn matches(pattern: &str, subject: &str) -> bool {
    let subject = subject.to_lowercase();
    pattern.split('|').any(|alternative| {
        let alternative = alternative.trim().to_lowercase();
        if alternative.contains('*') {
            wildcard_match(&alternative, &subject)
        } else {
            alternative == subject
        }
    })
}

/// `*` matches any run of characters (including empty)
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let last = parts.len() - 1;
    let mut pos = 0;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            let rest = &text[pos..];
            if !rest.ends_with(part) {
                return false;
            }
            pos = text.len();
        } else {
            match text[pos..].find(part) {
                Some(idx) => pos = pos + idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_case_insensitive() {
        assert!(matches("search", "search"));
        assert!(matches("Search", "sEaRcH"));
        assert!(!matches("search", "searcher"));
    }

    #[test]
    fn test_wildcard() {
        assert!(matches("git-*", "git-commit"));
        assert!(matches("*-expert", "code-expert"));
        assert!(matches("a*c", "abc"));
        assert!(matches("a*c", "ac"));
        assert!(!matches("a*c", "ab"));
        assert!(matches("*", "anything"));
        assert!(!matches("git-*", "jj-commit"));
    }

    #[test]
    fn test_alternation() {
        assert!(matches("read|write|edit", "write"));
        assert!(matches("read | write", "write"));
        assert!(!matches("read|write", "delete"));
    }

    #[test]
    fn test_alternation_with_wildcards() {
        assert!(matches("git-*|jj-*", "jj-status"));
        assert!(!matches("git-*|jj-*", "svn-status"));
    }

    #[test]
    fn test_overlapping_wildcard_parts() {
        // "aa*aa" needs four distinct chars around the star
        assert!(!wildcard_match("aa*aa", "aaa"));
        assert!(wildcard_match("aa*aa", "aaaa"));
        assert!(wildcard_match("aa*aa", "aaXaa"));
    }
}
