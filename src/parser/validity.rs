use std::sync::LazyLock;

use regex::Regex;

/// Term patterns a genuine DEF 14A is expected to hit. The first one is the
/// mandatory anchor; the rest vary with which topics a filing foregrounds.
static REQUIRED_TERMS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)proxy\s+statement").unwrap(),
        Regex::new(r"(?i)executive\s+compensation|compensation\s+discussion").unwrap(),
        Regex::new(r"(?i)board\s+of\s+directors|corporate\s+governance").unwrap(),
        Regex::new(r"(?i)(stock|share)\s+(ownership|holdings)").unwrap(),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityVerdict {
    pub valid: bool,
    pub matched_terms: usize,
}

/// Is this text a genuine proxy statement? Valid iff at least two term
/// patterns match and "proxy statement" itself is among them.
pub fn check_validity(text: &str) -> ValidityVerdict {
    let matched_terms = REQUIRED_TERMS.iter().filter(|re| re.is_match(text)).count();
    ValidityVerdict {
        valid: matched_terms >= 2 && REQUIRED_TERMS[0].is_match(text),
        matched_terms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_plus_one_term_is_valid() {
        let v = check_validity("This Proxy Statement describes executive compensation policy.");
        assert!(v.valid);
        assert_eq!(v.matched_terms, 2);
    }

    #[test]
    fn two_terms_without_anchor_is_invalid() {
        let v = check_validity("Our board of directors reviews stock ownership annually.");
        assert!(!v.valid);
        assert_eq!(v.matched_terms, 2);
    }

    #[test]
    fn anchor_alone_is_not_enough() {
        let v = check_validity("proxy statement");
        assert!(!v.valid);
        assert_eq!(v.matched_terms, 1);
    }

    #[test]
    fn matching_is_case_insensitive_across_whitespace() {
        let v = check_validity("PROXY\n STATEMENT and Compensation  Discussion and Analysis");
        assert!(v.valid);
    }

    #[test]
    fn share_holdings_variant_counts() {
        let v = check_validity("proxy statement: beneficial share holdings of management");
        assert!(v.valid);
    }

    #[test]
    fn empty_text_is_invalid() {
        let v = check_validity("");
        assert!(!v.valid);
        assert_eq!(v.matched_terms, 0);
    }
}
