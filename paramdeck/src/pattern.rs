//! Pattern matching for report extraction: line search and file-name globs.
//!
//! ## Match modes
//!
//! | Mode | Description |
//! |------|-------------|
//! | [`MatchMode::Literal`] | Case-sensitive substring search |
//! | [`MatchMode::Regexp`]  | [`regex`] crate, case-sensitive, unanchored |
//! | [`MatchMode::Grep`]    | Literal substring *or* regex, whichever hits |
//! | [`MatchMode::Glob`]    | Whole-name glob (`*`, `?`, `[…]`, `\x`) |
//!
//! `Grep` is what report pipelines use.  Search strings copied from a
//! listing often contain regex metacharacters (`ESTI. + FAIBLE SIGMA`), and
//! should still find the line they were copied from.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

// ── Public types ─────────────────────────────────────────────────────────────

/// Which matching algorithm a [`Pattern`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Literal,
    Regexp,
    Grep,
    Glob,
}

/// Error returned when a pattern cannot be compiled.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("regex error: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("glob error: {0}")]
    InvalidGlob(String),
}

#[derive(Clone)]
enum Compiled {
    Literal,
    Regex(Arc<Regex>),
    /// The regex half is absent when the source is not a valid regex.
    Grep(Option<Arc<Regex>>),
    Glob,
}

/// A compiled pattern ready for matching.
#[derive(Clone)]
pub struct Pattern {
    src: String,
    mode: MatchMode,
    compiled: Compiled,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("src", &self.src)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Pattern {
    /// Compile `src` using `mode`.
    ///
    /// `Grep` never fails: an invalid regex degrades to literal search.
    pub fn new(src: &str, mode: MatchMode) -> Result<Self, PatternError> {
        let compiled = match mode {
            MatchMode::Literal => Compiled::Literal,
            MatchMode::Regexp => Compiled::Regex(Arc::new(Regex::new(src)?)),
            MatchMode::Grep => Compiled::Grep(Regex::new(src).ok().map(Arc::new)),
            MatchMode::Glob => {
                check_glob(src).map_err(PatternError::InvalidGlob)?;
                Compiled::Glob
            }
        };
        Ok(Self {
            src: src.to_owned(),
            mode,
            compiled,
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns `true` if this pattern matches `text`.
    ///
    /// Search modes match anywhere in `text`; `Glob` must cover all of it.
    pub fn matches(&self, text: &str) -> bool {
        match &self.compiled {
            Compiled::Literal => text.contains(self.src.as_str()),
            Compiled::Regex(re) => re.is_match(text),
            Compiled::Grep(re) => {
                text.contains(self.src.as_str()) || re.as_ref().is_some_and(|re| re.is_match(text))
            }
            Compiled::Glob => glob_match(&self.src, text),
        }
    }
}

// ── Glob matching ─────────────────────────────────────────────────────────────
//
// Glob syntax (case-sensitive, whole string):
//   *        any sequence of characters
//   ?        any single character
//   [...]    character class; [^...] or [!...] negated; a-z ranges
//   \x       literal x

#[derive(Debug, Clone, Copy)]
enum GlobTok<'a> {
    Star,
    Any,
    Lit(char),
    /// Class body, starting after the opening `[`.
    Class(&'a [char]),
}

impl GlobTok<'_> {
    fn accepts(&self, ch: char) -> bool {
        match self {
            GlobTok::Star | GlobTok::Any => true,
            GlobTok::Lit(c) => *c == ch,
            GlobTok::Class(body) => cmatch(body, ch).is_some(),
        }
    }
}

/// Match `text` against glob `pat`.
///
/// Backtracks only to the most recent `*`, so matching stays polynomial
/// for any pattern.
pub fn glob_match(pat: &str, text: &str) -> bool {
    let p: Vec<char> = pat.chars().collect();
    let s: Vec<char> = text.chars().collect();
    let toks = glob_tokens(&p);

    let (mut pi, mut si) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while si < s.len() {
        match toks.get(pi) {
            Some(GlobTok::Star) => {
                star = Some(pi);
                mark = si;
                pi += 1;
                continue;
            }
            Some(t) if t.accepts(s[si]) => {
                pi += 1;
                si += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some(sp) => {
                pi = sp + 1;
                mark += 1;
                si = mark;
            }
            None => return false,
        }
    }
    toks[pi..].iter().all(|t| matches!(t, GlobTok::Star))
}

fn glob_tokens(p: &[char]) -> Vec<GlobTok<'_>> {
    let mut toks = Vec::with_capacity(p.len());
    let mut i = 0;
    while i < p.len() {
        match p[i] {
            '\\' if i + 1 < p.len() => {
                toks.push(GlobTok::Lit(p[i + 1]));
                i += 2;
            }
            '*' => {
                if !matches!(toks.last(), Some(GlobTok::Star)) {
                    toks.push(GlobTok::Star);
                }
                i += 1;
            }
            '?' => {
                toks.push(GlobTok::Any);
                i += 1;
            }
            '[' => match class_len(&p[i + 1..]) {
                Some(len) => {
                    toks.push(GlobTok::Class(&p[i + 1..]));
                    i += 1 + len;
                }
                None => {
                    toks.push(GlobTok::Lit('['));
                    i += 1;
                }
            },
            c => {
                toks.push(GlobTok::Lit(c));
                i += 1;
            }
        }
    }
    toks
}

/// Length of a class body including its closing `]`, or `None` if unclosed.
fn class_len(body: &[char]) -> Option<usize> {
    let mut j = usize::from(matches!(body.first(), Some('^' | '!')));
    let mut first = true;
    while j < body.len() {
        match body[j] {
            '\\' => j += 2,
            ']' if !first => return Some(j + 1),
            _ => j += 1,
        }
        first = false;
    }
    None
}

/// Match `ch` against a class body.  On a match, returns the pattern left
/// after the closing `]`.
fn cmatch(body: &[char], ch: char) -> Option<&[char]> {
    let negated = matches!(body.first(), Some('^' | '!'));
    let mut j = usize::from(negated);
    let mut first = true;
    let mut hit = false;
    while j < body.len() {
        let mut lo = body[j];
        if lo == ']' && !first {
            return (hit != negated).then(|| &body[j + 1..]);
        }
        first = false;
        if lo == '\\' {
            j += 1;
            lo = *body.get(j)?;
        }
        if body.get(j + 1) == Some(&'-') && body.get(j + 2).is_some_and(|&c| c != ']') {
            j += 2;
            let mut hi = body[j];
            if hi == '\\' {
                j += 1;
                hi = *body.get(j)?;
            }
            hit |= lo <= ch && ch <= hi;
        } else {
            hit |= lo == ch;
        }
        j += 1;
    }
    None
}

/// Validate glob syntax.
pub fn check_glob(pat: &str) -> Result<(), String> {
    let mut chars = pat.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if chars.next().is_none() {
                    return Err("trailing '\\'".into());
                }
            }
            '[' => {
                if matches!(chars.peek(), Some('^' | '!')) {
                    chars.next();
                }
                let mut found = false;
                let mut first = true;
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        chars.next();
                    } else if c == ']' && !first {
                        found = true;
                        break;
                    }
                    first = false;
                }
                if !found {
                    return Err("unmatched '['".into());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- Search modes ---------------------------------------------------------

    #[test]
    fn literal_is_case_sensitive_substring() {
        let p = Pattern::new("KEFF", MatchMode::Literal).unwrap();
        assert!(p.matches("0.99314 < KEFF < 0.99911"));
        assert!(!p.matches("keff"));
    }

    #[test]
    fn regexp_is_unanchored() {
        let p = Pattern::new(r"ETAPE\s+\d+", MatchMode::Regexp).unwrap();
        assert!(p.matches("  ETAPE 417 ESTI."));
        assert!(!p.matches("etape 417"));
    }

    #[test]
    fn regexp_rejects_bad_source() {
        assert!(matches!(
            Pattern::new("(unclosed", MatchMode::Regexp),
            Err(PatternError::InvalidRegex(_))
        ));
    }

    #[test]
    fn grep_finds_lines_copied_verbatim() {
        // As a regex this needs two spaces before FAIBLE; literally it hits.
        let p = Pattern::new("ESTI. + FAIBLE SIGMA", MatchMode::Grep).unwrap();
        assert!(p.matches(" ETAPE 417 ESTI. + FAIBLE SIGMA 0.99612 +/- 0.00100"));
        assert!(!p.matches(" ETAPE 417 ESTI. COMBINEE"));
    }

    #[test]
    fn grep_also_matches_as_regex() {
        let p = Pattern::new(r"KEFF\s*=", MatchMode::Grep).unwrap();
        assert!(p.matches("KEFF   = 1.002"));
    }

    #[test]
    fn grep_tolerates_invalid_regex() {
        let p = Pattern::new("SIGMA (", MatchMode::Grep).unwrap();
        assert!(p.matches("FAIBLE SIGMA ( 3 )"));
        assert!(!p.matches("FAIBLE SIGMA"));
    }

    // -- Glob -----------------------------------------------------------------

    #[test]
    fn glob_star_and_question() {
        assert!(glob_match("*.listing", "godiva.listing"));
        assert!(glob_match("*", ""));
        assert!(glob_match("case?.out", "case1.out"));
        assert!(!glob_match("case?.out", "case12.out"));
    }

    #[test]
    fn glob_covers_whole_name() {
        assert!(!glob_match("*.listing", "godiva.listing.bak"));
        assert!(!glob_match("godiva", "godiva.listing"));
    }

    #[test]
    fn glob_is_case_sensitive() {
        assert!(!glob_match("*.listing", "GODIVA.LISTING"));
    }

    #[test]
    fn glob_classes() {
        assert!(glob_match("run[0-9].log", "run7.log"));
        assert!(!glob_match("run[!0-9].log", "run7.log"));
        assert!(glob_match("run[^0-9].log", "runx.log"));
        assert!(glob_match(r"a\*b", "a*b"));
        assert!(!glob_match(r"a\*b", "axb"));
    }

    #[test]
    fn glob_class_members() {
        assert!(glob_match("case[abc].out", "caseb.out"));
        assert!(!glob_match("case[abc].out", "cased.out"));
        assert!(glob_match("[a-cx-z]", "y"));
        assert!(!glob_match("[a-cx-z]", "m"));
        // `]` first in the body and `-` last are literal members.
        assert!(glob_match("run[]].log", "run].log"));
        assert!(glob_match("run[a-].log", "run-.log"));
        assert!(glob_match(r"run[\]x].log", "run].log"));
        assert!(glob_match("[!]]", "a"));
        assert!(!glob_match("[!]]", "]"));
    }

    #[test]
    fn class_match_returns_rest_of_pattern() {
        let body: Vec<char> = "0-9]tail".chars().collect();
        assert_eq!(cmatch(&body, '5'), Some(&body[4..]));
        assert_eq!(cmatch(&body, 'x'), None);
        let unclosed: Vec<char> = "0-9".chars().collect();
        assert_eq!(cmatch(&unclosed, '5'), None);
    }

    #[test]
    fn glob_pathological_pattern_terminates() {
        let text = "a".repeat(64);
        assert!(!glob_match("*a*a*a*a*a*a*a*a*b", &text));
    }

    #[test]
    fn check_glob_rejects_unclosed_class() {
        assert!(check_glob("run[0-9.log").is_err());
        assert!(check_glob("trail\\").is_err());
        assert!(check_glob("run[]].log").is_ok());
        assert!(Pattern::new("[abc", MatchMode::Glob).is_err());
    }
}
