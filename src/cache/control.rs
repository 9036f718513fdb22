//! `Cache-Control` header interpretation.
//!
//! Only the directives the cache acts on are retained: `public`, `private`
//! and `max-age`. Everything else is skipped. Parsing never fails; a value the
//! parser does not understand simply contributes no directives.

use std::str::FromStr;
use std::time::Duration;

use crate::http::Headers;

/// Structured view of a `Cache-Control` header value.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use respcache::cache::CacheControl;
///
/// let cc = CacheControl::parse("Public, max-age=60");
/// assert!(cc.is_public());
/// assert!(!cc.is_private());
/// assert_eq!(cc.max_age(), Some(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    public: bool,
    private: bool,
    max_age: Option<Duration>,
}

impl CacheControl {
    /// Parses a single header value such as `"public, max-age=300"`.
    ///
    /// Directive names are matched case-insensitively. Arguments may be quoted.
    /// An unparsable `max-age` argument is ignored; when `max-age` appears more
    /// than once the first valid occurrence wins.
    pub fn parse(value: &str) -> Self {
        let mut cc = Self::default();
        cc.merge(value);
        cc
    }

    /// Interprets every `Cache-Control` line in `headers` as one directive list.
    ///
    /// Returns `None` when the header is absent.
    pub fn from_headers(headers: &Headers) -> Option<Self> {
        let mut values = headers.get_all("cache-control").peekable();
        values.peek()?;

        let mut cc = Self::default();
        for value in values {
            cc.merge(value);
        }
        Some(cc)
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    /// `private` with or without a field-name list.
    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Freshness lifetime from `max-age`, in whole seconds.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    fn merge(&mut self, value: &str) {
        for directive in value.split(',') {
            let directive = directive.trim();
            if directive.is_empty() {
                continue;
            }

            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(unquote(argument.trim()))),
                None => (directive, None),
            };

            if name.eq_ignore_ascii_case("public") {
                self.public = true;
            } else if name.eq_ignore_ascii_case("private") {
                self.private = true;
            } else if name.eq_ignore_ascii_case("max-age") && self.max_age.is_none() {
                self.max_age = argument
                    .and_then(|secs| secs.parse::<u64>().ok())
                    .map(Duration::from_secs);
            }
        }
    }
}

impl FromStr for CacheControl {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_value_has_no_directives() {
        assert_eq!(CacheControl::parse(""), CacheControl::default());
        assert_eq!(CacheControl::parse(" , ,"), CacheControl::default());
    }

    #[test]
    fn private_with_field_names() {
        let cc = CacheControl::parse(r#"private="Set-Cookie", max-age=10"#);
        assert!(cc.is_private());
        assert_eq!(cc.max_age(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn quoted_and_spaced_max_age() {
        let cc = CacheControl::parse(r#"public, max-age = "120""#);
        assert_eq!(cc.max_age(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn invalid_max_age_is_ignored() {
        assert_eq!(CacheControl::parse("max-age=soon").max_age(), None);
        assert_eq!(CacheControl::parse("max-age=-5").max_age(), None);
        assert_eq!(CacheControl::parse("max-age").max_age(), None);
    }

    #[test]
    fn first_valid_max_age_wins() {
        let cc = CacheControl::parse("max-age=5, max-age=50");
        assert_eq!(cc.max_age(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn unknown_directives_are_skipped() {
        let cc = CacheControl::parse("no-transform, must-revalidate, s-maxage=30");
        assert_eq!(cc, CacheControl::default());
    }

    #[test]
    fn header_lines_are_merged() {
        let mut headers = Headers::new();
        headers.insert("Cache-Control", "public");
        headers.insert("cache-control", "max-age=60");
        let cc = CacheControl::from_headers(&headers).unwrap();
        assert!(cc.is_public());
        assert_eq!(cc.max_age(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn absent_header_is_none() {
        assert_eq!(CacheControl::from_headers(&Headers::new()), None);
    }
}
