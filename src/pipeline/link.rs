//! Link validation: find a manuscript link inside a chat message.
//!
//! Users paste viewer links such as
//! `https://digi.vatlib.it/view/MSS_Vat.lat.3225`, often with some words
//! around them. Validation is a plain substring check against the library
//! root; only the first matching token is kept.

use crate::error::Vatlib2PdfError;
use std::fmt;

/// A token from user input that contains the library root URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManuscriptLink(String);

impl ManuscriptLink {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The manuscript identifier: the last non-empty path segment after the
    /// library root, ignoring any query string or fragment.
    ///
    /// Returns `None` for links that stop at the root.
    pub fn manuscript_id(&self, base_url: &str) -> Option<&str> {
        let start = self.0.find(base_url)? + base_url.len();
        let rest = &self.0[start..];
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        rest.split('/').rev().find(|segment| !segment.is_empty())
    }
}

impl fmt::Display for ManuscriptLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the manuscript link from `raw_text`.
///
/// Returns the first whitespace-delimited token containing `base_url`, or
/// [`Vatlib2PdfError::LinkInvalid`] when no token does.
pub fn validate(raw_text: &str, base_url: &str) -> Result<ManuscriptLink, Vatlib2PdfError> {
    if base_url.is_empty() || !raw_text.contains(base_url) {
        return Err(Vatlib2PdfError::LinkInvalid {
            input: raw_text.to_string(),
        });
    }

    raw_text
        .split_whitespace()
        .find(|token| token.contains(base_url))
        .map(|token| ManuscriptLink(token.to_string()))
        .ok_or_else(|| Vatlib2PdfError::LinkInvalid {
            input: raw_text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://digi.vatlib.it/";
    const LINK: &str = "https://digi.vatlib.it/view/MSS_Vat.lat.3225";

    #[test]
    fn bare_link_is_returned_whole() {
        assert_eq!(validate(LINK, BASE).unwrap().as_str(), LINK);
    }

    #[test]
    fn embedded_link_is_extracted() {
        let text = format!("check this out {LINK} thanks");
        assert_eq!(validate(&text, BASE).unwrap().as_str(), LINK);
    }

    #[test]
    fn surrounding_newlines_and_tabs_are_ignored() {
        let text = format!("\n\t{LINK}\n");
        assert_eq!(validate(&text, BASE).unwrap().as_str(), LINK);
    }

    #[test]
    fn first_of_several_links_wins() {
        let second = "https://digi.vatlib.it/view/MSS_Barb.lat.4426";
        let text = format!("{LINK} and {second}");
        assert_eq!(validate(&text, BASE).unwrap().as_str(), LINK);
    }

    #[test]
    fn text_without_base_url_is_rejected() {
        for text in ["", "hello", "https://example.org/view/x", "digi.vatlib.it/view/x"] {
            let err = validate(text, BASE).unwrap_err();
            assert!(err.is_user_correctable(), "{text:?}");
        }
    }

    #[test]
    fn any_standalone_token_is_returned_exactly() {
        let tokens = [
            "https://digi.vatlib.it/",
            "https://digi.vatlib.it/view/MSS_Urb.lat.365",
            "<https://digi.vatlib.it/view/x>",
        ];
        let fillers = [("", ""), ("a ", ""), ("", " b"), ("a b  ", "  c d")];
        for token in tokens {
            for (before, after) in fillers {
                let text = format!("{before}{token}{after}");
                assert_eq!(validate(&text, BASE).unwrap().as_str(), token, "{text:?}");
            }
        }
    }

    #[test]
    fn manuscript_id_is_last_segment() {
        let link = validate(LINK, BASE).unwrap();
        assert_eq!(link.manuscript_id(BASE), Some("MSS_Vat.lat.3225"));
    }

    #[test]
    fn manuscript_id_ignores_trailing_slash_and_query() {
        let link = validate("https://digi.vatlib.it/view/MSS_Vat.lat.3225/?ling=en#p3", BASE).unwrap();
        assert_eq!(link.manuscript_id(BASE), Some("MSS_Vat.lat.3225"));
    }

    #[test]
    fn root_link_has_no_id() {
        let link = validate("https://digi.vatlib.it/", BASE).unwrap();
        assert_eq!(link.manuscript_id(BASE), None);
    }
}
