//! Canonical URL form and the content-derived favorite id.

use sha1::{Digest, Sha1};
use url::Url;

const TRACKING_PREFIX: &str = "utm_";

/// Map a raw URL to its canonical form.
///
/// Surrounding whitespace is trimmed, the fragment is dropped, `utm_*`
/// query parameters are removed and trailing slashes are stripped. Strings
/// that do not parse as absolute URLs are returned trimmed but otherwise
/// untouched. The function is idempotent.
///
/// All trailing slashes go, not just one, so `https://x.com/a//` and
/// `https://x.com/a` share an id, which stores stripping a single slash
/// would have kept apart.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();

    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return trimmed.to_string(),
    };

    url.set_fragment(None);
    strip_tracking_params(&mut url);

    let serialized: String = url.into();
    serialized.trim_end_matches('/').to_string()
}

/// Hex-encoded SHA-1 of an already normalized URL.
///
/// SHA-1 keeps ids stable with favorites files already in the wild.
pub fn derive_id(normalized_url: &str) -> String {
    hex::encode(Sha1::digest(normalized_url.as_bytes()))
}

fn is_tracking_param(name: &str) -> bool {
    name.get(..TRACKING_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(TRACKING_PREFIX))
}

// The query is only re-serialized when something was actually removed, so
// URLs without tracking noise keep their exact encoding.
fn strip_tracking_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(name, _)| !is_tracking_param(name))
        .collect();

    if kept.len() == pairs.len() {
        return;
    }

    if kept.is_empty() {
        url.set_query(None);
        return;
    }

    let mut serializer = url.query_pairs_mut();
    serializer.clear();
    for (name, value) in kept {
        serializer.append_pair(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod normalize_url_tests {
        use super::*;

        #[test]
        fn test_strips_fragment_and_utm_params() {
            assert_eq!(
                normalize_url("https://x.com/a?utm_source=x#frag"),
                "https://x.com/a"
            );
        }

        #[test]
        fn test_utm_match_is_case_insensitive() {
            assert_eq!(
                normalize_url("https://x.com/a?UTM_Medium=mail&Utm_campaign=z"),
                "https://x.com/a"
            );
        }

        #[test]
        fn test_keeps_other_params_in_order() {
            assert_eq!(
                normalize_url("https://x.com/a?b=2&utm_source=x&a=1"),
                "https://x.com/a?b=2&a=1"
            );
        }

        #[test]
        fn test_leaves_query_untouched_without_tracking_params() {
            assert_eq!(
                normalize_url("https://x.com/search?q=a%20b&z=1"),
                "https://x.com/search?q=a%20b&z=1"
            );
        }

        #[test]
        fn test_param_merely_containing_utm_is_kept() {
            assert_eq!(
                normalize_url("https://x.com/a?not_utm_source=1"),
                "https://x.com/a?not_utm_source=1"
            );
        }

        #[test]
        fn test_strips_trailing_slash() {
            assert_eq!(normalize_url("https://x.com/a/"), "https://x.com/a");
            assert_eq!(normalize_url("https://x.com"), "https://x.com");
            assert_eq!(normalize_url("https://x.com/"), "https://x.com");
        }

        #[test]
        fn test_trims_whitespace() {
            assert_eq!(normalize_url("  https://x.com/a \n"), "https://x.com/a");
        }

        #[test]
        fn test_lowercases_scheme_and_host() {
            assert_eq!(normalize_url("HTTPS://X.COM/Path"), "https://x.com/Path");
        }

        #[test]
        fn test_unparseable_input_is_returned_trimmed() {
            assert_eq!(normalize_url("  not a url  "), "not a url");
            assert_eq!(normalize_url("x.com/a/"), "x.com/a/");
            assert_eq!(normalize_url(""), "");
        }

        #[test]
        fn test_is_idempotent() {
            let inputs = [
                "https://x.com/a?utm_source=x#frag",
                "https://x.com/a//",
                "https://x.com/",
                "https://x.com/a?b=/",
                "https://www.reddit.com/r/marketing/comments/abc/title/",
                "https://x.com/a?q=hello+world&utm_term=t",
                "https://x.com/a?",
                "http://user:pw@x.com:8080/p/../q/?k=v#top",
                "mailto:someone@example.com",
                "file:///tmp/",
                "not a url",
                "",
            ];

            for input in inputs {
                let once = normalize_url(input);
                assert_eq!(normalize_url(&once), once, "input: {input:?}");
            }
        }
    }

    mod derive_id_tests {
        use super::*;

        #[test]
        fn test_id_is_sha1_hex() {
            assert_eq!(
                derive_id("https://x.com/a"),
                hex::encode(Sha1::digest(b"https://x.com/a"))
            );
            assert_eq!(derive_id("https://x.com/a").len(), 40);
        }

        #[test]
        fn test_known_digest() {
            assert_eq!(
                derive_id(""),
                "da39a3ee5e6b4b0d3255bfef95601890afd80709"
            );
        }

        #[test]
        fn test_equivalent_urls_share_an_id() {
            let a = derive_id(&normalize_url("https://x.com/a/?utm_source=x"));
            let b = derive_id(&normalize_url("https://x.com/a#section"));
            assert_eq!(a, b);
        }

        #[test]
        fn test_repeated_trailing_slashes_share_an_id() {
            assert_eq!(
                derive_id(&normalize_url("https://x.com/a//")),
                derive_id(&normalize_url("https://x.com/a"))
            );
        }

        #[test]
        fn test_different_urls_have_different_ids() {
            let a = derive_id(&normalize_url("https://x.com/a"));
            let b = derive_id(&normalize_url("https://x.com/b"));
            assert_ne!(a, b);
        }
    }
}
