//! Link identity. Result links arrive percent-encoded from some sources and
//! decoded from others; two links name the same result iff their decoded
//! forms match.

/// Upper bound on decode passes, for links that were encoded more than once.
const MAX_DECODE_PASSES: usize = 3;

/// Fully percent-decode a link. Invalid escapes leave the link as it was at
/// the last successful pass.
pub fn canonical_link(link: &str) -> String {
    let mut current = link.trim().to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let decoded = match urlencoding::decode(&current) {
            Ok(d) => d.into_owned(),
            Err(_) => break,
        };
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

/// True when both links decode to the same URL.
pub fn same_link(a: &str, b: &str) -> bool {
    a == b || canonical_link(a) == canonical_link(b)
}
