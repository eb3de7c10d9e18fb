//! Platform and segment derivation from advisory source labels.
//!
//! Trivy names its advisory buckets `"<ecosystem> <version>"`, e.g.
//! `"alpine 3.15"`, `"amazon linux 2"` or `"alpine edge"`. Rows written to the
//! advisory table split such a label into a platform and a segment.

const EDGE_SEGMENT: &str = "edge";

/// Split a source label into `(platform, segment)`.
///
/// The last space-separated token becomes the segment when it contains an
/// ASCII digit or is exactly `edge`; the remaining tokens, re-joined with
/// single spaces, become the platform. Otherwise the whole label is the
/// platform and the segment is empty.
///
/// Platform names that themselves end in a numbered word are split too
/// (`"python 3"` gives `("python", "3")`); existing rows depend on this.
pub fn parse_platform_and_segment(label: &str) -> (String, String) {
    let tokens: Vec<&str> = label.split(' ').collect();
    if let [head @ .., last] = tokens.as_slice()
        && !head.is_empty()
        && is_segment(last)
    {
        return (head.join(" "), (*last).to_string());
    }
    (label.to_string(), String::new())
}

fn is_segment(token: &str) -> bool {
    token == EDGE_SEGMENT || token.bytes().any(|b| b.is_ascii_digit())
}
