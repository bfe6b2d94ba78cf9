//! Text helpers shared by the codec and the server: percent-decoding,
//! query-string parsing and timestamps.

use crate::query::Query;
use std::collections::HashMap;
use time::OffsetDateTime;

#[inline(always)]
const fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

pub(crate) fn url_decode_bytes(input: &[u8], plus_as_space: bool) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        match input[i] {
            b'%' => {
                let hi = input.get(i + 1).copied().and_then(from_hex);
                let lo = input.get(i + 2).copied().and_then(from_hex);

                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }

                out.push(b'%');
            }
            b'+' if plus_as_space => out.push(b' '),
            byte => out.push(byte),
        }
        i += 1;
    }

    match String::from_utf8(out) {
        Ok(value) => value,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

/// Decodes `%HH` escapes in a path. `+` is left alone, malformed escapes
/// are kept literally and invalid UTF-8 is replaced with `U+FFFD`.
///
/// ```
/// use snack_box::text::percent_decode;
///
/// assert_eq!(percent_decode("/docs/a%20b+c"), "/docs/a b+c");
/// assert_eq!(percent_decode("/100%"), "/100%");
/// ```
#[inline]
pub fn percent_decode(input: &str) -> String {
    url_decode_bytes(input.as_bytes(), false)
}

/// Decodes a form/query component: like [`percent_decode`], plus `+` -> space.
///
/// ```
/// use snack_box::text::url_decode;
///
/// assert_eq!(url_decode("hello+world%21"), "hello world!");
/// ```
#[inline]
pub fn url_decode(input: &str) -> String {
    url_decode_bytes(input.as_bytes(), true)
}

/// Parses a query string into a decoded map, keeping the last value of a
/// repeated key. An empty query yields an empty map.
///
/// ```
/// use snack_box::text::parse_query;
///
/// let query = parse_query("a=1&a=2&b");
/// assert_eq!(query["a"], "2");
/// assert_eq!(query["b"], "");
/// ```
#[inline]
pub fn parse_query(query: &str) -> HashMap<String, String> {
    Query::parse(query.as_bytes())
}

/// Formats a UTC timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_rfc3339(moment: OffsetDateTime) -> String {
    let moment = moment.to_offset(time::UtcOffset::UTC);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        moment.year(),
        u8::from(moment.month()),
        moment.day(),
        moment.hour(),
        moment.minute(),
        moment.second(),
    )
}

/// Current time, formatted for the `Date` header.
#[inline]
pub fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}
