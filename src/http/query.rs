//! URL query string parser with flexible collection support.

use crate::http::text::url_decode_bytes;
use memchr::memchr;
use std::collections::HashMap;

/// URL query string parser.
///
/// Splits a query string into `key=value` pairs and hands each pair to a
/// [`QueryCollector`]. The `HashMap<String, String>` collector percent-decodes
/// keys and values (`+` becomes a space) and keeps the last occurrence of a
/// repeated key.
///
/// There is no pair limit: the query is part of the request head, which the
/// server already caps with
/// [`ReqLimits::max_request_size`](crate::limits::ReqLimits::max_request_size).
///
/// # Examples
/// ```rust
/// use snack_box::query::Query;
/// use std::collections::HashMap;
///
/// let params: HashMap<String, String> = Query::parse(b"q=a%20b&q=c+d&page=2");
/// assert_eq!(params.len(), 2);
/// assert_eq!(params["q"], "c d");
/// assert_eq!(params["page"], "2");
/// ```
/// All possible formats:
/// ```rust
/// use snack_box::query::Query;
/// use std::collections::HashMap;
///
/// let params: HashMap<String, String> = Query::parse(b"?debug&name=&=Qwe&key=sda&&");
///
/// assert_eq!(params.len(), 4);
/// assert_eq!(params["debug"], "");
/// assert_eq!(params["name"], "");
/// assert_eq!(params[""], ""); // `=Qwe` overwritten by the empty trailing pair
/// assert_eq!(params["key"], "sda");
/// ```
pub struct Query;

impl Query {
    /// Parses a URL query string into a new collection.
    ///
    /// A leading `?` is skipped, so `?a=1` and `a=1` are equivalent. Empty
    /// input yields an empty collection.
    #[inline(always)]
    pub fn parse<'a, C: QueryCollector<'a>>(query: &'a [u8]) -> C {
        let mut result = C::with_capacity(8);
        Self::parse_into(&mut result, query);
        result
    }

    /// Parses a URL query string into an existing collection.
    ///
    /// # Examples
    /// ```
    /// use snack_box::query::Query;
    /// use std::collections::HashMap;
    ///
    /// // Reuse collection for multiple parses
    /// let mut collector: HashMap<String, String> = HashMap::new();
    ///
    /// Query::parse_into(&mut collector, b"a=1&b=2");
    /// Query::parse_into(&mut collector, b"b=3&c=4");
    ///
    /// assert_eq!(collector.len(), 3);
    /// assert_eq!(collector["b"], "3"); // later parses overwrite
    /// ```
    #[inline]
    pub fn parse_into<'a, C: QueryCollector<'a>>(result: &mut C, query: &'a [u8]) {
        let data = match query.first() {
            Some(b'?') => &query[1..],
            _ => query,
        };

        let mut start = 0;
        while start < data.len() {
            // Find next '&' or end of string
            let end = memchr(b'&', &data[start..])
                .map(|pos| start + pos)
                .unwrap_or(data.len());

            // Find '=' within current parameter segment
            let index = memchr(b'=', &data[start..end]).unwrap_or(end - start);
            let split_index = start + index;

            let key = &data[start..split_index];
            let value = match split_index < end {
                true => &data[split_index + 1..end],
                false => b"",
            };

            result.add_param(key, value);
            start = end + 1;
        }
    }
}

/// A trait for types that can collect parsed query parameters.
///
/// # Lifetime
/// - `'a`: The lifetime of the input query string bytes
///
/// # Examples
/// ```rust
/// use snack_box::query::{Query, QueryCollector};
///
/// // Keeps raw pairs in order, without decoding
/// struct Raw<'a>(Vec<(&'a [u8], &'a [u8])>);
///
/// impl<'a> QueryCollector<'a> for Raw<'a> {
///     fn add_param(&mut self, key: &'a [u8], value: &'a [u8]) {
///         self.0.push((key, value));
///     }
///
///     fn with_capacity(capacity: usize) -> Self {
///         Raw(Vec::with_capacity(capacity))
///     }
/// }
///
/// let raw: Raw = Query::parse(b"a=1&a=%20");
/// assert_eq!(raw.0, [(&b"a"[..], &b"1"[..]), (&b"a"[..], &b"%20"[..])]);
/// ```
pub trait QueryCollector<'a>
where
    Self: Sized,
{
    /// Adds a parsed parameter to the collection.
    fn add_param(&mut self, key: &'a [u8], value: &'a [u8]);

    /// Creates a new collection with the specified capacity.
    fn with_capacity(capacity: usize) -> Self;
}

// Decodes keys and values, last wins
impl<'a> QueryCollector<'a> for HashMap<String, String> {
    #[inline]
    fn add_param(&mut self, key: &'a [u8], value: &'a [u8]) {
        self.insert(url_decode_bytes(key, true), url_decode_bytes(value, true));
    }

    #[inline(always)]
    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity(capacity)
    }
}
