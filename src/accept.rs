use crate::config::{Registration, Registry};
use crate::prefer::Candidate;
use http::HeaderMap;
use http::header::ACCEPT_ENCODING;
use std::collections::HashMap;
use std::collections::hash_map;

/// Quality assigned to a coding that carries no `q` parameter.
const DEFAULT_QUALITY: f32 = 1.0;

/// Content codings accepted by a client, keyed by lowercased token.
///
/// A quality of `0.0` means the client explicitly rejected the coding; a
/// coding that is absent was simply not mentioned. The wildcard `*` is stored
/// like any other token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodingQualities {
    codings: HashMap<String, f32>,
}

impl CodingQualities {
    /// Returns the quality for `coding`, if the client mentioned it.
    pub fn get(&self, coding: &str) -> Option<f32> {
        self.codings.get(coding).copied()
    }

    /// Number of distinct codings.
    pub fn len(&self) -> usize {
        self.codings.len()
    }

    /// Returns `true` if no coding was mentioned.
    pub fn is_empty(&self) -> bool {
        self.codings.is_empty()
    }

    /// Iterates over `(coding, quality)` pairs in no particular order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, f32> {
        self.codings.iter()
    }

    fn insert(&mut self, coding: String, quality: f32) {
        self.codings.insert(coding, quality);
    }
}

impl<'a> FromIterator<(&'a str, f32)> for CodingQualities {
    fn from_iter<I: IntoIterator<Item = (&'a str, f32)>>(iter: I) -> Self {
        Self {
            codings: iter.into_iter().map(|(c, q)| (c.to_owned(), q)).collect(),
        }
    }
}

/// Parses an `Accept-Encoding` value such as `"gzip, br;q=1.0, zstd;q=0.8"`.
///
/// Parsing never fails: empty items are skipped and malformed quality values
/// count as `0.0`, which leaves the remaining items usable.
pub fn parse_accept_encoding(header: &str) -> CodingQualities {
    let mut codings = CodingQualities::default();
    parse_into(&mut codings, header);
    codings
}

/// Parses every `Accept-Encoding` line of a request into one map.
///
/// Values that are not valid UTF-8 are ignored.
pub fn accept_encoding_from_headers(headers: &HeaderMap) -> CodingQualities {
    let mut codings = CodingQualities::default();
    for value in headers.get_all(ACCEPT_ENCODING) {
        if let Ok(value) = value.to_str() {
            parse_into(&mut codings, value);
        }
    }
    codings
}

fn parse_into(codings: &mut CodingQualities, header: &str) {
    for item in header.split(',') {
        if let Some((coding, quality)) = parse_coding(item) {
            codings.insert(coding, quality);
        }
    }
}

/// Parses one item like `"gzip"` or `"br;q=0.8"` into (coding, quality).
fn parse_coding(item: &str) -> Option<(String, f32)> {
    let mut parts = item.splitn(2, ';');
    let coding = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    if coding.is_empty() {
        return None;
    }

    let quality = match parts.next() {
        Some(params) => parse_quality(params),
        None => DEFAULT_QUALITY,
    };

    Some((coding, quality))
}

fn parse_quality(params: &str) -> f32 {
    let params: String = params.chars().filter(|c| !c.is_whitespace()).collect();
    let Some(value) = params
        .strip_prefix("q=")
        .or_else(|| params.strip_prefix("Q="))
    else {
        return DEFAULT_QUALITY;
    };

    // ";q=0.5;foo=bar" keeps only the quality
    let value = value.split(';').next().unwrap_or("");
    match value.parse::<f32>() {
        Ok(q) if q.is_nan() => 0.0,
        Ok(q) => q.clamp(0.0, 1.0),
        Err(_) => 0.0,
    }
}

/// Intersects the client codings (quality above zero) with the registry.
///
/// Walks whichever side is smaller. The order of the result carries no
/// meaning; [`preferred`](crate::prefer::preferred) imposes one.
pub fn common_encodings(accept: &CodingQualities, registry: &Registry) -> Vec<Candidate> {
    let candidate = |(coding, quality): (&str, f32), registration: &Registration| {
        (quality > 0.0).then(|| Candidate::new(coding, quality, registration))
    };

    if accept.len() <= registry.len() {
        accept
            .iter()
            .filter_map(|(coding, &quality)| {
                let registration = registry.get(coding)?;
                candidate((coding.as_str(), quality), registration)
            })
            .collect()
    } else {
        registry
            .iter()
            .filter_map(|(coding, registration)| {
                let quality = accept.get(coding)?;
                candidate((coding, quality), registration)
            })
            .collect()
    }
}
