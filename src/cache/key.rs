//! Cache Key Module
//!
//! Deterministic cache-key construction from a namespace and a flat
//! parameter map.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

/// Maximum namespace length in bytes. Keeps hashed keys under `MAX_KEY_LENGTH`.
pub const MAX_NAMESPACE_LENGTH: usize = 64;

// == Cache Key ==
/// An opaque, fully built cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps an already-built key string.
    ///
    /// Rejects empty keys and keys longer than `MAX_KEY_LENGTH`.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// == Param Values ==
/// A scalar parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Primitive {
    fn write_canonical(&self, out: &mut String) -> Result<()> {
        match self {
            Primitive::Str(s) => escape_into(s, out),
            Primitive::Int(i) => out.push_str(&i.to_string()),
            Primitive::Float(f) => {
                if !f.is_finite() {
                    return Err(CacheError::InvalidRequest(format!(
                        "Unsupported param value: {} is not a finite number",
                        f
                    )));
                }
                out.push_str(&f.to_string());
            }
            Primitive::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        }
        Ok(())
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::Str(v.to_string())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Primitive::Str(v)
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Primitive::Int(v)
    }
}

impl From<i32> for Primitive {
    fn from(v: i32) -> Self {
        Primitive::Int(v.into())
    }
}

impl From<u32> for Primitive {
    fn from(v: u32) -> Self {
        Primitive::Int(v.into())
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Primitive::Float(v)
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Primitive::Bool(v)
    }
}

/// A parameter value: one primitive or a list of them. Nesting is not
/// representable.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Single(Primitive),
    List(Vec<Primitive>),
}

macro_rules! single_param_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    ParamValue::Single(v.into())
                }
            }
        )*
    };
}

single_param_from!(&str, String, i64, i32, u32, f64, bool);

impl From<Primitive> for ParamValue {
    fn from(v: Primitive) -> Self {
        ParamValue::Single(v)
    }
}

impl<T: Into<Primitive>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        ParamValue::List(v.into_iter().map(Into::into).collect())
    }
}

// == Params ==
/// Flat parameter map. Names are kept sorted, so insertion order never
/// reaches the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builds params from query-string pairs; every value is a string.
    pub fn from_query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| {
                let name: String = k.into();
                (name, ParamValue::Single(Primitive::Str(v.into())))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// == Build Key ==
/// Builds the canonical cache key for `namespace` and `params`.
///
/// Format: `namespace:a=1&b=x,y`. Names and string values have `%`, `&`,
/// `=` and `,` percent-escaped. When the result would exceed
/// `MAX_KEY_LENGTH`, the parameter part is replaced by its SHA-256 digest:
/// `namespace:sha256:<hex>`.
pub fn build_key(namespace: &str, params: &Params) -> Result<CacheKey> {
    validate_namespace(namespace)?;

    let mut serialized = String::new();
    for (i, (name, value)) in params.iter().enumerate() {
        if name.is_empty() {
            return Err(CacheError::InvalidRequest(
                "Param name cannot be empty".to_string(),
            ));
        }
        if i > 0 {
            serialized.push('&');
        }
        escape_into(name, &mut serialized);
        serialized.push('=');
        match value {
            ParamValue::Single(p) => p.write_canonical(&mut serialized)?,
            ParamValue::List(items) => {
                for (j, item) in items.iter().enumerate() {
                    if j > 0 {
                        serialized.push(',');
                    }
                    item.write_canonical(&mut serialized)?;
                }
            }
        }
    }

    let key = format!("{}:{}", namespace, serialized);
    if key.len() <= MAX_KEY_LENGTH {
        return Ok(CacheKey(key));
    }

    let digest = Sha256::digest(serialized.as_bytes());
    Ok(CacheKey(format!("{}:sha256:{}", namespace, hex::encode(digest))))
}

fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::InvalidRequest(
            "Namespace cannot be empty".to_string(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Namespace exceeds maximum length of {} bytes",
            MAX_NAMESPACE_LENGTH
        )));
    }
    if let Some(c) = namespace
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(CacheError::InvalidRequest(format!(
            "Namespace contains invalid character '{}'",
            c
        )));
    }
    Ok(())
}

fn escape_into(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            ',' => out.push_str("%2C"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_param_order_does_not_matter() {
        let a = Params::new().with("genre", "Action").with("page", 2);
        let b = Params::new().with("page", 2).with("genre", "Action");

        let key_a = build_key("anime-search", &a).unwrap();
        let key_b = build_key("anime-search", &b).unwrap();

        assert_eq!(key_a, key_b);
        assert_eq!(key_a.as_str(), "anime-search:genre=Action&page=2");
    }

    #[test]
    fn test_lists_and_scalars() {
        let params = Params::new()
            .with("ids", vec![3, 1, 2])
            .with("nsfw", false)
            .with("score", 7.5);

        let key = build_key("recs", &params).unwrap();
        assert_eq!(key.as_str(), "recs:ids=3,1,2&nsfw=false&score=7.5");
    }

    #[test]
    fn test_empty_params() {
        let key = build_key("trending", &Params::new()).unwrap();
        assert_eq!(key.as_str(), "trending:");
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        let injected = Params::new().with("q", "a&b=c");
        let split = Params::new().with("q", "a").with("b", "c");

        let k1 = build_key("search", &injected).unwrap();
        let k2 = build_key("search", &split).unwrap();

        assert_ne!(k1, k2);
        assert_eq!(k1.as_str(), "search:q=a%26b%3Dc");
    }

    #[test]
    fn test_list_items_with_commas_stay_distinct() {
        let one = Params::new().with("tags", vec!["a,b"]);
        let two = Params::new().with("tags", vec!["a", "b"]);
        assert_ne!(
            build_key("tags", &one).unwrap(),
            build_key("tags", &two).unwrap()
        );
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let result = build_key("", &Params::new());
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_namespace_with_separator_rejected() {
        let result = build_key("anime:search", &Params::new());
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let params = Params::new().with("score", f64::NAN);
        let result = build_key("recs", &params);
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_empty_param_name_rejected() {
        let params = Params::new().with("", 1);
        assert!(build_key("recs", &params).is_err());
    }

    #[test]
    fn test_long_keys_are_hashed() {
        let params = Params::new().with("q", "x".repeat(MAX_KEY_LENGTH));
        let key = build_key("anime-search", &params).unwrap();

        assert!(key.as_str().starts_with("anime-search:sha256:"));
        assert!(key.as_str().len() <= MAX_KEY_LENGTH);
        assert_eq!(key, build_key("anime-search", &params).unwrap());
    }

    #[test]
    fn test_from_query() {
        let params = Params::from_query(vec![("page", "2"), ("genre", "Drama")]);
        let key = build_key("anime-search", &params).unwrap();
        assert_eq!(key.as_str(), "anime-search:genre=Drama&page=2");
    }

    #[test]
    fn test_raw_key_validation() {
        assert!(CacheKey::new("k1").is_ok());
        assert!(CacheKey::new("").is_err());
        assert!(CacheKey::new("x".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    fn param_map_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 1..8)
            .prop_map(|m| m.into_iter().collect())
    }

    fn to_params(pairs: &[(String, i64)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.clone(), ParamValue::from(*v)))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_key_is_permutation_invariant(pairs in param_map_strategy(), rotate in 0usize..8) {
            let mut shuffled = pairs.clone();
            shuffled.reverse();
            let len = shuffled.len();
            shuffled.rotate_left(rotate % len);

            let k1 = build_key("anime-search", &to_params(&pairs)).unwrap();
            let k2 = build_key("anime-search", &to_params(&shuffled)).unwrap();
            prop_assert_eq!(k1, k2);
        }

        #[test]
        fn prop_key_differs_when_a_value_differs(
            pairs in param_map_strategy(),
            index in 0usize..8,
            delta in 1i64..1000,
        ) {
            let mut changed = pairs.clone();
            let i = index % changed.len();
            changed[i].1 = changed[i].1.wrapping_add(delta);

            let k1 = build_key("anime-search", &to_params(&pairs)).unwrap();
            let k2 = build_key("anime-search", &to_params(&changed)).unwrap();
            prop_assert_ne!(k1, k2);
        }

        #[test]
        fn prop_string_values_never_collide(a in "[a-z&=,%]{0,12}", b in "[a-z&=,%]{0,12}") {
            prop_assume!(a != b);
            let k1 = build_key("ns", &Params::new().with("q", a.as_str())).unwrap();
            let k2 = build_key("ns", &Params::new().with("q", b.as_str())).unwrap();
            prop_assert_ne!(k1, k2);
        }
    }
}
