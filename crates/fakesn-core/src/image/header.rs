use std::fmt;

use crate::error::{FakeSnError, Result};

/// A scalar header value.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    /// Numeric view of the value. Text is parsed leniently, accepting the
    /// Fortran `D` exponent.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Integer(v) => Some(*v as f64),
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Text(s) => s.trim().replace(['D', 'd'], "E").parse().ok(),
            HeaderValue::Logical(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(v) => Some(*v),
            HeaderValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            HeaderValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Logical(v) => Some(*v),
            HeaderValue::Text(s) => match s.trim() {
                "T" | "True" | "true" => Some(true),
                "F" | "False" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Logical(true) => write!(f, "T"),
            HeaderValue::Logical(false) => write!(f, "F"),
            HeaderValue::Integer(v) => write!(f, "{v}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Logical(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Integer(v)
    }
}

impl From<i32> for HeaderValue {
    fn from(v: i32) -> Self {
        HeaderValue::Integer(v as i64)
    }
}

impl From<usize> for HeaderValue {
    fn from(v: usize) -> Self {
        HeaderValue::Integer(v as i64)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Text(v)
    }
}

/// One keyword record.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub key: String,
    pub value: HeaderValue,
    pub comment: Option<String>,
}

/// A record without a value: `HISTORY`, `COMMENT` or a blank keyword.
#[derive(Clone, Debug, PartialEq)]
pub struct Commentary {
    pub key: String,
    pub text: String,
}

/// Ordered keyword → value map. Keywords are stored upper-case; insertion
/// order is preserved so written files keep the layout they were read with.
///
/// Commentary records are kept apart from the valued cards, in the order
/// they were added, and are not counted by [`Header::len`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
    commentary: Vec<Commentary>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().map(|c| c.key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.position(key).map(|i| &self.cards[i].value)
    }

    /// Insert or replace a keyword. A replaced card keeps its position.
    pub fn set(&mut self, key: &str, value: impl Into<HeaderValue>) {
        self.set_with_comment(key, value, None);
    }

    pub fn set_with_comment(
        &mut self,
        key: &str,
        value: impl Into<HeaderValue>,
        comment: Option<&str>,
    ) {
        let value = value.into();
        let comment = comment.map(str::to_string);
        match self.position(key) {
            Some(i) => {
                self.cards[i].value = value;
                if comment.is_some() {
                    self.cards[i].comment = comment;
                }
            }
            None => self.cards.push(Card {
                key: key.trim().to_ascii_uppercase(),
                value,
                comment,
            }),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.position(key).map(|i| self.cards.remove(i).value)
    }

    /// Keep only the cards for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Card) -> bool,
    {
        self.cards.retain(|c| keep(c));
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(HeaderValue::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.get_f64(key)
            .ok_or_else(|| FakeSnError::MissingHeaderKey(key.to_string()))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key)
            .ok_or_else(|| FakeSnError::MissingHeaderKey(key.to_string()))
    }

    pub fn commentary(&self) -> impl Iterator<Item = &Commentary> {
        self.commentary.iter()
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.commentary_for("HISTORY")
    }

    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.commentary_for("COMMENT")
    }

    pub fn add_history(&mut self, text: impl Into<String>) {
        self.add_commentary("HISTORY", text);
    }

    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.add_commentary("COMMENT", text);
    }

    /// Append a commentary record. `key` is `HISTORY`, `COMMENT` or blank.
    pub fn add_commentary(&mut self, key: &str, text: impl Into<String>) {
        self.commentary.push(Commentary {
            key: key.trim().to_ascii_uppercase(),
            text: text.into(),
        });
    }

    fn commentary_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.commentary
            .iter()
            .filter(move |c| c.key == key)
            .map(|c| c.text.as_str())
    }

    fn position(&self, key: &str) -> Option<usize> {
        let key = key.trim();
        self.cards
            .iter()
            .position(|c| c.key.eq_ignore_ascii_case(key))
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = &'a Card;
    type IntoIter = std::slice::Iter<'a, Card>;

    fn into_iter(self) -> Self::IntoIter {
        self.cards.iter()
    }
}
