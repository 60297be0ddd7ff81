//! Compound cache keys and their canonical encoding
//!
//! A cache key is an ordered sequence of elements. Each element contributes
//! a stable string form; backslashes are escaped as `\\` and commas as `\,`
//! before the parts are joined with `,`. The escaping makes the encoding
//! injective: two distinct sequences can never encode to the same string,
//! and element order matters.

use std::fmt;

/// Trait for values usable as one element of a [`CompoundKey`].
///
/// Implementations must be stable: the same logical element must always
/// produce the same part. Domain types should return a durable name or
/// identifier rather than a debug rendering.
pub trait KeyElement {
    /// The element's stable string form.
    fn key_part(&self) -> String;
}

impl KeyElement for str {
    fn key_part(&self) -> String {
        self.to_owned()
    }
}

impl KeyElement for String {
    fn key_part(&self) -> String {
        self.clone()
    }
}

impl<T: KeyElement + ?Sized> KeyElement for &T {
    fn key_part(&self) -> String {
        (**self).key_part()
    }
}

macro_rules! impl_key_element_via_to_string {
    ($($ty:ty),*) => {
        $(impl KeyElement for $ty {
            fn key_part(&self) -> String {
                self.to_string()
            }
        })*
    };
}

impl_key_element_via_to_string!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool);

/// An ordered sequence of key elements identifying one cached value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompoundKey(Vec<String>);

impl CompoundKey {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an element, builder style.
    pub fn part(mut self, element: impl KeyElement) -> Self {
        self.0.push(element.key_part());
        self
    }

    /// Append an element in place.
    pub fn push(&mut self, element: impl KeyElement) {
        self.0.push(element.key_part());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical string form: elements escaped and joined with `,`.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            for ch in part.chars() {
                match ch {
                    '\\' => out.push_str("\\\\"),
                    ',' => out.push_str("\\,"),
                    ch => out.push(ch),
                }
            }
        }
        out
    }
}

impl fmt::Display for CompoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<&str> for CompoundKey {
    fn from(part: &str) -> Self {
        Self(vec![part.to_owned()])
    }
}

impl From<String> for CompoundKey {
    fn from(part: String) -> Self {
        Self(vec![part])
    }
}

impl<T: KeyElement, const N: usize> From<[T; N]> for CompoundKey {
    fn from(parts: [T; N]) -> Self {
        Self(parts.iter().map(KeyElement::key_part).collect())
    }
}

impl<T: KeyElement> FromIterator<T> for CompoundKey {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(|e| e.key_part()).collect())
    }
}
