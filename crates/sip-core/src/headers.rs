// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::slice::Iter;

use smol_str::SmolStr;

/// Represents a single SIP header field as a name/value pair.
#[derive(Debug, Clone)]
pub struct Header {
    pub name: SmolStr,
    pub value: SmolStr,
}

impl Header {
    /// Returns `true` when this field carries the given name, ignoring ASCII case.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.value == other.value
    }
}

impl Eq for Header {}

/// Ordered multi-map of SIP header fields.
///
/// Every same-named field instance is kept as its own entry, in the order it
/// was received; Via and Route ordering encode routing history and must never
/// be shuffled. Name lookups ignore ASCII case.
///
/// The `with_*`/`without` operations leave `self` untouched and return a new
/// collection, so a header set handed to a collaborator can never change under
/// it. `push` exists for building a collection from scratch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<Header>);

impl Headers {
    /// Creates an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a header collection from the given vector without additional cloning.
    pub fn from_vec(headers: Vec<Header>) -> Self {
        Self(headers)
    }

    /// Appends a header to the collection.
    pub fn push(&mut self, name: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Returns an iterator over the stored headers.
    pub fn iter(&self) -> Iter<'_, Header> {
        self.0.iter()
    }

    /// Returns the number of field instances present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the collection does not contain any headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if at least one field with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|h| h.is(name))
    }

    /// Finds the first header whose name matches ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&SmolStr> {
        self.0.iter().find(|h| h.is(name)).map(|h| &h.value)
    }

    /// Returns all headers with the given name, preserving original order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SmolStr> + 'a {
        self.0.iter().filter(move |h| h.is(name)).map(|h| &h.value)
    }

    /// Collects the values of a field into a vector, preserving order.
    pub fn values(&self, name: &str) -> Vec<SmolStr> {
        self.get_all(name).cloned().collect()
    }

    /// Returns a copy where the field `name` holds exactly `values`.
    ///
    /// The new values take the position of the first existing instance of the
    /// field; if the field was absent they are appended. Every other field keeps
    /// its place. An empty `values` removes the field.
    pub fn with_values<I, V>(&self, name: &str, values: I) -> Headers
    where
        I: IntoIterator<Item = V>,
        V: Into<SmolStr>,
    {
        let mut replacement: Vec<Header> = values
            .into_iter()
            .map(|value| Header {
                name: SmolStr::new(name),
                value: value.into(),
            })
            .collect();

        let mut out = Vec::with_capacity(self.0.len() + replacement.len());
        let mut placed = false;
        for header in &self.0 {
            if header.is(name) {
                if !placed {
                    out.append(&mut replacement);
                    placed = true;
                }
                continue;
            }
            out.push(header.clone());
        }
        if !placed {
            out.append(&mut replacement);
        }
        Headers(out)
    }

    /// Returns a copy with the first value of `name` replaced, keeping the rest.
    pub fn with_first_value(&self, name: &str, value: impl Into<SmolStr>) -> Headers {
        let mut values = self.values(name);
        let value = value.into();
        match values.first_mut() {
            Some(first) => *first = value,
            None => values.push(value),
        }
        self.with_values(name, values)
    }

    /// Returns a copy with one more instance of `name` after all existing ones.
    pub fn with_appended(&self, name: &str, value: impl Into<SmolStr>) -> Headers {
        let mut values = self.values(name);
        values.push(value.into());
        self.with_values(name, values)
    }

    /// Returns a copy without any instance of `name`.
    pub fn without(&self, name: &str) -> Headers {
        Headers(self.0.iter().filter(|h| !h.is(name)).cloned().collect())
    }

    /// Returns a copy with every entry of `other` appended.
    pub fn merged(&self, other: &Headers) -> Headers {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        Headers(out)
    }

    /// Consumes the collection returning the underlying vector.
    pub fn into_inner(self) -> Vec<Header> {
        self.0
    }
}

impl IntoIterator for Headers {
    type Item = Header;
    type IntoIter = std::vec::IntoIter<Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(SmolStr, SmolStr)> for Headers {
    fn from_iter<T: IntoIterator<Item = (SmolStr, SmolStr)>>(iter: T) -> Self {
        Headers(
            iter.into_iter()
                .map(|(name, value)| Header { name, value })
                .collect(),
        )
    }
}
