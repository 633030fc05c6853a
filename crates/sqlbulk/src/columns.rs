//! Ordered column sets.

use crate::record::Record;

/// An ordered, de-duplicated list of column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    names: Vec<String>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An explicit allow-list. Duplicates keep their first position.
    pub fn explicit<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        columns.into_iter().collect()
    }

    /// Union of the columns of `records`, in first-seen order.
    pub fn infer<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut set = Self::new();
        for record in records {
            for name in record.names() {
                set.push(name);
            }
        }
        set
    }

    /// Append a column unless already present. Returns whether it was added.
    pub fn push(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>) -> Self {
        self.push(name);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl<S: Into<String>> FromIterator<S> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for name in iter {
            set.push(name);
        }
        set
    }
}
