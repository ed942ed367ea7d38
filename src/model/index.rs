//! Iteration indices.

use std::fmt;

/// Position of a value within nested iteration.
///
/// A fixed-length ordered sequence of non-negative integers; the empty
/// sequence denotes a singleton (non-iterated) value. Ordering is
/// lexicographic so indices can key ordered caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Index(Vec<u32>);

impl Index {
    /// The empty (singleton) index.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn new(positions: Vec<u32>) -> Self {
        Self(positions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iteration depth of this index.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Concatenate `self` with `tail`, in that order.
    ///
    /// Concatenation order of sub-indices is owned by the iteration
    /// strategy: a cross-product combines child indices in child order.
    pub fn concat(&self, tail: &Index) -> Index {
        let mut joined = Vec::with_capacity(self.0.len() + tail.0.len());
        joined.extend_from_slice(&self.0);
        joined.extend_from_slice(&tail.0);
        Index(joined)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl From<Vec<u32>> for Index {
    fn from(positions: Vec<u32>) -> Self {
        Self(positions)
    }
}

impl From<&[u32]> for Index {
    fn from(positions: &[u32]) -> Self {
        Self(positions.to_vec())
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Index::empty().to_string(), "[]");
        assert_eq!(Index::new(vec![0, 3, 1]).to_string(), "[0,3,1]");
    }

    #[test]
    fn test_concat_order() {
        let a = Index::new(vec![1]);
        let b = Index::new(vec![2, 0]);
        assert_eq!(a.concat(&b), Index::new(vec![1, 2, 0]));
        assert_eq!(b.concat(&a), Index::new(vec![2, 0, 1]));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut v = vec![
            Index::new(vec![1, 0]),
            Index::new(vec![0, 2]),
            Index::new(vec![0]),
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                Index::new(vec![0]),
                Index::new(vec![0, 2]),
                Index::new(vec![1, 0]),
            ]
        );
    }
}
