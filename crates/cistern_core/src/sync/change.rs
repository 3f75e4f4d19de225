//! Change notifications raised by [`ObservableCollection`](super::ObservableCollection).

/// A single structural change to an observable collection.
///
/// Indices are positions at the moment the change was applied, under the
/// exclusive lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<T> {
    /// `items` were inserted starting at `index`.
    Added {
        /// Position of the first inserted item.
        index: usize,
        /// Inserted items, in order.
        items: Vec<T>,
    },
    /// `items` were removed starting at `index`.
    Removed {
        /// Position the first removed item occupied.
        index: usize,
        /// Removed items, in order.
        items: Vec<T>,
    },
    /// The item at `index` was overwritten.
    Replaced {
        /// Position of the replaced item.
        index: usize,
        /// Previous value.
        old: T,
        /// New value.
        new: T,
    },
    /// An item moved from `old_index` to `new_index`.
    Moved {
        /// Where the item was.
        old_index: usize,
        /// Where the item is now.
        new_index: usize,
        /// The moved item.
        item: T,
    },
    /// The collection changed wholesale (cleared).
    Reset,
}

impl<T> CollectionChange<T> {
    /// Short name of the change kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Removed { .. } => "removed",
            Self::Replaced { .. } => "replaced",
            Self::Moved { .. } => "moved",
            Self::Reset => "reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        let added = CollectionChange::Added { index: 0, items: vec![1] };
        assert_eq!(added.kind(), "added");
        assert_eq!(CollectionChange::<u8>::Reset.kind(), "reset");
    }
}
