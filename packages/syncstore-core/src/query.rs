//! Filtered, ordered, paginated listing of a collection.

use std::collections::BTreeSet;

use crate::bso::Bso;
use crate::clock::Timestamp;
use crate::error::StorageError;
use crate::store::Store;

/// Filters for [`Store::list`]. Every filter is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only these ids; unknown ids are dropped and duplicates collapse
    pub ids: Option<Vec<String>>,
    /// Only objects modified strictly after this time
    pub newer: Option<Timestamp>,
    /// Only objects modified strictly before this time
    pub older: Option<Timestamp>,
    /// Return full objects instead of ids
    pub full: bool,
    /// Page size; zero means no limit
    pub limit: Option<usize>,
    /// Position of the first returned item
    pub offset: usize,
}

impl ListQuery {
    /// Creates a query matching every live object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the result to the given ids.
    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Keeps objects modified strictly after `newer`.
    pub fn with_newer(mut self, newer: Timestamp) -> Self {
        self.newer = Some(newer);
        self
    }

    /// Keeps objects modified strictly before `older`.
    pub fn with_older(mut self, older: Timestamp) -> Self {
        self.older = Some(older);
        self
    }

    /// Returns full objects instead of ids.
    pub fn with_full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Caps the page at `limit` items; zero means no cap.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching items.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn matches(&self, bso: &Bso) -> bool {
        self.newer.map_or(true, |newer| bso.modified > newer)
            && self.older.map_or(true, |older| bso.modified < older)
    }

    fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|limit| *limit > 0)
    }
}

/// Items of one page, either ids or full objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItems {
    Ids(Vec<String>),
    Full(Vec<Bso>),
}

impl ListItems {
    pub fn len(&self) -> usize {
        match self {
            ListItems::Ids(ids) => ids.len(),
            ListItems::Full(bsos) => bsos.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    pub items: ListItems,
    /// Offset of the next page, present only when more results remain
    pub next_offset: Option<usize>,
    /// Collection last-modified, absent when the collection does not exist
    pub last_modified: Option<Timestamp>,
}

impl ListPage {
    fn empty(full: bool) -> Self {
        Self {
            items: if full {
                ListItems::Full(Vec::new())
            } else {
                ListItems::Ids(Vec::new())
            },
            next_offset: None,
            last_modified: None,
        }
    }
}

/// Cuts one page out of an ordered result set.
///
/// Returns the page and the offset of the following page, if any result
/// remains after it.
pub fn paginate<T>(results: Vec<T>, offset: usize, limit: Option<usize>) -> (Vec<T>, Option<usize>) {
    let total = results.len();
    if offset >= total {
        return (Vec::new(), None);
    }
    let end = match limit {
        Some(limit) => offset.saturating_add(limit).min(total),
        None => total,
    };
    let next_offset = (end < total).then_some(end);
    let page = results.into_iter().skip(offset).take(end - offset).collect();
    (page, next_offset)
}

impl Store {
    /// Lists live objects in ascending `(modified, id)` order.
    ///
    /// Unknown or emptied collections yield an empty page.
    pub fn list(&self, owner: &str, collection: &str, query: &ListQuery) -> Result<ListPage, StorageError> {
        let Some(shard) = self.shard(owner)? else {
            return Ok(ListPage::empty(query.full));
        };
        let state = shard.read()?;
        let now = self.now();
        let Some(coll) = state.collection(collection) else {
            return Ok(ListPage::empty(query.full));
        };

        let mut matched: Vec<&Bso> = match &query.ids {
            Some(ids) => ids
                .iter()
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .filter_map(|id| coll.live_bso(id, now))
                .filter(|bso| query.matches(bso))
                .collect(),
            None => coll.live(now).filter(|bso| query.matches(bso)).collect(),
        };
        matched.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.id.cmp(&b.id)));

        let (page, next_offset) = paginate(matched, query.offset, query.effective_limit());
        let items = if query.full {
            ListItems::Full(page.into_iter().cloned().collect())
        } else {
            ListItems::Ids(page.into_iter().map(|bso| bso.id.clone()).collect())
        };

        Ok(ListPage {
            items,
            next_offset,
            last_modified: coll.last_modified(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_walks_to_the_end() {
        let items: Vec<u32> = (0..5).collect();
        assert_eq!(paginate(items.clone(), 0, Some(2)), (vec![0, 1], Some(2)));
        assert_eq!(paginate(items.clone(), 2, Some(2)), (vec![2, 3], Some(4)));
        assert_eq!(paginate(items.clone(), 4, Some(2)), (vec![4], None));
        assert_eq!(paginate(items.clone(), 4, None), (vec![4], None));
    }

    #[test]
    fn test_paginate_exact_fit_has_no_next_offset() {
        let items: Vec<u32> = (0..4).collect();
        assert_eq!(paginate(items.clone(), 0, Some(4)), (vec![0, 1, 2, 3], None));
        assert_eq!(paginate(items, 2, Some(2)), (vec![2, 3], None));
    }

    #[test]
    fn test_paginate_offset_past_end() {
        let items: Vec<u32> = (0..3).collect();
        assert_eq!(paginate(items.clone(), 3, Some(2)), (vec![], None));
        assert_eq!(paginate(items, 100, None), (vec![], None));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let query = ListQuery::new().with_limit(0);
        assert_eq!(query.effective_limit(), None);
        let query = ListQuery::new().with_limit(3);
        assert_eq!(query.effective_limit(), Some(3));
    }

    #[test]
    fn test_builders_set_each_filter() {
        let query = ListQuery::new()
            .with_ids(["a", "b"])
            .with_newer(Timestamp::from_centis(10))
            .with_older(Timestamp::from_centis(20))
            .with_full(true)
            .with_limit(5)
            .with_offset(2);
        assert_eq!(query.ids, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(query.newer, Some(Timestamp::from_centis(10)));
        assert_eq!(query.older, Some(Timestamp::from_centis(20)));
        assert!(query.full);
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, 2);
    }
}
