//! Paged stream traversal.
//!
//! Backends hand out events one page at a time through a [`PageCursor`].
//! Any continuation token or keyset position stays inside the cursor; the
//! functions here turn a cursor into the fully materialized collections the
//! storage engine contract returns.

use async_trait::async_trait;

use crate::engine::ReadPredicate;
use crate::error::EventStoreError;
use crate::event::StorageEvent;

/// A source that yields a stream one page at a time.
#[async_trait]
pub trait PageCursor: Send {
    /// Fetches the next page, or `None` once the source is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<StorageEvent>>, EventStoreError>;
}

/// Drains `cursor` into one collection, preserving page order.
///
/// # Errors
///
/// Propagates the first error returned by the cursor.
pub async fn read_all<C: PageCursor + ?Sized>(
    cursor: &mut C,
) -> Result<Vec<StorageEvent>, EventStoreError> {
    let mut events = Vec::new();
    while let Some(page) = cursor.next_page().await? {
        events.extend(page);
    }
    Ok(events)
}

/// Consumes a newest-first `cursor` until an event satisfies
/// `read_from_here`, including that event, and returns what was read in
/// ascending order. No page after the one holding the match is fetched.
///
/// # Errors
///
/// Propagates the first error returned by the cursor.
pub async fn read_back_until<C: PageCursor + ?Sized>(
    cursor: &mut C,
    read_from_here: &ReadPredicate<'_>,
) -> Result<Vec<StorageEvent>, EventStoreError> {
    let mut newest_first = Vec::new();
    'pages: while let Some(page) = cursor.next_page().await? {
        for event in page {
            let found = read_from_here(&event);
            newest_first.push(event);
            if found {
                break 'pages;
            }
        }
    }
    newest_first.reverse();
    Ok(newest_first)
}

/// Exclusive upper event number for a forward read of `count` events from
/// `start`, saturating instead of overflowing.
#[must_use]
pub fn forward_end(start: i64, count: i64) -> i64 {
    start.saturating_add(count)
}

/// Iterator adapter yielding items up to and including the first one that
/// satisfies a predicate.
#[derive(Debug)]
pub struct TakeUntilInclusive<I, P> {
    iter: I,
    predicate: P,
    done: bool,
}

impl<I, P> Iterator for TakeUntilInclusive<I, P>
where
    I: Iterator,
    P: FnMut(&I::Item) -> bool,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.iter.next()?;
        if (self.predicate)(&item) {
            self.done = true;
        }
        Some(item)
    }
}

/// Extension adding [`TakeUntilInclusive`] to every iterator.
pub trait IteratorExt: Iterator + Sized {
    /// Yields items until one satisfies `predicate`, including that item.
    fn take_until_inclusive<P>(self, predicate: P) -> TakeUntilInclusive<Self, P>
    where
        P: FnMut(&Self::Item) -> bool,
    {
        TakeUntilInclusive {
            iter: self,
            predicate,
            done: false,
        }
    }
}

impl<I: Iterator> IteratorExt for I {}
