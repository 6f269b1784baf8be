//! Offset pagination over the `filtered-items` search endpoint.
//!
//! A [`Paginator`] turns one search into a lazy stream: every advancement
//! fetches one page, the offset moves by the page size, and the first empty
//! page ends the stream. Any page failure ends the stream with
//! [`DsapsError::Pagination`], since a skipped page cannot be made up later.
//!
//! Re-polling a fresh stream starts again from offset 0. If the matching set
//! changes while a scan is running (for instance because items are being
//! edited out of it), later offsets shift and items can be skipped or seen
//! twice. Callers that mutate what they search for should collect the
//! references first.

use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, info};

use crate::config::PaginationConfig;
use crate::models::{
    CollectionScope, FilteredItem, FilteredItemsPage, ItemReference, SearchPredicate,
};
use crate::network::{get_with_retry, RetryConfig};
use crate::session::Session;
use crate::{DsapsError, Result};

const FILTERED_ITEMS_PATH: &str = "filtered-items";

/// A filtered-item search paged by offset.
#[derive(Debug, Clone)]
pub struct Paginator {
    predicate: SearchPredicate,
    scope: CollectionScope,
    page_size: u32,
    expand_metadata: bool,
    retry: RetryConfig,
}

impl Paginator {
    pub fn new(predicate: SearchPredicate, scope: CollectionScope) -> Self {
        Self {
            predicate,
            scope,
            page_size: PaginationConfig::MUTATION_PAGE_SIZE,
            expand_metadata: false,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Ask the server to inline each item's metadata. Switches to the smaller
    /// expanded page size unless one was set explicitly afterwards.
    pub fn with_expanded_metadata(mut self) -> Self {
        self.expand_metadata = true;
        self.page_size = PaginationConfig::EXPANDED_PAGE_SIZE;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Query string for the page starting at `offset`.
    pub fn page_query(&self, offset: u32) -> Vec<(String, String)> {
        let mut query = self.predicate.query_pairs();
        query.extend(self.scope.query_pairs());
        if self.expand_metadata {
            query.push(("expand".to_string(), "metadata".to_string()));
        }
        query.push(("limit".to_string(), self.page_size.to_string()));
        query.push(("offset".to_string(), offset.to_string()));
        query
    }

    /// Fetch a single page.
    pub async fn fetch_page<S>(&self, session: &S, offset: u32) -> Result<Vec<FilteredItem>>
    where
        S: Session + ?Sized,
    {
        let query = self.page_query(offset);
        debug!("Requesting {} with {:?}", FILTERED_ITEMS_PATH, query);

        let page: FilteredItemsPage =
            get_with_retry(session, FILTERED_ITEMS_PATH, &query, &self.retry)
                .await
                .and_then(|response| response.json())
                .map_err(|e| DsapsError::Pagination {
                    offset,
                    message: e.to_string(),
                })?;

        info!(
            "Fetched {} items at offset {} ({} {})",
            page.items.len(),
            offset,
            self.predicate.field,
            self.predicate.operator
        );
        Ok(page.items)
    }

    /// Stream of non-empty pages, in server order.
    pub fn pages<'a, S>(
        &'a self,
        session: &'a S,
    ) -> impl Stream<Item = Result<Vec<FilteredItem>>> + 'a
    where
        S: Session + ?Sized,
    {
        stream::try_unfold(Some(0u32), move |next_offset| async move {
            let Some(offset) = next_offset else {
                return Ok(None);
            };
            let items = self.fetch_page(session, offset).await?;
            if items.is_empty() {
                return Ok(None);
            }
            let following = offset.checked_add(self.page_size);
            Ok(Some((items, following)))
        })
    }

    /// Stream of every matching item, pages flattened.
    pub fn items<'a, S>(
        &'a self,
        session: &'a S,
    ) -> impl Stream<Item = Result<FilteredItem>> + 'a
    where
        S: Session + ?Sized,
    {
        self.pages(session)
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<FilteredItem, DsapsError>)))
            .try_flatten()
    }

    /// Stream of item references.
    pub fn references<'a, S>(
        &'a self,
        session: &'a S,
    ) -> impl Stream<Item = Result<ItemReference>> + 'a
    where
        S: Session + ?Sized,
    {
        self.items(session).map_ok(|item| item.reference())
    }

    /// Run the whole scan and return every reference.
    pub async fn collect_references<S>(&self, session: &S) -> Result<Vec<ItemReference>>
    where
        S: Session + ?Sized,
    {
        let references: Vec<ItemReference> = self.references(session).try_collect().await?;
        info!("Search matched {} items", references.len());
        Ok(references)
    }
}

/// Search shorthand used by the CLI `search` command.
///
/// Operators that compare against a value refuse an empty one.
pub async fn filtered_item_search<S>(
    session: &S,
    predicate: SearchPredicate,
    scope: CollectionScope,
) -> Result<Vec<ItemReference>>
where
    S: Session + ?Sized,
{
    if predicate.operator.takes_value() && predicate.value.is_empty() {
        return Err(DsapsError::Validation {
            field: "search value".to_string(),
            message: format!("'{}' needs a value to compare against", predicate.operator),
        });
    }
    Paginator::new(predicate, scope).collect_references(session).await
}
