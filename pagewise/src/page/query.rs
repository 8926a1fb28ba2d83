use std::future::Future;

use super::{Page, PageError};

/// Row window applied to a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: u64,
    pub offset: u64,
}

/// How the rows of a page are fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Every matching row, no window
    All,
    /// `LIMIT/OFFSET` on the filtered query
    Direct(Window),
    /// Window applied to a key-only sub-query that the row fetch joins onto
    KeyJoin { key: String, window: Window },
}

/// Instructions handed to [`PageSource::rows`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Ascending order on this column, set when the source has no ordering
    pub default_order: Option<String>,
    pub strategy: Strategy,
}

/// A filtered, optionally ordered row source the pagination engine drives.
///
/// Implementations must apply the same filter to [`count`](Self::count) and
/// [`rows`](Self::rows).
pub trait PageSource: Send {
    type Row: Send;

    /// Whether the source carries an explicit ordering
    fn has_order(&self) -> bool;

    /// Number of rows matching the filter
    fn count(&mut self) -> impl Future<Output = Result<i64, PageError>> + Send;

    /// Fetches rows according to `plan`
    fn rows(
        &mut self,
        plan: &FetchPlan,
    ) -> impl Future<Output = Result<Vec<Self::Row>, PageError>> + Send;
}

/// A [`Page`] bound to a row source for a single fetch
#[must_use = "a query does nothing until `find` is awaited"]
pub struct Query<'p, S> {
    page: &'p mut Page,
    source: S,
}

impl<'p, S: PageSource> Query<'p, S> {
    pub(super) fn new(page: &'p mut Page, source: S) -> Self {
        Self { page, source }
    }

    /// Counts, plans and fetches one page of rows, updating the bound page.
    ///
    /// A zero count short-circuits to an empty list without touching the
    /// rows. With `count_skip` the caller's `total` is used as is and the
    /// fetch always runs.
    pub async fn find(self) -> Result<Vec<S::Row>, PageError> {
        let Query { page, mut source } = self;

        let default_order = if source.has_order() {
            None
        } else if page.primary_key.is_empty() {
            tracing::debug!("paged query has neither ordering nor primary key");
            None
        } else {
            Some(page.primary_key.clone())
        };

        if page.disable {
            let rows = source
                .rows(&FetchPlan {
                    default_order,
                    strategy: Strategy::All,
                })
                .await?;
            page.total = i64::try_from(rows.len()).unwrap_or(i64::MAX);
            page.limit();
            return Ok(rows);
        }

        if !page.count_skip {
            page.total = source.count().await?;
            if page.total <= 0 {
                page.total = 0;
                page.limit();
                return Ok(Vec::new());
            }
        }

        let (limit, offset) = page.limit();
        let window = Window { limit, offset };
        let strategy = if page.primary_key.is_empty() {
            Strategy::Direct(window)
        } else {
            Strategy::KeyJoin {
                key: page.primary_key.clone(),
                window,
            }
        };
        tracing::debug!(
            num = page.num,
            size = page.size,
            total = page.total,
            limit,
            offset,
            "fetching page"
        );

        source
            .rows(&FetchPlan {
                default_order,
                strategy,
            })
            .await
    }

    /// Same as [`find`](Self::find); reads as the natural verb for raw-row sources.
    pub async fn scan(self) -> Result<Vec<S::Row>, PageError> {
        self.find().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        counts: usize,
        plans: Vec<FetchPlan>,
    }

    /// In-memory source over `1..=rows`, recording every call
    struct MemorySource {
        rows: Vec<i64>,
        ordered: bool,
        calls: Arc<Mutex<Calls>>,
    }

    impl MemorySource {
        fn new(rows: i64) -> (Self, Arc<Mutex<Calls>>) {
            let calls = Arc::new(Mutex::new(Calls::default()));
            let source = Self {
                rows: (1..=rows).collect(),
                ordered: false,
                calls: calls.clone(),
            };
            (source, calls)
        }
    }

    impl PageSource for MemorySource {
        type Row = i64;

        fn has_order(&self) -> bool {
            self.ordered
        }

        async fn count(&mut self) -> Result<i64, PageError> {
            self.calls.lock().unwrap().counts += 1;
            Ok(self.rows.len() as i64)
        }

        async fn rows(&mut self, plan: &FetchPlan) -> Result<Vec<i64>, PageError> {
            self.calls.lock().unwrap().plans.push(plan.clone());
            let window = match &plan.strategy {
                Strategy::All => return Ok(self.rows.clone()),
                Strategy::Direct(window) | Strategy::KeyJoin { window, .. } => *window,
            };
            Ok(self
                .rows
                .iter()
                .copied()
                .skip(window.offset as usize)
                .take(window.limit as usize)
                .collect())
        }
    }

    struct FailingSource;

    impl PageSource for FailingSource {
        type Row = i64;

        fn has_order(&self) -> bool {
            true
        }

        async fn count(&mut self) -> Result<i64, PageError> {
            Err(PageError::ParseModel)
        }

        async fn rows(&mut self, _plan: &FetchPlan) -> Result<Vec<i64>, PageError> {
            panic!("rows must not be fetched after a failed count");
        }
    }

    #[tokio::test]
    async fn test_find_direct_window() {
        let (source, calls) = MemorySource::new(25);
        let mut page = Page::new(3, 10);

        let rows = page.query(source).find().await.unwrap();

        assert_eq!(rows, (21..=25).collect::<Vec<_>>());
        assert_eq!((page.num, page.size, page.total), (3, 10, 25));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.counts, 1);
        assert_eq!(
            calls.plans[0],
            FetchPlan {
                default_order: None,
                strategy: Strategy::Direct(Window { limit: 10, offset: 20 }),
            }
        );
    }

    #[tokio::test]
    async fn test_find_key_join_with_default_order() {
        let (source, calls) = MemorySource::new(25);
        let mut page = Page::new(2, 10).with_primary_key("id");

        let rows = page.query(source).find().await.unwrap();

        assert_eq!(rows.len(), 10);
        let calls = calls.lock().unwrap();
        assert_eq!(
            calls.plans[0],
            FetchPlan {
                default_order: Some("id".into()),
                strategy: Strategy::KeyJoin {
                    key: "id".into(),
                    window: Window { limit: 10, offset: 10 },
                },
            }
        );
    }

    #[tokio::test]
    async fn test_find_explicit_order_wins() {
        let (mut source, calls) = MemorySource::new(5);
        source.ordered = true;
        let mut page = Page::new(1, 10).with_primary_key("id");

        page.query(source).find().await.unwrap();

        assert_eq!(calls.lock().unwrap().plans[0].default_order, None);
    }

    #[tokio::test]
    async fn test_find_past_last_page_is_empty() {
        let (source, _) = MemorySource::new(25);
        let mut page = Page::new(5, 10);

        let rows = page.query(source).find().await.unwrap();

        assert!(rows.is_empty());
        assert_eq!((page.num, page.total), (4, 25));
    }

    #[tokio::test]
    async fn test_find_zero_count_skips_fetch() {
        let (source, calls) = MemorySource::new(0);
        let mut page = Page::new(1, 10).with_primary_key("id");

        let rows = page.query(source).find().await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(page.total, 0);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.counts, 1);
        assert!(calls.plans.is_empty());
    }

    #[tokio::test]
    async fn test_find_count_skip_uses_known_total() {
        let (source, calls) = MemorySource::new(25);
        let mut page = Page::new(2, 10).with_known_total(25);

        let rows = page.query(source).find().await.unwrap();

        assert_eq!(rows, (11..=20).collect::<Vec<_>>());
        assert_eq!(calls.lock().unwrap().counts, 0);
    }

    #[tokio::test]
    async fn test_find_count_skip_fetches_even_without_total() {
        let (source, calls) = MemorySource::new(3);
        let mut page = Page::new(1, 10).with_known_total(0);

        let rows = page.query(source).find().await.unwrap();

        assert_eq!(rows, vec![1, 2, 3]);
        assert_eq!(calls.lock().unwrap().plans.len(), 1);
    }

    #[tokio::test]
    async fn test_find_disabled_returns_everything() {
        let (source, calls) = MemorySource::new(37);
        let mut page = Page::new(2, 10).disabled();

        let rows = page.query(source).scan().await.unwrap();

        assert_eq!(rows.len(), 37);
        assert_eq!(page.total, 37);
        assert_eq!(page.size, 37);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.counts, 0);
        assert_eq!(calls.plans[0].strategy, Strategy::All);
    }

    #[tokio::test]
    async fn test_find_propagates_count_error() {
        let mut page = Page::new(1, 10);
        let err = page.query(FailingSource).find().await.unwrap_err();
        assert!(matches!(err, PageError::ParseModel));
    }
}
