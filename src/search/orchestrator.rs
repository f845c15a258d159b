use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::errors::PlanError;
use crate::search::cache::SearchCache;
use crate::search::index::{IndexHit, RecipeIndex};
use crate::search::query::SearchQuery;
use crate::search::scorer::{RecipeScorer, ScoredCandidate, ScoringTarget};

/// Ranked alternatives for one query, shared between cache and callers.
pub type Alternatives = Arc<Vec<ScoredCandidate>>;

pub type ResultCache = SearchCache<Alternatives>;

#[derive(Debug)]
pub struct SearchEntry {
    pub query: SearchQuery,
    pub outcome: Result<Alternatives, PlanError>,
}

/// Per-query outcomes of one `search_many` wave, in input order.
#[derive(Debug, Default)]
pub struct SearchBatch {
    entries: Vec<SearchEntry>,
}

impl SearchBatch {
    pub fn entries(&self) -> &[SearchEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<SearchEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn get(&self, query: &SearchQuery) -> Option<&Result<Alternatives, PlanError>> {
        self.entries
            .iter()
            .find(|e| &e.query == query)
            .map(|e| &e.outcome)
    }
}

/// Fans independent queries out over tasks. Each task goes cache, then index
/// (with retries), then scorer. Index calls from every caller and clone share
/// one pool of `worker_width` permits.
#[derive(Clone)]
pub struct SearchOrchestrator {
    index: Arc<dyn RecipeIndex>,
    scorer: Arc<RecipeScorer>,
    cache: Arc<ResultCache>,
    permits: Arc<Semaphore>,
    config: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(
        index: Arc<dyn RecipeIndex>,
        scorer: Arc<RecipeScorer>,
        cache: Arc<ResultCache>,
        config: SearchConfig,
    ) -> Self {
        Self {
            index,
            scorer,
            cache,
            permits: Arc::new(Semaphore::new(config.worker_width.max(1))),
            config,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Single query through the cache.
    pub async fn search_one(&self, query: &SearchQuery) -> Result<Alternatives, PlanError> {
        let normalized = query.normalized();
        let key = query.cache_key();
        self.cache
            .get_or_compute(&key, || async {
                let hits = self.query_index_with_retry(&normalized).await?;
                let target = ScoringTarget::from(&normalized);
                Ok(Arc::new(self.scorer.score(hits, &target)))
            })
            .await
    }

    /// Runs every query concurrently, with at most `worker_width` index calls in
    /// flight. Fails only when no query succeeds; otherwise each entry carries
    /// its own outcome.
    pub async fn search_many(&self, queries: Vec<SearchQuery>) -> Result<SearchBatch, PlanError> {
        if queries.is_empty() {
            return Ok(SearchBatch::default());
        }

        let wave_timeout = self.config.wave_timeout();
        let deadline = Instant::now() + wave_timeout;
        let mut tasks = JoinSet::new();

        for (position, query) in queries.iter().cloned().enumerate() {
            let worker = self.clone();
            tasks.spawn(async move { (position, worker.search_one(&query).await) });
        }

        let mut outcomes: Vec<Option<Result<Alternatives, PlanError>>> =
            (0..queries.len()).map(|_| None).collect();
        let mut timed_out = false;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((position, outcome)))) => outcomes[position] = Some(outcome),
                Ok(Some(Err(join_err))) => {
                    warn!(error = %join_err, "search worker terminated abnormally");
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let entries: Vec<SearchEntry> = queries
            .into_iter()
            .zip(outcomes)
            .map(|(query, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    if timed_out {
                        Err(PlanError::SearchTimedOut(wave_timeout))
                    } else {
                        Err(PlanError::IndexUnavailable("search worker failed".into()))
                    }
                });
                SearchEntry { query, outcome }
            })
            .collect();

        let batch = SearchBatch { entries };
        let succeeded = batch.succeeded();
        if timed_out {
            warn!(
                pending = batch.len() - succeeded,
                timeout_ms = wave_timeout.as_millis() as u64,
                "search wave deadline reached; outstanding queries aborted"
            );
        }
        info!(queries = batch.len(), succeeded, "search wave finished");

        if succeeded == 0 {
            let count = batch.len();
            let first = batch
                .into_entries()
                .into_iter()
                .find_map(|e| e.outcome.err())
                .unwrap_or_else(|| PlanError::IndexUnavailable("no queries ran".into()));
            return Err(PlanError::AllQueriesFailed {
                count,
                first: Box::new(first),
            });
        }
        Ok(batch)
    }

    async fn query_index_with_retry(&self, query: &SearchQuery) -> Result<Vec<IndexHit>, PlanError> {
        let text = query.query_text();
        let filters = query.index_filters();
        let fetch_k = query.k.saturating_mul(self.config.oversample_factor.max(1));
        let call_timeout = self.config.index_timeout();

        let mut attempt = 0;
        loop {
            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| PlanError::IndexUnavailable("worker pool closed".into()))?;
                match timeout(call_timeout, self.index.query(&text, &filters, fetch_k)).await {
                    Ok(result) => result,
                    Err(_) => Err(PlanError::IndexUnavailable(format!(
                        "{} did not answer within {:?}",
                        self.index.name(),
                        call_timeout
                    ))),
                }
            };

            match result {
                Ok(hits) => {
                    debug!(meal_type = %query.meal_type, hits = hits.len(), attempt, "index query answered");
                    return Ok(hits);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        meal_type = %query.meal_type,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "index query failed; retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
