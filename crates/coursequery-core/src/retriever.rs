//! Query-time orchestration: embed the question, search the course index, apply
//! the time scope, and return at most `k` segments for prompt assembly.

use std::borrow::Borrow;
use std::collections::HashSet;

use serde::Serialize;

use crate::chunks::Segment;
use crate::config::Config;
use crate::content::SectionType;
use crate::embed::{EmbedError, Embedder};
use crate::index::CourseIndex;
use crate::store::VectorIndexError;
use crate::time_filter::{sort_newest_first, TimeFilter, TimeScope};

/// A segment chosen for the answer, with its similarity score and 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedSegment {
    pub segment: Segment,
    pub score: f32,
    pub rank: usize,
}

impl Borrow<Segment> for RetrievedSegment {
    fn borrow(&self) -> &Segment {
        &self.segment
    }
}

/// What the caller should tell the user about a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Found,
    /// Nothing matched the question at all.
    NoRelevantContent,
    /// A time-scoped question with nothing in the requested timeframe.
    NoContentInTimeframe,
    /// "last N" asked for more dated items than exist.
    Partial { requested: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub hits: Vec<RetrievedSegment>,
    pub scope: TimeScope,
    /// Carried over from the time filter for `LastN`.
    pub shortfall: Option<usize>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.hits.iter().map(|h| &h.segment)
    }

    pub fn outcome(&self) -> Outcome {
        if self.hits.is_empty() {
            return if self.scope.is_none() {
                Outcome::NoRelevantContent
            } else {
                Outcome::NoContentInTimeframe
            };
        }
        match (self.scope, self.shortfall) {
            (TimeScope::LastN(requested), Some(missing)) => Outcome::Partial {
                requested,
                found: requested.saturating_sub(missing),
            },
            _ => Outcome::Found,
        }
    }
}

/// Runs similarity search plus time filtering against a loaded [`CourseIndex`].
#[derive(Debug, Clone)]
pub struct Retriever<E> {
    embedder: E,
    time_filter: TimeFilter,
    over_fetch: usize,
}

impl<E: Embedder> Retriever<E> {
    pub fn new(embedder: E, time_filter: TimeFilter, config: &Config) -> Self {
        Self {
            embedder,
            time_filter,
            over_fetch: config.over_fetch.max(1),
        }
    }

    pub fn time_filter(&self) -> &TimeFilter {
        &self.time_filter
    }

    /// Parses the question's time scope against this retriever's reference time.
    pub fn resolve(&self, question: &str) -> TimeScope {
        self.time_filter.resolve(question)
    }

    /// Up to `k` segments for `question`. With a time scope, results are newest
    /// first; otherwise by similarity. An empty result is not an error.
    pub async fn retrieve(
        &self,
        question: &str,
        scope: &TimeScope,
        index: &CourseIndex,
        k: usize,
    ) -> Result<Retrieval, RetrieveError> {
        self.retrieve_in_section(question, scope, None, index, k).await
    }

    /// Like [`Retriever::retrieve`], restricted to one section when `section` is set.
    pub async fn retrieve_in_section(
        &self,
        question: &str,
        scope: &TimeScope,
        section: Option<SectionType>,
        index: &CourseIndex,
        k: usize,
    ) -> Result<Retrieval, RetrieveError> {
        let empty = Retrieval {
            hits: Vec::new(),
            scope: *scope,
            shortfall: None,
        };
        if k == 0 || index.is_empty() {
            return Ok(empty);
        }

        let query = self.embedder.embed(question).await?;
        let fetch_k = self.candidate_count(scope, section, k);
        let hits = index.vectors.search(&query, fetch_k)?;
        tracing::debug!(k, fetch_k, candidates = hits.len(), %scope, "similarity search");

        let mut seen = HashSet::new();
        let candidates: Vec<RetrievedSegment> = hits
            .into_iter()
            .filter(|h| section.map_or(true, |s| h.segment.section == s))
            .filter(|h| seen.insert((h.segment.source_id.clone(), h.segment.index)))
            .map(|h| RetrievedSegment {
                segment: h.segment.clone(),
                score: h.score,
                rank: 0,
            })
            .collect();

        let filtered = self.time_filter.apply(scope, candidates);
        let mut hits = filtered.segments;
        if !scope.is_none() {
            sort_newest_first(&mut hits);
        }
        hits.truncate(k);
        for (i, hit) in hits.iter_mut().enumerate() {
            hit.rank = i + 1;
        }
        tracing::debug!(returned = hits.len(), shortfall = ?filtered.shortfall, "retrieval done");

        Ok(Retrieval {
            hits,
            shortfall: filtered.shortfall,
            ..empty
        })
    }

    /// Over-fetch when filters will drop candidates, so `k` can still be met.
    fn candidate_count(&self, scope: &TimeScope, section: Option<SectionType>, k: usize) -> usize {
        let wanted = match *scope {
            TimeScope::LastN(n) => k.max(n),
            _ => k,
        };
        if scope.is_none() && section.is_none() {
            wanted
        } else {
            wanted.saturating_mul(self.over_fetch)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("failed to embed question: {0}")]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Index(#[from] VectorIndexError),
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::embed::fake::HashEmbedder;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn seg(id: &str, section: SectionType, ts: Option<DateTime<Utc>>, text: &str) -> Segment {
        Segment {
            source_id: id.to_string(),
            section,
            title: None,
            timestamp: ts,
            index: 0,
            text: text.to_string(),
        }
    }

    fn course(embedder: &HashEmbedder) -> CourseIndex {
        let mut index = CourseIndex::new("c1", "hash-bow");
        let segments = [
            seg("syllabus", SectionType::Syllabus, None, "grading policy exams homework weights"),
            seg("hw1", SectionType::Assignment, Some(at(2024, 2, 1)), "homework one assignment due"),
            seg("hw2", SectionType::Assignment, Some(at(2024, 2, 10)), "homework two assignment due"),
            seg("hw3", SectionType::Assignment, Some(at(2024, 2, 20)), "homework three assignment due"),
            seg("ann1", SectionType::Announcement, Some(at(2024, 2, 22)), "class cancelled announcement"),
        ];
        for s in segments {
            let v = embedder.vector(&s.text);
            index.vectors.add(s, v).unwrap();
        }
        index
    }

    fn retriever(now: DateTime<Utc>) -> Retriever<HashEmbedder> {
        Retriever::new(HashEmbedder { dim: 64 }, TimeFilter::new(now), &Config::default())
    }

    fn ids(r: &Retrieval) -> Vec<&str> {
        r.segments().map(|s| s.source_id.as_str()).collect()
    }

    #[tokio::test]
    async fn unscoped_is_by_similarity() {
        let r = retriever(at(2024, 2, 25));
        let index = course(&HashEmbedder { dim: 64 });
        let res = r
            .retrieve("grading policy exams homework weights", &TimeScope::None, &index, 2)
            .await
            .unwrap();
        assert_eq!(res.hits[0].segment.source_id, "syllabus");
        assert_eq!(res.hits.len(), 2);
        assert_eq!(res.hits[0].rank, 1);
        assert!(res.hits[0].score >= res.hits[1].score);
        assert_eq!(res.outcome(), Outcome::Found);
    }

    #[tokio::test]
    async fn last_n_in_section_newest_first() {
        let r = retriever(at(2024, 2, 25));
        let index = course(&HashEmbedder { dim: 64 });
        let question = "what are the last 2 assignments";
        let scope = r.resolve(question);
        assert_eq!(scope, TimeScope::LastN(2));
        let res = r
            .retrieve_in_section(question, &scope, Some(SectionType::Assignment), &index, 5)
            .await
            .unwrap();
        assert_eq!(ids(&res), ["hw3", "hw2"]);
        assert_eq!(res.outcome(), Outcome::Found);
    }

    #[tokio::test]
    async fn empty_timeframe_never_substitutes() {
        let r = retriever(at(2024, 6, 1));
        let index = course(&HashEmbedder { dim: 64 });
        let res = r
            .retrieve(
                "homework assignment due",
                &TimeScope::RelativeWindow(TimeDelta::days(7)),
                &index,
                3,
            )
            .await
            .unwrap();
        assert!(res.is_empty());
        assert_eq!(res.outcome(), Outcome::NoContentInTimeframe);
    }

    #[tokio::test]
    async fn window_results_are_newest_first() {
        let r = retriever(at(2024, 2, 25));
        let index = course(&HashEmbedder { dim: 64 });
        let res = r
            .retrieve(
                "homework assignment",
                &TimeScope::RelativeWindow(TimeDelta::days(16)),
                &index,
                5,
            )
            .await
            .unwrap();
        assert_eq!(ids(&res), ["ann1", "hw3", "hw2"]);
    }

    #[tokio::test]
    async fn partial_last_n() {
        let r = retriever(at(2024, 2, 25));
        let index = course(&HashEmbedder { dim: 64 });
        let res = r
            .retrieve_in_section(
                "assignments",
                &TimeScope::LastN(5),
                Some(SectionType::Assignment),
                &index,
                5,
            )
            .await
            .unwrap();
        assert_eq!(ids(&res), ["hw3", "hw2", "hw1"]);
        assert_eq!(res.outcome(), Outcome::Partial { requested: 5, found: 3 });
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_fatal() {
        let index = course(&HashEmbedder { dim: 64 });
        let r = Retriever::new(
            HashEmbedder { dim: 32 },
            TimeFilter::new(at(2024, 2, 25)),
            &Config::default(),
        );
        let err = r.retrieve("anything", &TimeScope::None, &index, 3).await.unwrap_err();
        assert!(matches!(
            err,
            RetrieveError::Index(VectorIndexError::DimensionMismatch { expected: 64, actual: 32 })
        ));
    }

    #[tokio::test]
    async fn empty_index_or_zero_k() {
        let r = retriever(at(2024, 2, 25));
        let empty = CourseIndex::new("c1", "hash-bow");
        let res = r.retrieve("anything", &TimeScope::None, &empty, 3).await.unwrap();
        assert_eq!(res.outcome(), Outcome::NoRelevantContent);

        let index = course(&HashEmbedder { dim: 64 });
        assert!(r.retrieve("homework", &TimeScope::None, &index, 0).await.unwrap().is_empty());
    }
}
