//! Topic clustering of recent queries.
//!
//! A density-based (DBSCAN) pass over query embeddings groups semantically
//! similar questions; each cluster is then named by a single LLM call. The
//! result is stored with a refresh timestamp, and concurrent refreshes for
//! one workspace coalesce into the in-flight job.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::embeddings::cosine_distance;
use crate::llm::{ChatMessage, LlmService};
use crate::storage::AnalyticsStore;
use crate::Result;

/// Configuration for the clustering pass
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    /// Maximum cosine distance between neighbours
    pub eps: f32,
    /// Minimum neighbours to seed a cluster
    pub min_samples: usize,
    /// How far back to collect queries
    pub lookback_days: i64,
    /// Cap on queries fed into one clustering pass
    pub max_queries: usize,
    /// Example queries retained per cluster
    pub examples_per_cluster: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: 0.35,
            min_samples: 3,
            lookback_days: 30,
            max_queries: 2000,
            examples_per_cluster: 5,
        }
    }
}

/// Lifecycle of the per-workspace clustering job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    NotStarted,
    InProgress,
    Completed,
    Error,
}

/// A group of semantically similar historical queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCluster {
    pub cluster_id: usize,
    /// LLM-generated name
    pub label: String,
    /// Example member queries
    pub examples: Vec<String>,
    /// Member count
    pub popularity: usize,
}

/// Stored clustering result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicInsights {
    pub status: InsightStatus,
    pub clusters: Vec<TopicCluster>,
    /// Queries that joined no cluster
    pub unclustered_count: usize,
    pub refresh_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TopicInsights {
    #[must_use]
    pub fn not_started() -> Self {
        Self {
            status: InsightStatus::NotStarted,
            clusters: Vec::new(),
            unclustered_count: 0,
            refresh_timestamp: None,
            error: None,
        }
    }
}

/// Density-based clustering over embeddings
pub struct TopicClusterer {
    config: ClusteringConfig,
}

impl TopicClusterer {
    #[must_use]
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Group `(query_text, embedding)` pairs into clusters.
    ///
    /// Returns `(clusters_as_member_indices, noise_count)`.
    #[must_use]
    pub fn cluster(&self, embeddings: &[(String, Vec<f32>)]) -> (Vec<Vec<usize>>, usize) {
        let n = embeddings.len();
        if n == 0 {
            return (Vec::new(), 0);
        }

        const UNVISITED: i64 = -2;
        const NOISE: i64 = -1;
        let mut labels: Vec<i64> = vec![UNVISITED; n];
        let mut cluster_id: i64 = 0;

        for i in 0..n {
            if labels[i] != UNVISITED {
                continue;
            }
            let neighbors = self.region_query(i, embeddings);
            if neighbors.len() < self.config.min_samples {
                labels[i] = NOISE;
                continue;
            }

            labels[i] = cluster_id;
            let mut queue = neighbors;
            while let Some(p) = queue.pop() {
                if labels[p] == NOISE {
                    labels[p] = cluster_id;
                }
                if labels[p] != UNVISITED {
                    continue;
                }
                labels[p] = cluster_id;
                let p_neighbors = self.region_query(p, embeddings);
                if p_neighbors.len() >= self.config.min_samples {
                    queue.extend(p_neighbors);
                }
            }
            cluster_id += 1;
        }

        let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); cluster_id as usize];
        let mut noise = 0;
        for (index, label) in labels.iter().enumerate() {
            if *label >= 0 {
                clusters[*label as usize].push(index);
            } else {
                noise += 1;
            }
        }

        // Largest topics first
        clusters.sort_by_key(|members| std::cmp::Reverse(members.len()));
        (clusters, noise)
    }

    /// All points within `eps` cosine distance of point `i`
    fn region_query(&self, i: usize, embeddings: &[(String, Vec<f32>)]) -> Vec<usize> {
        let mut neighbors = Vec::new();
        for (j, (_, other)) in embeddings.iter().enumerate() {
            if i != j && cosine_distance(&embeddings[i].1, other) <= self.config.eps {
                neighbors.push(j);
            }
        }
        neighbors
    }
}

/// Topic-insight job runner with per-workspace coalescing
pub struct TopicService {
    store: Arc<dyn AnalyticsStore>,
    llm: Arc<LlmService>,
    clusterer: TopicClusterer,
    config: ClusteringConfig,
    in_progress: Mutex<HashSet<i64>>,
}

#[derive(Debug, Deserialize)]
struct LabelVerdict {
    label: String,
}

impl TopicService {
    #[must_use]
    pub fn new(store: Arc<dyn AnalyticsStore>, llm: Arc<LlmService>, config: ClusteringConfig) -> Self {
        Self {
            store,
            llm,
            clusterer: TopicClusterer::new(config.clone()),
            config,
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    /// Load the stored insights, or `not_started` when none exist yet.
    /// While a refresh is running the stored payload is overridden with an
    /// in-progress status.
    pub async fn current(&self, workspace_id: i64) -> Result<TopicInsights> {
        if self.in_progress.lock().contains(&workspace_id) {
            let mut insights = self.load(workspace_id).await?;
            insights.status = InsightStatus::InProgress;
            return Ok(insights);
        }
        self.load(workspace_id).await
    }

    async fn load(&self, workspace_id: i64) -> Result<TopicInsights> {
        match self.store.load_topic_insights(workspace_id).await? {
            Some(payload) => Ok(serde_json::from_value(payload)?),
            None => Ok(TopicInsights::not_started()),
        }
    }

    /// Start a refresh unless one is already running for this workspace.
    /// Returns `false` when coalesced into the in-flight job.
    pub fn spawn_refresh(self: &Arc<Self>, workspace_id: i64) -> bool {
        {
            let mut jobs = self.in_progress.lock();
            if !jobs.insert(workspace_id) {
                tracing::debug!(workspace_id, "topic refresh already running, coalescing");
                return false;
            }
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.run_refresh(workspace_id).await;
            if let Err(e) = result {
                tracing::warn!(workspace_id, error = %e, "topic refresh failed");
                let failed = TopicInsights {
                    status: InsightStatus::Error,
                    clusters: Vec::new(),
                    unclustered_count: 0,
                    refresh_timestamp: Some(Utc::now()),
                    error: Some(e.to_string()),
                };
                if let Ok(payload) = serde_json::to_value(&failed) {
                    let _ = service.store.save_topic_insights(workspace_id, &payload).await;
                }
            }
            service.in_progress.lock().remove(&workspace_id);
        });
        true
    }

    async fn run_refresh(&self, workspace_id: i64) -> Result<()> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(self.config.lookback_days);
        let queries = self
            .store
            .recent_query_embeddings(workspace_id, from, to, self.config.max_queries)
            .await?;

        let (clusters, noise) = self.clusterer.cluster(&queries);
        let mut named = Vec::with_capacity(clusters.len());

        for (cluster_id, members) in clusters.iter().enumerate() {
            let examples: Vec<String> = members
                .iter()
                .take(self.config.examples_per_cluster)
                .map(|&i| queries[i].0.clone())
                .collect();
            let label = self.label_cluster(&examples).await;
            named.push(TopicCluster {
                cluster_id,
                label,
                examples,
                popularity: members.len(),
            });
        }

        let insights = TopicInsights {
            status: InsightStatus::Completed,
            clusters: named,
            unclustered_count: noise,
            refresh_timestamp: Some(Utc::now()),
            error: None,
        };
        self.store
            .save_topic_insights(workspace_id, &serde_json::to_value(&insights)?)
            .await?;

        tracing::info!(
            workspace_id,
            clusters = insights.clusters.len(),
            unclustered = noise,
            "topic insights refreshed"
        );
        Ok(())
    }

    /// Name one cluster from its example queries; labelling failures fall
    /// back to the first example so a refresh never dies on naming
    async fn label_cluster(&self, examples: &[String]) -> String {
        let messages = vec![
            ChatMessage::system(
                "Summarize the common topic of these user questions in at most five \
                 words. Respond with a JSON object {\"label\": string} and nothing else.",
            ),
            ChatMessage::user(examples.join("\n")),
        ];
        match self.llm.complete_json::<LabelVerdict>(messages).await {
            Ok(verdict) => verdict.label,
            Err(e) => {
                tracing::warn!(error = %e, "cluster labelling failed, using example");
                examples.first().cloned().unwrap_or_else(|| "topic".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(text: &str, v: Vec<f32>) -> (String, Vec<f32>) {
        (text.to_string(), v)
    }

    #[test]
    fn empty_input_clusters_to_nothing() {
        let clusterer = TopicClusterer::new(ClusteringConfig::default());
        let (clusters, noise) = clusterer.cluster(&[]);
        assert!(clusters.is_empty());
        assert_eq!(noise, 0);
    }

    #[test]
    fn separates_two_dense_groups() {
        let clusterer = TopicClusterer::new(ClusteringConfig {
            eps: 0.1,
            min_samples: 2,
            ..Default::default()
        });

        let points = vec![
            point("a1", vec![1.0, 0.0]),
            point("a2", vec![0.99, 0.01]),
            point("a3", vec![0.98, 0.02]),
            point("b1", vec![0.0, 1.0]),
            point("b2", vec![0.01, 0.99]),
            point("b3", vec![0.02, 0.98]),
            point("outlier", vec![-0.7, -0.7]),
        ];

        let (clusters, noise) = clusterer.cluster(&points);
        assert_eq!(clusters.len(), 2);
        assert_eq!(noise, 1);
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[1].len(), 3);
    }

    #[test]
    fn sparse_points_are_noise() {
        let clusterer = TopicClusterer::new(ClusteringConfig {
            eps: 0.05,
            min_samples: 3,
            ..Default::default()
        });
        let points = vec![
            point("x", vec![1.0, 0.0]),
            point("y", vec![0.0, 1.0]),
            point("z", vec![-1.0, 0.0]),
        ];
        let (clusters, noise) = clusterer.cluster(&points);
        assert!(clusters.is_empty());
        assert_eq!(noise, 3);
    }
}
