//! Similar-incident recall over the in-memory store.

use autolog_core::analysis::Severity;
use autolog_core::embedding::Embedding;
use autolog_core::models::{new_id, now_ts, LogFile, Memory, MemoryMetadata};
use autolog_core::retrieval::{similar_to_embedding, Relevance, RetrievalParams};
use autolog_core::store::memory::InMemoryStore;
use autolog_core::store::Store;

/// A unit vector in the plane whose cosine with `[1, 0]` is `cos`.
fn at_cosine(cos: f32, flip: bool) -> Vec<f32> {
    let sin = (1.0 - cos * cos).sqrt();
    vec![cos, if flip { -sin } else { sin }]
}

async fn remember(store: &InMemoryStore, log_file_id: &str, vector: Vec<f32>) -> Memory {
    let memory = Memory {
        id: new_id(),
        log_file_id: Some(log_file_id.to_string()),
        summary: format!("orders outage seen in {}", log_file_id),
        root_cause: "Connection pool exhausted".to_string(),
        embedding: Embedding::new(vector),
        metadata: MemoryMetadata {
            severity: Severity::High,
            recommendations: vec!["Raise the pool size".to_string()],
            error_count: 3,
        },
        created_at: now_ts(),
    };
    store.insert_memory(&memory).await.unwrap();
    memory
}

#[tokio::test]
async fn test_threshold_keeps_medium_matches_and_drops_weaker_ones() {
    let store = InMemoryStore::new();
    let first = remember(&store, "f1", at_cosine(0.75, false)).await;
    let second = remember(&store, "f2", at_cosine(0.75, true)).await;
    let weak = remember(&store, "f3", at_cosine(0.69, false)).await;

    let query = Embedding::new(vec![1.0, 0.0]);
    let incidents = similar_to_embedding(&store, &query, None, &RetrievalParams::default())
        .await
        .unwrap();

    assert_eq!(incidents.len(), 2);
    for incident in &incidents {
        assert!((incident.similarity - 0.75).abs() < 1e-4, "{}", incident.similarity);
        assert_eq!(incident.relevance, Relevance::Medium);
    }
    assert!(incidents[0].similarity >= incidents[1].similarity);

    let ids: Vec<&str> = incidents.iter().map(|i| i.memory_id.as_str()).collect();
    assert!(ids.contains(&first.id.as_str()));
    assert!(ids.contains(&second.id.as_str()));
    assert!(!ids.contains(&weak.id.as_str()));
}

#[tokio::test]
async fn test_incidents_sorted_by_similarity() {
    let store = InMemoryStore::new();
    let medium = remember(&store, "f1", at_cosine(0.72, false)).await;
    let high = remember(&store, "f2", at_cosine(0.95, false)).await;

    let query = Embedding::new(vec![1.0, 0.0]);
    let incidents = similar_to_embedding(&store, &query, None, &RetrievalParams::default())
        .await
        .unwrap();

    let ids: Vec<&str> = incidents.iter().map(|i| i.memory_id.as_str()).collect();
    assert_eq!(ids, vec![high.id.as_str(), medium.id.as_str()]);
    assert_eq!(incidents[0].relevance, Relevance::High);
    assert_eq!(incidents[1].relevance, Relevance::Medium);
}

#[tokio::test]
async fn test_own_analyses_do_not_crowd_out_other_files() {
    let store = InMemoryStore::new();
    let current = LogFile::new("api.jsonl", 128);
    store.insert_log_file(&current, &[]).await.unwrap();
    let other_file = LogFile::new("billing.jsonl", 128);
    store.insert_log_file(&other_file, &[]).await.unwrap();

    for _ in 0..5 {
        remember(&store, &current.id, vec![1.0, 0.0]).await;
    }
    let other = remember(&store, &other_file.id, at_cosine(0.9, false)).await;

    let query = Embedding::new(vec![1.0, 0.0]);
    let incidents = similar_to_embedding(
        &store,
        &query,
        Some(&current.id),
        &RetrievalParams::default(),
    )
    .await
    .unwrap();

    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].memory_id, other.id);
    assert_eq!(incidents[0].filename, "billing.jsonl");
    assert_eq!(incidents[0].relevance, Relevance::High);
}
