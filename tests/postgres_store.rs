//! `PgStore` against a live database. Run with
//! `DATABASE_URL=postgres://... cargo test --test postgres_store -- --ignored`.

use std::sync::Arc;

use sigmaguard::model::{NewModel, Samples, TrainingStats};
use sigmaguard::{PgStore, SeriesStore, Version, VersionRef};

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    PgStore::connect(&url).await.unwrap()
}

/// A series id no earlier run has used.
fn fresh_series(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}-{nanos}")
}

fn new_model(series_id: &str, mean: f64) -> NewModel {
    let values = vec![mean - 1.0, mean, mean + 1.0];
    NewModel {
        series_id: series_id.to_string(),
        mean,
        std: 0.8165,
        threshold: 3.0,
        training_points: 3,
        training_stats: TrainingStats {
            count: 3,
            mean,
            std: 0.8165,
            min: mean - 1.0,
            max: mean + 1.0,
            start_time: 100,
            end_time: 220,
        },
        training_latency_ms: Some(0.4),
        samples: Samples {
            timestamps: vec![100, 160, 220],
            values,
        },
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn commit_swaps_active_version_and_keeps_history() {
    let store = connect().await;
    let series = fresh_series("pg-swap");

    assert_eq!(store.commit_version(new_model(&series, 10.0)).await.unwrap(), Version::FIRST);
    let v2 = store.commit_version(new_model(&series, 20.0)).await.unwrap();
    assert_eq!(v2.number(), 2);

    let active = store.get_active(&series).await.unwrap().unwrap();
    assert_eq!(active.version, v2);
    assert_eq!(active.mean, 20.0);

    let v1 = store.get_version(&series, Version::FIRST).await.unwrap().unwrap();
    assert!(!v1.is_active);
    assert_eq!(v1.training_stats.max, 11.0);

    let latest = store
        .get_training_data(&series, VersionRef::Latest)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, v2);
    assert_eq!(latest.samples.values, vec![19.0, 20.0, 21.0]);
    assert_eq!(latest.samples.timestamps, vec![100, 160, 220]);

    let first = store
        .get_training_data(&series, VersionRef::Exact(Version::FIRST))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.samples.values, vec![9.0, 10.0, 11.0]);

    let versions = store.list_versions(&series).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions.iter().filter(|m| m.is_active).count(), 1);
    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_commits_get_gap_free_versions() {
    let store = Arc::new(connect().await);
    let series = fresh_series("pg-race");

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        let series = series.clone();
        handles.push(tokio::spawn(async move {
            store.commit_version(new_model(&series, f64::from(i))).await
        }));
    }
    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap().number());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u32>>());

    let active = store.get_active(&series).await.unwrap().unwrap();
    assert_eq!(active.version.number(), 8);
    store.close().await;
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn unknown_series_reads_as_none() {
    let store = connect().await;
    let series = fresh_series("pg-none");
    assert!(store.get_active(&series).await.unwrap().is_none());
    assert!(store
        .get_training_data(&series, VersionRef::Latest)
        .await
        .unwrap()
        .is_none());
    assert!(store.list_versions(&series).await.unwrap().is_empty());
    assert!(store.ping().await.is_ok());
    store.close().await;
}
