/// Status normalization tests
///
/// Run with: cargo test --test status_normalization_tests
mod common;

use bson::{Bson, doc};
use common::Harness;

const NORMALIZE: &str = "0008-status_normalization";

fn seed(harness: &Harness) {
    harness.seed_target(
        "insights",
        vec![
            doc! {
                "_id": 1,
                "a": { "status": 200 },
                "b": [ { "status": Bson::Null }, { "status": 5 } ],
            },
            doc! { "_id": 2, "status": 1 },
        ],
    );
    harness.seed_target("reports", vec![doc! { "_id": 3, "Status": 200_i64 }]);
    harness.seed_target("system.profile", vec![doc! { "_id": 4, "status": 200 }]);
}

#[tokio::test]
async fn test_rewrites_legacy_status_everywhere() {
    let harness = Harness::new();
    seed(&harness);

    let report = harness.run(NORMALIZE, harness.config()).await.unwrap();

    assert_eq!(
        harness.target("insights")[0],
        doc! {
            "_id": 1,
            "a": { "status": 2 },
            "b": [ { "status": 2 }, { "status": 5 } ],
        }
    );
    assert_eq!(harness.target("insights")[1], doc! { "_id": 2, "status": 1 });
    assert_eq!(harness.target("reports")[0], doc! { "_id": 3, "Status": 2 });
    assert_eq!(harness.target("system.profile")[0], doc! { "_id": 4, "status": 200 });

    let counters = &report.counters;
    assert_eq!(counters.tally("collections_processed"), 2);
    assert_eq!(counters.tally("collections_updated"), 2);
    assert_eq!(counters.tally("documents_matched"), 2);
    assert_eq!(counters.tally("status_fields"), 3);
    assert_eq!(counters.tally("insights_documents"), 1);
    assert_eq!(counters.processed(), 3);
}

#[tokio::test]
async fn test_dry_run_only_identifies() {
    let harness = Harness::new();
    seed(&harness);
    let before = harness.target("insights");

    let report = harness
        .run(NORMALIZE, harness.config().dry_run(true))
        .await
        .unwrap();

    assert_eq!(harness.target("insights"), before);
    assert_eq!(report.counters.tally("status_fields"), 3);
}

#[tokio::test]
async fn test_second_pass_finds_nothing() {
    let harness = Harness::new();
    seed(&harness);

    harness.run(NORMALIZE, harness.config()).await.unwrap();
    let second = harness.run(NORMALIZE, harness.config()).await.unwrap();

    assert_eq!(second.counters.tally("documents_matched"), 0);
    assert_eq!(second.counters.tally("collections_updated"), 0);
}
