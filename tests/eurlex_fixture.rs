// tests/eurlex_fixture.rs
use eu_compliance_monitor::ingest::fetch_all;
use eu_compliance_monitor::ingest::providers::eurlex::{EurLexDailyProvider, SOURCE};
use eu_compliance_monitor::ingest::types::{FetchedUpdate, UpdateFetcher};
use std::time::Duration;

const PAGE: &str = include_str!("fixtures/eurlex_daily_view.html");

#[tokio::test]
async fn fixture_rows_extracted_in_page_order() {
    let p = EurLexDailyProvider::from_fixture_str(PAGE);
    let items = p.fetch("10092025").await.unwrap();
    assert_eq!(items.len(), 3);

    assert!(items[0].title.starts_with("Commission Implementing Regulation (EU) 2025/1801"));
    assert!(items[0].title.contains("as regards \"high-risk\" AI systems"));
    assert_eq!(
        items[0].url,
        "https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=OJ:L_202501801"
    );
    assert_eq!(
        items[0].content,
        "Sets out the conformity assessment procedure for high-risk AI systems."
    );

    assert_eq!(items[1].content, "", "row without a paragraph");
    assert_eq!(
        items[2].title,
        "Corrigendum to Regulation (EU) 2022/2065 (Digital Services Act)"
    );
    assert_eq!(items[2].url, "");
    assert!(items.iter().all(|u| u.date == "2025-09-10" && u.source == SOURCE));
}

#[tokio::test]
async fn bad_oj_date_is_a_fetch_failure_not_a_panic() {
    let fetchers: Vec<Box<dyn UpdateFetcher>> =
        vec![Box::new(EurLexDailyProvider::from_fixture_str(PAGE))];
    let out = fetch_all(&fetchers, "2025-09-10", Duration::from_secs(5), None).await;
    assert_eq!(out.fetched(), 0);
    assert_eq!(out.failures.len(), 1);
}

#[tokio::test]
async fn non_empty_fetch_is_archived_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let fetchers: Vec<Box<dyn UpdateFetcher>> =
        vec![Box::new(EurLexDailyProvider::from_fixture_str(PAGE))];
    let out = fetch_all(&fetchers, "10092025", Duration::from_secs(5), Some(dir.path())).await;
    assert_eq!(out.fetched(), 3);

    let snapshots: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(snapshots.len(), 1);
    let name = snapshots[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("eur-lex_") && name.ends_with(".json"), "{name}");

    let saved: Vec<FetchedUpdate> =
        serde_json::from_str(&std::fs::read_to_string(&snapshots[0]).unwrap()).unwrap();
    assert_eq!(saved, out.batch[SOURCE]);
}
