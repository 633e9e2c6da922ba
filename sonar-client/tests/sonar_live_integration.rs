//! Requires a reachable SonarQube server. Point `SONAR_HOST_URL`, `SONAR_TOKEN`
//! and `SONAR_PROJECT_KEY` at it and run with `--ignored`.

use sonar_client::{QualityApi, SonarClient, SonarConfig, METRICS};
use std::time::Duration;

fn make_client() -> SonarClient {
    let base_url =
        std::env::var("SONAR_HOST_URL").unwrap_or_else(|_| "http://localhost:9000".to_string());
    let token = std::env::var("SONAR_TOKEN").unwrap_or_else(|_| "admin".to_string());
    SonarClient::new(
        SonarConfig::new()
            .with_base_url(base_url)
            .with_token(token)
            .with_timeout(Duration::from_secs(30)),
    )
    .expect("client creation")
}

fn project_key() -> String {
    std::env::var("SONAR_PROJECT_KEY").unwrap_or_else(|_| "python-demo-project".to_string())
}

#[tokio::test]
#[ignore]
async fn test_authentication() {
    let client = make_client();
    client
        .validate_authentication()
        .await
        .expect("token should be valid");
}

#[tokio::test]
#[ignore]
async fn test_project_results() {
    let client = make_client();
    let key = project_key();

    assert!(
        client.project_exists(&key).await.expect("project search"),
        "project {key} must exist"
    );

    let analysis = client
        .latest_analysis(&key)
        .await
        .expect("analysis search")
        .expect("at least one analysis");
    assert!(!analysis.date.is_empty());

    let measures = client.measures(&key, METRICS).await.expect("measures");
    assert!(
        measures.keys().all(|k| METRICS.contains(&k.as_str())),
        "unexpected metric in {:?}",
        measures.keys().collect::<Vec<_>>()
    );

    let status = client.quality_gate_status(&key).await.expect("gate status");
    assert!(!status.is_empty());
}
