use anyhow::Result;
use serde_json::json;
use tokio::time::{sleep, Duration};

mod common;
use common::{alert, create_incident, ingest, TestServer};

#[tokio::test]
async fn test_incident_lifecycle_keeps_aggregates_current() -> Result<()> {
    let server = TestServer::start_default().await?;
    let mut client = server.connect();

    let alert_ids = ingest(
        &mut client,
        vec![
            alert("CPU high", "fp-cpu", "warning", "prometheus"),
            alert("DB down", "fp-db", "critical", "datadog"),
        ],
    )
    .await?;
    assert_eq!(alert_ids.len(), 2);

    let incident = create_incident(&mut client, "Checkout outage").await?;
    let id = incident["id"].clone();
    assert_eq!(incident["alerts_count"], 0);
    assert_eq!(incident["is_confirmed"], true);

    let incident = client
        .call("incidents/add_alerts", json!({ "incident_id": id, "alert_ids": alert_ids }))
        .await?;
    assert_eq!(incident["alerts_count"], 2);
    assert_eq!(incident["severity"], "critical");
    assert_eq!(incident["alert_sources"], json!(["datadog", "prometheus"]));
    assert!(incident["start_time"].is_string());

    let page = client
        .call("incidents/alerts", json!({ "incident_id": id, "limit": 1 }))
        .await?;
    assert_eq!(page["count"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let incident = client
        .call(
            "incidents/remove_alerts",
            json!({ "incident_id": id, "alert_ids": [alert_ids[1]] }),
        )
        .await?;
    assert_eq!(incident["alerts_count"], 1);
    assert_eq!(incident["severity"], "warning");
    assert_eq!(incident["alert_sources"], json!(["prometheus"]));

    let incident = client
        .call("incidents/change_status", json!({ "incident_id": id, "status": "resolved" }))
        .await?;
    assert_eq!(incident["status"], "resolved");
    assert!(incident["end_time"].is_string());

    let meta = client.call("incidents/meta", json!({})).await?;
    assert_eq!(meta["sources"], json!(["prometheus"]));

    let deleted = client.call("incidents/delete", json!({ "incident_id": id })).await?;
    assert_eq!(deleted["deleted"], true);

    let error = client.call_err("incidents/get", json!({ "incident_id": id })).await?;
    assert_eq!(error["code"], -32004);
    Ok(())
}

#[tokio::test]
async fn test_update_and_list_with_filters() -> Result<()> {
    let server = TestServer::start_default().await?;
    let mut client = server.connect();

    let first = create_incident(&mut client, "db-primary latency").await?;
    create_incident(&mut client, "web 5xx").await?;

    let updated = client
        .call(
            "incidents/update",
            json!({
                "incident_id": first["id"],
                "incident": { "user_generated_name": "db-primary saturation", "assignee": "oncall" }
            }),
        )
        .await?;
    assert_eq!(updated["user_generated_name"], "db-primary saturation");
    assert_eq!(updated["assignee"], "oncall");

    let page = client
        .call("incidents/list", json!({ "search": "DB*", "sorting": "name" }))
        .await?;
    assert_eq!(page["count"], 1);
    assert_eq!(page["items"][0]["id"], first["id"]);

    let page = client.call("incidents/list", json!({ "assignees": ["oncall"] })).await?;
    assert_eq!(page["count"], 1);

    let page = client.call("incidents/list", json!({ "limit": 1 })).await?;
    assert_eq!(page["count"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_predicted_incidents_need_confirmation() -> Result<()> {
    let server = TestServer::start_default().await?;
    let mut client = server.connect();

    let predicted = client
        .call(
            "incidents/create",
            json!({ "incident": { "user_generated_name": "Correlated" }, "generated_from_ai": true }),
        )
        .await?;
    assert_eq!(predicted["ai_generated_name"], "Correlated");
    assert_eq!(predicted["is_confirmed"], false);

    let page = client.call("incidents/list", json!({})).await?;
    assert_eq!(page["count"], 0);

    client
        .call("incidents/confirm", json!({ "incident_id": predicted["id"] }))
        .await?;
    let page = client.call("incidents/list", json!({})).await?;
    assert_eq!(page["count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_commit_candidates_creates_linked_incidents() -> Result<()> {
    let server = TestServer::start_default().await?;
    let mut client = server.connect();

    let committed = client
        .call(
            "incidents/commit_candidates",
            json!({
                "candidates": [{
                    "id": uuid::Uuid::new_v4(),
                    "name": "Payments degraded",
                    "description": "Errors and latency on payments",
                    "severity": "high",
                    "confidence_score": 0.87,
                    "confidence_explanation": "same service",
                    "alerts": [
                        alert("5xx", "fp-5xx", "high", "grafana"),
                        alert("p99", "fp-p99", "warning", "grafana")
                    ],
                    "alert_sources": ["grafana"],
                    "services": []
                }]
            }),
        )
        .await?;

    let incident = &committed[0];
    assert_eq!(incident["alerts_count"], 2);
    assert_eq!(incident["is_predicted"], true);
    assert_eq!(incident["is_confirmed"], true);
    assert_eq!(incident["generated_summary"], "Errors and latency on payments");
    Ok(())
}

#[tokio::test]
async fn test_summary_generated_above_threshold() -> Result<()> {
    let server = TestServer::start_default().await?;
    let mut client = server.connect();

    let alerts = (0..6)
        .map(|i| alert(&format!("alert {}", i), &format!("fp-{}", i), "high", "zabbix"))
        .collect();
    let alert_ids = ingest(&mut client, alerts).await?;
    let incident = create_incident(&mut client, "Noisy cluster").await?;
    let id = incident["id"].clone();

    client
        .call("incidents/add_alerts", json!({ "incident_id": id, "alert_ids": alert_ids }))
        .await?;

    let mut summary = serde_json::Value::Null;
    for _ in 0..50 {
        let incident = client.call("incidents/get", json!({ "incident_id": id })).await?;
        if incident["generated_summary"].is_string() {
            summary = incident["generated_summary"].clone();
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let summary = summary.as_str().expect("summary was not generated");
    assert!(summary.starts_with("6 alert(s) with 6 distinct fingerprint(s) from zabbix"));
    Ok(())
}

#[tokio::test]
async fn test_validation_errors_use_invalid_params_code() -> Result<()> {
    let server = TestServer::start_default().await?;
    let mut client = server.connect();

    let error = client
        .call_err("incidents/create", json!({ "incident": { "user_generated_name": "" } }))
        .await?;
    assert_eq!(error["code"], -32602);

    let error = client.call_err("incidents/list", json!({ "limit": 0 })).await?;
    assert_eq!(error["code"], -32602);

    let incident = create_incident(&mut client, "Linked").await?;
    let error = client
        .call_err(
            "incidents/add_alerts",
            json!({ "incident_id": incident["id"], "alert_ids": [uuid::Uuid::new_v4()] }),
        )
        .await?;
    assert_eq!(error["code"], -32005);
    Ok(())
}
