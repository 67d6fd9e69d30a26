use anyhow::Result;
use serde_json::json;

use incidentd::config::{AuthMode, Settings};

mod common;
use common::TestServer;

fn tenant_settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth.mode = AuthMode::Tenant;
    settings
}

#[tokio::test]
async fn test_tenants_do_not_see_each_other() -> Result<()> {
    let server = TestServer::start(tenant_settings()).await?;
    let mut client = server.connect();

    let incident = client
        .call(
            "incidents/create",
            json!({ "tenant_id": "acme", "incident": { "user_generated_name": "Acme outage" } }),
        )
        .await?;

    let error = client
        .call_err(
            "incidents/get",
            json!({ "tenant_id": "globex", "incident_id": incident["id"] }),
        )
        .await?;
    assert_eq!(error["code"], -32004);

    let page = client.call("incidents/list", json!({ "tenant_id": "globex" })).await?;
    assert_eq!(page["count"], 0);

    let page = client.call("incidents/list", json!({ "tenant_id": "acme" })).await?;
    assert_eq!(page["count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_alerts_cannot_be_linked_across_tenants() -> Result<()> {
    let server = TestServer::start(tenant_settings()).await?;
    let mut client = server.connect();

    let ingested = client
        .call(
            "alerts/ingest",
            json!({ "tenant_id": "acme", "alerts": [common::alert("cpu", "fp", "high", "prom")] }),
        )
        .await?;
    let incident = client
        .call(
            "incidents/create",
            json!({ "tenant_id": "globex", "incident": { "user_generated_name": "Globex" } }),
        )
        .await?;

    let error = client
        .call_err(
            "incidents/add_alerts",
            json!({
                "tenant_id": "globex",
                "incident_id": incident["id"],
                "alert_ids": ingested["alert_ids"]
            }),
        )
        .await?;
    assert_eq!(error["code"], -32005);
    Ok(())
}

#[tokio::test]
async fn test_tenant_mode_requires_tenant_id() -> Result<()> {
    let server = TestServer::start(tenant_settings()).await?;
    let mut client = server.connect();

    let error = client.call_err("incidents/meta", json!({})).await?;
    assert_eq!(error["code"], -32007);

    // health is not tenant scoped
    let health = client.call("incidentd/health", json!({})).await?;
    assert_eq!(health["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_no_auth_ignores_requested_tenant() -> Result<()> {
    let server = TestServer::start_default().await?;
    let mut client = server.connect();

    client
        .call(
            "incidents/create",
            json!({ "tenant_id": "acme", "incident": { "user_generated_name": "Shared" } }),
        )
        .await?;
    let page = client.call("incidents/list", json!({ "tenant_id": "globex" })).await?;
    assert_eq!(page["count"], 1);
    Ok(())
}

#[tokio::test]
async fn test_notifications_stay_within_tenant() -> Result<()> {
    let server = TestServer::start(tenant_settings()).await?;
    let mut alpha = server.connect();
    let mut bravo = server.connect();

    let subscribed = bravo
        .call("incidents/subscribe", json!({ "tenant_id": "bravo" }))
        .await?;
    assert_eq!(subscribed["channel"], "private-bravo");

    alpha
        .call(
            "incidents/create",
            json!({
                "tenant_id": "alpha",
                "incident": {
                    "user_generated_name": "Payroll DB",
                    "user_summary": "payroll db creds rotated"
                }
            }),
        )
        .await?;
    let own = alpha.notification("incidents/workflow").await?;
    assert_eq!(own["params"]["tenant_id"], "alpha");

    // bravo's own change is queued after alpha's, so anything leaked would arrive first
    let incident = bravo
        .call(
            "incidents/create",
            json!({ "tenant_id": "bravo", "incident": { "user_generated_name": "Bravo API" } }),
        )
        .await?;

    let change = bravo.notification("incidents/change").await?;
    assert_eq!(change["params"]["channel"], "private-bravo");
    let workflow = bravo.notification("incidents/workflow").await?;
    assert_eq!(workflow["params"]["tenant_id"], "bravo");
    assert_eq!(workflow["params"]["incident"]["id"], incident["id"]);
    Ok(())
}

#[tokio::test]
async fn test_connection_without_tenant_gets_no_notifications() -> Result<()> {
    let server = TestServer::start(tenant_settings()).await?;
    let mut actor = server.connect();
    let mut idle = server.connect();

    // health carries no tenant, so it does not subscribe
    idle.call("incidentd/health", json!({})).await?;

    actor
        .call(
            "incidents/create",
            json!({ "tenant_id": "acme", "incident": { "user_generated_name": "Acme" } }),
        )
        .await?;
    actor.notification("incidents/workflow").await?;

    let result = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        idle.notification("incidents/change"),
    )
    .await;
    assert!(result.is_err(), "unsubscribed connection received a notification");
    Ok(())
}
