//! Deployment commands: thin wrappers over the orchestrator facade's JSON
//! command surface (`POST/GET /api/v1/deployments/...`).

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

async fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn print_pretty(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn check_status(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("response body was not valid JSON")?;
    if !status.is_success() {
        bail!("request failed ({status}): {body}");
    }
    Ok(body)
}

pub async fn deploy(
    api_url: &str,
    module_name: &str,
    version: &str,
    environment: &str,
    requester_email: &str,
    strategy: Option<String>,
    require_approval: Option<bool>,
    force: bool,
) -> Result<()> {
    let body = json!({
        "moduleName": module_name,
        "version": version,
        "targetEnvironment": environment,
        "requesterEmail": requester_email,
        "strategy": strategy,
        "requireApproval": require_approval,
        "force": force,
    });

    let response = client()
        .await
        .post(format!("{api_url}/api/v1/deployments/"))
        .json(&body)
        .send()
        .await
        .context("failed to reach the orchestrator API")?;

    print_pretty(&check_status(response).await?)
}

pub async fn status(api_url: &str, execution_id: &str) -> Result<()> {
    let response = client()
        .await
        .get(format!("{api_url}/api/v1/deployments/{execution_id}"))
        .send()
        .await
        .context("failed to reach the orchestrator API")?;

    print_pretty(&check_status(response).await?)
}

pub async fn list(api_url: &str, module_name: Option<String>, environment: Option<String>, limit: u32) -> Result<()> {
    let mut query = vec![("limit".to_string(), limit.to_string())];
    if let Some(module_name) = module_name {
        query.push(("module_name".to_string(), module_name));
    }
    if let Some(environment) = environment {
        query.push(("environment".to_string(), environment));
    }

    let response = client()
        .await
        .get(format!("{api_url}/api/v1/deployments/"))
        .query(&query)
        .send()
        .await
        .context("failed to reach the orchestrator API")?;

    print_pretty(&check_status(response).await?)
}

pub async fn rollback(api_url: &str, execution_id: &str, actor_email: &str) -> Result<()> {
    let response = client()
        .await
        .post(format!("{api_url}/api/v1/deployments/{execution_id}/rollback"))
        .json(&json!({ "actorEmail": actor_email }))
        .send()
        .await
        .context("failed to reach the orchestrator API")?;

    print_pretty(&check_status(response).await?)
}

pub async fn decide_approval(
    api_url: &str,
    execution_id: &str,
    approver_email: &str,
    reason: Option<String>,
    approve: bool,
) -> Result<()> {
    let action = if approve { "approve" } else { "reject" };
    let response = client()
        .await
        .post(format!("{api_url}/api/v1/deployments/{execution_id}/{action}"))
        .json(&json!({ "approverEmail": approver_email, "reason": reason }))
        .send()
        .await
        .context("failed to reach the orchestrator API")?;

    print_pretty(&check_status(response).await?)
}

pub async fn cancel(api_url: &str, execution_id: &str, actor_email: &str) -> Result<()> {
    let response = client()
        .await
        .post(format!("{api_url}/api/v1/deployments/{execution_id}/cancel"))
        .json(&json!({ "actorEmail": actor_email }))
        .send()
        .await
        .context("failed to reach the orchestrator API")?;

    print_pretty(&check_status(response).await?)
}
