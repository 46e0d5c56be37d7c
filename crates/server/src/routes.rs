use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use flowmesh_core::ProcessId;
use flowmesh_dsl::FlowDefinition;
use flowmesh_secret::SecretType;
use flowmesh_trigger::mount::rest_trigger_data;
use flowmesh_trigger::soap_codec;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/flow", axum::routing::post(deploy_flow))
        .route("/v1/test", axum::routing::post(test_flow))
        .route("/api/v1/processes", axum::routing::get(list_processes))
        .route("/api/v1/processes/:id", axum::routing::delete(delete_process))
        .route("/api/v1/processes/:id/deploy", axum::routing::post(deploy_process))
        .route("/api/v1/processes/:id/stop", axum::routing::post(stop_process))
        .route("/api/v1/processes/:id/reset", axum::routing::post(reset_process))
        .route("/api/v1/secrets", axum::routing::get(list_secrets).post(create_secret))
        .route("/api/v1/secrets/:name", axum::routing::delete(delete_secret))
        .route("/triggers/*path", axum::routing::any(rest_dispatch))
        .route("/soap/*path", axum::routing::any(soap_dispatch))
        .with_state(state)
}

async fn deploy_flow(State(state): State<AppState>, body: String) -> Result<Json<Value>, ApiError> {
    let definition = FlowDefinition::from_json(&body)?;
    state.processes.save(definition.clone()).await?;
    let record = state.processes.deploy(&definition.id).await?;
    state.manager.deploy(record.definition.clone()).await?;
    Ok(Json(json!({ "process_id": record.definition.id.as_str(), "status": "deployed" })))
}

#[derive(Deserialize)]
struct TestRequest {
    definition: FlowDefinition,
    #[serde(default)]
    trigger_data: Value,
}

async fn test_flow(State(state): State<AppState>, Json(request): Json<TestRequest>) -> Result<Json<Value>, ApiError> {
    let (ctx, result) = state.executor.execute(&request.definition, request.trigger_data).await;
    result?;
    Ok(Json(json!({ "execution_id": ctx.execution_id.to_string(), "nodes": ctx.nodes() })))
}

async fn list_processes(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let records = state.processes.list().await?;
    Ok(Json(serde_json::to_value(records).unwrap_or(Value::Null)))
}

async fn delete_process(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let id = ProcessId::new(id);
    state.manager.stop(&id).await?;
    state.processes.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deploy_process(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = ProcessId::new(id);
    let record = state.processes.deploy(&id).await?;
    state.manager.deploy(record.definition.clone()).await?;
    Ok(Json(json!({ "process_id": id.as_str(), "status": "deployed" })))
}

async fn stop_process(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = ProcessId::new(id);
    state.manager.stop(&id).await?;
    state.processes.stop(&id).await?;
    Ok(Json(json!({ "process_id": id.as_str(), "status": "stopped" })))
}

async fn reset_process(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = ProcessId::new(id);
    state.manager.stop(&id).await?;
    state.processes.reset(&id).await?;
    Ok(Json(json!({ "process_id": id.as_str(), "status": "draft" })))
}

async fn list_secrets(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summaries = state.secrets.list().await?;
    Ok(Json(serde_json::to_value(summaries).unwrap_or(Value::Null)))
}

#[derive(Deserialize)]
struct CreateSecretRequest {
    name: String,
    secret_type: SecretType,
    value: Value,
    #[serde(default)]
    metadata: Value,
}

async fn create_secret(State(state): State<AppState>, Json(request): Json<CreateSecretRequest>) -> Result<Json<Value>, ApiError> {
    let plaintext = serde_json::to_vec(&request.value).map_err(|e| flowmesh_error::FlowError::config(format!("secret value not serializable: {e}")))?;
    let encrypted = flowmesh_secret::crypto::encrypt(&state.master_key, &plaintext)?;
    let id = state.secrets.upsert(&request.name, request.secret_type, encrypted, request.metadata).await?;
    Ok(Json(json!({ "id": id.as_str(), "name": request.name })))
}

async fn delete_secret(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, ApiError> {
    state.secrets.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// First-value-per-key header map as a JSON object of strings. Headers
/// that aren't valid UTF-8 are skipped rather than failing the request.
fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.entry(name.as_str().to_owned()).or_insert_with(|| Value::String(value.to_owned()));
        }
    }
    Value::Object(map)
}

fn auth_header(headers: &HeaderMap) -> Value {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map_or(Value::Null, |v| Value::String(v.to_owned()))
}

async fn rest_dispatch(State(state): State<AppState>, method: Method, Path(path): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let path = format!("/{path}");
    let mount = state
        .rest
        .lookup(method.as_str(), &path)
        .or_else(|| state.rest.lookup("POST", &path));
    let Some(mount) = mount else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": format!("no rest trigger mounted at {method} {path}") }))).into_response();
    };

    let body_json = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(err) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid JSON body: {err}") }))).into_response();
            }
        }
    };

    let data = rest_trigger_data(method.as_str(), &headers_to_json(&headers), &body_json, &auth_header(&headers));
    let (ctx, result) = mount.executor.execute(&mount.definition, data).await;
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({ "execution_id": ctx.execution_id.to_string(), "nodes": ctx.nodes() }))).into_response(),
        Err(err) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": err.to_string() }))).into_response(),
    }
}

async fn soap_dispatch(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = format!("/{path}");
    let Some(mount) = state.soap.lookup(&path) else {
        return (
            StatusCode::NOT_FOUND,
            [("content-type", "text/xml")],
            soap_codec::fault_xml(&format!("no soap trigger mounted at {path}")),
        )
            .into_response();
    };

    if query.contains_key("wsdl") {
        return match mount.wsdl.clone() {
            Some(wsdl) => ([("content-type", "text/xml")], wsdl).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                [("content-type", "text/xml")],
                soap_codec::fault_xml(&format!("no wsdl configured at {path}")),
            )
                .into_response(),
        };
    }

    if method != Method::POST {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [("content-type", "text/xml")],
            soap_codec::fault_xml(&format!("{method} not allowed, only POST")),
        )
            .into_response();
    }

    let body_xml = match soap_codec::body_inner_xml(&body) {
        Ok(inner) => inner,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, [("content-type", "text/xml")], soap_codec::fault_xml(&err.to_string())).into_response();
        }
    };

    let soap_action = headers
        .get("soapaction")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_owned())
        .unwrap_or_default();

    let data = json!({ "method": soap_action, "body": body_xml });
    let (ctx, result) = mount.executor.execute(&mount.definition, data).await;
    match result {
        Ok(()) => {
            let nodes = serde_json::to_value(ctx.nodes()).unwrap_or(Value::Null);
            let envelope = format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?><soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body><Response><executionId>{}</executionId><result>{}</result></Response></soap:Body></soap:Envelope>",
                ctx.execution_id,
                nodes
            );
            ([("content-type", "text/xml")], envelope).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", "text/xml")], soap_codec::fault_xml(&err.to_string())).into_response(),
    }
}
