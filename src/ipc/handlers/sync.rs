use crate::config::{SyncConfig, SYNC_CONFIG_KEY};
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::sync::policy::SyncPolicy;
use crate::sync::schema::SchemaInspector;
use crate::sync::session::{abort, SourcePool};
use crate::sync::{run_session, EventSink, SyncError, SyncRequest};
use serde_json::json;
use std::time::Duration;

fn saved_config(state: &AppState) -> Result<Option<serde_json::Value>, HandlerErr> {
    match state.db.as_ref() {
        Some(conn) => db::settings_get_json(conn, SYNC_CONFIG_KEY)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string())),
        None => Ok(None),
    }
}

/// Workspace setting, then environment overrides. Without a workspace only
/// the environment applies.
fn resolve_config(saved: Option<serde_json::Value>) -> Result<SyncConfig, SyncError> {
    let mut config = match saved {
        Some(v) => SyncConfig::from_value(&v)?,
        None => SyncConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

fn sync_configure(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let Some(raw) = params.get("config") else {
        return Err(HandlerErr::bad_params("missing config"));
    };
    let config = SyncConfig::from_value(raw)?;
    config.validate()?;
    let stored = serde_json::to_value(&config)
        .map_err(|e| HandlerErr::new("bad_params", e.to_string()))?;
    db::settings_set_json(conn, SYNC_CONFIG_KEY, &stored)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    tracing::info!(
        source = %config.source.path.to_string_lossy(),
        destination = %config.destination.path.to_string_lossy(),
        "sync configuration saved"
    );
    Ok(json!({
        "config": stored,
        "schemas": config.source.schema_names(),
    }))
}

fn sync_list_tables(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let config = resolve_config(saved_config(state)?)?;
    config.validate()?;
    let pool = SourcePool::open(
        &config.source,
        Duration::from_millis(config.busy_timeout_ms),
    )?;

    let mut schemas = Vec::new();
    {
        let Some(conn) = pool.conn() else {
            return Err(HandlerErr::new("sync_unreachable", "source store is closed"));
        };
        for schema in config.source.schema_names() {
            let tables = SchemaInspector::new(conn, &schema)
                .tables()
                .map_err(SyncError::from)?;
            let tables: Vec<serde_json::Value> = tables
                .iter()
                .map(|t| json!({ "name": t, "policy": SyncPolicy::classify(t).as_str() }))
                .collect();
            schemas.push(json!({ "schemaName": schema, "tables": tables }));
        }
    }
    pool.close()?;
    Ok(json!({ "schemas": schemas }))
}

fn sync_run(
    state: &mut AppState,
    params: &serde_json::Value,
    events: &mut dyn EventSink,
) -> Result<serde_json::Value, HandlerErr> {
    let request: SyncRequest = serde_json::from_value(params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid sync request: {}", e)))?;
    request.authorize()?;
    let tables = request.tables();

    // Configuration problems are reported on the stream, not as a failed call.
    let summary = match resolve_config(saved_config(state)?) {
        Ok(config) => run_session(&config, &tables, events),
        Err(e) => abort(&e, events),
    };
    serde_json::to_value(&summary).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    events: &mut dyn EventSink,
) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sync.configure" => sync_configure(state, &req.params),
        "sync.listTables" => sync_list_tables(state),
        "sync.run" => sync_run(state, &req.params, events),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
