use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::layout::{Canvas, LayoutContext, MarginSettings, PageGeometry};
use crate::report::compose::{
    layout_context, preview_student, render_class_pdf, render_student_pdf,
};
use crate::report::model::SchoolInfo;
use crate::report::{bundle, data, ledger};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

fn out_path(params: &serde_json::Value) -> Result<PathBuf, HandlerErr> {
    get_required_str(params, "outPath").map(PathBuf::from)
}

fn query_failed(e: anyhow::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", format!("{e:#}"))
}

fn report_failed(e: anyhow::Error) -> HandlerErr {
    HandlerErr::new("report_failed", format!("failed to generate document: {e:#}"))
}

fn page_geometry(params: &serde_json::Value) -> Result<PageGeometry, HandlerErr> {
    match params.get("pageSize").and_then(|v| v.as_str()) {
        None => Ok(PageGeometry::A4),
        Some(name) => PageGeometry::named(name).ok_or_else(|| {
            HandlerErr::bad_params("pageSize must be one of: A4, F4")
                .with_details(json!({ "pageSize": name }))
        }),
    }
}

fn report_context(conn: &Connection, params: &serde_json::Value) -> Result<LayoutContext, HandlerErr> {
    let page = page_geometry(params)?;
    let margins = data::load_margins(conn).map_err(query_failed)?;
    if !margins.is_usable_on(page) {
        return Err(HandlerErr::bad_params("saved margins leave no room on this page size")
            .with_details(json!({ "margins": margins })));
    }
    Ok(layout_context(page, margins))
}

fn class_label(conn: &Connection, class_id: &str) -> Result<String, HandlerErr> {
    data::class_name(conn, class_id)
        .map_err(query_failed)?
        .ok_or_else(|| HandlerErr::new("not_found", "class not found"))
}

fn settings_get(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let margins = data::load_margins(conn).map_err(query_failed)?;
    let school = data::load_school(conn).map_err(query_failed)?;
    Ok(json!({ "margins": margins, "school": school }))
}

fn settings_set(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    if let Some(raw) = params.get("margins") {
        let margins: MarginSettings = serde_json::from_value(raw.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid margins: {}", e)))?;
        let page = page_geometry(params)?;
        if !margins.is_usable_on(page) {
            return Err(HandlerErr::bad_params("margins leave no room on the page")
                .with_details(json!({ "margins": margins })));
        }
        db::settings_set_json(conn, data::MARGINS_KEY, &json!(margins))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(raw) = params.get("school") {
        let school: SchoolInfo = serde_json::from_value(raw.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid school: {}", e)))?;
        db::settings_set_json(conn, data::SCHOOL_KEY, &json!(school))
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    settings_get(conn)
}

fn student_pdf(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let out = out_path(params)?;
    let ctx = report_context(conn, params)?;
    let school = data::load_school(conn).map_err(query_failed)?;
    let report = data::load_report(conn, &school, &student_id)
        .map_err(query_failed)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;

    let pdf = render_student_pdf(&ctx, &report);
    let pages = pdf.page_count();
    pdf.save(&out).map_err(report_failed)?;
    tracing::info!(student = %student_id, pages, "student report written");
    Ok(json!({
        "path": out.to_string_lossy(),
        "pages": pages,
    }))
}

fn class_pdf(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let out = out_path(params)?;
    let ctx = report_context(conn, params)?;
    let class_name = class_label(conn, &class_id)?;
    let reports = data::load_class_reports(conn, &class_id).map_err(query_failed)?;
    if reports.is_empty() {
        return Err(HandlerErr::new("not_found", "class has no students"));
    }

    let (pdf, spans) = render_class_pdf(&ctx, &class_name, &reports);
    let pages = pdf.page_count();
    pdf.save(&out).map_err(report_failed)?;
    let students: Vec<serde_json::Value> = reports
        .iter()
        .zip(&spans)
        .map(|(r, span)| json!({ "studentId": r.student.id, "name": r.student.name, "pages": span }))
        .collect();
    tracing::info!(class = %class_id, pages, "class report written");
    Ok(json!({
        "path": out.to_string_lossy(),
        "pages": pages,
        "students": students,
    }))
}

fn class_bundle(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let out = out_path(params)?;
    let ctx = report_context(conn, params)?;
    let class_name = class_label(conn, &class_id)?;
    let reports = data::load_class_reports(conn, &class_id).map_err(query_failed)?;
    if reports.is_empty() {
        return Err(HandlerErr::new("not_found", "class has no students"));
    }
    let summary =
        bundle::export_class_bundle(&ctx, &class_name, &reports, &out).map_err(report_failed)?;
    Ok(json!({
        "path": out.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "entries": summary.entries,
    }))
}

fn ledger_xlsx(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let out = out_path(params)?;
    let ledger = ledger::load_ledger(conn, &class_id)
        .map_err(query_failed)?
        .ok_or_else(|| HandlerErr::new("not_found", "class not found"))?;
    ledger::save_ledger(&ledger, &out).map_err(report_failed)?;
    Ok(json!({
        "path": out.to_string_lossy(),
        "students": ledger.rows.len(),
        "subjects": ledger.subjects,
    }))
}

fn layout_preview(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let ctx = report_context(conn, params)?;
    let school = data::load_school(conn).map_err(query_failed)?;
    let report = data::load_report(conn, &school, &student_id)
        .map_err(query_failed)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    let (canvas, span) = preview_student(&ctx, &report);
    Ok(json!({
        "span": span,
        "pageCount": canvas.page_count(),
        "document": canvas,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "reports.settings.get" => |conn, _| settings_get(conn),
            "reports.settings.set" => settings_set,
            "reports.studentPdf" => student_pdf,
            "reports.classPdf" => class_pdf,
            "reports.classBundle" => class_bundle,
            "reports.ledgerXlsx" => ledger_xlsx,
            "reports.layoutPreview" => layout_preview,
            _ => return None,
        };
    let result = db_conn(state).and_then(|conn| handler(conn, &req.params));
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
