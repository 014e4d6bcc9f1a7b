use crate::auth;
use crate::error::AppError;
use crate::fees;
use crate::ipc::error::respond;
use crate::ipc::handlers::students::load_student;
use crate::ipc::helpers::{db_conn, parse_params, Page, PageParams};
use crate::ipc::types::{AppState, Request};
use crate::models::{FeeRecord, FEE_COLUMNS};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

fn handle_status(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let student = load_student(conn, &caller.id)?;
    let records = fees::list_for_student(conn, &caller.id)?;
    Ok(json!({
        "feePaid": student.fee_paid,
        "fees": records,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PayParams {
    #[serde(default)]
    fee_id: Option<String>,
}

fn handle_pay(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: PayParams = parse_params(req)?;
    // The account must still exist; fee rows alone outlive deleted students.
    load_student(conn, &caller.id)?;
    let fee = fees::pay(
        conn,
        &caller.id,
        p.fee_id.as_deref(),
        state.config.default_fee_amount,
    )?;
    Ok(json!({ "message": "Payment successful", "fee": fee }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateParams {
    student_id: String,
    #[serde(default)]
    amount: Option<f64>,
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: CreateParams = parse_params(req)?;
    load_student(conn, &p.student_id)?;
    let amount = p.amount.unwrap_or(state.config.default_fee_amount);
    let tx = conn.unchecked_transaction()?;
    let fee = fees::create_charge(&tx, &p.student_id, amount)?;
    tx.execute(
        "UPDATE students SET fee_paid = 0 WHERE id = ?",
        [&p.student_id],
    )?;
    tx.commit()?;
    info!(student_id = %p.student_id, admin_id = %admin.id, fee_id = %fee.id, amount, "fee charge created");
    Ok(json!({ "fee": fee }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListParams {
    #[serde(default)]
    paid: Option<bool>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ListParams = parse_params(req)?;
    let page = Page::from_params(
        PageParams {
            page: p.page,
            limit: p.limit,
        },
        state.config.page_limit_max,
    )?;
    let paid_filter = p.paid.map(|b| b as i64);

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fees WHERE ?1 IS NULL OR paid = ?1",
        [paid_filter],
        |r| r.get(0),
    )?;

    let columns = FEE_COLUMNS
        .split(", ")
        .map(|c| format!("f.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, s.name, s.email, s.student_code
         FROM fees f LEFT JOIN students s ON s.id = f.student_id
         WHERE ?1 IS NULL OR f.paid = ?1
         ORDER BY f.created_at DESC, f.rowid DESC
         LIMIT ?2 OFFSET ?3",
        columns
    ))?;
    let rows = stmt
        .query_map((paid_filter, page.limit, page.offset()), |r| {
            let fee = FeeRecord::from_row(r)?;
            let name: Option<String> = r.get(6)?;
            let email: Option<String> = r.get(7)?;
            let code: Option<String> = r.get(8)?;
            let mut v = json!(fee);
            v["student"] = match name {
                Some(name) => json!({ "name": name, "email": email, "studentId": code }),
                None => serde_json::Value::Null,
            };
            Ok(v)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "fees": rows,
        "total": total,
        "totalPages": page.total_pages(total),
        "currentPage": page.page,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateParams {
    fee_id: String,
    #[serde(default)]
    paid: Option<bool>,
    #[serde(default)]
    amount: Option<f64>,
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: UpdateParams = parse_params(req)?;
    if p.paid.is_none() && p.amount.is_none() {
        return Err(AppError::invalid("nothing to update"));
    }
    let fee = fees::update(conn, &p.fee_id, p.paid, p.amount)?;
    info!(fee_id = %fee.id, admin_id = %admin.id, paid = fee.paid, amount = fee.amount, "fee updated");
    Ok(json!({ "fee": fee }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "fees.status" => handle_status(state, req),
        "fees.pay" => handle_pay(state, req),
        "fees.create" => handle_create(state, req),
        "fees.list" => handle_list(state, req),
        "fees.update" => handle_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
