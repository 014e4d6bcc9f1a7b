use crate::db;
use crate::error::AppError;
use crate::models::{FeeRecord, FEE_COLUMNS};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::info;
use uuid::Uuid;

pub fn get_fee(conn: &Connection, fee_id: &str) -> Result<Option<FeeRecord>, AppError> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM fees WHERE id = ?", FEE_COLUMNS),
            [fee_id],
            FeeRecord::from_row,
        )
        .optional()?)
}

pub fn list_for_student(conn: &Connection, student_id: &str) -> Result<Vec<FeeRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM fees WHERE student_id = ? ORDER BY created_at DESC, rowid DESC",
        FEE_COLUMNS
    ))?;
    let rows = stmt
        .query_map([student_id], FeeRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_charge(conn: &Connection, student_id: &str, amount: f64) -> Result<FeeRecord, AppError> {
    validate_amount(amount)?;
    let fee = FeeRecord {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        amount,
        paid: false,
        payment_date: None,
        created_at: db::now_ts(),
    };
    conn.execute(
        "INSERT INTO fees(id, student_id, amount, paid, payment_date, created_at)
         VALUES(?, ?, ?, 0, NULL, ?)",
        (&fee.id, &fee.student_id, fee.amount, &fee.created_at),
    )?;
    Ok(fee)
}

pub fn validate_amount(amount: f64) -> Result<(), AppError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::invalid("amount must be a non-negative number"));
    }
    Ok(())
}

/// Pays a fee on behalf of `student_id`.
///
/// With `fee_id`, that record is paid if it is still pending; paying it again
/// changes nothing. Without `fee_id`, the oldest pending record is paid, or a
/// new pre-paid record of `default_amount` is created when none is pending.
pub fn pay(
    conn: &Connection,
    student_id: &str,
    fee_id: Option<&str>,
    default_amount: f64,
) -> Result<FeeRecord, AppError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let now = db::now_ts();

    let paid_id = match fee_id {
        Some(fee_id) => {
            let owner: Option<String> = tx
                .query_row("SELECT student_id FROM fees WHERE id = ?", [fee_id], |r| r.get(0))
                .optional()?;
            match owner {
                None => return Err(AppError::not_found("fee")),
                Some(owner) if owner != student_id => {
                    return Err(AppError::unauthorized("fee belongs to another student"))
                }
                Some(_) => {}
            }
            let changed = tx.execute(
                "UPDATE fees SET paid = 1, payment_date = ? WHERE id = ? AND paid = 0",
                (&now, fee_id),
            )?;
            if changed == 0 {
                info!(fee_id, "fee already paid; nothing to do");
            }
            fee_id.to_string()
        }
        None => {
            let oldest: Option<String> = tx
                .query_row(
                    "UPDATE fees SET paid = 1, payment_date = ?1
                     WHERE id = (
                       SELECT id FROM fees
                       WHERE student_id = ?2 AND paid = 0
                       ORDER BY created_at, rowid
                       LIMIT 1
                     )
                     RETURNING id",
                    (&now, student_id),
                    |r| r.get(0),
                )
                .optional()?;
            match oldest {
                Some(id) => id,
                None => {
                    validate_amount(default_amount)?;
                    let id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO fees(id, student_id, amount, paid, payment_date, created_at)
                         VALUES(?1, ?2, ?3, 1, ?4, ?4)",
                        (&id, student_id, default_amount, &now),
                    )?;
                    id
                }
            }
        }
    };

    sync_student_flag(&tx, student_id)?;
    let fee = get_fee(&tx, &paid_id)?.ok_or_else(|| AppError::not_found("fee"))?;
    tx.commit()?;
    info!(student_id, fee_id = %fee.id, amount = fee.amount, "fee paid");
    Ok(fee)
}

/// Admin edit of a fee record. Stamps the payment date only on false→true and
/// clears it when the record goes back to pending.
pub fn update(
    conn: &Connection,
    fee_id: &str,
    paid: Option<bool>,
    amount: Option<f64>,
) -> Result<FeeRecord, AppError> {
    if let Some(a) = amount {
        validate_amount(a)?;
    }
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let current = get_fee(&tx, fee_id)?.ok_or_else(|| AppError::not_found("fee"))?;

    let new_paid = paid.unwrap_or(current.paid);
    let payment_date = match (current.paid, new_paid) {
        (false, true) => Some(db::now_ts()),
        (_, false) => None,
        (true, true) => current.payment_date.clone(),
    };
    tx.execute(
        "UPDATE fees SET paid = ?, payment_date = ?, amount = ? WHERE id = ?",
        (
            new_paid as i64,
            &payment_date,
            amount.unwrap_or(current.amount),
            fee_id,
        ),
    )?;
    sync_student_flag(&tx, &current.student_id)?;
    let fee = get_fee(&tx, fee_id)?.ok_or_else(|| AppError::not_found("fee"))?;
    tx.commit()?;
    Ok(fee)
}

/// The student's `fee_paid` convenience flag follows "no pending fee records".
fn sync_student_flag(conn: &Connection, student_id: &str) -> Result<(), AppError> {
    conn.execute(
        "UPDATE students
         SET fee_paid = NOT EXISTS(SELECT 1 FROM fees WHERE student_id = ?1 AND paid = 0)
         WHERE id = ?1",
        [student_id],
    )?;
    Ok(())
}
