mod test_support;

use serde_json::{json, Value};
use std::sync::{Arc, Barrier};
use std::thread;
use test_support::{spawn_sidecar, spawn_sidecar_with_env, temp_dir};

#[test]
fn paying_the_same_fee_twice_changes_nothing() {
    let workspace = temp_dir("colleged-fees-idempotent");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();
    let (student, _) = sc.register_student("Payer", "payer@example.com", "BCom");

    let charge = sc.ok(
        "fees.create",
        json!({ "studentId": student["id"], "amount": 1200 }),
        Some(&admin),
    );
    let fee_id = charge["fee"]["id"].clone();
    assert_eq!(charge["fee"]["paid"], false);

    let first = sc.ok("fees.pay", json!({ "feeId": fee_id }), Some(&student));
    assert_eq!(first["fee"]["paid"], true);
    let stamped = first["fee"]["paymentDate"].clone();
    assert!(stamped.is_string());

    let second = sc.ok("fees.pay", json!({ "feeId": fee_id }), Some(&student));
    assert_eq!(second["fee"]["paymentDate"], stamped);

    let status = sc.ok("fees.status", json!({}), Some(&student));
    assert_eq!(status["fees"].as_array().expect("fees").len(), 1);
    assert_eq!(status["feePaid"], true);
}

#[test]
fn paying_without_an_id_settles_oldest_then_creates_default_charge() {
    let workspace = temp_dir("colleged-fees-default");
    let mut sc = spawn_sidecar_with_env(&[("COLLEGED_DEFAULT_FEE", "750")]);
    sc.open(&workspace);
    let admin = sc.login_admin();
    let (student, _) = sc.register_student("Payer Two", "payer2@example.com", "BCom");

    let older = sc.ok("fees.create", json!({ "studentId": student["id"], "amount": 100 }), Some(&admin));
    let _newer = sc.ok("fees.create", json!({ "studentId": student["id"], "amount": 200 }), Some(&admin));

    let paid = sc.ok("fees.pay", json!({}), Some(&student));
    assert_eq!(paid["fee"]["id"], older["fee"]["id"]);
    let status = sc.ok("fees.status", json!({}), Some(&student));
    assert_eq!(status["feePaid"], false);

    sc.ok("fees.pay", json!({}), Some(&student));
    let created = sc.ok("fees.pay", json!({}), Some(&student));
    assert_eq!(created["fee"]["amount"], 750.0);
    assert_eq!(created["fee"]["paid"], true);

    let status = sc.ok("fees.status", json!({}), Some(&student));
    assert_eq!(status["fees"].as_array().expect("fees").len(), 3);
    assert_eq!(status["feePaid"], true);
}

#[test]
fn foreign_fee_and_admin_edits() {
    let workspace = temp_dir("colleged-fees-admin");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();
    let (a, _) = sc.register_student("A", "a@example.com", "BA");
    let (b, _) = sc.register_student("B", "b@example.com", "BA");

    let charge = sc.ok("fees.create", json!({ "studentId": a["id"] }), Some(&admin));
    assert_eq!(charge["fee"]["amount"], 5000.0);
    let fee_id = charge["fee"]["id"].clone();

    assert_eq!(sc.err("fees.pay", json!({ "feeId": fee_id }), Some(&b)), "unauthorized");
    assert_eq!(sc.err("fees.pay", json!({ "feeId": "missing" }), Some(&a)), "not_found");

    let marked = sc.ok("fees.update", json!({ "feeId": fee_id, "paid": true }), Some(&admin));
    assert!(marked["fee"]["paymentDate"].is_string());
    let reopened = sc.ok("fees.update", json!({ "feeId": fee_id, "paid": false }), Some(&admin));
    assert!(reopened["fee"]["paymentDate"].is_null());
    assert_eq!(
        sc.err("fees.update", json!({ "feeId": fee_id, "studentId": "x" }), Some(&admin)),
        "invalid_input"
    );

    let listed = sc.ok("fees.list", json!({ "limit": 1 }), Some(&admin));
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["fees"][0]["student"]["name"], "A");
}

#[test]
fn racing_payers_settle_each_fee_once() {
    let workspace = temp_dir("colleged-fees-race");
    let (student, fee_ids) = {
        let mut sc = spawn_sidecar();
        sc.open(&workspace);
        let admin = sc.login_admin();
        let (student, _) = sc.register_student("Racer", "racer@example.com", "BSc");
        let fee_ids: Vec<Value> = (0..5)
            .map(|i| {
                let charge = sc.ok(
                    "fees.create",
                    json!({ "studentId": student["id"], "amount": 100 + i }),
                    Some(&admin),
                );
                charge["fee"]["id"].clone()
            })
            .collect();
        (student, fee_ids)
    };

    let barrier = Arc::new(Barrier::new(2));
    let payers: Vec<_> = (0..2)
        .map(|_| {
            let workspace = workspace.clone();
            let student = student.clone();
            let fee_ids = fee_ids.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut sc = spawn_sidecar();
                sc.open(&workspace);
                fee_ids
                    .iter()
                    .map(|fee_id| {
                        barrier.wait();
                        let paid = sc.ok("fees.pay", json!({ "feeId": fee_id }), Some(&student));
                        assert_eq!(paid["fee"]["id"], *fee_id);
                        assert_eq!(paid["fee"]["paid"], true);
                        paid["fee"]["paymentDate"].clone()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let dates: Vec<Vec<Value>> = payers.into_iter().map(|p| p.join().expect("payer")).collect();
    assert!(dates[0].iter().all(Value::is_string));
    assert_eq!(dates[0], dates[1], "both payers must see the first payment's date");

    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let status = sc.ok("fees.status", json!({}), Some(&student));
    let fees = status["fees"].as_array().expect("fees");
    assert_eq!(fees.len(), 5, "no extra charge was created");
    assert!(fees.iter().all(|f| f["paid"] == true));
    assert_eq!(status["feePaid"], true);
}
