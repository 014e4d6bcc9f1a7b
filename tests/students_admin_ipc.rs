mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, spawn_sidecar_with_env, temp_dir};

#[test]
fn registration_login_and_profile_flow() {
    let workspace = temp_dir("colleged-students-profile");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);

    let (student, code) = sc.register_student("Dev Patel", "Dev@Example.com", "BTech");
    let year = chrono::Local::now().format("%Y").to_string();
    assert_eq!(code, format!("STU{}0001", year));

    let caller = sc.login("dev@example.com", "password1");
    assert_eq!(caller, student);
    assert_eq!(
        sc.err("auth.login", json!({ "email": "dev@example.com", "password": "wrong-one" }), None),
        "unauthorized"
    );

    let profile = sc.ok("profile.get", json!({}), Some(&student));
    assert_eq!(profile["student"]["admissionStatus"], "Approved");
    assert_eq!(profile["student"]["studentCode"], code.as_str());
    assert!(profile["student"].get("passwordHash").is_none());

    let updated = sc.ok(
        "profile.update",
        json!({ "phone": "555-0100", "address": "12 Hill Rd" }),
        Some(&student),
    );
    assert_eq!(updated["student"]["phone"], "555-0100");
    assert_eq!(updated["student"]["name"], "Dev Patel");
    assert_eq!(
        sc.err("profile.update", json!({ "role": "admin" }), Some(&student)),
        "invalid_input"
    );

    let submitted = sc.ok(
        "admission.submit",
        json!({ "address": "12 Hill Rd", "phone": "555-0100", "dob": "2005-04-01" }),
        Some(&student),
    );
    assert_eq!(submitted["student"]["admissionStatus"], "Submitted");

    sc.ok(
        "auth.changePassword",
        json!({ "currentPassword": "password1", "newPassword": "password2" }),
        Some(&student),
    );
    sc.login("dev@example.com", "password2");
    assert_eq!(
        sc.err(
            "auth.changePassword",
            json!({ "currentPassword": "nope", "newPassword": "password3" }),
            Some(&student)
        ),
        "invalid_input"
    );
}

#[test]
fn admin_lists_filters_updates_and_deletes_students() {
    let workspace = temp_dir("colleged-students-admin");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();

    let (asha, _) = sc.register_student("Asha Rao", "asha@example.com", "BSc");
    let (_ben, _) = sc.register_student("Ben Stone", "ben@example.com", "BCom");
    let (_cara, _) = sc.register_student("Cara Rao", "cara@example.com", "BSc");

    let all = sc.ok("students.list", json!({}), Some(&admin));
    assert_eq!(all["total"], 3);
    assert_eq!(all["currentPage"], 1);
    assert_eq!(all["students"][0]["name"], "Cara Rao", "newest first");

    let rao = sc.ok("students.list", json!({ "search": "RAO" }), Some(&admin));
    assert_eq!(rao["total"], 2);

    let paged = sc.ok("students.list", json!({ "course": "BSc", "limit": 1, "page": 2 }), Some(&admin));
    assert_eq!(paged["total"], 2);
    assert_eq!(paged["totalPages"], 2);
    assert_eq!(paged["students"][0]["name"], "Asha Rao");

    let rejected = sc.ok(
        "students.update",
        json!({ "studentId": asha["id"], "admissionStatus": "Rejected" }),
        Some(&admin),
    );
    assert_eq!(rejected["student"]["admissionStatus"], "Rejected");
    // Rejected students can be approved again directly.
    let approved = sc.ok(
        "students.update",
        json!({ "studentId": asha["id"], "admissionStatus": "Approved", "feePaid": true }),
        Some(&admin),
    );
    assert_eq!(approved["student"]["admissionStatus"], "Approved");
    assert_eq!(approved["student"]["feePaid"], true);
    assert_eq!(
        sc.err(
            "students.update",
            json!({ "studentId": asha["id"], "admissionStatus": "Pending" }),
            Some(&admin)
        ),
        "invalid_input"
    );

    let paid = sc.ok("students.list", json!({ "feePaid": true }), Some(&admin));
    assert_eq!(paid["total"], 1);

    let stats = sc.ok("dashboard.stats", json!({}), Some(&admin));
    assert_eq!(stats["students"]["total"], 3);
    assert_eq!(stats["students"]["approved"], 3);
    assert_eq!(stats["fees"]["paidStudents"], 1);

    sc.ok("students.delete", json!({ "studentId": asha["id"] }), Some(&admin));
    assert_eq!(sc.err("profile.get", json!({}), Some(&asha)), "not_found");
    assert_eq!(
        sc.err("students.delete", json!({ "studentId": asha["id"] }), Some(&admin)),
        "not_found"
    );
    let left = sc.ok("students.list", json!({}), Some(&admin));
    assert_eq!(left["total"], 2);
}

#[test]
fn configured_admin_and_prefix_are_used() {
    let workspace = temp_dir("colleged-students-config");
    let mut sc = spawn_sidecar_with_env(&[
        ("COLLEGED_ADMIN_EMAIL", "registrar@campus.edu"),
        ("COLLEGED_ADMIN_PASSWORD", "letmein99"),
        ("COLLEGED_ID_PREFIX", "CLG"),
    ]);
    sc.open(&workspace);
    let admin = sc.login("registrar@campus.edu", "letmein99");
    assert_eq!(admin["role"], "admin");

    let (_, code) = sc.register_student("Eve", "eve@example.com", "BA");
    assert!(code.starts_with("CLG"), "{}", code);

    sc.ok(
        "auth.registerAdmin",
        json!({ "name": "Second Admin", "email": "second@campus.edu", "password": "secret99" }),
        Some(&admin),
    );
    let second = sc.login("second@campus.edu", "secret99");
    assert_eq!(second["role"], "admin");
}

#[test]
fn search_folds_accented_capitals_and_bad_pages_are_rejected() {
    let workspace = temp_dir("colleged-students-search");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();
    let (emile, _) = sc.register_student("Émile Zola", "emile@example.com", "BA");
    sc.register_student("Ada Byron", "ada@example.com", "BA");

    for query in ["Émile", "émile", "ÉMILE ZOLA"] {
        let found = sc.ok("students.list", json!({ "search": query }), Some(&admin));
        assert_eq!(found["total"], 1, "search {:?}", query);
        assert_eq!(found["students"][0]["id"], emile["id"]);
    }

    assert_eq!(
        sc.err("students.list", json!({ "page": i64::MAX, "limit": 10 }), Some(&admin)),
        "invalid_input"
    );
    assert_eq!(
        sc.err("fees.list", json!({ "page": i64::MAX, "limit": 10 }), Some(&admin)),
        "invalid_input"
    );
    // The process is still serving.
    let all = sc.ok("students.list", json!({}), Some(&admin));
    assert_eq!(all["total"], 2);

    assert_eq!(
        sc.err("students.delete", json!({ "studentId": emile["id"], "force": true }), Some(&admin)),
        "invalid_input"
    );
}
