mod test_support;

use base64::Engine;
use serde_json::json;
use test_support::{decode_base64, spawn_sidecar, temp_dir};

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[test]
fn uploaded_result_file_is_stored_and_downloadable_by_owner() {
    let workspace = temp_dir("colleged-uploads-results");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();
    let (owner, _) = sc.register_student("Owner", "owner@example.com", "BSc");
    let (other, _) = sc.register_student("Other", "other@example.com", "BSc");

    let content = b"%PDF-1.4 marksheet";
    let uploaded = sc.ok(
        "results.upload",
        json!({
            "studentId": owner["id"],
            "semester": 3,
            "fileName": "../sem3 marks.pdf",
            "contentBase64": b64(content)
        }),
        Some(&admin),
    );
    let result = &uploaded["result"];
    assert_eq!(result["kind"], "file");
    let rel = result["filePath"].as_str().expect("filePath");
    assert!(rel.starts_with("uploads/results/"), "{}", rel);
    assert!(!rel.contains(".."), "{}", rel);
    assert_eq!(std::fs::read(workspace.join(rel)).expect("stored"), content);
    assert_eq!(result["checksum"].as_str().expect("checksum").len(), 64);

    let id = result["id"].clone();
    let dl = sc.ok("results.download", json!({ "resultId": id }), Some(&owner));
    assert_eq!(dl["contentType"], "application/pdf");
    assert_eq!(decode_base64(&dl["contentBase64"]), content);
    assert_eq!(sc.err("results.download", json!({ "resultId": id }), Some(&other)), "not_found");
    assert_eq!(
        sc.err("results.update", json!({ "resultId": id, "subjects": [{ "name": "m", "marks": 1 }] }), Some(&admin)),
        "invalid_input"
    );

    sc.ok("results.delete", json!({ "resultId": id }), Some(&admin));
    assert!(!workspace.join(rel).exists());
    assert_eq!(
        sc.err("results.upload", json!({ "studentId": owner["id"], "semester": 1 }), Some(&admin)),
        "invalid_input"
    );
}

#[test]
fn latest_admit_card_upload_wins() {
    let workspace = temp_dir("colleged-uploads-admit");
    let staged = workspace.join("staged-card.png");
    std::fs::write(&staged, b"second card").expect("stage file");

    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();
    let (student, _) = sc.register_student("Holder", "holder@example.com", "BA");

    assert_eq!(sc.err("admitCards.my", json!({}), Some(&student)), "not_found");

    sc.ok(
        "admitCards.upload",
        json!({ "studentId": student["id"], "fileName": "first.pdf", "contentBase64": b64(b"first card") }),
        Some(&admin),
    );
    std::thread::sleep(std::time::Duration::from_millis(5));
    sc.ok(
        "admitCards.upload",
        json!({ "studentId": student["id"], "sourcePath": staged.to_string_lossy() }),
        Some(&admin),
    );

    let mine = sc.ok("admitCards.my", json!({}), Some(&student));
    assert_eq!(mine["filename"], "staged-card.png");
    assert_eq!(mine["contentType"], "image/png");
    assert_eq!(decode_base64(&mine["contentBase64"]), b"second card");

    sc.ok("students.delete", json!({ "studentId": student["id"] }), Some(&admin));
    let leftover = std::fs::read_dir(workspace.join("uploads").join("admitcards"))
        .expect("admit card dir")
        .count();
    assert_eq!(leftover, 0);
}
