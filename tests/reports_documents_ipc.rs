mod test_support;

use serde_json::json;
use std::io::{Cursor, Read};
use test_support::{decode_base64, spawn_sidecar, temp_dir};

fn sheet_xml(xlsx: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(xlsx)).expect("xlsx is a zip");
    let mut sheet = archive
        .by_name("xl/worksheets/sheet1.xml")
        .expect("sheet1 present");
    let mut xml = String::new();
    sheet.read_to_string(&mut xml).expect("read sheet");
    xml
}

#[test]
fn empty_reports_are_well_formed() {
    let workspace = temp_dir("colleged-reports-empty");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();

    let pdf = sc.ok("reports.students", json!({}), Some(&admin));
    assert_eq!(pdf["contentType"], "application/pdf");
    assert_eq!(pdf["filename"], "students_report.pdf");
    assert!(decode_base64(&pdf["contentBase64"]).starts_with(b"%PDF"));

    let xlsx = sc.ok("reports.fees", json!({ "format": "excel" }), Some(&admin));
    assert_eq!(xlsx["filename"], "fees_report.xlsx");
    let xml = sheet_xml(&decode_base64(&xlsx["contentBase64"]));
    assert!(xml.contains("Student Name"));
    assert!(xml.contains("Payment Date"));

    assert_eq!(
        sc.err("reports.fees", json!({ "format": "csv" }), Some(&admin)),
        "invalid_input"
    );
}

#[test]
fn reports_use_placeholders_for_deleted_students() {
    let workspace = temp_dir("colleged-reports-placeholder");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();
    let (student, code) = sc.register_student("Gone Soon", "gone@example.com", "BA");

    sc.ok("fees.create", json!({ "studentId": student["id"], "amount": 300 }), Some(&admin));

    let students = sc.ok("reports.students", json!({ "format": "excel" }), Some(&admin));
    let xml = sheet_xml(&decode_base64(&students["contentBase64"]));
    assert!(xml.contains(&code));
    assert!(xml.contains("Gone Soon"));
    assert!(!xml.contains("admin@college.com"), "admins are not listed");

    sc.ok("students.delete", json!({ "studentId": student["id"] }), Some(&admin));

    let fees = sc.ok("reports.fees", json!({ "format": "excel" }), Some(&admin));
    let xml = sheet_xml(&decode_base64(&fees["contentBase64"]));
    assert!(xml.contains("N/A"));
    assert!(!xml.contains("Gone Soon"));
    assert!(xml.contains("<v>300</v>"));
}

#[test]
fn report_written_to_out_path() {
    let workspace = temp_dir("colleged-reports-outpath");
    let out = workspace.join("exports").join("students.pdf");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let admin = sc.login_admin();

    let res = sc.ok(
        "reports.students",
        json!({ "outPath": out.to_string_lossy() }),
        Some(&admin),
    );
    assert!(res.get("contentBase64").is_none());
    assert_eq!(res["path"], out.to_string_lossy().to_string());
    let bytes = std::fs::read(&out).expect("written report");
    assert_eq!(res["byteLength"], bytes.len());
}

#[test]
fn student_documents_render_for_the_caller() {
    let workspace = temp_dir("colleged-documents");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let (student, _) = sc.register_student("Cert Holder", "cert@example.com", "BSc Physics");

    let cert = sc.ok("certificates.enrollment", json!({}), Some(&student));
    assert_eq!(cert["filename"], "certificate_Cert_Holder.pdf");
    assert!(decode_base64(&cert["contentBase64"]).starts_with(b"%PDF"));

    let card = sc.ok("admitCards.generate", json!({}), Some(&student));
    assert_eq!(card["filename"], "admit_card_Cert_Holder.pdf");

    let admin = sc.login_admin();
    assert_eq!(sc.err("reports.students", json!({}), Some(&student)), "unauthorized");
    assert_eq!(sc.err("certificates.enrollment", json!({}), Some(&admin)), "unauthorized");
}
