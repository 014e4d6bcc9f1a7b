use crate::models::{FeeRecord, ResultBody, ResultRecord, Student};
use crate::render::{format_number, Cell, Column, Document, Section, Table};

pub const INSTITUTION: &str = "College Management System";
pub const PLACEHOLDER: &str = "N/A";

/// A fee row joined with whatever is left of its student.
#[derive(Debug, Clone)]
pub struct FeeLine {
    pub fee: FeeRecord,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "Yes"
    } else {
        "No"
    }
}

fn or_placeholder(v: Option<&str>) -> String {
    match v {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// `YYYY-MM-DD` part of a stored timestamp.
fn date_part(ts: &str) -> String {
    ts.get(..10).unwrap_or(ts).to_string()
}

pub fn students_report(students: &[Student], generated_on: &str) -> Document {
    let columns = vec![
        Column::new("Student ID", 14),
        Column::new("Name", 20),
        Column::new("Email", 30),
        Column::new("Course", 20),
        Column::new("Admission Status", 15),
        Column::new("Fee Paid", 10),
        Column::new("Phone", 15),
        Column::new("Address", 30),
    ];
    let rows = students
        .iter()
        .map(|s| {
            vec![
                Cell::text(or_placeholder(s.student_code.as_deref())),
                Cell::text(s.name.clone()),
                Cell::text(s.email.clone()),
                Cell::text(or_placeholder(s.course.as_deref())),
                Cell::text(s.admission_status.as_str()),
                Cell::text(yes_no(s.fee_paid)),
                Cell::text(or_placeholder(s.phone.as_deref())),
                Cell::text(or_placeholder(s.address.as_deref())),
            ]
        })
        .collect();

    Document {
        title: format!("{} - Students Report", INSTITUTION),
        subtitle: Some(format!("Generated on: {}", generated_on)),
        sheet_name: "Students Report".to_string(),
        sections: vec![
            Section::Paragraph(format!("Total students: {}", students.len())),
            Section::Table(Table { columns, rows }),
        ],
        footer: None,
    }
}

pub fn fees_report(lines: &[FeeLine], generated_on: &str) -> Document {
    let columns = vec![
        Column::new("Student Name", 20),
        Column::new("Email", 30),
        Column::new("Amount", 15),
        Column::new("Paid", 10),
        Column::new("Payment Date", 15),
    ];
    let rows = lines
        .iter()
        .map(|l| {
            vec![
                Cell::text(or_placeholder(l.student_name.as_deref())),
                Cell::text(or_placeholder(l.student_email.as_deref())),
                Cell::Number(l.fee.amount),
                Cell::text(yes_no(l.fee.paid)),
                Cell::text(
                    l.fee
                        .payment_date
                        .as_deref()
                        .map(date_part)
                        .unwrap_or_else(|| PLACEHOLDER.to_string()),
                ),
            ]
        })
        .collect();

    let collected: f64 = lines.iter().filter(|l| l.fee.paid).map(|l| l.fee.amount).sum();
    Document {
        title: format!("{} - Fees Report", INSTITUTION),
        subtitle: Some(format!("Generated on: {}", generated_on)),
        sheet_name: "Fees Report".to_string(),
        sections: vec![
            Section::Paragraph(format!(
                "Fee records: {}  Collected: {}",
                lines.len(),
                format_number(collected)
            )),
            Section::Table(Table { columns, rows }),
        ],
        footer: None,
    }
}

fn identity_block(student: &Student) -> Section {
    Section::KeyValues(vec![
        ("Student Name".into(), student.name.clone()),
        ("Student ID".into(), or_placeholder(student.student_code.as_deref())),
        ("Email".into(), student.email.clone()),
        ("Phone".into(), or_placeholder(student.phone.as_deref())),
        ("Course".into(), or_placeholder(student.course.as_deref())),
    ])
}

pub fn result_sheet(student: &Student, result: &ResultRecord, generated_on: &str) -> Document {
    let mut sections = vec![
        Section::Heading("STUDENT RESULT".into()),
        identity_block(student),
        Section::KeyValues(vec![("Semester".into(), result.semester.to_string())]),
    ];

    match &result.body {
        ResultBody::Subjects {
            subjects,
            total,
            grade,
        } => {
            sections.push(Section::Heading("Subject-wise Marks".into()));
            sections.push(Section::Table(Table {
                columns: vec![Column::new("Subject", 30), Column::new("Marks", 10)],
                rows: subjects
                    .iter()
                    .map(|s| vec![Cell::text(s.name.clone()), Cell::Number(s.marks)])
                    .collect(),
            }));
            sections.push(Section::KeyValues(vec![
                ("Total Marks".into(), format_number(*total)),
                ("Grade".into(), grade.clone()),
            ]));
        }
        ResultBody::File { file_name, .. } => {
            sections.push(Section::Paragraph(format!(
                "This result was published as an uploaded document ({}).",
                file_name
            )));
        }
    }

    Document {
        title: INSTITUTION.to_uppercase(),
        subtitle: None,
        sheet_name: format!("Semester {}", result.semester),
        sections,
        footer: Some(format!("Generated on: {}", generated_on)),
    }
}

pub fn enrollment_certificate(student: &Student, issued_on: &str) -> Document {
    Document {
        title: "Certificate of Enrollment".into(),
        subtitle: Some(INSTITUTION.into()),
        sheet_name: "Certificate".into(),
        sections: vec![
            Section::Paragraph("This is to certify that".into()),
            Section::Heading(student.name.clone()),
            Section::Paragraph(format!(
                "has been enrolled in {}.",
                or_placeholder(student.course.as_deref())
            )),
            Section::KeyValues(vec![
                ("Student ID".into(), or_placeholder(student.student_code.as_deref())),
                ("Admission Status".into(), student.admission_status.as_str().into()),
                ("Date of Issue".into(), issued_on.into()),
            ]),
        ],
        footer: None,
    }
}

pub fn admit_card(student: &Student, issued_on: &str) -> Document {
    Document {
        title: "College Admit Card".into(),
        subtitle: Some(INSTITUTION.into()),
        sheet_name: "Admit Card".into(),
        sections: vec![
            identity_block(student),
            Section::KeyValues(vec![
                ("Admission Status".into(), student.admission_status.as_str().into()),
                ("Exam Date".into(), "To be announced".into()),
                ("Venue".into(), "College Campus".into()),
            ]),
        ],
        footer: Some(format!("Issued on: {}", issued_on)),
    }
}

/// File-name friendly version of a person's name.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "student".to_string()
    } else {
        stem
    }
}
