use crate::calc::SubjectMark;
use crate::error::AppError;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Enum stored and sent as a fixed string, with `as_str` + `FromStr`.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(AppError::InvalidInput(format!(
                        "invalid {}: {}",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let s = value.as_str()?;
                s.parse()
                    .map_err(|e: AppError| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }
    };
}

str_enum!(Role {
    Student => "student",
    Admin => "admin",
});

str_enum!(AdmissionStatus {
    Submitted => "Submitted",
    Approved => "Approved",
    Rejected => "Rejected",
});

str_enum!(NoticeCategory {
    General => "general",
    Exam => "exam",
    Fee => "fee",
    Admission => "admission",
});

str_enum!(NoticePriority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Student (or admin) account without its credential.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub student_code: Option<String>,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub course: Option<String>,
    pub admission_status: AdmissionStatus,
    pub fee_paid: bool,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub dob: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

pub const STUDENT_COLUMNS: &str = "id, student_code, name, email, role, course, admission_status, \
     fee_paid, address, phone, dob, created_at, updated_at";

impl Student {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Student {
            id: r.get(0)?,
            student_code: r.get(1)?,
            name: r.get(2)?,
            email: r.get(3)?,
            role: r.get(4)?,
            course: r.get(5)?,
            admission_status: r.get(6)?,
            fee_paid: r.get::<_, i64>(7)? != 0,
            address: r.get(8)?,
            phone: r.get(9)?,
            dob: r.get(10)?,
            created_at: r.get(11)?,
            updated_at: r.get(12)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    pub id: String,
    pub student_id: String,
    pub amount: f64,
    pub paid: bool,
    pub payment_date: Option<String>,
    pub created_at: String,
}

pub const FEE_COLUMNS: &str = "id, student_id, amount, paid, payment_date, created_at";

impl FeeRecord {
    pub fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(FeeRecord {
            id: r.get(0)?,
            student_id: r.get(1)?,
            amount: r.get(2)?,
            paid: r.get::<_, i64>(3)? != 0,
            payment_date: r.get(4)?,
            created_at: r.get(5)?,
        })
    }
}

/// A result holds either graded subjects or an uploaded file, never both.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResultBody {
    #[serde(rename_all = "camelCase")]
    Subjects {
        subjects: Vec<SubjectMark>,
        total: f64,
        grade: String,
    },
    #[serde(rename_all = "camelCase")]
    File {
        file_path: String,
        file_name: String,
        checksum: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub student_id: String,
    pub semester: i64,
    #[serde(flatten)]
    pub body: ResultBody,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: NoticeCategory,
    pub priority: NoticePriority,
    pub created_by: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExamEntry {
    pub subject: String,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSchedule {
    pub id: String,
    pub course: String,
    pub semester: i64,
    pub exams: Vec<ExamEntry>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Syllabus {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub credits: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: Option<String>,
    pub course: String,
    pub semester: i64,
    pub syllabus: Syllabus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmitCard {
    pub id: String,
    pub student_id: String,
    pub file_path: String,
    pub file_name: String,
    pub checksum: String,
    pub uploaded_at: String,
}
