use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectMark {
    pub name: String,
    pub marks: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    APlus,
    A,
    BPlus,
    B,
    C,
    F,
}

/// Lower edges, highest first. A bucket includes its lower edge.
const GRADE_THRESHOLDS: [(f64, Grade); 5] = [
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::BPlus),
    (60.0, Grade::B),
    (50.0, Grade::C),
];

impl Grade {
    pub fn from_average(average: f64) -> Grade {
        GRADE_THRESHOLDS
            .iter()
            .find(|(edge, _)| average >= *edge)
            .map(|(_, g)| *g)
            .unwrap_or(Grade::F)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeSummary {
    pub total: f64,
    pub average: f64,
    pub grade: Grade,
}

/// Total, average and letter grade for a result's subject list.
///
/// Every flow that creates or replaces a result's subjects goes through this,
/// so total and grade are always derived together.
pub fn summarize(subjects: &[SubjectMark]) -> Result<GradeSummary, AppError> {
    if subjects.is_empty() {
        return Err(AppError::invalid("subjects must not be empty"));
    }
    for (i, s) in subjects.iter().enumerate() {
        if s.name.trim().is_empty() {
            return Err(AppError::invalid(format!("subjects[{}].name must not be empty", i)));
        }
        if !s.marks.is_finite() || s.marks < 0.0 {
            return Err(AppError::invalid(format!(
                "subjects[{}].marks must be a non-negative number",
                i
            )));
        }
    }

    let total: f64 = subjects.iter().map(|s| s.marks).sum();
    let average = total / subjects.len() as f64;
    Ok(GradeSummary {
        total,
        average,
        grade: Grade::from_average(average),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marks(values: &[f64]) -> Vec<SubjectMark> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SubjectMark {
                name: format!("subject{}", i),
                marks: *v,
            })
            .collect()
    }

    #[test]
    fn three_subject_example_is_grade_a() {
        let subjects = vec![
            SubjectMark { name: "math".into(), marks: 90.0 },
            SubjectMark { name: "physics".into(), marks: 80.0 },
            SubjectMark { name: "chemistry".into(), marks: 70.0 },
        ];
        let s = summarize(&subjects).expect("summary");
        assert_eq!(s.total, 240.0);
        assert_eq!(s.average, 80.0);
        assert_eq!(s.grade.as_str(), "A");
    }

    #[test]
    fn lower_edges_are_inclusive() {
        assert_eq!(Grade::from_average(90.0), Grade::APlus);
        assert_eq!(Grade::from_average(89.99), Grade::A);
        assert_eq!(Grade::from_average(80.0), Grade::A);
        assert_eq!(Grade::from_average(70.0), Grade::BPlus);
        assert_eq!(Grade::from_average(60.0), Grade::B);
        assert_eq!(Grade::from_average(50.0), Grade::C);
        assert_eq!(Grade::from_average(49.99), Grade::F);
        assert_eq!(Grade::from_average(0.0), Grade::F);
    }

    #[test]
    fn average_decides_not_total() {
        // 50 + 49 averages below the C edge.
        assert_eq!(summarize(&marks(&[50.0, 49.0])).expect("summary").grade, Grade::F);
        assert_eq!(summarize(&marks(&[100.0, 80.0])).expect("summary").grade, Grade::APlus);
    }

    #[test]
    fn empty_subjects_is_invalid_input() {
        let e = summarize(&[]).expect_err("empty must fail");
        assert_eq!(e.code(), "invalid_input");
    }

    #[test]
    fn rejects_negative_and_nan_marks() {
        assert!(summarize(&marks(&[-1.0])).is_err());
        assert!(summarize(&marks(&[f64::NAN])).is_err());
        assert!(summarize(&marks(&[f64::INFINITY])).is_err());
    }

    #[test]
    fn rejects_blank_subject_name() {
        let subjects = vec![SubjectMark { name: "  ".into(), marks: 10.0 }];
        assert!(summarize(&subjects).is_err());
    }

    #[test]
    fn same_input_same_output() {
        let subjects = marks(&[71.5, 64.0, 88.25]);
        let a = summarize(&subjects).expect("summary");
        let b = summarize(&subjects).expect("summary");
        assert_eq!(a, b);
    }
}
