use serde::{Deserialize, Serialize};

/// School-wide values printed on every report card. Stored as the
/// `report.school` workspace setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolInfo {
    pub name: String,
    pub address: String,
    pub principal_name: String,
    pub principal_nip: String,
    pub city: String,
    pub academic_year: String,
    pub semester: String,
    /// Date line under the signature block, e.g. "20 Desember 2025".
    pub report_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdentity {
    pub id: String,
    pub name: String,
    pub nis: String,
    pub nisn: String,
    pub class_name: String,
    pub homeroom_teacher: String,
    pub homeroom_nip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    pub subject: String,
    pub group: String,
    pub score: Option<f64>,
    pub predikat: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtracurricularRow {
    pub name: String,
    pub predikat: String,
    pub description: String,
}

/// Days absent, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub sick: i64,
    pub permit: i64,
    pub unexcused: i64,
}

impl Attendance {
    pub fn rows(&self) -> [(&'static str, i64); 3] {
        [
            ("Sakit", self.sick),
            ("Izin", self.permit),
            ("Tanpa Keterangan", self.unexcused),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub school: SchoolInfo,
    pub student: StudentIdentity,
    pub grades: Vec<GradeRow>,
    pub extracurriculars: Vec<ExtracurricularRow>,
    pub attendance: Attendance,
    pub homeroom_note: String,
}

pub fn average(scores: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = scores.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Letter grade for a final score when none is stored.
pub fn default_predikat(score: f64) -> &'static str {
    if score >= 86.0 {
        "A"
    } else if score >= 71.0 {
        "B"
    } else if score >= 56.0 {
        "C"
    } else {
        "D"
    }
}
