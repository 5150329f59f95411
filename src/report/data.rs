use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};

use super::model::{
    default_predikat, Attendance, ExtracurricularRow, GradeRow, ReportCard, SchoolInfo,
    StudentIdentity,
};
use crate::db;
use crate::layout::MarginSettings;

pub const SCHOOL_KEY: &str = "report.school";
pub const MARGINS_KEY: &str = "report.margins";

pub fn load_school(conn: &Connection) -> anyhow::Result<SchoolInfo> {
    match db::settings_get_json(conn, SCHOOL_KEY)? {
        Some(v) => serde_json::from_value(v).context("report.school setting is malformed"),
        None => Ok(SchoolInfo::default()),
    }
}

/// Stored margins, or the defaults when none are saved or the saved value
/// no longer parses.
pub fn load_margins(conn: &Connection) -> anyhow::Result<MarginSettings> {
    let saved = db::settings_get_json(conn, MARGINS_KEY)?;
    Ok(saved
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

pub fn class_name(conn: &Connection, class_id: &str) -> anyhow::Result<Option<String>> {
    conn.query_row(
        "SELECT nama_kelas FROM tabel_kelas WHERE id = ?",
        [class_id],
        |r| r.get(0),
    )
    .optional()
    .context("failed to read class")
}

/// Student ids of a class in roster order.
pub fn class_student_ids(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM tabel_siswa WHERE id_kelas = ? ORDER BY urutan, nama, id",
    )?;
    let ids = stmt
        .query_map([class_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn load_identity(conn: &Connection, student_id: &str) -> anyhow::Result<Option<StudentIdentity>> {
    conn.query_row(
        "SELECT s.id, s.nama, COALESCE(s.nis, ''), COALESCE(s.nisn, ''),
                COALESCE(k.nama_kelas, ''), COALESCE(k.wali_kelas, ''), COALESCE(k.nip_wali, '')
         FROM tabel_siswa s
         LEFT JOIN tabel_kelas k ON k.id = s.id_kelas
         WHERE s.id = ?",
        [student_id],
        |r| {
            Ok(StudentIdentity {
                id: r.get(0)?,
                name: r.get(1)?,
                nis: r.get(2)?,
                nisn: r.get(3)?,
                class_name: r.get(4)?,
                homeroom_teacher: r.get(5)?,
                homeroom_nip: r.get(6)?,
            })
        },
    )
    .optional()
    .context("failed to read student")
}

fn load_grades(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<GradeRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.nama_mapel, COALESCE(m.kelompok, ''), n.nilai_akhir,
                COALESCE(n.predikat, ''), COALESCE(n.capaian, '')
         FROM tabel_nilai n
         JOIN tabel_mapel m ON m.id = n.id_mapel
         WHERE n.id_siswa = ?
         ORDER BY m.urutan, m.nama_mapel",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            let score: Option<f64> = r.get(2)?;
            let stored: String = r.get(3)?;
            let predikat = match (stored.trim().is_empty(), score) {
                (true, Some(s)) => default_predikat(s).to_string(),
                _ => stored,
            };
            Ok(GradeRow {
                subject: r.get(0)?,
                group: r.get(1)?,
                score,
                predikat,
                description: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_extracurriculars(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<Vec<ExtracurricularRow>> {
    let mut stmt = conn.prepare(
        "SELECT nama_ekskul, COALESCE(predikat, ''), COALESCE(keterangan, '')
         FROM tabel_ekskul WHERE id_siswa = ? ORDER BY nama_ekskul",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(ExtracurricularRow {
                name: r.get(0)?,
                predikat: r.get(1)?,
                description: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_attendance(conn: &Connection, student_id: &str) -> anyhow::Result<Attendance> {
    let found = conn
        .query_row(
            "SELECT sakit, izin, alpha FROM tabel_kehadiran WHERE id_siswa = ?",
            [student_id],
            |r| {
                Ok(Attendance {
                    sick: r.get(0)?,
                    permit: r.get(1)?,
                    unexcused: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(found.unwrap_or_default())
}

fn load_note(conn: &Connection, student_id: &str) -> anyhow::Result<String> {
    let note: Option<String> = conn
        .query_row(
            "SELECT catatan FROM tabel_catatan_wali WHERE id_siswa = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(note.unwrap_or_default())
}

pub fn load_report(
    conn: &Connection,
    school: &SchoolInfo,
    student_id: &str,
) -> anyhow::Result<Option<ReportCard>> {
    let Some(student) = load_identity(conn, student_id)? else {
        return Ok(None);
    };
    Ok(Some(ReportCard {
        school: school.clone(),
        grades: load_grades(conn, student_id).context("failed to read grades")?,
        extracurriculars: load_extracurriculars(conn, student_id)
            .context("failed to read extracurriculars")?,
        attendance: load_attendance(conn, student_id).context("failed to read attendance")?,
        homeroom_note: load_note(conn, student_id).context("failed to read homeroom note")?,
        student,
    }))
}

pub fn load_class_reports(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<ReportCard>> {
    let school = load_school(conn)?;
    let mut reports = Vec::new();
    for id in class_student_ids(conn, class_id)? {
        if let Some(report) = load_report(conn, &school, &id)? {
            reports.push(report);
        }
    }
    Ok(reports)
}
