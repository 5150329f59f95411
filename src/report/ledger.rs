//! Class grade ledger ("leger"): one row per student, one column per
//! subject, with the average and class rank at the end.

use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use super::data;
use super::model::average;

const HEADER_TOP: u32 = 2;
const FIRST_DATA_ROW: u32 = 4;
const FIXED_COLUMNS: u16 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub nis: String,
    pub name: String,
    pub scores: Vec<Option<f64>>,
    pub average: Option<f64>,
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub class_name: String,
    pub subjects: Vec<String>,
    pub rows: Vec<LedgerRow>,
}

/// Competition ranking ("1224") by average, highest first. Students without
/// any score are unranked.
fn assign_ranks(rows: &mut [LedgerRow]) {
    let averages: Vec<f64> = rows.iter().filter_map(|r| r.average).collect();
    for row in rows.iter_mut() {
        row.rank = row
            .average
            .map(|avg| 1 + averages.iter().filter(|other| **other > avg).count());
    }
}

pub fn load_ledger(conn: &Connection, class_id: &str) -> Result<Option<Ledger>> {
    let Some(class_name) = data::class_name(conn, class_id)? else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT DISTINCT m.id, m.nama_mapel, m.urutan
         FROM tabel_nilai n
         JOIN tabel_mapel m ON m.id = n.id_mapel
         JOIN tabel_siswa s ON s.id = n.id_siswa
         WHERE s.id_kelas = ?
         ORDER BY m.urutan, m.nama_mapel",
    )?;
    let subjects = stmt
        .query_map([class_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to read class subjects")?;
    let column_of: HashMap<&str, usize> = subjects
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();

    let mut score_stmt =
        conn.prepare("SELECT id_mapel, nilai_akhir FROM tabel_nilai WHERE id_siswa = ?")?;
    let mut student_stmt =
        conn.prepare("SELECT nama, COALESCE(nis, '') FROM tabel_siswa WHERE id = ?")?;

    let mut rows = Vec::new();
    for student_id in data::class_student_ids(conn, class_id)? {
        let (name, nis): (String, String) =
            student_stmt.query_row([&student_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let mut scores = vec![None; subjects.len()];
        let found = score_stmt
            .query_map([&student_id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, Option<f64>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read student scores")?;
        for (subject_id, score) in found {
            if let Some(col) = column_of.get(subject_id.as_str()) {
                scores[*col] = score;
            }
        }
        rows.push(LedgerRow {
            average: average(scores.iter().flatten().copied()),
            nis,
            name,
            scores,
            rank: None,
        });
    }
    assign_ranks(&mut rows);

    Ok(Some(Ledger {
        class_name,
        subjects: subjects.into_iter().map(|(_, name)| name).collect(),
        rows,
    }))
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Thin)
        .set_background_color(Color::RGB(0xD9E1F2))
}

fn write_sheet(sheet: &mut Worksheet, ledger: &Ledger) -> Result<()> {
    let header = header_format();
    let cell = Format::new().set_border(FormatBorder::Thin);
    let centered = cell.clone().set_align(FormatAlign::Center);
    let score = centered.clone().set_num_format("0.00");
    let title = Format::new().set_bold().set_font_size(14);

    let subject_count = ledger.subjects.len() as u16;
    let avg_col = FIXED_COLUMNS + subject_count;
    let rank_col = avg_col + 1;

    sheet.set_name("Leger")?;
    sheet.merge_range(
        0,
        0,
        0,
        rank_col,
        &format!("Leger Nilai Kelas {}", ledger.class_name),
        &title,
    )?;

    for (col, label) in [(0u16, "No"), (1, "NIS"), (2, "Nama Peserta Didik")] {
        sheet.merge_range(HEADER_TOP, col, HEADER_TOP + 1, col, label, &header)?;
    }
    match subject_count {
        0 => {}
        1 => {
            sheet.write_string_with_format(HEADER_TOP, FIXED_COLUMNS, "Mata Pelajaran", &header)?;
        }
        n => {
            sheet.merge_range(
                HEADER_TOP,
                FIXED_COLUMNS,
                HEADER_TOP,
                FIXED_COLUMNS + n - 1,
                "Mata Pelajaran",
                &header,
            )?;
        }
    }
    for (i, subject) in ledger.subjects.iter().enumerate() {
        let col = FIXED_COLUMNS + i as u16;
        sheet.write_string_with_format(HEADER_TOP + 1, col, subject, &header)?;
        sheet.set_column_width(col, 11)?;
    }
    sheet.merge_range(HEADER_TOP, avg_col, HEADER_TOP + 1, avg_col, "Rata-rata", &header)?;
    sheet.merge_range(HEADER_TOP, rank_col, HEADER_TOP + 1, rank_col, "Peringkat", &header)?;

    sheet.set_column_width(0, 5)?;
    sheet.set_column_width(1, 12)?;
    sheet.set_column_width(2, 32)?;
    sheet.set_column_width(avg_col, 11)?;
    sheet.set_column_width(rank_col, 11)?;
    sheet.set_row_height(HEADER_TOP + 1, 30)?;

    for (i, row) in ledger.rows.iter().enumerate() {
        let r = FIRST_DATA_ROW + i as u32;
        sheet.write_number_with_format(r, 0, (i + 1) as f64, &centered)?;
        sheet.write_string_with_format(r, 1, &row.nis, &centered)?;
        sheet.write_string_with_format(r, 2, &row.name, &cell)?;
        for (j, value) in row.scores.iter().enumerate() {
            let col = FIXED_COLUMNS + j as u16;
            match value {
                Some(v) => sheet.write_number_with_format(r, col, *v, &score)?,
                None => sheet.write_blank(r, col, &cell)?,
            };
        }
        match row.average {
            Some(v) => sheet.write_number_with_format(r, avg_col, v, &score)?,
            None => sheet.write_blank(r, avg_col, &cell)?,
        };
        match row.rank {
            Some(rank) => sheet.write_number_with_format(r, rank_col, rank as f64, &centered)?,
            None => sheet.write_string_with_format(r, rank_col, "-", &centered)?,
        };
    }

    sheet.set_freeze_panes(FIRST_DATA_ROW, FIXED_COLUMNS)?;
    Ok(())
}

fn build_workbook(ledger: &Ledger) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    write_sheet(sheet, ledger)?;
    Ok(workbook)
}

pub fn ledger_to_bytes(ledger: &Ledger) -> Result<Vec<u8>> {
    build_workbook(ledger)?
        .save_to_buffer()
        .context("failed to serialize ledger workbook")
}

pub fn save_ledger(ledger: &Ledger, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let bytes = ledger_to_bytes(ledger)?;
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to save ledger {}", path.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::data::fixtures;
    use std::io::{Cursor, Read};

    fn entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("xlsx is a zip");
        let mut text = String::new();
        archive
            .by_name(name)
            .expect("entry")
            .read_to_string(&mut text)
            .expect("utf8");
        text
    }

    #[test]
    fn ledger_rows_follow_roster_with_ranks() {
        let conn = fixtures::workspace();
        let ledger = load_ledger(&conn, "k1").expect("load").expect("class");
        assert_eq!(ledger.subjects, ["Pendidikan Agama", "Matematika", "Seni Budaya"]);
        assert_eq!(ledger.rows.len(), 2);

        let budi = &ledger.rows[0];
        assert_eq!(budi.scores, vec![Some(88.0), Some(72.5), None]);
        assert_eq!(budi.average, Some(80.25));
        let ani = &ledger.rows[1];
        assert_eq!(ani.average, Some(75.0));
        assert_eq!((budi.rank, ani.rank), (Some(1), Some(2)));

        assert!(load_ledger(&conn, "missing").expect("load").is_none());
    }

    #[test]
    fn ties_share_a_rank_and_unscored_rows_are_unranked() {
        let row = |avg: Option<f64>| LedgerRow {
            nis: String::new(),
            name: String::new(),
            scores: Vec::new(),
            average: avg,
            rank: None,
        };
        let mut rows = vec![row(Some(80.0)), row(Some(90.0)), row(Some(80.0)), row(None), row(Some(70.0))];
        assign_ranks(&mut rows);
        let ranks: Vec<Option<usize>> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![Some(2), Some(1), Some(2), None, Some(4)]);
    }

    #[test]
    fn workbook_has_merged_headers_and_names() {
        let conn = fixtures::workspace();
        let ledger = load_ledger(&conn, "k1").expect("load").expect("class");
        let bytes = ledger_to_bytes(&ledger).expect("xlsx");

        let sheet = entry(&bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<mergeCell ref=\"D3:F3\"/>"));
        assert!(sheet.contains("<mergeCell ref=\"A3:A4\"/>"));
        assert!(sheet.contains("<pane "));
        let strings = entry(&bytes, "xl/sharedStrings.xml");
        for expected in ["Leger Nilai Kelas X IPA 1", "Mata Pelajaran", "Budi Santoso", "Rata-rata"] {
            assert!(strings.contains(expected), "missing {expected}");
        }
        let workbook = entry(&bytes, "xl/workbook.xml");
        assert!(workbook.contains("name=\"Leger\""));
    }

    #[test]
    fn single_subject_ledger_still_writes() {
        let ledger = Ledger {
            class_name: "XI".into(),
            subjects: vec!["Matematika".into()],
            rows: vec![LedgerRow {
                nis: "1".into(),
                name: "Ani".into(),
                scores: vec![Some(90.0)],
                average: Some(90.0),
                rank: Some(1),
            }],
        };
        let dir = std::env::temp_dir().join(format!(
            "rapord-ledger-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let path = dir.join("leger.xlsx");
        save_ledger(&ledger, &path).expect("save");
        let bytes = std::fs::read(&path).expect("read");
        assert!(entry(&bytes, "xl/sharedStrings.xml").contains("Matematika"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
