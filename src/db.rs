use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "rapor.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_kelas(
            id TEXT PRIMARY KEY,
            nama_kelas TEXT NOT NULL,
            tingkat INTEGER,
            wali_kelas TEXT,
            nip_wali TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_siswa(
            id TEXT PRIMARY KEY,
            id_kelas TEXT,
            nis TEXT,
            nisn TEXT,
            nama TEXT NOT NULL,
            jenis_kelamin TEXT,
            urutan INTEGER NOT NULL DEFAULT 0,
            is_locally_edited INTEGER NOT NULL DEFAULT 0,
            last_local_sync TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_siswa_pelengkap(
            id TEXT PRIMARY KEY,
            id_siswa TEXT NOT NULL,
            tempat_lahir TEXT,
            tanggal_lahir TEXT,
            alamat TEXT,
            nama_ayah TEXT,
            nama_ibu TEXT,
            is_locally_edited INTEGER NOT NULL DEFAULT 0,
            last_local_sync TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_mapel(
            id TEXT PRIMARY KEY,
            nama_mapel TEXT NOT NULL,
            kelompok TEXT,
            urutan INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_nilai(
            id TEXT PRIMARY KEY,
            id_siswa TEXT NOT NULL,
            id_mapel TEXT NOT NULL,
            nilai_akhir REAL,
            predikat TEXT,
            capaian TEXT,
            UNIQUE(id_siswa, id_mapel)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_nilai_siswa ON tabel_nilai(id_siswa)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_ekskul(
            id TEXT PRIMARY KEY,
            id_siswa TEXT NOT NULL,
            nama_ekskul TEXT NOT NULL,
            predikat TEXT,
            keterangan TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ekskul_siswa ON tabel_ekskul(id_siswa)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_kehadiran(
            id_siswa TEXT PRIMARY KEY,
            sakit INTEGER NOT NULL DEFAULT 0,
            izin INTEGER NOT NULL DEFAULT 0,
            alpha INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tabel_catatan_wali(
            id_siswa TEXT PRIMARY KEY,
            catatan TEXT NOT NULL
        )",
        [],
    )?;

    // Older workspaces may carry a thinner student table; bring it up to
    // date before anything indexes or selects the newer columns.
    ensure_columns(
        conn,
        "tabel_siswa",
        &[
            ("id_kelas", "TEXT"),
            ("nis", "TEXT"),
            ("nisn", "TEXT"),
            ("jenis_kelamin", "TEXT"),
            ("urutan", "INTEGER NOT NULL DEFAULT 0"),
        ],
    )?;
    for table in ["tabel_siswa", "tabel_siswa_pelengkap"] {
        ensure_columns(conn, table, SYNC_COLUMNS)?;
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_siswa_kelas ON tabel_siswa(id_kelas, urutan)",
        [],
    )?;

    Ok(())
}

const SYNC_COLUMNS: &[(&str, &str)] = &[
    ("is_locally_edited", "INTEGER NOT NULL DEFAULT 0"),
    ("last_local_sync", "TEXT"),
];

fn ensure_columns(conn: &Connection, table: &str, columns: &[(&str, &str)]) -> anyhow::Result<()> {
    for (column, decl) in columns {
        if !table_has_column(conn, table, column)? {
            conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
                [],
            )?;
        }
    }
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
