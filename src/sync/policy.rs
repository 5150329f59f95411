use serde::Serialize;

/// Tables whose destination rows may be edited on the mirror side.
pub const SELECTIVE_MERGE_TABLES: [&str; 2] = ["tabel_siswa", "tabel_siswa_pelengkap"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPolicy {
    /// Delete the destination table's rows and re-insert everything from the source.
    ForcedReplace,
    /// Per-row upsert that never overwrites rows flagged `is_locally_edited`.
    SelectiveMerge,
}

impl SyncPolicy {
    pub fn classify(table_name: &str) -> SyncPolicy {
        if SELECTIVE_MERGE_TABLES.contains(&table_name) {
            SyncPolicy::SelectiveMerge
        } else {
            SyncPolicy::ForcedReplace
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncPolicy::ForcedReplace => "forcedReplace",
            SyncPolicy::SelectiveMerge => "selectiveMerge",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_student_tables_merge() {
        assert_eq!(SyncPolicy::classify("tabel_siswa"), SyncPolicy::SelectiveMerge);
        assert_eq!(
            SyncPolicy::classify("tabel_siswa_pelengkap"),
            SyncPolicy::SelectiveMerge
        );
        assert_eq!(SyncPolicy::classify("tabel_nilai"), SyncPolicy::ForcedReplace);
        assert_eq!(SyncPolicy::classify("TABEL_SISWA"), SyncPolicy::ForcedReplace);
        assert_eq!(SyncPolicy::classify(""), SyncPolicy::ForcedReplace);
    }
}
