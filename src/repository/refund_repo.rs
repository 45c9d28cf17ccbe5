// ==========================================
// 保税加工退税核销系统 - 退税核销纪录仓储
// ==========================================
// 职责:
// - tax_refund 表的建表与读写
// - 按报表号码 / 出口项次提供审计查询
// - 核销纪录不提供删除 (仅随未核销的父报单一并清理)
// ==========================================

use crate::domain::quantity::Qty;
use crate::domain::refund::TaxRefund;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 新增核销纪录的输入 (id 与 created_at 由仓储产生)
#[derive(Debug, Clone)]
pub struct NewTaxRefund {
    pub report_no: String,
    pub doc_no: String,
    pub export_id: i64,
    pub import_id: i64,
    pub bom_id: i64,
    pub usage_qty: Qty,
    pub branch_num: i32,
}

pub struct TaxRefundRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TaxRefundRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.ensure_tables()?;
        Ok(repo)
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_tables()?;
        Ok(repo)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_tables(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tax_refund (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              report_no TEXT NOT NULL,
              doc_no TEXT NOT NULL,
              export_id INTEGER NOT NULL REFERENCES export_declaration(id),
              import_id INTEGER NOT NULL REFERENCES import_declaration(id),
              bom_id INTEGER NOT NULL REFERENCES tax_bom(id),
              usage_qty_milli INTEGER NOT NULL CHECK (usage_qty_milli > 0),
              branch_num INTEGER NOT NULL,
              created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_tax_refund_report_no
              ON tax_refund(report_no);
            CREATE INDEX IF NOT EXISTS idx_tax_refund_export_id
              ON tax_refund(export_id);
            CREATE INDEX IF NOT EXISTS idx_tax_refund_import_id
              ON tax_refund(import_id);
            "#,
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<RefundRaw> {
        Ok(RefundRaw {
            id: row.get(0)?,
            report_no: row.get(1)?,
            doc_no: row.get(2)?,
            export_id: row.get(3)?,
            import_id: row.get(4)?,
            bom_id: row.get(5)?,
            usage_qty_milli: row.get(6)?,
            branch_num: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn to_entity(raw: RefundRaw) -> RepositoryResult<TaxRefund> {
        let usage_qty =
            Qty::from_milli(raw.usage_qty_milli).map_err(|e| RepositoryError::FieldValueError {
                field: "usage_qty_milli".to_string(),
                message: e.to_string(),
            })?;
        let created_at = DateTime::parse_from_rfc3339(&raw.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                // SQLite 的 datetime('now') 产生 "YYYY-MM-DD HH:MM:SS" (UTC)
                chrono::NaiveDateTime::parse_from_str(&raw.created_at, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| naive.and_utc())
            })
            .map_err(|e| RepositoryError::FieldValueError {
                field: "created_at".to_string(),
                message: e.to_string(),
            })?;
        Ok(TaxRefund {
            id: raw.id,
            report_no: raw.report_no,
            doc_no: raw.doc_no,
            export_id: raw.export_id,
            import_id: raw.import_id,
            bom_id: raw.bom_id,
            usage_qty,
            branch_num: raw.branch_num,
            created_at,
        })
    }

    const SELECT_COLS: &'static str = "id, report_no, doc_no, export_id, import_id, bom_id, \
                                       usage_qty_milli, branch_num, created_at";

    /// 新增核销纪录 (数量必须大于零)
    pub fn insert(&self, refund: &NewTaxRefund) -> RepositoryResult<i64> {
        if refund.usage_qty.is_zero() {
            return Err(RepositoryError::ValidationError(
                "核銷數量必須大於零".to_string(),
            ));
        }
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tax_refund
               (report_no, doc_no, export_id, import_id, bom_id, usage_qty_milli, branch_num)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                refund.report_no,
                refund.doc_no,
                refund.export_id,
                refund.import_id,
                refund.bom_id,
                refund.usage_qty.as_milli(),
                refund.branch_num,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<TaxRefund>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tax_refund WHERE id = ?1",
            Self::SELECT_COLS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_row)?;
        match rows.next() {
            Some(raw) => Ok(Some(Self::to_entity(raw?)?)),
            None => Ok(None),
        }
    }

    /// 按报表号码查询 (同一次核销运行的全部纪录)
    pub fn find_by_report_no(&self, report_no: &str) -> RepositoryResult<Vec<TaxRefund>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tax_refund WHERE report_no = ?1 ORDER BY id ASC",
            Self::SELECT_COLS
        ))?;
        let rows = stmt.query_map(params![report_no], Self::map_row)?;
        let mut result = Vec::new();
        for raw in rows {
            result.push(Self::to_entity(raw?)?);
        }
        Ok(result)
    }

    /// 按出口项次查询，原料分号升序
    pub fn find_by_export_id(&self, export_id: i64) -> RepositoryResult<Vec<TaxRefund>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tax_refund WHERE export_id = ?1 ORDER BY branch_num ASC",
            Self::SELECT_COLS
        ))?;
        let rows = stmt.query_map(params![export_id], Self::map_row)?;
        let mut result = Vec::new();
        for raw in rows {
            result.push(Self::to_entity(raw?)?);
        }
        Ok(result)
    }

    /// 修正核销数量 (由编排器在台账校验通过后调用)
    pub fn update_usage_qty(&self, id: i64, new_qty: Qty) -> RepositoryResult<()> {
        if new_qty.is_zero() {
            return Err(RepositoryError::ValidationError(
                "核銷數量必須大於零".to_string(),
            ));
        }
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE tax_refund SET usage_qty_milli = ?2 WHERE id = ?1",
            params![id, new_qty.as_milli()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "TaxRefund".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count_by_export_id(&self, export_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tax_refund WHERE export_id = ?1",
            params![export_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM tax_refund", [], |row| row.get(0))?;
        Ok(count)
    }
}

struct RefundRaw {
    id: i64,
    report_no: String,
    doc_no: String,
    export_id: i64,
    import_id: i64,
    bom_id: i64,
    usage_qty_milli: i64,
    branch_num: i32,
    created_at: String,
}
