// ==========================================
// 保税加工退税核销系统 - 出口报单仓储
// ==========================================
// 职责:
// - export_declaration 表的建表与读写
// - 按报单号码取项次列表 (核销批次入口)
// - 带守卫的删除: 仅「已匯入」且无核销纪录的项次可删
// ==========================================

use crate::domain::declaration::ExportDeclaration;
use crate::domain::quantity::Qty;
use crate::domain::types::RefundStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 新增出口报单项次的输入 (状态由仓储置为「已匯入」)
#[derive(Debug, Clone)]
pub struct NewExportDeclaration {
    pub doc_no: String,
    pub items: String,
    pub prod_type: String,
    pub prod_name: String,
    pub export_qty: Qty,
}

/// 出口报单查询条件 (None 表示不过滤；status None/0 表示全部)
#[derive(Debug, Clone, Default)]
pub struct ExportSearch {
    pub doc_no: Option<String>,
    pub prod_type: Option<String>,
    pub prod_name: Option<String>,
    pub status: Option<i32>,
}

/// 批量删除结果 (逐笔收集错误，不因单笔失败中断)
#[derive(Debug, Default)]
pub struct BatchDeleteOutcome {
    pub success_count: u32,
    pub errors: Vec<String>,
}

pub struct ExportDeclarationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ExportDeclarationRepository {
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
            CREATE TABLE IF NOT EXISTS export_declaration (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              doc_no TEXT NOT NULL,
              items TEXT NOT NULL,
              prod_type TEXT NOT NULL,
              prod_name TEXT NOT NULL,
              export_qty_milli INTEGER NOT NULL CHECK (export_qty_milli >= 0),
              status INTEGER NOT NULL DEFAULT 1,
              UNIQUE (doc_no, items)
            );

            CREATE INDEX IF NOT EXISTS idx_export_declaration_doc_no
              ON export_declaration(doc_no);
            "#,
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String, String, i64, i32)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn to_entity(
        (id, doc_no, items, prod_type, prod_name, qty_milli, status): (
            i64,
            String,
            String,
            String,
            String,
            i64,
            i32,
        ),
    ) -> RepositoryResult<ExportDeclaration> {
        let export_qty = Qty::from_milli(qty_milli).map_err(|e| RepositoryError::FieldValueError {
            field: "export_qty_milli".to_string(),
            message: e.to_string(),
        })?;
        let status = RefundStatus::from_code(status).ok_or_else(|| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message: format!("未知状态码: {}", status),
        })?;
        Ok(ExportDeclaration {
            id,
            doc_no,
            items,
            prod_type,
            prod_name,
            export_qty,
            status,
        })
    }

    const SELECT_COLS: &'static str =
        "id, doc_no, items, prod_type, prod_name, export_qty_milli, status";

    /// 新增项次，状态置为「已匯入出口明細」
    pub fn insert(&self, dec: &NewExportDeclaration) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO export_declaration
               (doc_no, items, prod_type, prod_name, export_qty_milli, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                dec.doc_no,
                dec.items,
                dec.prod_type,
                dec.prod_name,
                dec.export_qty.as_milli(),
                RefundStatus::Created.as_code(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<ExportDeclaration>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM export_declaration WHERE id = ?1",
            Self::SELECT_COLS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_row)?;
        match rows.next() {
            Some(raw) => Ok(Some(Self::to_entity(raw?)?)),
            None => Ok(None),
        }
    }

    /// 按报单号码取全部项次，项次序号升序 (核销批次的处理顺序)
    ///
    /// items 为文本栏位但惯例填数字序号，按数值排序避免 "10" 排在 "2" 前。
    pub fn find_by_doc_no(&self, doc_no: &str) -> RepositoryResult<Vec<ExportDeclaration>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM export_declaration WHERE doc_no = ?1 \
             ORDER BY CAST(items AS INTEGER) ASC, items ASC, id ASC",
            Self::SELECT_COLS
        ))?;
        let rows = stmt.query_map(params![doc_no], Self::map_row)?;
        let mut result = Vec::new();
        for raw in rows {
            result.push(Self::to_entity(raw?)?);
        }
        Ok(result)
    }

    pub fn exists_by_doc_no_and_items(&self, doc_no: &str, items: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM export_declaration WHERE doc_no = ?1 AND items = ?2",
            params![doc_no, items],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 更新可编辑字段 (成品规格/名称/出口数量)
    pub fn update_fields(
        &self,
        id: i64,
        prod_type: &str,
        prod_name: &str,
        export_qty: Qty,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE export_declaration
               SET prod_type = ?2, prod_name = ?3, export_qty_milli = ?4
             WHERE id = ?1",
            params![id, prod_type, prod_name, export_qty.as_milli()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ExportDeclaration".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 更新核退状态
    pub fn update_status(&self, id: i64, status: RefundStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE export_declaration SET status = ?2 WHERE id = ?1",
            params![id, status.as_code()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ExportDeclaration".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 条件查询 (报单号码/成品规格/成品名称模糊，状态精确)
    pub fn search(&self, cond: &ExportSearch) -> RepositoryResult<Vec<ExportDeclaration>> {
        let conn = self.get_conn()?;
        let mut sql = format!(
            "SELECT {} FROM export_declaration WHERE 1=1",
            Self::SELECT_COLS
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(doc_no) = cond.doc_no.as_deref().filter(|s| !s.trim().is_empty()) {
            args.push(Box::new(format!("%{}%", doc_no.trim())));
            sql.push_str(&format!(" AND doc_no LIKE ?{}", args.len()));
        }
        if let Some(prod_type) = cond.prod_type.as_deref().filter(|s| !s.trim().is_empty()) {
            args.push(Box::new(format!("%{}%", prod_type.trim())));
            sql.push_str(&format!(" AND prod_type LIKE ?{}", args.len()));
        }
        if let Some(prod_name) = cond.prod_name.as_deref().filter(|s| !s.trim().is_empty()) {
            args.push(Box::new(format!("%{}%", prod_name.trim())));
            sql.push_str(&format!(" AND prod_name LIKE ?{}", args.len()));
        }
        // status 0 约定为全部
        if let Some(status) = cond.status.filter(|s| *s != 0) {
            args.push(Box::new(status));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), Self::map_row)?;
        let mut result = Vec::new();
        for raw in rows {
            result.push(Self::to_entity(raw?)?);
        }
        Ok(result)
    }

    /// 去重后的出口报单号码列表 (前端下拉选单用)
    pub fn distinct_doc_nos(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT doc_no FROM export_declaration ORDER BY doc_no ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for r in rows {
            result.push(r?);
        }
        Ok(result)
    }

    /// 删除项次
    ///
    /// 守卫: 状态必须仍为「已匯入出口明細」，且不得存在核销纪录。
    pub fn delete(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let status: i32 = conn
            .query_row(
                "SELECT status FROM export_declaration WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                    entity: "ExportDeclaration".to_string(),
                    id: id.to_string(),
                },
                other => other.into(),
            })?;

        if status != RefundStatus::Created.as_code() {
            return Err(RepositoryError::BusinessRuleViolation(
                "該報單狀態非「已匯入」，不可刪除".to_string(),
            ));
        }

        // tax_refund 表由退税纪录仓储建表；单独使用本仓储的库可能尚无该表
        let has_refund_table: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tax_refund'",
            [],
            |row| row.get(0),
        )?;
        let refund_count: i64 = if has_refund_table > 0 {
            conn.query_row(
                "SELECT COUNT(*) FROM tax_refund WHERE export_id = ?1",
                params![id],
                |row| row.get(0),
            )?
        } else {
            0
        };
        if refund_count > 0 {
            return Err(RepositoryError::BusinessRuleViolation(
                "已產生核銷清單，不可刪除".to_string(),
            ));
        }

        conn.execute("DELETE FROM export_declaration WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// 批量删除项次，守卫同 [`delete`](Self::delete)
    ///
    /// 单笔失败记入错误列表后继续处理后续 id，保证一次操作给出完整结果。
    pub fn batch_delete(&self, ids: &[i64]) -> RepositoryResult<BatchDeleteOutcome> {
        let mut outcome = BatchDeleteOutcome::default();
        for &id in ids {
            let dec = match self.find_by_id(id)? {
                Some(dec) => dec,
                None => {
                    outcome.errors.push(format!("出口報單不存在 (ID={})", id));
                    continue;
                }
            };
            match self.delete(id) {
                Ok(()) => outcome.success_count += 1,
                Err(RepositoryError::BusinessRuleViolation(msg)) => outcome
                    .errors
                    .push(format!("報單 {} 項次 {}: {}", dec.doc_no, dec.items, msg)),
                Err(e) => outcome.errors.push(format!("ID {}: {}", id, e)),
            }
        }
        Ok(outcome)
    }
}
