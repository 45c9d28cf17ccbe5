// ==========================================
// 保税加工退税核销系统 - 进口报单仓储
// ==========================================
// 职责:
// - import_declaration 表的建表与读写
// - 按 (原料名称, 规格) 精确匹配取候选批次, id 升序 (FIFO)
// - 累计已核销数量的回写
// ==========================================

use crate::domain::declaration::ImportDeclaration;
use crate::domain::quantity::Qty;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 新增进口报单项次的输入 (累计已核销数量由仓储置零)
#[derive(Debug, Clone)]
pub struct NewImportDeclaration {
    pub doc_no: String,
    pub items: String,
    pub material_name: String,
    pub material_unit: Option<String>,
    pub material_spec: String,
    pub import_qty: Qty,
}

/// 进口报单查询条件
#[derive(Debug, Clone, Default)]
pub struct ImportSearch {
    pub doc_no: Option<String>,
    pub material_name: Option<String>,
}

pub struct ImportDeclarationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportDeclarationRepository {
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
            CREATE TABLE IF NOT EXISTS import_declaration (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              doc_no TEXT NOT NULL,
              items TEXT NOT NULL,
              material_name TEXT NOT NULL,
              material_unit TEXT,
              material_spec TEXT NOT NULL,
              import_qty_milli INTEGER NOT NULL CHECK (import_qty_milli >= 0),
              total_refund_qty_milli INTEGER NOT NULL DEFAULT 0
                CHECK (total_refund_qty_milli >= 0
                   AND total_refund_qty_milli <= import_qty_milli),
              UNIQUE (doc_no, items)
            );

            CREATE INDEX IF NOT EXISTS idx_import_declaration_material
              ON import_declaration(material_name, material_spec);
            "#,
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ImportRaw> {
        Ok(ImportRaw {
            id: row.get(0)?,
            doc_no: row.get(1)?,
            items: row.get(2)?,
            material_name: row.get(3)?,
            material_unit: row.get(4)?,
            material_spec: row.get(5)?,
            import_qty_milli: row.get(6)?,
            total_refund_qty_milli: row.get(7)?,
        })
    }

    fn to_entity(raw: ImportRaw) -> RepositoryResult<ImportDeclaration> {
        let field_err = |field: &str, e: crate::domain::quantity::QtyError| {
            RepositoryError::FieldValueError {
                field: field.to_string(),
                message: e.to_string(),
            }
        };
        Ok(ImportDeclaration {
            id: raw.id,
            doc_no: raw.doc_no,
            items: raw.items,
            material_name: raw.material_name,
            material_unit: raw.material_unit,
            material_spec: raw.material_spec,
            import_qty: Qty::from_milli(raw.import_qty_milli)
                .map_err(|e| field_err("import_qty_milli", e))?,
            total_refund_qty: Qty::from_milli(raw.total_refund_qty_milli)
                .map_err(|e| field_err("total_refund_qty_milli", e))?,
        })
    }

    const SELECT_COLS: &'static str = "id, doc_no, items, material_name, material_unit, \
                                       material_spec, import_qty_milli, total_refund_qty_milli";

    /// 新增项次，累计已核销数量置零
    pub fn insert(&self, dec: &NewImportDeclaration) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO import_declaration
               (doc_no, items, material_name, material_unit, material_spec,
                import_qty_milli, total_refund_qty_milli)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                dec.doc_no,
                dec.items,
                dec.material_name,
                dec.material_unit,
                dec.material_spec,
                dec.import_qty.as_milli(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<ImportDeclaration>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_declaration WHERE id = ?1",
            Self::SELECT_COLS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_row)?;
        match rows.next() {
            Some(raw) => Ok(Some(Self::to_entity(raw?)?)),
            None => Ok(None),
        }
    }

    /// FIFO 候选查询: 原料名称与规格均精确匹配，id 升序 (先进先核销)
    pub fn find_by_material_and_spec(
        &self,
        material_name: &str,
        material_spec: &str,
    ) -> RepositoryResult<Vec<ImportDeclaration>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_declaration
             WHERE material_name = ?1 AND material_spec = ?2
             ORDER BY id ASC",
            Self::SELECT_COLS
        ))?;
        let rows = stmt.query_map(params![material_name, material_spec], Self::map_row)?;
        let mut result = Vec::new();
        for raw in rows {
            result.push(Self::to_entity(raw?)?);
        }
        Ok(result)
    }

    /// 回写累计已核销数量
    ///
    /// 数量上下界由台账 (engine::ledger) 校验; 表上的 CHECK 约束兜底。
    pub fn update_total_refund_qty(&self, id: i64, total: Qty) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE import_declaration SET total_refund_qty_milli = ?2 WHERE id = ?1",
            params![id, total.as_milli()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ImportDeclaration".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 条件查询 (报单号码/原料名称模糊)
    pub fn search(&self, cond: &ImportSearch) -> RepositoryResult<Vec<ImportDeclaration>> {
        let conn = self.get_conn()?;
        let mut sql = format!(
            "SELECT {} FROM import_declaration WHERE 1=1",
            Self::SELECT_COLS
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(doc_no) = cond.doc_no.as_deref().filter(|s| !s.trim().is_empty()) {
            args.push(Box::new(format!("%{}%", doc_no.trim())));
            sql.push_str(&format!(" AND doc_no LIKE ?{}", args.len()));
        }
        if let Some(name) = cond.material_name.as_deref().filter(|s| !s.trim().is_empty()) {
            args.push(Box::new(format!("%{}%", name.trim())));
            sql.push_str(&format!(" AND material_name LIKE ?{}", args.len()));
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

    /// 删除项次
    ///
    /// 守卫: 已被核销纪录引用的批次不可删除。
    pub fn delete(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_declaration WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ImportDeclaration".to_string(),
                id: id.to_string(),
            });
        }

        let has_refund_table: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tax_refund'",
            [],
            |row| row.get(0),
        )?;
        if has_refund_table > 0 {
            let refund_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tax_refund WHERE import_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if refund_count > 0 {
                return Err(RepositoryError::BusinessRuleViolation(
                    "已產生核銷清單，不可刪除".to_string(),
                ));
            }
        }

        conn.execute("DELETE FROM import_declaration WHERE id = ?1", params![id])?;
        Ok(())
    }
}

// 行读取中间结构 (列数超过元组映射的可读范围)
struct ImportRaw {
    id: i64,
    doc_no: String,
    items: String,
    material_name: String,
    material_unit: Option<String>,
    material_spec: String,
    import_qty_milli: i64,
    total_refund_qty_milli: i64,
}
