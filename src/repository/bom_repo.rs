// ==========================================
// 保税加工退税核销系统 - 核退标准 BOM 仓储
// ==========================================
// 职责:
// - tax_bom 表的建表与读写
// - 按 (成品规格, 成品名称) 精确匹配取配方行
// ==========================================

use crate::domain::bom::TaxBom;
use crate::domain::quantity::Qty;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 新增 BOM 配方行的输入
#[derive(Debug, Clone)]
pub struct NewTaxBom {
    pub doc_no: String,
    pub prod_type: String,
    pub prod_name: String,
    pub prod_unit: Option<String>,
    pub material_num: i32,
    pub material_name: String,
    pub material_unit: String,
    pub material_spec: String,
    pub usage_qty: Qty,
}

pub struct TaxBomRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TaxBomRepository {
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
            CREATE TABLE IF NOT EXISTS tax_bom (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              doc_no TEXT NOT NULL,
              prod_type TEXT NOT NULL,
              prod_name TEXT NOT NULL,
              prod_unit TEXT,
              material_num INTEGER NOT NULL,
              material_name TEXT NOT NULL,
              material_unit TEXT NOT NULL,
              material_spec TEXT NOT NULL,
              usage_qty_milli INTEGER NOT NULL CHECK (usage_qty_milli >= 0)
            );

            CREATE INDEX IF NOT EXISTS idx_tax_bom_prod
              ON tax_bom(prod_type, prod_name);
            "#,
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<BomRaw> {
        Ok(BomRaw {
            id: row.get(0)?,
            doc_no: row.get(1)?,
            prod_type: row.get(2)?,
            prod_name: row.get(3)?,
            prod_unit: row.get(4)?,
            material_num: row.get(5)?,
            material_name: row.get(6)?,
            material_unit: row.get(7)?,
            material_spec: row.get(8)?,
            usage_qty_milli: row.get(9)?,
        })
    }

    fn to_entity(raw: BomRaw) -> RepositoryResult<TaxBom> {
        let usage_qty =
            Qty::from_milli(raw.usage_qty_milli).map_err(|e| RepositoryError::FieldValueError {
                field: "usage_qty_milli".to_string(),
                message: e.to_string(),
            })?;
        Ok(TaxBom {
            id: raw.id,
            doc_no: raw.doc_no,
            prod_type: raw.prod_type,
            prod_name: raw.prod_name,
            prod_unit: raw.prod_unit,
            material_num: raw.material_num,
            material_name: raw.material_name,
            material_unit: raw.material_unit,
            material_spec: raw.material_spec,
            usage_qty,
        })
    }

    const SELECT_COLS: &'static str = "id, doc_no, prod_type, prod_name, prod_unit, \
                                       material_num, material_name, material_unit, \
                                       material_spec, usage_qty_milli";

    pub fn insert(&self, bom: &NewTaxBom) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO tax_bom
               (doc_no, prod_type, prod_name, prod_unit, material_num,
                material_name, material_unit, material_spec, usage_qty_milli)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                bom.doc_no,
                bom.prod_type,
                bom.prod_name,
                bom.prod_unit,
                bom.material_num,
                bom.material_name,
                bom.material_unit,
                bom.material_spec,
                bom.usage_qty.as_milli(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<TaxBom>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tax_bom WHERE id = ?1",
            Self::SELECT_COLS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::map_row)?;
        match rows.next() {
            Some(raw) => Ok(Some(Self::to_entity(raw?)?)),
            None => Ok(None),
        }
    }

    /// 按 (成品规格, 成品名称) 精确匹配取配方行，原料序号升序
    ///
    /// 无配方时返回空列表 (由上层转为警告，不视为错误)。
    pub fn find_by_prod(
        &self,
        prod_type: &str,
        prod_name: &str,
    ) -> RepositoryResult<Vec<TaxBom>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tax_bom
             WHERE prod_type = ?1 AND prod_name = ?2
             ORDER BY material_num ASC, id ASC",
            Self::SELECT_COLS
        ))?;
        let rows = stmt.query_map(params![prod_type, prod_name], Self::map_row)?;
        let mut result = Vec::new();
        for raw in rows {
            result.push(Self::to_entity(raw?)?);
        }
        Ok(result)
    }

    /// 删除配方行
    ///
    /// 守卫: 已被核销纪录引用的配方行不可删除。
    pub fn delete(&self, id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tax_bom WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(RepositoryError::NotFound {
                entity: "TaxBom".to_string(),
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
                "SELECT COUNT(*) FROM tax_refund WHERE bom_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if refund_count > 0 {
                return Err(RepositoryError::BusinessRuleViolation(
                    "已產生核銷清單，不可刪除".to_string(),
                ));
            }
        }

        conn.execute("DELETE FROM tax_bom WHERE id = ?1", params![id])?;
        Ok(())
    }
}

struct BomRaw {
    id: i64,
    doc_no: String,
    prod_type: String,
    prod_name: String,
    prod_unit: Option<String>,
    material_num: i32,
    material_name: String,
    material_unit: String,
    material_spec: String,
    usage_qty_milli: i64,
}
