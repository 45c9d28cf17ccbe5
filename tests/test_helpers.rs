// ==========================================
// 集成测试辅助工具
// ==========================================
// 作用: 建立共享连接的测试数据库与各仓储、造数辅助函数
// ==========================================

#![allow(dead_code)]

use bonded_tax_refund::db;
use bonded_tax_refund::domain::Qty;
use bonded_tax_refund::engine::{BomResolver, RefundOrchestrator};
use bonded_tax_refund::repository::bom_repo::{NewTaxBom, TaxBomRepository};
use bonded_tax_refund::repository::export_repo::{
    ExportDeclarationRepository, NewExportDeclaration,
};
use bonded_tax_refund::repository::import_repo::{
    ImportDeclarationRepository, NewImportDeclaration,
};
use bonded_tax_refund::repository::refund_repo::TaxRefundRepository;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 测试上下文: 所有仓储共享同一个连接 (与生产布线一致)
pub struct TestContext {
    // TempDir 随上下文存活，析构时清理数据库文件
    _temp_dir: TempDir,
    pub conn: Arc<Mutex<Connection>>,
    pub export_repo: Arc<ExportDeclarationRepository>,
    pub import_repo: Arc<ImportDeclarationRepository>,
    pub bom_repo: Arc<TaxBomRepository>,
    pub refund_repo: Arc<TaxRefundRepository>,
}

impl TestContext {
    pub fn orchestrator(&self) -> RefundOrchestrator {
        RefundOrchestrator::new(
            self.conn.clone(),
            self.export_repo.clone(),
            self.import_repo.clone(),
            self.refund_repo.clone(),
            BomResolver::new(self.bom_repo.clone()),
        )
    }
}

/// 建立临时数据库与全部仓储
pub fn setup() -> TestContext {
    let temp_dir = TempDir::new().expect("建立临时目录失败");
    let db_path = temp_dir
        .path()
        .join("tax_refund_test.db")
        .to_string_lossy()
        .to_string();

    let conn = db::open_sqlite_connection(&db_path).expect("打开测试数据库失败");
    let conn = Arc::new(Mutex::new(conn));

    let export_repo =
        Arc::new(ExportDeclarationRepository::from_connection(conn.clone()).expect("export repo"));
    let import_repo =
        Arc::new(ImportDeclarationRepository::from_connection(conn.clone()).expect("import repo"));
    let bom_repo = Arc::new(TaxBomRepository::from_connection(conn.clone()).expect("bom repo"));
    let refund_repo =
        Arc::new(TaxRefundRepository::from_connection(conn.clone()).expect("refund repo"));

    TestContext {
        _temp_dir: temp_dir,
        conn,
        export_repo,
        import_repo,
        bom_repo,
        refund_repo,
    }
}

/// 解析数量字面量 (测试内统一入口)
pub fn qty(s: &str) -> Qty {
    Qty::parse(s).expect("数量字面量非法")
}

/// 造一笔出口报单项次
pub fn insert_export(
    ctx: &TestContext,
    doc_no: &str,
    items: &str,
    prod_type: &str,
    prod_name: &str,
    export_qty: &str,
) -> i64 {
    ctx.export_repo
        .insert(&NewExportDeclaration {
            doc_no: doc_no.to_string(),
            items: items.to_string(),
            prod_type: prod_type.to_string(),
            prod_name: prod_name.to_string(),
            export_qty: qty(export_qty),
        })
        .expect("插入出口报单失败")
}

/// 造一笔进口报单项次 (原料批次)
pub fn insert_import(
    ctx: &TestContext,
    doc_no: &str,
    items: &str,
    material_name: &str,
    material_spec: &str,
    import_qty: &str,
) -> i64 {
    ctx.import_repo
        .insert(&NewImportDeclaration {
            doc_no: doc_no.to_string(),
            items: items.to_string(),
            material_name: material_name.to_string(),
            material_unit: Some("KG".to_string()),
            material_spec: material_spec.to_string(),
            import_qty: qty(import_qty),
        })
        .expect("插入进口报单失败")
}

/// 造一行核退标准 BOM
#[allow(clippy::too_many_arguments)]
pub fn insert_bom(
    ctx: &TestContext,
    doc_no: &str,
    prod_type: &str,
    prod_name: &str,
    material_num: i32,
    material_name: &str,
    material_spec: &str,
    usage_qty: &str,
) -> i64 {
    ctx.bom_repo
        .insert(&NewTaxBom {
            doc_no: doc_no.to_string(),
            prod_type: prod_type.to_string(),
            prod_name: prod_name.to_string(),
            prod_unit: Some("SET".to_string()),
            material_num,
            material_name: material_name.to_string(),
            material_unit: "KG".to_string(),
            material_spec: material_spec.to_string(),
            usage_qty: qty(usage_qty),
        })
        .expect("插入BOM失败")
}
