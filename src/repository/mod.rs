// ==========================================
// 保税加工退税核销系统 - 数据仓储层
// ==========================================
// 职责: 四张核心表 (出口报单/进口报单/核退标准BOM/核销纪录) 的数据访问
// 红线: 仓储只做数据存取与存量守卫，核销规则一律在 engine 层
// ==========================================

pub mod bom_repo;
pub mod error;
pub mod export_repo;
pub mod import_repo;
pub mod refund_repo;

pub use bom_repo::{NewTaxBom, TaxBomRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use export_repo::{
    BatchDeleteOutcome, ExportDeclarationRepository, ExportSearch, NewExportDeclaration,
};
pub use import_repo::{ImportDeclarationRepository, ImportSearch, NewImportDeclaration};
pub use refund_repo::{NewTaxRefund, TaxRefundRepository};
