// ==========================================
// 保税加工退税核销系统 - 领域层
// ==========================================
// 职责: 实体与值类型定义，不含持久化与业务编排
// ==========================================

pub mod bom;
pub mod declaration;
pub mod quantity;
pub mod refund;
pub mod types;

pub use bom::{TaxBom, DEFAULT_PROD_UNIT};
pub use declaration::{ExportDeclaration, ImportDeclaration};
pub use quantity::{Qty, QtyError, QTY_SCALE};
pub use refund::TaxRefund;
pub use types::RefundStatus;
