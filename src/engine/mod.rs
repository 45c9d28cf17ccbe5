// ==========================================
// 保税加工退税核销系统 - 引擎层
// ==========================================
// 职责: 核销业务规则 (FIFO 扣取、BOM 解析、台账守恒、批次编排、报表)
// 红线: 纯算法 (ledger / allocator::consume) 不访问存储;
//       逐项业务问题降级为警告，基础设施错误原样上抛
// ==========================================

pub mod allocator;
pub mod bom_resolver;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod report;

// 重导出核心引擎
pub use allocator::{FifoAllocator, FifoOutcome};
pub use bom_resolver::{BomLine, BomResolver, MaterialKey};
pub use error::{EngineError, EngineResult};
pub use ledger::LedgerError;
pub use orchestrator::{GenerateRefundResult, RefundOrchestrator};
pub use report::{ReportBuilder, ReportTable};
