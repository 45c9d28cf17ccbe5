// ==========================================
// 保税加工退税核销系统 - 引擎层错误类型
// ==========================================
// 错误分级:
// - 致命 (整批): DocumentNotFound
// - 致命 (单次修正): RefundNotFound / Ledger(CapacityExceeded | InvalidAdjustment)
// - 可恢复 (逐项降级为警告): 缺 BOM / 无进口报单 / 库存不足，不进入本类型
// - 基础设施: Repository 错误原样向上传播
// ==========================================

use crate::domain::quantity::QtyError;
use crate::engine::ledger::LedgerError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("找不到出口報單: {0}")]
    DocumentNotFound(String),

    #[error("找不到退稅紀錄: {0}")]
    RefundNotFound(i64),

    #[error("核销纪录引用的数据缺失: {entity} id={id}")]
    DanglingReference { entity: String, id: i64 },

    #[error("數量運算錯誤: {0}")]
    Quantity(#[from] QtyError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
