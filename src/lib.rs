// ==========================================
// 保税加工退税核销系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 保税加工出口退税核销 (BOM 解析 + FIFO 批次扣取)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与值类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 核销业务规则
pub mod engine;

// 导入层 - 外部报单/BOM 文件
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{ExportDeclaration, ImportDeclaration, Qty, RefundStatus, TaxBom, TaxRefund};

// 引擎
pub use engine::{
    BomResolver, EngineError, EngineResult, FifoAllocator, GenerateRefundResult,
    RefundOrchestrator, ReportBuilder,
};

// 导入器
pub use importer::{
    ExportDeclarationImporter, ImportDeclarationImporter, ImportOutcome, TaxBomImporter,
};

// 配置
pub use config::AppConfig;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "保税加工退税核销系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
