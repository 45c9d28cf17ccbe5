// ==========================================
// 保税加工退税核销系统 - 导入层
// ==========================================
// 职责: 外部报单/BOM 文件导入，生成内部数据
// 支持: Excel, CSV
// ==========================================

// 模块声明
pub mod declaration_importer;
pub mod error;
pub mod file_parser;

// 重导出核心类型
pub use declaration_importer::{
    ExportDeclarationImporter, ImportDeclarationImporter, ImportOutcome, TaxBomImporter,
};
pub use error::{ImportError, ImportResult};
pub use file_parser::{parse_csv, parse_excel, parse_file, RawRecord};
