// ==========================================
// 保税加工退税核销系统 - 应用配置
// ==========================================
// 职责: 数据库路径与厂商统一编号的解析
// 优先级: 环境变量 > 系统数据目录缺省值
// ==========================================

use std::path::PathBuf;

/// 数据库路径环境变量
pub const ENV_DB_PATH: &str = "TAX_REFUND_DB";

/// 厂商统一编号环境变量
pub const ENV_UNIFORM_NO: &str = "TAX_REFUND_UNIFORM_NO";

/// 厂商统一编号缺省值 (用料清表/沖退稅申請報表的製造商与進口商栏位)
pub const DEFAULT_UNIFORM_NO: &str = "53019078";

/// 应用配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite 数据库文件路径
    pub db_path: PathBuf,
    /// 厂商统一编号
    pub manufacturer_uniform_no: String,
}

impl AppConfig {
    /// 从环境变量解析配置，缺省落到系统数据目录
    pub fn from_env() -> Self {
        let db_path = std::env::var(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_db_path());

        let manufacturer_uniform_no = std::env::var(ENV_UNIFORM_NO)
            .unwrap_or_else(|_| DEFAULT_UNIFORM_NO.to_string());

        Self {
            db_path,
            manufacturer_uniform_no,
        }
    }

    /// 缺省数据库路径: <数据目录>/bonded-tax-refund/tax_refund.db
    ///
    /// 数据目录不可用时退回当前目录 (如容器内精简环境)。
    pub fn default_db_path() -> PathBuf {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("bonded-tax-refund").join("tax_refund.db")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_path_has_fixed_file_name() {
        let p = AppConfig::default_db_path();
        assert_eq!(p.file_name().and_then(|n| n.to_str()), Some("tax_refund.db"));
    }
}
