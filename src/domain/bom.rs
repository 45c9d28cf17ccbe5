// ==========================================
// 保税加工退税核销系统 - 核退标准 BOM
// ==========================================
// 职责: (成品规格, 成品名称) → 原料用量配方行
// 说明: material_spec 为逗号分隔的规格别名串，
//       任一别名命中进口报单即可核销；
//       拆分动作统一由 BomResolver 完成 (只拆一次)
// ==========================================

use crate::domain::quantity::Qty;
use serde::{Deserialize, Serialize};

/// 成品单位缺省值 (报表输出时使用)
pub const DEFAULT_PROD_UNIT: &str = "SET";

// ==========================================
// TaxBom - 核退标准 BOM 配方行
// ==========================================

/// 核退标准 BOM 的一行: 某成品每单位消耗某原料 usage_qty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBom {
    /// 数据库主键
    pub id: i64,
    /// 工業局標準文號
    pub doc_no: String,
    /// 成品规格 (产品类别)
    pub prod_type: String,
    /// 成品名称
    pub prod_name: String,
    /// 成品单位，缺省记 SET
    pub prod_unit: Option<String>,
    /// 原料序号
    pub material_num: i32,
    /// 原料名称
    pub material_name: String,
    /// 原料单位
    pub material_unit: String,
    /// 原料规格 (原始逗号分隔串，报表按原样输出)
    pub material_spec: String,
    /// 每单位成品用量
    pub usage_qty: Qty,
}

impl TaxBom {
    /// 报表用成品单位
    pub fn prod_unit_or_default(&self) -> &str {
        self.prod_unit.as_deref().unwrap_or(DEFAULT_PROD_UNIT)
    }
}
