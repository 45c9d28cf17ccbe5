// ==========================================
// 保税加工退税核销系统 - 报单实体
// ==========================================
// 职责: 出口报单项次 / 进口报单项次
// 说明: 一行实体对应报关单上的一个项次 (items)，
//       同一报单号码 (doc_no) 下可有多个项次
// ==========================================

use crate::domain::quantity::Qty;
use crate::domain::types::RefundStatus;
use serde::{Deserialize, Serialize};

// ==========================================
// ExportDeclaration - 出口报单项次
// ==========================================

/// 出口报单项次 (成品出口明细的一行)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDeclaration {
    /// 数据库主键 (同时作为创建顺序)
    pub id: i64,
    /// 出口报单号码
    pub doc_no: String,
    /// 报单项次
    pub items: String,
    /// 成品规格 (产品类别)
    pub prod_type: String,
    /// 成品名称
    pub prod_name: String,
    /// 出口数量
    pub export_qty: Qty,
    /// 核退状态
    pub status: RefundStatus,
}

impl ExportDeclaration {
    /// 是否已进入核销流程 (已产生核销清单或报表)
    pub fn is_reconciled(&self) -> bool {
        self.status >= RefundStatus::Reconciled
    }
}

// ==========================================
// ImportDeclaration - 进口报单项次
// ==========================================

/// 进口报单项次 (原料入库批次的一行)
///
/// 不变量: `0 ≤ total_refund_qty ≤ import_qty` 在每次核销/调整前后恒成立。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDeclaration {
    /// 数据库主键，FIFO 依此升序消耗 (最早进口的批次先核销)
    pub id: i64,
    /// 进口报单号码
    pub doc_no: String,
    /// 报单项次
    pub items: String,
    /// 原料名称
    pub material_name: String,
    /// 原料单位
    pub material_unit: Option<String>,
    /// 原料规格
    pub material_spec: String,
    /// 进口数量
    pub import_qty: Qty,
    /// 累计已核销数量 (初始为零)
    pub total_refund_qty: Qty,
}
