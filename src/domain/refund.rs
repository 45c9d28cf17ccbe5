// ==========================================
// 保税加工退税核销系统 - 退税核销纪录
// ==========================================
// 职责: 核销审计纪录 (一次出口项次对一批进口原料的扣账)
// 说明: 纪录一经产生不可删除；数量仅可经显式调整操作修正，
//       并同步回进口报单的累计已核销数量
// ==========================================

use crate::domain::quantity::Qty;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// TaxRefund - 退税核销纪录
// ==========================================

/// 一笔核销: 某出口项次依某 BOM 行，自某进口批次扣除 usage_qty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxRefund {
    /// 数据库主键
    pub id: i64,
    /// 报表生成号码 (YYYYMMDD-HHmmss，同一次核销运行共用)
    pub report_no: String,
    /// 工業局標準文號 (自 BOM 行复制)
    pub doc_no: String,
    /// 出口报单项次 ID
    pub export_id: i64,
    /// 进口报单项次 ID
    pub import_id: i64,
    /// BOM 配方行 ID
    pub bom_id: i64,
    /// 本笔核销数量 (> 0)
    pub usage_qty: Qty,
    /// 原料分号: 同一出口项次内自 1 起连续编号，
    /// 跨该项次所有 BOM 行连续递增 (不按行重置)
    pub branch_num: i32,
    /// 产生时间
    pub created_at: DateTime<Utc>,
}
