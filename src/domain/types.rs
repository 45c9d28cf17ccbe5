// ==========================================
// 保税加工退税核销系统 - 领域类型定义
// ==========================================
// 依据: 出口报单核退状态流转 (单向递进)
// 1: 已匯入出口明細 → 2: 已產生核銷清單 → 3: 已產生核銷清單報表
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 核退状态 (Refund Status)
// ==========================================
// 红线: 状态只能单向前进，不允许回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    /// 已匯入出口明細
    Created,
    /// 已產生核銷清單
    Reconciled,
    /// 已產生核銷清單報表
    Reported,
}

impl RefundStatus {
    /// 数据库状态码 (与原始报单系统一致: 1/2/3)
    pub fn as_code(self) -> i32 {
        match self {
            RefundStatus::Created => 1,
            RefundStatus::Reconciled => 2,
            RefundStatus::Reported => 3,
        }
    }

    /// 从数据库状态码还原
    pub fn from_code(code: i32) -> Option<RefundStatus> {
        match code {
            1 => Some(RefundStatus::Created),
            2 => Some(RefundStatus::Reconciled),
            3 => Some(RefundStatus::Reported),
            _ => None,
        }
    }

    /// 状态中文名称 (查询结果展示用)
    pub fn label(self) -> &'static str {
        match self {
            RefundStatus::Created => "已匯入出口明細",
            RefundStatus::Reconciled => "已產生核銷清單",
            RefundStatus::Reported => "已產生核銷清單報表",
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefundStatus::Created => write!(f, "CREATED"),
            RefundStatus::Reconciled => write!(f, "RECONCILED"),
            RefundStatus::Reported => write!(f, "REPORTED"),
        }
    }
}
