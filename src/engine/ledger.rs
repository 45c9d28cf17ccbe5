// ==========================================
// 保税加工退税核销系统 - 进口批次数量台账
// ==========================================
// 职责: 进口报单项次上 "已核销数量" 的集中式安全运算
// 不变量: 0 ≤ total_refund_qty ≤ import_qty 在每次操作前后恒成立
// 红线: 越界即失败，禁止静默截断
// ==========================================

use crate::domain::declaration::ImportDeclaration;
use crate::domain::quantity::Qty;
use thiserror::Error;

/// 台账操作错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LedgerError {
    #[error("核銷數量必須大於零")]
    NonPositiveAmount,

    #[error("進口報單數量不足 (進口總量: {import_qty}, 調整後已核銷: {attempted_total})")]
    CapacityExceeded {
        import_qty: Qty,
        attempted_total: Qty,
    },

    #[error("已核銷數量不能小於 0 (調整量: {delta_milli:+} milli)")]
    InvalidAdjustment { delta_milli: i64 },
}

/// 批次可用余额 = 进口数量 - 累计已核销数量
///
/// 持久化数据满足不变量时不会为负；余额展示一律截断到零由调用方负责，
/// 校验路径使用 [`apply_consumption`] / [`adjust_consumption`]，不在此处放宽。
pub fn remaining_qty(lot: &ImportDeclaration) -> Qty {
    lot.import_qty.saturating_sub(lot.total_refund_qty)
}

/// 核销扣账: 累计已核销数量增加 amount
///
/// # 失败
/// - `NonPositiveAmount`: amount 为零
/// - `CapacityExceeded`: 扣账后超过进口总量
pub fn apply_consumption(lot: &mut ImportDeclaration, amount: Qty) -> Result<(), LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::NonPositiveAmount);
    }
    let attempted = lot
        .total_refund_qty
        .checked_add(amount)
        .map_err(|_| LedgerError::CapacityExceeded {
            import_qty: lot.import_qty,
            attempted_total: lot.total_refund_qty,
        })?;
    if attempted > lot.import_qty {
        return Err(LedgerError::CapacityExceeded {
            import_qty: lot.import_qty,
            attempted_total: attempted,
        });
    }
    lot.total_refund_qty = attempted;
    Ok(())
}

/// 核销数量调整: 累计已核销数量应用带符号增量 (千分位)
///
/// 用于单笔核销纪录的数量修正；结果必须仍落在 [0, import_qty] 内。
///
/// # 失败
/// - `InvalidAdjustment`: 调整后为负
/// - `CapacityExceeded`: 调整后超过进口总量
pub fn adjust_consumption(lot: &mut ImportDeclaration, delta_milli: i64) -> Result<(), LedgerError> {
    let adjusted = lot
        .total_refund_qty
        .checked_add_milli(delta_milli)
        .map_err(|_| LedgerError::InvalidAdjustment { delta_milli })?;
    if adjusted > lot.import_qty {
        return Err(LedgerError::CapacityExceeded {
            import_qty: lot.import_qty,
            attempted_total: adjusted,
        });
    }
    lot.total_refund_qty = adjusted;
    Ok(())
}
