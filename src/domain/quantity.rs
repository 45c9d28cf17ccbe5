// ==========================================
// 保税加工退税核销系统 - 数量值类型
// ==========================================
// 职责: 定点三位小数数量 (对应数据库 numeric(9,3) 语义)
// 红线: 核销数量运算不得引入二进制浮点误差
// 实现: i64 千分位整数 (milli), 全程整数运算
// ==========================================

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// 数量小数位数 (固定 3 位)
pub const QTY_SCALE: u32 = 3;

/// 千分位换算因子
const MILLI: i64 = 1_000;

/// 数量解析错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QtyError {
    #[error("数量为空")]
    Empty,

    #[error("数量格式错误: {0}")]
    Invalid(String),

    #[error("数量小数位超过 {QTY_SCALE} 位: {0}")]
    TooManyDecimalPlaces(String),

    #[error("数量不可为负: {0}")]
    Negative(String),

    #[error("数量溢出: {0}")]
    Overflow(String),
}

// ==========================================
// Qty - 定点数量
// ==========================================

/// 非负定点数量，内部以千分位整数存储。
///
/// 所有加减乘与比较均为整数运算，满足“核销守恒”性质：
/// 已核销数量之和 = 需核销数量 - 剩余未核销数量 (精确相等)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Qty(i64);

impl Qty {
    /// 零数量
    pub const ZERO: Qty = Qty(0);

    /// 从千分位整数构造
    ///
    /// # 参数
    /// - milli: 千分位整数，不可为负
    pub fn from_milli(milli: i64) -> Result<Self, QtyError> {
        if milli < 0 {
            return Err(QtyError::Negative(format!("{} milli", milli)));
        }
        Ok(Qty(milli))
    }

    /// 千分位整数值 (数据库存储形式)
    pub fn as_milli(self) -> i64 {
        self.0
    }

    /// 是否为零
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// 解析十进制字符串 (如 "12.345")
    ///
    /// 规则:
    /// - 仅接受非负数值，可带 "+" 前缀
    /// - 小数位最多 3 位，超过即拒绝 (不做四舍五入)
    /// - 全程整数解析，不经过浮点
    pub fn parse(s: &str) -> Result<Self, QtyError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(QtyError::Empty);
        }

        if let Some(rest) = s.strip_prefix('-') {
            // "-0" 之类一律拒绝，避免出现“负零”歧义
            let _ = rest;
            return Err(QtyError::Negative(s.to_string()));
        }
        let digits = s.strip_prefix('+').unwrap_or(s);
        if digits.is_empty() {
            return Err(QtyError::Invalid(s.to_string()));
        }

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(QtyError::Invalid(s.to_string()));
        }
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(QtyError::Invalid(s.to_string()));
        }
        if frac_part.len() > QTY_SCALE as usize {
            return Err(QtyError::TooManyDecimalPlaces(s.to_string()));
        }

        let int_val: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse::<i64>()
                .map_err(|_| QtyError::Overflow(s.to_string()))?
        };

        // 小数部分右补零到 3 位后按整数解析
        let mut frac_padded = frac_part.to_string();
        while frac_padded.len() < QTY_SCALE as usize {
            frac_padded.push('0');
        }
        let frac_val: i64 = if frac_padded.is_empty() {
            0
        } else {
            frac_padded
                .parse::<i64>()
                .map_err(|_| QtyError::Invalid(s.to_string()))?
        };

        let milli = int_val
            .checked_mul(MILLI)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(|| QtyError::Overflow(s.to_string()))?;
        Ok(Qty(milli))
    }

    /// 加法 (溢出检查)
    pub fn checked_add(self, other: Qty) -> Result<Qty, QtyError> {
        self.0
            .checked_add(other.0)
            .map(Qty)
            .ok_or_else(|| QtyError::Overflow(format!("{} + {}", self, other)))
    }

    /// 减法，结果不可为负
    pub fn checked_sub(self, other: Qty) -> Result<Qty, QtyError> {
        if other.0 > self.0 {
            return Err(QtyError::Negative(format!("{} - {}", self, other)));
        }
        Ok(Qty(self.0 - other.0))
    }

    /// 减法，不足时截断为零 (用于余额展示，不用于账务校验)
    pub fn saturating_sub(self, other: Qty) -> Qty {
        Qty((self.0 - other.0).max(0))
    }

    /// 两数量中的较小者
    pub fn min(self, other: Qty) -> Qty {
        Qty(self.0.min(other.0))
    }

    /// 数量相乘 (出口数量 × 单位用量)
    ///
    /// 两个 scale=3 的定点数相乘产生 scale=6 的中间值，
    /// 随即按存储精度 scale=3 四舍五入 (round half up)。
    pub fn checked_mul(self, other: Qty) -> Result<Qty, QtyError> {
        let product = (self.0 as i128) * (other.0 as i128);
        // 半进位回到千分位: (p + 500) / 1000，两数均非负
        let rounded = (product + (MILLI as i128) / 2) / (MILLI as i128);
        if rounded > i64::MAX as i128 {
            return Err(QtyError::Overflow(format!("{} * {}", self, other)));
        }
        Ok(Qty(rounded as i64))
    }

    /// 与另一数量的千分位差值 (可为负，用于核销数量调整)
    pub fn milli_diff(self, other: Qty) -> i64 {
        self.0 - other.0
    }

    /// 应用千分位增量，结果不可为负
    pub fn checked_add_milli(self, delta: i64) -> Result<Qty, QtyError> {
        let v = self
            .0
            .checked_add(delta)
            .ok_or_else(|| QtyError::Overflow(format!("{} {:+} milli", self, delta)))?;
        if v < 0 {
            return Err(QtyError::Negative(format!("{} {:+} milli", self, delta)));
        }
        Ok(Qty(v))
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / MILLI, self.0 % MILLI)
    }
}

// ==========================================
// serde 实现
// ==========================================
// 序列化为三位小数字符串；反序列化兼容字符串与数值
// (Excel 解析出的数值列可能直接是浮点)

impl Serialize for Qty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct QtyVisitor;

impl<'de> Visitor<'de> for QtyVisitor {
    type Value = Qty;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("三位小数数量字符串或数值")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Qty, E> {
        Qty::parse(v).map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Qty, E> {
        let milli = (v as i64)
            .checked_mul(MILLI)
            .ok_or_else(|| de::Error::custom(QtyError::Overflow(v.to_string())))?;
        Qty::from_milli(milli).map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Qty, E> {
        let milli = v
            .checked_mul(MILLI)
            .ok_or_else(|| de::Error::custom(QtyError::Overflow(v.to_string())))?;
        Qty::from_milli(milli).map_err(de::Error::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Qty, E> {
        if !v.is_finite() || v < 0.0 {
            return Err(de::Error::custom(QtyError::Invalid(v.to_string())));
        }
        // 仅此一处经过浮点: 外部数值列转入时按存储精度取整
        let milli = (v * MILLI as f64).round();
        if milli > i64::MAX as f64 {
            return Err(de::Error::custom(QtyError::Overflow(v.to_string())));
        }
        Ok(Qty(milli as i64))
    }
}

impl<'de> Deserialize<'de> for Qty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Qty, D::Error> {
        deserializer.deserialize_any(QtyVisitor)
    }
}
