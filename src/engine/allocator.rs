// ==========================================
// 保税加工退税核销系统 - FIFO 批次分配引擎
// ==========================================
// 职责: 按原料键取候选进口批次，先进先核销地贪心扣取需求量
// 规则:
// 1) 候选按规格别名逐一检索 (名称+规格均精确匹配)
// 2) 每个别名的子列表按批次创建顺序升序 (最旧批次优先)
// 3) 逐批扣取 min(批次余额, 剩余需求)，扣完或候选耗尽为止
// 红线: 库存不足不是引擎错误，以非零 remainder 上报，由编排层转警告
// ==========================================

use crate::domain::declaration::ImportDeclaration;
use crate::domain::quantity::Qty;
use crate::engine::bom_resolver::MaterialKey;
use crate::engine::ledger;
use crate::repository::error::RepositoryResult;
use crate::repository::import_repo::ImportDeclarationRepository;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

// ==========================================
// FifoOutcome - 分配结果
// ==========================================

/// 一次 FIFO 分配的结果
#[derive(Debug, Clone)]
pub struct FifoOutcome {
    /// 有序扣取明细: (被扣批次快照, 本批扣取量)，扣取量均大于零
    pub consumed: Vec<(ImportDeclaration, Qty)>,
    /// 候选耗尽后仍未满足的需求量 (完全满足时为零)
    pub remainder: Qty,
    /// 是否完全没有候选批次 (连一个匹配批次都不存在)
    pub no_candidates: bool,
}

impl FifoOutcome {
    /// 实际扣取总量
    pub fn total_consumed(&self) -> Qty {
        self.consumed
            .iter()
            .fold(Qty::ZERO, |acc, (_, amount)| {
                // 扣取量来源于余额切分，不会溢出
                acc.checked_add(*amount).unwrap_or(acc)
            })
    }
}

// ==========================================
// FifoAllocator - FIFO 批次分配器
// ==========================================

pub struct FifoAllocator {
    import_repo: Arc<ImportDeclarationRepository>,
}

impl FifoAllocator {
    pub fn new(import_repo: Arc<ImportDeclarationRepository>) -> Self {
        Self { import_repo }
    }

    /// 检索候选批次并执行 FIFO 扣取
    ///
    /// # 参数
    /// - key: 原料键 (名称 + 有序规格别名集)
    /// - required: 需核销数量；为零时直接返回空结果
    #[instrument(skip(self), fields(material = %key.name, required = %required))]
    pub fn allocate(&self, key: &MaterialKey, required: Qty) -> RepositoryResult<FifoOutcome> {
        if required.is_zero() {
            return Ok(FifoOutcome {
                consumed: Vec::new(),
                remainder: Qty::ZERO,
                no_candidates: false,
            });
        }

        // 按别名顺序拼接候选；同一批次多次命中 (规格别名重复) 只保留首次
        let mut candidates: Vec<ImportDeclaration> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();
        for spec in &key.specs {
            let lots = self.import_repo.find_by_material_and_spec(&key.name, spec)?;
            for lot in lots {
                if seen.insert(lot.id) {
                    candidates.push(lot);
                }
            }
        }

        debug!(candidates = candidates.len(), "FIFO 候选批次检索完成");
        Ok(Self::consume(candidates, required))
    }

    /// 纯 FIFO 扣取 (不访问存储，候选顺序即消耗顺序)
    pub fn consume(candidates: Vec<ImportDeclaration>, required: Qty) -> FifoOutcome {
        let no_candidates = candidates.is_empty();
        let mut consumed = Vec::new();
        let mut remaining = required;

        for lot in candidates {
            if remaining.is_zero() {
                break;
            }
            let available = ledger::remaining_qty(&lot);
            if available.is_zero() {
                continue;
            }
            let take = available.min(remaining);
            // remaining ≥ take 恒成立
            remaining = remaining.saturating_sub(take);
            consumed.push((lot, take));
        }

        FifoOutcome {
            consumed,
            remainder: remaining,
            no_candidates,
        }
    }
}
