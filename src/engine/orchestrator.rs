// ==========================================
// 保税加工退税核销系统 - 核销编排器
// ==========================================
// 用途: 退税核销主流程 (以出口报单号码为批次入口)
// 流程: 取出口项次 → 已处理跳过 → 解析 BOM → 计算需求量
//       → FIFO 扣取进口批次 → 落核销纪录/回写台账 → 推进状态
// 红线:
// - 单项次/单原料的问题一律降级为警告，不中断同报单其他项次
// - 基础设施错误原样上抛并回滚整批事务
// - 整份退税纪录的数量修正必须同步回写进口台账
// ==========================================

use crate::domain::declaration::ExportDeclaration;
use crate::domain::quantity::Qty;
use crate::domain::refund::TaxRefund;
use crate::domain::types::RefundStatus;
use crate::engine::allocator::FifoAllocator;
use crate::engine::bom_resolver::BomResolver;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ledger;
use crate::repository::error::RepositoryError;
use crate::repository::export_repo::ExportDeclarationRepository;
use crate::repository::import_repo::ImportDeclarationRepository;
use crate::repository::refund_repo::{NewTaxRefund, TaxRefundRepository};
use chrono::Local;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

// ==========================================
// GenerateRefundResult - 核销批次结果
// ==========================================

/// 一次核销运行的汇总结果
#[derive(Debug, Clone)]
pub struct GenerateRefundResult {
    /// 成功产生的核销纪录笔数
    pub success_count: u32,
    /// 本次运行的报表生成号码 (YYYYMMDD-HHmmss)
    pub report_no: String,
    /// 逐项降级的警告 (按发生顺序)
    pub warnings: Vec<String>,
}

/// 单一出口项次的处理结果 (显式累加值，逐项折叠进批次结果)
#[derive(Debug, Clone, Default)]
struct ItemOutcome {
    created: u32,
    warnings: Vec<String>,
}

// ==========================================
// RefundOrchestrator - 核销编排器
// ==========================================

pub struct RefundOrchestrator {
    conn: Arc<Mutex<Connection>>,
    export_repo: Arc<ExportDeclarationRepository>,
    import_repo: Arc<ImportDeclarationRepository>,
    refund_repo: Arc<TaxRefundRepository>,
    resolver: BomResolver,
    allocator: FifoAllocator,
}

impl RefundOrchestrator {
    /// 创建编排器 (各仓储须共享同一连接，保证批次事务覆盖全部写入)
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        export_repo: Arc<ExportDeclarationRepository>,
        import_repo: Arc<ImportDeclarationRepository>,
        refund_repo: Arc<TaxRefundRepository>,
        resolver: BomResolver,
    ) -> Self {
        let allocator = FifoAllocator::new(import_repo.clone());
        Self {
            conn,
            export_repo,
            import_repo,
            refund_repo,
            resolver,
            allocator,
        }
    }

    // ==========================================
    // 批次入口
    // ==========================================

    /// 产生退税清单 (核销一份出口报单)
    ///
    /// # 参数
    /// - doc_no: 出口报单号码
    ///
    /// # 返回
    /// 成功笔数、报表号码、警告列表；报单不存在时返回
    /// [`EngineError::DocumentNotFound`]，不产生任何写入。
    #[instrument(skip(self))]
    pub fn generate_refund_list(&self, doc_no: &str) -> EngineResult<GenerateRefundResult> {
        info!(doc_no = %doc_no, "開始產生退稅清單");

        // 报表号码: 本次运行内所有核销纪录共用
        let report_no = Local::now().format("%Y%m%d-%H%M%S").to_string();

        let exports = self.export_repo.find_by_doc_no(doc_no)?;
        if exports.is_empty() {
            return Err(EngineError::DocumentNotFound(doc_no.to_string()));
        }

        // 整批一个事务: 业务性部分结果 (缺BOM/库存不足) 照常提交，
        // 基础设施错误回滚全部写入
        self.in_transaction(|| {
            let mut success_count: u32 = 0;
            let mut warnings: Vec<String> = Vec::new();

            for export in &exports {
                let outcome = self.reconcile_item(export, &report_no)?;
                success_count += outcome.created;
                warnings.extend(outcome.warnings);
            }

            info!(
                doc_no = %doc_no,
                report_no = %report_no,
                success_count,
                warning_count = warnings.len(),
                "退稅清單產生完成"
            );
            Ok(GenerateRefundResult {
                success_count,
                report_no: report_no.clone(),
                warnings,
            })
        })
    }

    /// 处理单一出口项次，返回显式结果值 (不共享可变批次状态)
    fn reconcile_item(
        &self,
        export: &ExportDeclaration,
        report_no: &str,
    ) -> EngineResult<ItemOutcome> {
        let mut outcome = ItemOutcome::default();

        // 已产生核销清单的项次跳过
        if export.is_reconciled() {
            info!(items = %export.items, "出口項次已產生核銷清單，跳過");
            outcome
                .warnings
                .push(format!("出口項次 {} 已產生核銷清單，跳過", export.items));
            return Ok(outcome);
        }

        // 解析核退标准 BOM
        let bom_lines = self.resolver.resolve(&export.prod_type, &export.prod_name)?;
        if bom_lines.is_empty() {
            warn!(
                prod_type = %export.prod_type,
                prod_name = %export.prod_name,
                "找不到對應的BOM"
            );
            outcome.warnings.push(format!(
                "項次 {} 找不到對應的核退標準 BOM (規格={}, 品名={})",
                export.items, export.prod_type, export.prod_name
            ));
            return Ok(outcome);
        }

        // 原料分号: 同一出口项次内跨所有 BOM 行连续递增，自 1 起
        let mut branch_num: i32 = 1;

        for line in &bom_lines {
            // 需核销数量 = 出口数量 × 单位用量
            let required = export.export_qty.checked_mul(line.bom.usage_qty)?;
            info!(
                material = %line.bom.material_name,
                required = %required,
                "原料需核銷數量"
            );
            if required.is_zero() {
                // 用量为零的配方行: 不产生核销也不告警
                continue;
            }

            let fifo = self.allocator.allocate(&line.material, required)?;
            if fifo.no_candidates {
                warn!(
                    material_name = %line.bom.material_name,
                    material_spec = %line.bom.material_spec,
                    "找不到對應的進口報單"
                );
                outcome.warnings.push(format!(
                    "項次 {} 原料「{}」找不到對應的進口報單",
                    export.items, line.bom.material_name
                ));
                continue;
            }

            for (mut lot, amount) in fifo.consumed {
                // 先落核销纪录，再回写进口台账 (单事务内顺序无碍，保持审计顺序)
                self.refund_repo.insert(&NewTaxRefund {
                    report_no: report_no.to_string(),
                    doc_no: line.bom.doc_no.clone(),
                    export_id: export.id,
                    import_id: lot.id,
                    bom_id: line.bom.id,
                    usage_qty: amount,
                    branch_num,
                })?;
                branch_num += 1;
                outcome.created += 1;

                ledger::apply_consumption(&mut lot, amount)?;
                self.import_repo
                    .update_total_refund_qty(lot.id, lot.total_refund_qty)?;

                info!(
                    import_doc = %lot.doc_no,
                    import_items = %lot.items,
                    amount = %amount,
                    "核銷紀錄"
                );
            }

            if !fifo.remainder.is_zero() {
                warn!(
                    material = %line.bom.material_name,
                    remainder = %fifo.remainder,
                    "原料庫存不足"
                );
                outcome.warnings.push(format!(
                    "項次 {} 原料「{}」庫存不足，剩餘未核銷數量: {}",
                    export.items, line.bom.material_name, fifo.remainder
                ));
            }
        }

        // 仅当产生了核销纪录才推进状态
        if outcome.created > 0 {
            self.export_repo
                .update_status(export.id, RefundStatus::Reconciled)?;
        } else {
            outcome.warnings.push(format!(
                "項次 {} 未產生任何核銷紀錄 (可能是找不到進口報單或庫存不足)",
                export.items
            ));
        }

        Ok(outcome)
    }

    // ==========================================
    // 核销数量修正
    // ==========================================

    /// 更新单笔核销数量，并同步回写进口报单的累计已核销数量
    ///
    /// # 失败
    /// - [`EngineError::RefundNotFound`]: 核销纪录不存在
    /// - [`EngineError::Ledger`]: 调整后越界 (超过进口总量或为负)；不产生写入
    #[instrument(skip(self))]
    pub fn update_refund_qty(&self, refund_id: i64, new_qty: Qty) -> EngineResult<()> {
        if new_qty.is_zero() {
            return Err(EngineError::Ledger(ledger::LedgerError::NonPositiveAmount));
        }

        let refund = self
            .refund_repo
            .find_by_id(refund_id)?
            .ok_or(EngineError::RefundNotFound(refund_id))?;

        let mut lot = self
            .import_repo
            .find_by_id(refund.import_id)?
            .ok_or(EngineError::DanglingReference {
                entity: "ImportDeclaration".to_string(),
                id: refund.import_id,
            })?;

        let old_qty = refund.usage_qty;
        let delta_milli = new_qty.milli_diff(old_qty);
        ledger::adjust_consumption(&mut lot, delta_milli)?;

        self.in_transaction(|| {
            self.refund_repo.update_usage_qty(refund_id, new_qty)?;
            self.import_repo
                .update_total_refund_qty(lot.id, lot.total_refund_qty)?;
            Ok(())
        })?;

        info!(
            refund_id,
            old_qty = %old_qty,
            new_qty = %new_qty,
            import_doc = %lot.doc_no,
            new_total_refund = %lot.total_refund_qty,
            "更新退稅數量"
        );
        Ok(())
    }

    // ==========================================
    // 报表状态推进
    // ==========================================

    /// 将整份出口报单标记为「已產生核銷清單報表」
    ///
    /// 仅推进状态仍低于 Reported 的项次；重复调用为幂等空操作。
    ///
    /// # 返回
    /// 本次实际推进的项次数
    #[instrument(skip(self))]
    pub fn mark_reported(&self, doc_no: &str) -> EngineResult<u32> {
        let exports = self.export_repo.find_by_doc_no(doc_no)?;
        if exports.is_empty() {
            return Err(EngineError::DocumentNotFound(doc_no.to_string()));
        }

        let mut advanced: u32 = 0;
        for export in &exports {
            if export.status < RefundStatus::Reported {
                self.export_repo
                    .update_status(export.id, RefundStatus::Reported)?;
                advanced += 1;
            }
        }
        Ok(advanced)
    }

    // ==========================================
    // 审计查询
    // ==========================================

    /// 查询退税纪录 by 报表号码
    pub fn refunds_by_report_no(&self, report_no: &str) -> EngineResult<Vec<TaxRefund>> {
        Ok(self.refund_repo.find_by_report_no(report_no)?)
    }

    /// 查询退税纪录 by 出口报单项次 ID
    pub fn refunds_by_export_id(&self, export_id: i64) -> EngineResult<Vec<TaxRefund>> {
        Ok(self.refund_repo.find_by_export_id(export_id)?)
    }

    // ==========================================
    // 事务辅助
    // ==========================================

    fn exec_tx(&self, sql: &str) -> EngineResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        conn.execute_batch(sql)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    /// 在一个 SQLite 事务内执行 f；f 或提交失败时回滚
    fn in_transaction<T>(&self, f: impl FnOnce() -> EngineResult<T>) -> EngineResult<T> {
        self.exec_tx("BEGIN IMMEDIATE;")?;
        match f() {
            Ok(value) => {
                if let Err(commit_err) = self.exec_tx("COMMIT;") {
                    // 提交失败后连接上仍挂着未完成事务，必须回滚释放
                    if let Err(rollback_err) = self.exec_tx("ROLLBACK;") {
                        warn!(error = %rollback_err, "事務回滾失敗");
                    }
                    return Err(commit_err);
                }
                Ok(value)
            }
            Err(e) => {
                // 回滚失败不掩盖原始错误
                if let Err(rollback_err) = self.exec_tx("ROLLBACK;") {
                    warn!(error = %rollback_err, "事務回滾失敗");
                }
                Err(e)
            }
        }
    }
}

// ==========================================
// 测试模块
// ==========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::bom_repo::TaxBomRepository;

    fn orchestrator_on_memory_db() -> RefundOrchestrator {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let export_repo =
            Arc::new(ExportDeclarationRepository::from_connection(conn.clone()).unwrap());
        let import_repo =
            Arc::new(ImportDeclarationRepository::from_connection(conn.clone()).unwrap());
        let bom_repo = Arc::new(TaxBomRepository::from_connection(conn.clone()).unwrap());
        let refund_repo = Arc::new(TaxRefundRepository::from_connection(conn.clone()).unwrap());
        RefundOrchestrator::new(
            conn,
            export_repo,
            import_repo,
            refund_repo,
            BomResolver::new(bom_repo),
        )
    }

    #[test]
    fn test_commit_failure_leaves_connection_usable() {
        let orchestrator = orchestrator_on_memory_db();

        // 闭包内提前提交，外层 COMMIT 必然失败
        let result: EngineResult<()> = orchestrator.in_transaction(|| {
            orchestrator.exec_tx("COMMIT;")?;
            Ok(())
        });
        assert!(result.is_err());

        // 连接上不得残留未完成事务，后续事务照常可用
        orchestrator.in_transaction(|| Ok(())).unwrap();
    }
}
