// ==========================================
// 保税加工退税核销系统 - 核销报表生成
// ==========================================
// 用途: 依出口报单号码生成两种核销申报表
// - 用料清表 (22 欄 A~V)
// - 沖退稅申請 (6 欄)
// 表格以字符串行矩阵表示，再经 csv crate 落盘；
// 生成成功后将整份报单推进为「已產生核銷清單報表」
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use crate::repository::bom_repo::TaxBomRepository;
use crate::repository::export_repo::ExportDeclarationRepository;
use crate::repository::import_repo::ImportDeclarationRepository;
use crate::repository::refund_repo::TaxRefundRepository;
use crate::domain::types::RefundStatus;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// 用料清表表头 (A~V)
const MATERIALS_USAGE_HEADERS: [&str; 22] = [
    "報單項次",
    "工業局標準文號",
    "製造商統一編號",
    "成品貨物英文名稱",
    "成品規格",
    "成品數量/重成品量",
    "成品單位",
    "成品牌名",
    "成品型號",
    "成品貨物中文名稱",
    "原料序號",
    "原料分號",
    "原料名稱",
    "原料規格",
    "原料數量/重量(含損耗)",
    "原料單位",
    "進口商統一編號",
    "原料牌名",
    "原料型號",
    "進口報單號碼",
    "項次",
    "備註",
];

/// 沖退稅申請表头
const REFUND_APPLICATION_HEADERS: [&str; 6] = [
    "報單項次",
    "原料序號",
    "原料分號",
    "進口報單號碼",
    "項次",
    "申退數量/重量",
];

/// 报表 = 行矩阵 (首行为报单号码、次行为表头、其后数据行)
pub type ReportTable = Vec<Vec<String>>;

// ==========================================
// ReportBuilder - 报表生成器
// ==========================================

pub struct ReportBuilder {
    export_repo: Arc<ExportDeclarationRepository>,
    import_repo: Arc<ImportDeclarationRepository>,
    bom_repo: Arc<TaxBomRepository>,
    refund_repo: Arc<TaxRefundRepository>,
    /// 製造商統一編號 (同时填入进口商栏位)
    uniform_no: String,
}

impl ReportBuilder {
    pub fn new(
        export_repo: Arc<ExportDeclarationRepository>,
        import_repo: Arc<ImportDeclarationRepository>,
        bom_repo: Arc<TaxBomRepository>,
        refund_repo: Arc<TaxRefundRepository>,
        uniform_no: String,
    ) -> Self {
        Self {
            export_repo,
            import_repo,
            bom_repo,
            refund_repo,
            uniform_no,
        }
    }

    // ==========================================
    // 用料清表 (Report L)
    // ==========================================

    /// 生成用料清表，并将整份报单标记为已产生报表
    #[instrument(skip(self))]
    pub fn materials_usage_table(&self, doc_no: &str) -> EngineResult<ReportTable> {
        let exports = self.export_repo.find_by_doc_no(doc_no)?;
        if exports.is_empty() {
            return Err(EngineError::DocumentNotFound(doc_no.to_string()));
        }

        let mut rows: ReportTable = Vec::new();
        rows.push(vec!["出口報單號碼".to_string(), doc_no.to_string()]);
        rows.push(MATERIALS_USAGE_HEADERS.iter().map(|s| s.to_string()).collect());

        for export in &exports {
            for refund in self.refund_repo.find_by_export_id(export.id)? {
                let bom = self
                    .bom_repo
                    .find_by_id(refund.bom_id)?
                    .ok_or(EngineError::DanglingReference {
                        entity: "TaxBom".to_string(),
                        id: refund.bom_id,
                    })?;
                let lot = self
                    .import_repo
                    .find_by_id(refund.import_id)?
                    .ok_or(EngineError::DanglingReference {
                        entity: "ImportDeclaration".to_string(),
                        id: refund.import_id,
                    })?;

                rows.push(vec![
                    export.items.clone(),                      // A 報單項次
                    refund.doc_no.clone(),                     // B 工業局標準文號
                    self.uniform_no.clone(),                   // C 製造商統一編號
                    export.prod_name.clone(),                  // D 成品貨物英文名稱
                    export.prod_type.clone(),                  // E 成品規格
                    export.export_qty.to_string(),             // F 成品數量/重成品量
                    bom.prod_unit_or_default().to_string(),    // G 成品單位
                    String::new(),                             // H 成品牌名
                    String::new(),                             // I 成品型號
                    String::new(),                             // J 成品貨物中文名稱
                    bom.material_num.to_string(),              // K 原料序號
                    refund.branch_num.to_string(),             // L 原料分號
                    bom.material_name.clone(),                 // M 原料名稱
                    bom.material_spec.clone(),                 // N 原料規格
                    refund.usage_qty.to_string(),              // O 原料數量/重量(含損耗)
                    bom.material_unit.clone(),                 // P 原料單位
                    self.uniform_no.clone(),                   // Q 進口商統一編號
                    String::new(),                             // R 原料牌名
                    String::new(),                             // S 原料型號
                    lot.doc_no.clone(),                        // T 進口報單號碼
                    lot.items.clone(),                         // U 項次
                    String::new(),                             // V 備註
                ]);
            }
        }

        self.advance_to_reported(&exports)?;
        info!(doc_no = %doc_no, data_rows = rows.len() - 2, "用料清表生成完成");
        Ok(rows)
    }

    // ==========================================
    // 沖退稅申請 (Report A)
    // ==========================================

    /// 生成沖退稅申請表，并将整份报单标记为已产生报表
    #[instrument(skip(self))]
    pub fn refund_application_table(&self, doc_no: &str) -> EngineResult<ReportTable> {
        let exports = self.export_repo.find_by_doc_no(doc_no)?;
        if exports.is_empty() {
            return Err(EngineError::DocumentNotFound(doc_no.to_string()));
        }

        let mut rows: ReportTable = Vec::new();
        rows.push(vec!["出口報單號碼".to_string(), doc_no.to_string()]);
        rows.push(
            REFUND_APPLICATION_HEADERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );

        for export in &exports {
            for refund in self.refund_repo.find_by_export_id(export.id)? {
                let bom = self
                    .bom_repo
                    .find_by_id(refund.bom_id)?
                    .ok_or(EngineError::DanglingReference {
                        entity: "TaxBom".to_string(),
                        id: refund.bom_id,
                    })?;
                let lot = self
                    .import_repo
                    .find_by_id(refund.import_id)?
                    .ok_or(EngineError::DanglingReference {
                        entity: "ImportDeclaration".to_string(),
                        id: refund.import_id,
                    })?;

                rows.push(vec![
                    export.items.clone(),
                    bom.material_num.to_string(),
                    refund.branch_num.to_string(),
                    lot.doc_no.clone(),
                    lot.items.clone(),
                    refund.usage_qty.to_string(),
                ]);
            }
        }

        self.advance_to_reported(&exports)?;
        info!(doc_no = %doc_no, data_rows = rows.len() - 2, "沖退稅申請表生成完成");
        Ok(rows)
    }

    /// 报表生成后推进报单状态；已在 Reported 的项次不回退
    fn advance_to_reported(
        &self,
        exports: &[crate::domain::declaration::ExportDeclaration],
    ) -> EngineResult<()> {
        for export in exports {
            if export.status < RefundStatus::Reported {
                self.export_repo
                    .update_status(export.id, RefundStatus::Reported)?;
            }
        }
        Ok(())
    }
}

// ==========================================
// CSV 落盘
// ==========================================

/// 将报表行矩阵写为 CSV 文件
pub fn write_csv(path: &Path, table: &ReportTable) -> EngineResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| anyhow::anyhow!("無法建立報表檔案 {}: {}", path.display(), e))
        .map_err(crate::repository::error::RepositoryError::Other)?;
    for row in table {
        writer
            .write_record(row)
            .map_err(|e| anyhow::anyhow!("寫入報表失敗: {}", e))
            .map_err(crate::repository::error::RepositoryError::Other)?;
    }
    writer
        .flush()
        .map_err(|e| anyhow::anyhow!("報表檔案 flush 失敗: {}", e))
        .map_err(crate::repository::error::RepositoryError::Other)?;
    Ok(())
}
