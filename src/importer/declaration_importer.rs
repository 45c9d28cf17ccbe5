// ==========================================
// 保税加工退税核销系统 - 报单/BOM 导入器
// ==========================================
// 用途: 从 Excel/CSV 批量导入出口报单、进口报单、核退标准 BOM
// 流程: 解析文件 → 表头别名定位 → 逐行校验落库
// 约定: 单行问题记入 ImportOutcome.errors 继续往下，
//       文件级问题 (找不到表头等) 整体失败
// ==========================================

use crate::domain::quantity::Qty;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{parse_file, RawRecord};
use crate::repository::bom_repo::{NewTaxBom, TaxBomRepository};
use crate::repository::error::RepositoryError;
use crate::repository::export_repo::{ExportDeclarationRepository, NewExportDeclaration};
use crate::repository::import_repo::{ImportDeclarationRepository, NewImportDeclaration};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

// ==========================================
// 表头别名 (同一字段在不同来源文件的叫法)
// ==========================================

const ALIAS_EXPORT_DOC_NO: &[&str] = &["報單號碼", "出口報單號碼"];
const ALIAS_EXPORT_ITEMS: &[&str] = &["出口報單項次", "報單項次", "項次", "ITEM"];
const ALIAS_PROD_TYPE: &[&str] = &["成品規格", "規格", "SPEC"];
const ALIAS_PROD_NAME: &[&str] = &["成品名稱", "品名", "NAME"];
const ALIAS_EXPORT_QTY: &[&str] = &["出口數量", "數量", "QTY"];

const ALIAS_IMPORT_DOC_NO: &[&str] = &["Declaration NO", "報單號碼", "進口報單號碼"];
const ALIAS_IMPORT_ITEMS: &[&str] = &["報單項次", "項次", "ITEM"];
const ALIAS_MATERIAL_NAME: &[&str] = &["原料名稱", "退稅品名", "品名"];
const ALIAS_IMPORT_QTY: &[&str] = &["進口數量", "QTY", "數量"];
const ALIAS_MATERIAL_SPEC: &[&str] = &["原料規格", "SPEC", "規格"];
const ALIAS_MATERIAL_UNIT: &[&str] = &["原料單位", "單位", "使用單位", "UNIT"];

const ALIAS_BOM_DOC_NO: &[&str] = &["核准文號", "工業局標準文號", "文號"];
const ALIAS_BOM_PROD_UNIT: &[&str] = &["成品單位"];
const ALIAS_BOM_MATERIAL_NUM: &[&str] = &["原料序號", "序號"];
const ALIAS_BOM_USAGE_QTY: &[&str] = &["使用數量", "單位用量", "用量"];
const ALIAS_BOM_MATERIAL_UNIT: &[&str] = &["使用單位", "原料單位", "單位"];

// ==========================================
// ImportOutcome - 导入结果
// ==========================================

/// 一次文件导入的汇总结果 (逐行错误不中断导入)
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// 导入批次号
    pub batch_id: String,
    /// 成功落库笔数
    pub success_count: u32,
    /// 逐行错误信息 (第 N 列: 原因)
    pub errors: Vec<String>,
}

impl ImportOutcome {
    fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            success_count: 0,
            errors: Vec::new(),
        }
    }
}

// ==========================================
// 别名取值辅助
// ==========================================

/// 依别名顺序取首个存在且非空的栏位值
fn pick<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .filter_map(|alias| record.get(*alias))
        .map(|v| v.as_str())
        .find(|v| !v.is_empty())
}

/// 检查首行记录是否带齐必要表头 (任一别名命中即算)
fn require_headers(
    record: &RawRecord,
    required: &[(&str, &[&str])],
) -> ImportResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, aliases)| !aliases.iter().any(|a| record.contains_key(*a)))
        .map(|(label, _)| *label)
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    let mut found: Vec<&str> = record.keys().map(|k| k.as_str()).collect();
    found.sort_unstable();
    Err(ImportError::MissingHeaders {
        missing: missing.join(", "),
        found: found.join(", "),
    })
}

/// 解析数量栏位 (接受 "100" / "25.5" 等字符串)
fn parse_qty(raw: &str, field: &str) -> Result<Qty, String> {
    Qty::parse(raw).map_err(|e| format!("{} 格式錯誤: {}", field, e))
}

// ==========================================
// 出口报单导入
// ==========================================

pub struct ExportDeclarationImporter {
    repo: Arc<ExportDeclarationRepository>,
}

impl ExportDeclarationImporter {
    pub fn new(repo: Arc<ExportDeclarationRepository>) -> Self {
        Self { repo }
    }

    /// 导入出口报单明细文件
    ///
    /// 必要表头: 報單號碼 / 出口報單項次 / 成品名稱 / 出口數量
    /// (成品規格可缺省)；重复的 (報單號碼, 項次) 记为错误并跳过。
    #[instrument(skip(self))]
    pub fn import_file(&self, path: &Path) -> ImportResult<ImportOutcome> {
        let records = parse_file(path)?;
        let mut outcome = ImportOutcome::new();
        info!(batch_id = %outcome.batch_id, rows = records.len(), "開始匯入出口報單");

        if let Some(first) = records.first() {
            require_headers(
                first,
                &[
                    ("報單號碼", ALIAS_EXPORT_DOC_NO),
                    ("出口報單項次", ALIAS_EXPORT_ITEMS),
                    ("成品名稱", ALIAS_PROD_NAME),
                    ("出口數量", ALIAS_EXPORT_QTY),
                ],
            )?;
        }

        for (row_idx, record) in records.iter().enumerate() {
            // 文件首行为表头，错误信息以 1 起算的文件行号呈现
            let row_no = row_idx + 2;
            match self.import_row(record) {
                Ok(true) => outcome.success_count += 1,
                Ok(false) => {} // 空行已在解析层丢弃，此处仅防御
                Err(msg) => {
                    warn!(row = row_no, error = %msg, "出口報單匯入行失敗");
                    outcome.errors.push(format!("第 {} 列: {}", row_no, msg));
                }
            }
        }

        info!(
            batch_id = %outcome.batch_id,
            success = outcome.success_count,
            errors = outcome.errors.len(),
            "出口報單匯入完成"
        );
        Ok(outcome)
    }

    fn import_row(&self, record: &RawRecord) -> Result<bool, String> {
        let doc_no = pick(record, ALIAS_EXPORT_DOC_NO);
        let items = pick(record, ALIAS_EXPORT_ITEMS);
        let prod_name = pick(record, ALIAS_PROD_NAME);
        let qty_raw = pick(record, ALIAS_EXPORT_QTY);

        let mut missing = Vec::new();
        if doc_no.is_none() {
            missing.push("報單號碼");
        }
        if items.is_none() {
            missing.push("項次");
        }
        if prod_name.is_none() {
            missing.push("成品名稱");
        }
        if qty_raw.is_none() {
            missing.push("出口數量");
        }
        if !missing.is_empty() {
            return Err(format!("缺少必填欄位: {}", missing.join(", ")));
        }

        let doc_no = doc_no.unwrap();
        let items = items.unwrap();
        let export_qty = parse_qty(qty_raw.unwrap(), "出口數量")?;

        let exists = self
            .repo
            .exists_by_doc_no_and_items(doc_no, items)
            .map_err(|e| e.to_string())?;
        if exists {
            return Err(format!("重複的報單號碼 {} 與項次 {}", doc_no, items));
        }

        self.repo
            .insert(&NewExportDeclaration {
                doc_no: doc_no.to_string(),
                items: items.to_string(),
                prod_type: pick(record, ALIAS_PROD_TYPE).unwrap_or("").to_string(),
                prod_name: prod_name.unwrap().to_string(),
                export_qty,
            })
            .map_err(|e| e.to_string())?;
        Ok(true)
    }
}

// ==========================================
// 进口报单导入
// ==========================================

pub struct ImportDeclarationImporter {
    repo: Arc<ImportDeclarationRepository>,
}

impl ImportDeclarationImporter {
    pub fn new(repo: Arc<ImportDeclarationRepository>) -> Self {
        Self { repo }
    }

    /// 导入进口报单明细文件 (原料批次台账的来源)
    #[instrument(skip(self))]
    pub fn import_file(&self, path: &Path) -> ImportResult<ImportOutcome> {
        let records = parse_file(path)?;
        let mut outcome = ImportOutcome::new();
        info!(batch_id = %outcome.batch_id, rows = records.len(), "開始匯入進口報單");

        if let Some(first) = records.first() {
            require_headers(
                first,
                &[
                    ("報單號碼", ALIAS_IMPORT_DOC_NO),
                    ("報單項次", ALIAS_IMPORT_ITEMS),
                    ("原料名稱", ALIAS_MATERIAL_NAME),
                    ("進口數量", ALIAS_IMPORT_QTY),
                ],
            )?;
        }

        for (row_idx, record) in records.iter().enumerate() {
            let row_no = row_idx + 2;
            if let Err(msg) = self.import_row(record) {
                warn!(row = row_no, error = %msg, "進口報單匯入行失敗");
                outcome.errors.push(format!("第 {} 列: {}", row_no, msg));
            } else {
                outcome.success_count += 1;
            }
        }

        info!(
            batch_id = %outcome.batch_id,
            success = outcome.success_count,
            errors = outcome.errors.len(),
            "進口報單匯入完成"
        );
        Ok(outcome)
    }

    fn import_row(&self, record: &RawRecord) -> Result<(), String> {
        let doc_no = pick(record, ALIAS_IMPORT_DOC_NO);
        let items = pick(record, ALIAS_IMPORT_ITEMS);
        let material_name = pick(record, ALIAS_MATERIAL_NAME);
        let qty_raw = pick(record, ALIAS_IMPORT_QTY);

        let mut missing = Vec::new();
        if doc_no.is_none() {
            missing.push("報單號碼");
        }
        if items.is_none() {
            missing.push("項次");
        }
        if material_name.is_none() {
            missing.push("原料名稱");
        }
        if qty_raw.is_none() {
            missing.push("進口數量");
        }
        if !missing.is_empty() {
            return Err(format!("缺少必填欄位: {}", missing.join(", ")));
        }

        let import_qty = parse_qty(qty_raw.unwrap(), "進口數量")?;

        // (doc_no, items) 唯一约束: 重复插入在此降级为行错误
        match self.repo.insert(&NewImportDeclaration {
            doc_no: doc_no.unwrap().to_string(),
            items: items.unwrap().to_string(),
            material_name: material_name.unwrap().to_string(),
            material_unit: pick(record, ALIAS_MATERIAL_UNIT).map(|s| s.to_string()),
            material_spec: pick(record, ALIAS_MATERIAL_SPEC).unwrap_or("").to_string(),
            import_qty,
        }) {
            Ok(_) => Ok(()),
            Err(RepositoryError::UniqueConstraintViolation(_)) => Err(format!(
                "重複的報單號碼 {} 與項次 {}",
                doc_no.unwrap(),
                items.unwrap()
            )),
            Err(e) => Err(e.to_string()),
        }
    }
}

// ==========================================
// 核退标准 BOM 导入
// ==========================================

pub struct TaxBomImporter {
    repo: Arc<TaxBomRepository>,
}

impl TaxBomImporter {
    pub fn new(repo: Arc<TaxBomRepository>) -> Self {
        Self { repo }
    }

    /// 导入核退标准 BOM 文件
    ///
    /// 同一核准文號下多行原料共用成品信息；来源表常以合并储存格
    /// 表示，成品栏位空白时沿用上一行的值。
    #[instrument(skip(self))]
    pub fn import_file(&self, path: &Path) -> ImportResult<ImportOutcome> {
        let records = parse_file(path)?;
        let mut outcome = ImportOutcome::new();
        info!(batch_id = %outcome.batch_id, rows = records.len(), "開始匯入核退標準BOM");

        if let Some(first) = records.first() {
            require_headers(
                first,
                &[
                    ("核准文號", ALIAS_BOM_DOC_NO),
                    ("成品名稱", ALIAS_PROD_NAME),
                    ("原料名稱", ALIAS_MATERIAL_NAME),
                    ("使用數量", ALIAS_BOM_USAGE_QTY),
                ],
            )?;
        }

        // 合并储存格沿用值
        let mut carry_doc_no = String::new();
        let mut carry_prod_type = String::new();
        let mut carry_prod_name = String::new();
        let mut carry_prod_unit: Option<String> = None;

        for (row_idx, record) in records.iter().enumerate() {
            let row_no = row_idx + 2;

            if let Some(v) = pick(record, ALIAS_BOM_DOC_NO) {
                carry_doc_no = v.to_string();
            }
            if let Some(v) = pick(record, ALIAS_PROD_TYPE) {
                carry_prod_type = v.to_string();
            }
            if let Some(v) = pick(record, ALIAS_PROD_NAME) {
                carry_prod_name = v.to_string();
            }
            if let Some(v) = pick(record, ALIAS_BOM_PROD_UNIT) {
                carry_prod_unit = Some(v.to_string());
            }

            match self.import_row(
                record,
                &carry_doc_no,
                &carry_prod_type,
                &carry_prod_name,
                carry_prod_unit.as_deref(),
            ) {
                Ok(()) => outcome.success_count += 1,
                Err(msg) => {
                    warn!(row = row_no, error = %msg, "核退標準BOM匯入行失敗");
                    outcome.errors.push(format!("第 {} 列: {}", row_no, msg));
                }
            }
        }

        info!(
            batch_id = %outcome.batch_id,
            success = outcome.success_count,
            errors = outcome.errors.len(),
            "核退標準BOM匯入完成"
        );
        Ok(outcome)
    }

    fn import_row(
        &self,
        record: &RawRecord,
        doc_no: &str,
        prod_type: &str,
        prod_name: &str,
        prod_unit: Option<&str>,
    ) -> Result<(), String> {
        let material_name = pick(record, ALIAS_MATERIAL_NAME);
        let qty_raw = pick(record, ALIAS_BOM_USAGE_QTY);

        let mut missing = Vec::new();
        if doc_no.is_empty() {
            missing.push("核准文號");
        }
        if prod_name.is_empty() {
            missing.push("成品名稱");
        }
        if material_name.is_none() {
            missing.push("原料名稱");
        }
        if qty_raw.is_none() {
            missing.push("使用數量");
        }
        if !missing.is_empty() {
            return Err(format!("缺少必填欄位: {}", missing.join(", ")));
        }

        let usage_qty = parse_qty(qty_raw.unwrap(), "使用數量")?;
        let material_num = pick(record, ALIAS_BOM_MATERIAL_NUM)
            .map(parse_material_num)
            .unwrap_or(0);

        self.repo
            .insert(&NewTaxBom {
                doc_no: doc_no.to_string(),
                prod_type: prod_type.to_string(),
                prod_name: prod_name.to_string(),
                prod_unit: prod_unit.map(|s| s.to_string()),
                material_num,
                material_name: material_name.unwrap().to_string(),
                material_unit: pick(record, ALIAS_BOM_MATERIAL_UNIT)
                    .unwrap_or("")
                    .to_string(),
                material_spec: pick(record, ALIAS_MATERIAL_SPEC).unwrap_or("").to_string(),
                usage_qty,
            })
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// 原料序号可能带数值格式化小数点 ("1.0" → 1)，解析失败取 0
fn parse_material_num(raw: &str) -> i32 {
    let head = raw.split('.').next().unwrap_or(raw);
    head.trim().parse::<i32>().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_pick_respects_alias_order() {
        let rec = record(&[("報單號碼", "DOC-A"), ("出口報單號碼", "DOC-B")]);
        assert_eq!(pick(&rec, ALIAS_EXPORT_DOC_NO), Some("DOC-A"));
    }

    #[test]
    fn test_pick_skips_empty_values() {
        let rec = record(&[("報單號碼", ""), ("出口報單號碼", "DOC-B")]);
        assert_eq!(pick(&rec, ALIAS_EXPORT_DOC_NO), Some("DOC-B"));
    }

    #[test]
    fn test_require_headers_reports_missing() {
        let rec = record(&[("報單號碼", "DOC-A")]);
        let result = require_headers(
            &rec,
            &[
                ("報單號碼", ALIAS_EXPORT_DOC_NO),
                ("出口數量", ALIAS_EXPORT_QTY),
            ],
        );
        match result {
            Err(ImportError::MissingHeaders { missing, .. }) => {
                assert_eq!(missing, "出口數量");
            }
            other => panic!("预期缺表头错误, 实际 {:?}", other.err()),
        }
    }

    #[test]
    fn test_parse_material_num_strips_decimal() {
        assert_eq!(parse_material_num("1.0"), 1);
        assert_eq!(parse_material_num("12"), 12);
        assert_eq!(parse_material_num("abc"), 0);
    }
}
