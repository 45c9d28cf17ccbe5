// ==========================================
// 核销报表集成测试
// ==========================================
// 测试目标: 用料清表 (22 欄) / 沖退稅申請 (6 欄) 的
//           布局与取值、CSV 落盘、生成后状态推进
// ==========================================

mod test_helpers;

use bonded_tax_refund::domain::RefundStatus;
use bonded_tax_refund::engine::{report, EngineError, ReportBuilder};
use test_helpers::{insert_bom, insert_export, insert_import, setup, TestContext};

const UNIFORM_NO: &str = "53019078";

fn report_builder(ctx: &TestContext) -> ReportBuilder {
    ReportBuilder::new(
        ctx.export_repo.clone(),
        ctx.import_repo.clone(),
        ctx.bom_repo.clone(),
        ctx.refund_repo.clone(),
        UNIFORM_NO.to_string(),
    )
}

/// 造一份已核销的报单: 需求 20, lot1 供 15, lot2 供 5
fn reconciled_fixture(ctx: &TestContext) {
    insert_bom(ctx, "BOM-001", "TYPE-A", "PCB", 3, "銅箔", "S1,S2", "2.0");
    insert_export(ctx, "EXP-001", "1", "TYPE-A", "PCB", "10");
    insert_import(ctx, "IMP-001", "1", "銅箔", "S1", "15");
    insert_import(ctx, "IMP-002", "2", "銅箔", "S2", "10");
    ctx.orchestrator()
        .generate_refund_list("EXP-001")
        .expect("核销失败");
}

#[test]
fn test_materials_usage_table_layout() {
    let ctx = setup();
    reconciled_fixture(&ctx);

    let table = report_builder(&ctx)
        .materials_usage_table("EXP-001")
        .unwrap();

    // 首行: 出口報單號碼, 次行: 22 栏表头, 随后两笔核销数据行
    assert_eq!(table.len(), 4);
    assert_eq!(table[0], vec!["出口報單號碼".to_string(), "EXP-001".to_string()]);
    assert_eq!(table[1].len(), 22);
    assert_eq!(table[1][0], "報單項次");
    assert_eq!(table[1][21], "備註");

    let first = &table[2];
    assert_eq!(first.len(), 22);
    assert_eq!(first[0], "1");          // 報單項次
    assert_eq!(first[1], "BOM-001");    // 工業局標準文號
    assert_eq!(first[2], UNIFORM_NO);   // 製造商統一編號
    assert_eq!(first[3], "PCB");        // 成品貨物英文名稱
    assert_eq!(first[4], "TYPE-A");     // 成品規格
    assert_eq!(first[5], "10.000");     // 成品數量
    assert_eq!(first[6], "SET");        // 成品單位
    assert_eq!(first[10], "3");         // 原料序號
    assert_eq!(first[11], "1");         // 原料分號
    assert_eq!(first[12], "銅箔");      // 原料名稱
    assert_eq!(first[14], "15.000");    // 原料數量
    assert_eq!(first[16], UNIFORM_NO);  // 進口商統一編號
    assert_eq!(first[19], "IMP-001");   // 進口報單號碼
    assert_eq!(first[20], "1");         // 項次

    let second = &table[3];
    assert_eq!(second[11], "2");        // 原料分號遞增
    assert_eq!(second[14], "5.000");
    assert_eq!(second[19], "IMP-002");

    // 生成报表即推进状态
    let exports = ctx.export_repo.find_by_doc_no("EXP-001").unwrap();
    assert!(exports.iter().all(|e| e.status == RefundStatus::Reported));
}

#[test]
fn test_refund_application_table_layout() {
    let ctx = setup();
    reconciled_fixture(&ctx);

    let table = report_builder(&ctx)
        .refund_application_table("EXP-001")
        .unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(table[1].len(), 6);
    assert_eq!(table[1][5], "申退數量/重量");

    assert_eq!(table[2], vec!["1", "3", "1", "IMP-001", "1", "15.000"]);
    assert_eq!(table[3], vec!["1", "3", "2", "IMP-002", "2", "5.000"]);
}

#[test]
fn test_report_for_unreconciled_document_has_no_data_rows() {
    let ctx = setup();
    insert_export(&ctx, "EXP-001", "1", "TYPE-A", "PCB", "10");

    let table = report_builder(&ctx)
        .materials_usage_table("EXP-001")
        .unwrap();

    // 没有核销纪录: 只剩报单号码行与表头行
    assert_eq!(table.len(), 2);

    // 报表仍视为已产出, 状态照样推进
    let exports = ctx.export_repo.find_by_doc_no("EXP-001").unwrap();
    assert_eq!(exports[0].status, RefundStatus::Reported);
}

#[test]
fn test_report_document_not_found() {
    let ctx = setup();
    let result = report_builder(&ctx).materials_usage_table("NO-SUCH-DOC");
    assert!(matches!(result, Err(EngineError::DocumentNotFound(_))));
}

#[test]
fn test_write_csv_roundtrip() {
    let ctx = setup();
    reconciled_fixture(&ctx);

    let table = report_builder(&ctx)
        .refund_application_table("EXP-001")
        .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("refund_application.csv");
    report::write_csv(&path, &table).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("出口報單號碼"));
    assert!(content.contains("申退數量/重量"));
    assert!(content.contains("IMP-002"));
    // 首行 + 表头 + 两笔数据
    assert_eq!(content.lines().count(), 4);
}
