// ==========================================
// Repository 层集成测试
// ==========================================
// 测试目标: 建表/增删改查/唯一约束/删除守卫/检索条件
// ==========================================

mod test_helpers;

use bonded_tax_refund::domain::RefundStatus;
use bonded_tax_refund::repository::error::RepositoryError;
use bonded_tax_refund::repository::export_repo::ExportSearch;
use bonded_tax_refund::repository::import_repo::ImportSearch;
use bonded_tax_refund::repository::refund_repo::NewTaxRefund;
use test_helpers::{insert_bom, insert_export, insert_import, qty, setup};

// ==========================================
// 出口报单
// ==========================================

#[test]
fn test_export_insert_and_find() {
    let ctx = setup();
    let id = insert_export(&ctx, "EXP-001", "1", "TYPE-A", "PROD", "12.5");

    let dec = ctx.export_repo.find_by_id(id).unwrap().unwrap();
    assert_eq!(dec.doc_no, "EXP-001");
    assert_eq!(dec.items, "1");
    assert_eq!(dec.export_qty, qty("12.5"));
    // 新录入即为「已匯入出口明細」
    assert_eq!(dec.status, RefundStatus::Created);

    assert!(ctx
        .export_repo
        .exists_by_doc_no_and_items("EXP-001", "1")
        .unwrap());
    assert!(!ctx
        .export_repo
        .exists_by_doc_no_and_items("EXP-001", "2")
        .unwrap());
}

#[test]
fn test_export_unique_doc_no_and_items() {
    let ctx = setup();
    insert_export(&ctx, "EXP-001", "1", "TYPE-A", "PROD", "10");

    let dup = ctx.export_repo.insert(
        &bonded_tax_refund::repository::export_repo::NewExportDeclaration {
            doc_no: "EXP-001".to_string(),
            items: "1".to_string(),
            prod_type: "TYPE-A".to_string(),
            prod_name: "PROD".to_string(),
            export_qty: qty("10"),
        },
    );
    assert!(matches!(
        dup,
        Err(RepositoryError::UniqueConstraintViolation(_))
    ));
}

#[test]
fn test_export_find_by_doc_no_ordered_by_item_sequence() {
    let ctx = setup();
    insert_export(&ctx, "EXP-001", "10", "TYPE-A", "PROD", "1");
    insert_export(&ctx, "EXP-001", "2", "TYPE-A", "PROD", "1");
    insert_export(&ctx, "EXP-001", "1", "TYPE-A", "PROD", "1");
    insert_export(&ctx, "EXP-002", "1", "TYPE-A", "PROD", "1");

    let list = ctx.export_repo.find_by_doc_no("EXP-001").unwrap();
    assert_eq!(list.len(), 3);
    // 按项次序号数值升序, 与录入顺序无关 ("10" 不得排在 "2" 前)
    assert_eq!(list[0].items, "1");
    assert_eq!(list[1].items, "2");
    assert_eq!(list[2].items, "10");
}

#[test]
fn test_export_search_filters() {
    let ctx = setup();
    let id1 = insert_export(&ctx, "EXP-001", "1", "TYPE-A", "銅箔基板", "1");
    insert_export(&ctx, "EXP-002", "1", "TYPE-B", "樹脂板", "1");
    ctx.export_repo
        .update_status(id1, RefundStatus::Reconciled)
        .unwrap();

    // 模糊品名
    let hits = ctx
        .export_repo
        .search(&ExportSearch {
            prod_name: Some("銅箔".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_no, "EXP-001");

    // 状态精确; 0 表示全部
    let reconciled = ctx
        .export_repo
        .search(&ExportSearch {
            status: Some(RefundStatus::Reconciled.as_code()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(reconciled.len(), 1);

    let all = ctx
        .export_repo
        .search(&ExportSearch {
            status: Some(0),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_export_distinct_doc_nos() {
    let ctx = setup();
    insert_export(&ctx, "EXP-002", "1", "T", "P", "1");
    insert_export(&ctx, "EXP-001", "1", "T", "P", "1");
    insert_export(&ctx, "EXP-001", "2", "T", "P", "1");

    let doc_nos = ctx.export_repo.distinct_doc_nos().unwrap();
    assert_eq!(doc_nos, vec!["EXP-001".to_string(), "EXP-002".to_string()]);
}

#[test]
fn test_export_delete_guards() {
    let ctx = setup();
    let id = insert_export(&ctx, "EXP-001", "1", "T", "P", "1");

    // 状态推进后不可删除
    ctx.export_repo
        .update_status(id, RefundStatus::Reconciled)
        .unwrap();
    let result = ctx.export_repo.delete(id);
    assert!(matches!(
        result,
        Err(RepositoryError::BusinessRuleViolation(_))
    ));

    // 回到初始状态即可删除
    ctx.export_repo
        .update_status(id, RefundStatus::Created)
        .unwrap();
    ctx.export_repo.delete(id).unwrap();
    assert!(ctx.export_repo.find_by_id(id).unwrap().is_none());

    // 再删报 NotFound
    assert!(matches!(
        ctx.export_repo.delete(id),
        Err(RepositoryError::NotFound { .. })
    ));
}

#[test]
fn test_export_batch_delete_collects_errors_per_id() {
    let ctx = setup();
    let deletable = insert_export(&ctx, "EXP-001", "1", "T", "P", "1");
    let reconciled = insert_export(&ctx, "EXP-001", "2", "T", "P", "1");
    ctx.export_repo
        .update_status(reconciled, RefundStatus::Reconciled)
        .unwrap();

    let outcome = ctx
        .export_repo
        .batch_delete(&[deletable, reconciled, 999])
        .unwrap();

    // 单笔失败不中断: 可删的删掉，其余逐笔记错
    assert_eq!(outcome.success_count, 1);
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome.errors[0].contains("EXP-001"));
    assert!(outcome.errors[0].contains("不可刪除"));
    assert!(outcome.errors[1].contains("ID=999"));
    assert!(ctx.export_repo.find_by_id(deletable).unwrap().is_none());
    assert!(ctx.export_repo.find_by_id(reconciled).unwrap().is_some());
}

#[test]
fn test_export_update_fields() {
    let ctx = setup();
    let id = insert_export(&ctx, "EXP-001", "1", "T", "P", "1");

    ctx.export_repo
        .update_fields(id, "T2", "P2", qty("7.5"))
        .unwrap();

    let dec = ctx.export_repo.find_by_id(id).unwrap().unwrap();
    assert_eq!(dec.prod_type, "T2");
    assert_eq!(dec.prod_name, "P2");
    assert_eq!(dec.export_qty, qty("7.5"));
    // 状态不随字段编辑变动
    assert_eq!(dec.status, RefundStatus::Created);

    assert!(matches!(
        ctx.export_repo.update_fields(999, "T", "P", qty("1")),
        Err(RepositoryError::NotFound { .. })
    ));
}

// ==========================================
// 进口报单
// ==========================================

#[test]
fn test_import_fifo_query_orders_by_creation() {
    let ctx = setup();
    let newer_doc = insert_import(&ctx, "IMP-002", "1", "銅箔", "S1", "10");
    let older_doc = insert_import(&ctx, "IMP-001", "1", "銅箔", "S1", "10");
    insert_import(&ctx, "IMP-003", "1", "銅箔", "S2", "10");
    insert_import(&ctx, "IMP-004", "1", "樹脂", "S1", "10");

    // 精确匹配名称+规格, 按 id 升序 (= 录入顺序, 与报单号码无关)
    let lots = ctx
        .import_repo
        .find_by_material_and_spec("銅箔", "S1")
        .unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[0].id, newer_doc);
    assert_eq!(lots[1].id, older_doc);
}

#[test]
fn test_import_total_refund_qty_bounds() {
    let ctx = setup();
    let id = insert_import(&ctx, "IMP-001", "1", "銅箔", "S1", "10");

    ctx.import_repo
        .update_total_refund_qty(id, qty("10"))
        .unwrap();
    let lot = ctx.import_repo.find_by_id(id).unwrap().unwrap();
    assert_eq!(lot.total_refund_qty, qty("10"));

    // CHECK 约束: 超过进口数量被数据库拒绝
    let over = ctx.import_repo.update_total_refund_qty(id, qty("10.001"));
    assert!(over.is_err());
}

#[test]
fn test_import_search_and_delete_guard() {
    let ctx = setup();
    let lot = insert_import(&ctx, "IMP-001", "1", "銅箔", "S1", "10");
    insert_import(&ctx, "IMP-002", "1", "樹脂", "R1", "10");

    let hits = ctx
        .import_repo
        .search(&ImportSearch {
            material_name: Some("銅".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(hits.len(), 1);

    // 产生核销纪录后不可删除
    let export_id = insert_export(&ctx, "EXP-001", "1", "T", "P", "1");
    let bom_id = insert_bom(&ctx, "BOM-001", "T", "P", 1, "銅箔", "S1", "1");
    ctx.refund_repo
        .insert(&NewTaxRefund {
            report_no: "20260830-120000".to_string(),
            doc_no: "BOM-001".to_string(),
            export_id,
            import_id: lot,
            bom_id,
            usage_qty: qty("1"),
            branch_num: 1,
        })
        .unwrap();

    assert!(matches!(
        ctx.import_repo.delete(lot),
        Err(RepositoryError::BusinessRuleViolation(_))
    ));
}

// ==========================================
// 核退标准 BOM
// ==========================================

#[test]
fn test_bom_find_by_prod_ordered_by_material_num() {
    let ctx = setup();
    insert_bom(&ctx, "BOM-001", "TYPE-A", "P", 2, "樹脂", "R1", "1");
    insert_bom(&ctx, "BOM-001", "TYPE-A", "P", 1, "銅箔", "S1", "2");
    insert_bom(&ctx, "BOM-002", "TYPE-B", "Q", 1, "玻纖", "G1", "3");

    let lines = ctx.bom_repo.find_by_prod("TYPE-A", "P").unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].material_num, 1);
    assert_eq!(lines[0].material_name, "銅箔");
    assert_eq!(lines[1].material_num, 2);

    // 规格与品名都要精确命中
    assert!(ctx.bom_repo.find_by_prod("TYPE-A", "Q").unwrap().is_empty());
}

// ==========================================
// 退税纪录
// ==========================================

#[test]
fn test_refund_insert_rejects_zero_qty() {
    let ctx = setup();
    let export_id = insert_export(&ctx, "EXP-001", "1", "T", "P", "1");
    let lot = insert_import(&ctx, "IMP-001", "1", "銅箔", "S1", "10");
    let bom_id = insert_bom(&ctx, "BOM-001", "T", "P", 1, "銅箔", "S1", "1");

    let result = ctx.refund_repo.insert(&NewTaxRefund {
        report_no: "20260830-120000".to_string(),
        doc_no: "BOM-001".to_string(),
        export_id,
        import_id: lot,
        bom_id,
        usage_qty: qty("0"),
        branch_num: 1,
    });
    assert!(matches!(result, Err(RepositoryError::ValidationError(_))));
}

#[test]
fn test_refund_foreign_keys_enforced() {
    let ctx = setup();
    let result = ctx.refund_repo.insert(&NewTaxRefund {
        report_no: "20260830-120000".to_string(),
        doc_no: "BOM-001".to_string(),
        export_id: 999,
        import_id: 999,
        bom_id: 999,
        usage_qty: qty("1"),
        branch_num: 1,
    });
    assert!(matches!(
        result,
        Err(RepositoryError::ForeignKeyViolation(_))
    ));
}

#[test]
fn test_refund_queries_and_counts() {
    let ctx = setup();
    let export_id = insert_export(&ctx, "EXP-001", "1", "T", "P", "1");
    let lot = insert_import(&ctx, "IMP-001", "1", "銅箔", "S1", "10");
    let bom_id = insert_bom(&ctx, "BOM-001", "T", "P", 1, "銅箔", "S1", "1");

    for branch in 1..=3 {
        ctx.refund_repo
            .insert(&NewTaxRefund {
                report_no: "20260830-120000".to_string(),
                doc_no: "BOM-001".to_string(),
                export_id,
                import_id: lot,
                bom_id,
                usage_qty: qty("1"),
                branch_num: branch,
            })
            .unwrap();
    }

    let by_report = ctx
        .refund_repo
        .find_by_report_no("20260830-120000")
        .unwrap();
    assert_eq!(by_report.len(), 3);

    let by_export = ctx.refund_repo.find_by_export_id(export_id).unwrap();
    let branches: Vec<i32> = by_export.iter().map(|r| r.branch_num).collect();
    assert_eq!(branches, vec![1, 2, 3]);

    assert_eq!(ctx.refund_repo.count_by_export_id(export_id).unwrap(), 3);
    assert_eq!(ctx.refund_repo.count_all().unwrap(), 3);
}
