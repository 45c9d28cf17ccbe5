// ==========================================
// 保税加工退税核销系统 - 核退标准 BOM 解析器
// ==========================================
// 职责: (成品规格, 成品名称) → 配方行 + 原料键
// 说明: material_spec 的逗号分隔别名串只在此处拆分一次，
//       后续核销调用不再重复 split
// ==========================================

use crate::domain::bom::TaxBom;
use crate::repository::bom_repo::TaxBomRepository;
use crate::repository::error::RepositoryResult;
use std::sync::Arc;
use tracing::debug;

// ==========================================
// MaterialKey - 原料键
// ==========================================

/// 原料检索键: 名称 + 有序规格别名集
///
/// 任一规格别名命中进口报单即可核销；别名顺序保持 BOM 原串顺序，
/// 这一顺序决定 FIFO 候选批次的拼接顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialKey {
    pub name: String,
    pub specs: Vec<String>,
}

impl MaterialKey {
    /// 从原始逗号分隔串解析 (去首尾空白，丢弃空段)
    pub fn parse(material_name: &str, raw_spec: &str) -> Self {
        let specs = raw_spec
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            name: material_name.to_string(),
            specs,
        }
    }
}

// ==========================================
// BomLine - 已解析配方行
// ==========================================

/// 配方行与其解析后的原料键
#[derive(Debug, Clone)]
pub struct BomLine {
    pub bom: TaxBom,
    pub material: MaterialKey,
}

// ==========================================
// BomResolver - BOM 解析器
// ==========================================

pub struct BomResolver {
    bom_repo: Arc<TaxBomRepository>,
}

impl BomResolver {
    pub fn new(bom_repo: Arc<TaxBomRepository>) -> Self {
        Self { bom_repo }
    }

    /// 查出某成品适用的全部配方行
    ///
    /// 成品规格与成品名称均为精确匹配，不做模糊。
    /// 无配方时返回空列表 (上层转警告)，不是错误。
    pub fn resolve(&self, prod_type: &str, prod_name: &str) -> RepositoryResult<Vec<BomLine>> {
        let boms = self.bom_repo.find_by_prod(prod_type, prod_name)?;
        debug!(
            prod_type = %prod_type,
            prod_name = %prod_name,
            bom_rows = boms.len(),
            "BOM 配方解析"
        );
        Ok(boms
            .into_iter()
            .map(|bom| {
                let material = MaterialKey::parse(&bom.material_name, &bom.material_spec);
                BomLine { bom, material }
            })
            .collect())
    }
}
