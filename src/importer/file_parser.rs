// ==========================================
// 保税加工退税核销系统 - 文件解析
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输出: 以去空白表头为键的行记录，整行皆空的行直接丢弃
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook, Reader, Xlsx};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// 单行记录: 表头 → 去空白后的字符串值
pub type RawRecord = HashMap<String, String>;

/// 按扩展名自动选择解析器
pub fn parse_file(path: &Path) -> ImportResult<Vec<RawRecord>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => parse_csv(path),
        "xlsx" | "xls" => parse_excel(path),
        _ => Err(ImportError::UnsupportedFormat(ext)),
    }
}

/// 解析 CSV 文件
pub fn parse_csv(path: &Path) -> ImportResult<Vec<RawRecord>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row = zip_row(&headers, record.iter());
        if row.values().all(|v| v.is_empty()) {
            continue;
        }
        records.push(row);
    }

    Ok(records)
}

/// 解析 Excel 文件 (取第一个工作表，首行为表头)
pub fn parse_excel(path: &Path) -> ImportResult<Vec<RawRecord>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e: calamine::XlsxError| ImportError::ExcelParseError(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.is_empty() {
        return Err(ImportError::ExcelParseError("Excel 文件无工作表".to_string()));
    }
    let sheet_name = sheet_names[0].clone();
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无数据行".to_string()))?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let mut records = Vec::new();
    for data_row in rows {
        let row = zip_row(&headers, data_row.iter().map(|cell| cell.to_string()));
        if row.values().all(|v| v.is_empty()) {
            continue;
        }
        records.push(row);
    }

    Ok(records)
}

fn zip_row<I, S>(headers: &[String], values: I) -> RawRecord
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut row = HashMap::new();
    for (col_idx, value) in values.into_iter().enumerate() {
        if let Some(header) = headers.get(col_idx) {
            if header.is_empty() {
                continue;
            }
            row.insert(header.clone(), value.as_ref().trim().to_string());
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(lines: &[&str]) -> NamedTempFile {
        let mut temp_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(temp_file, "{}", line).unwrap();
        }
        temp_file
    }

    #[test]
    fn test_parse_csv_keyed_by_header() {
        let file = csv_file(&[
            "報單號碼,項次,出口數量",
            "AA/12/345/67890,1,100",
            "AA/12/345/67890,2,25.5",
        ]);
        let records = parse_file(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get("報單號碼"),
            Some(&"AA/12/345/67890".to_string())
        );
        assert_eq!(records[1].get("出口數量"), Some(&"25.5".to_string()));
    }

    #[test]
    fn test_parse_csv_skips_blank_rows() {
        let file = csv_file(&["報單號碼,項次", "DOC1,1", ",", "DOC1,2"]);
        let records = parse_file(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_parse_file_not_found() {
        let result = parse_file(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_file_unsupported_extension() {
        let mut temp_file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(temp_file, "whatever").unwrap();
        let result = parse_file(temp_file.path());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}
