use chrono::NaiveDate;
use importer::store::MemoryStore;
use importer::{CanonicalDelivery, DeliveryStatus, ImportRequest, ImportSettings, Importer};
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type Sheet<'a> = (&'a str, &'a [&'a [&'a str]]);

const HEADER: &[&str] = &[
    "IDM",
    "IDE",
    "ENTREGA",
    "STATUS",
    "DATA DE INÍCIO",
    "DATA DE TÉRMINO",
    "% EXECUÇÃO",
];

/// Write an .xlsx with one worksheet per entry. Numeric-looking cells are
/// stored as numbers, blank cells are left empty.
fn write_workbook(path: &Path, sheets: &[Sheet]) {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                match value.parse::<f64>() {
                    Ok(number) => worksheet.write_number(r as u32, c as u16, number).unwrap(),
                    Err(_) => worksheet.write_string(r as u32, c as u16, *value).unwrap(),
                };
            }
        }
    }
    workbook.save(path).unwrap();
}

fn sheet_file(dir: &TempDir, name: &str, rows: &[&[&str]]) -> PathBuf {
    let path = dir.path().join(name);
    write_workbook(&path, &[("Planilha1", rows)]);
    path
}

fn importer(store: MemoryStore) -> Importer<MemoryStore> {
    Importer::with_settings(
        store,
        ImportSettings {
            reference_date: NaiveDate::from_ymd_opt(2025, 3, 20),
            ..ImportSettings::default()
        },
    )
}

fn codes(deliveries: &[CanonicalDelivery]) -> Vec<&str> {
    deliveries.iter().map(|d| d.delivery_code.as_str()).collect()
}

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

#[tokio::test]
async fn test_import_normalizes_and_skips_rows_without_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024.xlsx",
        &[
            HEADER,
            &["M1", "E1", "Reforma do hospital", "em andamento", "15/08/2024", "2024-12-31", "0.75"],
            &["M1", "", "Linha sem código", "ATRASADA", "", "", "0.1"],
            &["M2", "E2", "Compra de ambulâncias", "CONCLUIDA", "01/02/24", "", "85"],
        ],
    );
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let outcome = importer.import_file(&path, &ImportRequest::by("ana")).await;

    assert!(outcome.success, "{:?}", outcome.error_message);
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.secretariat_code, "SESAU");
    assert_eq!(summary.period, "08/2024");
    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.inserted_count, 2);
    assert_eq!(summary.failed_count, 0);

    let stored = importer.store().deliveries_for(summary.import_id);
    assert_eq!(codes(&stored), vec!["E1", "E2"]);

    let first = &stored[0];
    assert_eq!(first.meta_code.as_deref(), Some("M1"));
    assert_eq!(first.description.as_deref(), Some("Reforma do hospital"));
    assert_eq!(first.status, Some(DeliveryStatus::InProgress));
    assert_eq!(first.start_date, date(2024, 8, 15));
    assert_eq!(first.end_date, date(2024, 12, 31));
    assert_eq!(first.execution_percent, Some(75.0));

    let second = &stored[1];
    assert_eq!(second.status, Some(DeliveryStatus::Completed));
    // ambiguous day/month reads month-first
    assert_eq!(second.start_date, date(2024, 1, 2));
    assert_eq!(second.end_date, None);
    assert_eq!(second.execution_percent, Some(85.0));

    let imports = importer.store().imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].record.imported_by, "ana");
    assert_eq!(imports[0].record.total_delivery_count, 2);
    assert_eq!(imports[0].record.source_file_name, "SESAU_AGOSTO_2024.xlsx");
}

#[tokio::test]
async fn test_excel_date_cells_are_read_as_dates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SESAU_AGOSTO_2024.xlsx");

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (c, label) in HEADER.iter().enumerate() {
        worksheet.write_string(0, c as u16, *label).unwrap();
    }
    worksheet.write_string(1, 1, "E1").unwrap();
    let day = Format::new().set_num_format("dd/mm/yyyy");
    let start = NaiveDate::from_ymd_opt(2024, 8, 5).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
    worksheet.write_datetime_with_format(1, 4, &start, &day).unwrap();
    worksheet.write_datetime_with_format(1, 5, &end, &day).unwrap();
    workbook.save(&path).unwrap();

    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));
    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    let stored = importer.store().deliveries_for(outcome.summary.unwrap().import_id);
    assert_eq!(stored[0].start_date, date(2024, 8, 5));
    assert_eq!(stored[0].end_date, date(2024, 12, 20));
}

#[tokio::test]
async fn test_failed_delivery_insert_is_counted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024.xlsx",
        &[HEADER, &["M1", "E1", "A", "", "", "", ""], &["M1", "E2", "B", "", "", "", ""]],
    );
    let store = MemoryStore::new().with_secretariat("SESAU");
    store.fail_delivery("E2");
    let importer = importer(store);

    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    assert!(outcome.success);
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.inserted_count, 1);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(codes(&importer.store().deliveries_for(summary.import_id)), vec!["E1"]);
}

#[tokio::test]
async fn test_reimport_replaces_deliveries_of_same_period() {
    let dir = tempfile::tempdir().unwrap();
    let first = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024.xlsx",
        &[HEADER, &["M1", "E1", "A", "", "", "", ""], &["M1", "E2", "B", "", "", "", ""]],
    );
    let second = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024_revisado.xlsx",
        &[HEADER, &["M3", "E3", "C", "", "", "", "0.5"]],
    );
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let a = importer.import_file(&first, &ImportRequest::by("Sistema")).await;
    let b = importer.import_file(&second, &ImportRequest::by("revisor")).await;

    let a = a.summary.unwrap();
    let b = b.summary.unwrap();
    assert_eq!(a.import_id, b.import_id);

    let imports = importer.store().imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].record.source_file_name, "SESAU_AGOSTO_2024_revisado.xlsx");
    assert_eq!(imports[0].record.imported_by, "revisor");
    assert_eq!(imports[0].record.total_delivery_count, 1);

    let stored = importer.store().deliveries_for(b.import_id);
    assert_eq!(codes(&stored), vec!["E3"]);
    assert_eq!(stored[0].execution_percent, Some(50.0));
    assert_eq!(importer.store().deliveries().len(), 1);
}

#[tokio::test]
async fn test_other_period_gets_its_own_import() {
    let dir = tempfile::tempdir().unwrap();
    let august = sheet_file(&dir, "SESAU_AGOSTO_2024.xlsx", &[HEADER, &["M1", "E1", "A", "", "", "", ""]]);
    let september = sheet_file(&dir, "SESAU_SETEMBRO_2024.xlsx", &[HEADER, &["M1", "E1", "A", "", "", "", ""]]);
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    importer.import_file(&august, &ImportRequest::by("Sistema")).await;
    let outcome = importer.import_file(&september, &ImportRequest::by("Sistema")).await;

    assert_eq!(outcome.summary.unwrap().period, "09/2024");
    assert_eq!(importer.store().imports().len(), 2);
    assert_eq!(importer.store().deliveries().len(), 2);
}

#[tokio::test]
async fn test_commit_failure_keeps_previous_import() {
    let dir = tempfile::tempdir().unwrap();
    let first = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024.xlsx",
        &[HEADER, &["M1", "E1", "A", "", "", "", ""], &["M1", "E2", "B", "", "", "", ""]],
    );
    let second = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024_v2.xlsx",
        &[HEADER, &["M3", "E3", "C", "", "", "", ""]],
    );
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let ok = importer.import_file(&first, &ImportRequest::by("Sistema")).await;
    let import_id = ok.summary.unwrap().import_id;

    importer.store().set_fail_commit(true);
    let failed = importer.import_file(&second, &ImportRequest::by("Sistema")).await;

    assert!(!failed.success);
    assert_eq!(failed.error_message.as_deref(), Some("commit failed"));
    let imports = importer.store().imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].record.source_file_name, "SESAU_AGOSTO_2024.xlsx");
    assert_eq!(codes(&importer.store().deliveries_for(import_id)), vec!["E1", "E2"]);
}

#[tokio::test]
async fn test_unknown_secretariat_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(&dir, "SEDUC_AGOSTO_2024.xlsx", &[HEADER, &["M1", "E1", "A", "", "", "", ""]]);
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_message.as_deref(), Some("secretariat SEDUC not found"));
    assert!(importer.store().imports().is_empty());
    assert!(importer.store().deliveries().is_empty());
}

#[tokio::test]
async fn test_explicit_code_and_period_override_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(&dir, "planilha.xlsx", &[HEADER, &["M1", "E1", "A", "", "", "", ""]]);
    let importer = importer(MemoryStore::new().with_secretariat("SEAD"));
    let request = ImportRequest {
        secretariat_code: Some("SEAD".to_string()),
        month: Some(11),
        year: Some(2023),
        ..ImportRequest::by("Sistema")
    };

    let outcome = importer.import_file(&path, &request).await;

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.secretariat_code, "SEAD");
    assert_eq!(summary.period, "11/2023");
}

#[tokio::test]
async fn test_sheet_without_deliveries_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(&dir, "SESAU_AGOSTO_2024.xlsx", &[HEADER, &["M1", "", "Sem código", "", "", "", ""]]);
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_message.as_deref(), Some("no data found in spreadsheet"));
    assert!(importer.store().imports().is_empty());
}

#[tokio::test]
async fn test_header_found_below_title_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024.xlsx",
        &[
            &["PLANO DE METAS 2024"],
            &[],
            &["Secretaria de Saúde"],
            HEADER,
            &["M1", "E1", "A", "PAUSADA", "", "", "1"],
        ],
    );
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.total_records, 1);
    let stored = importer.store().deliveries_for(summary.import_id);
    assert_eq!(stored[0].status, Some(DeliveryStatus::Paused));
    // exactly 1 reads as a fraction
    assert_eq!(stored[0].execution_percent, Some(100.0));
}

#[tokio::test]
async fn test_headerless_sheet_uses_second_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024.xlsx",
        &[
            &["Relatório mensal"],
            &["CÓDIGO", "IDE", "DESCRIÇÃO"],
            &["X", "E9", "Sem cabeçalho padrão"],
        ],
    );
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    let summary = outcome.summary.unwrap();
    let stored = importer.store().deliveries_for(summary.import_id);
    assert_eq!(codes(&stored), vec!["E9"]);
    assert_eq!(stored[0].description, None);
}

#[tokio::test]
async fn test_unparsable_percent_becomes_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(
        &dir,
        "SESAU_AGOSTO_2024.xlsx",
        &[
            HEADER,
            &["M1", "E1", "A", "", "data ruim", "", "n/d"],
            &["M1", "E2", "B", "", "", "", ""],
            &["M1", "E3", "C", "", "", "", "42.5%"],
        ],
    );
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    let stored = importer.store().deliveries_for(outcome.summary.unwrap().import_id);
    assert_eq!(stored[0].execution_percent, Some(0.0));
    assert_eq!(stored[0].start_date, None);
    assert_eq!(stored[1].execution_percent, None);
    assert_eq!(stored[2].execution_percent, Some(42.5));
}

#[tokio::test]
async fn test_named_sheet_is_selected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SESAU_AGOSTO_2024.xlsx");
    let summary_rows: &[&[&str]] = &[&["Total de entregas", "2"]];
    let delivery_rows: &[&[&str]] = &[
        HEADER,
        &["M1", "E1", "A", "", "", "", ""],
        &["M1", "E2", "B", "", "", "", ""],
    ];
    write_workbook(&path, &[("Resumo", summary_rows), ("Entregas", delivery_rows)]);
    let importer = importer(MemoryStore::new().with_secretariat("SESAU"));

    let request = ImportRequest {
        sheet: Some("Entregas".to_string()),
        ..ImportRequest::by("Sistema")
    };
    let outcome = importer.import_file(&path, &request).await;
    assert_eq!(outcome.summary.unwrap().total_records, 2);

    // the first sheet has no IDE column
    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;
    assert_eq!(outcome.error_message.as_deref(), Some("no data found in spreadsheet"));

    let request = ImportRequest {
        sheet: Some("Metas".to_string()),
        ..ImportRequest::by("Sistema")
    };
    let outcome = importer.import_file(&path, &request).await;
    assert!(!outcome.success);
    assert!(outcome.error_message.unwrap().contains("sheet \"Metas\" not found"));
}

#[tokio::test]
async fn test_permissive_store_accepts_any_secretariat() {
    let dir = tempfile::tempdir().unwrap();
    let path = sheet_file(&dir, "SEINFRA_MAIO_2025.xlsx", &[HEADER, &["M1", "E1", "A", "", "", "", ""]]);
    let importer = importer(MemoryStore::permissive());

    let outcome = importer.import_file(&path, &ImportRequest::by("Sistema")).await;

    let summary = outcome.summary.unwrap();
    assert_eq!(summary.secretariat_code, "SEINFRA");
    assert_eq!(summary.period, "05/2025");
    assert!(importer.store().secretariat_id("SEINFRA").is_some());
}

#[tokio::test]
async fn test_directory_import_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let rows: &[&[&str]] = &[HEADER, &["M1", "E1", "A", "", "", "", ""]];
    sheet_file(&dir, "SESAU_AGOSTO_2024.xlsx", rows);
    sheet_file(&dir, "SEDUC_AGOSTO_2024.xlsx", rows);
    sheet_file(&dir, "SEAD_AGOSTO_2024.xlsx", rows);
    std::fs::write(dir.path().join("leia-me.txt"), b"ignorar").unwrap();
    std::fs::create_dir(dir.path().join("antigos.xlsx")).unwrap();
    let importer = importer(
        MemoryStore::new()
            .with_secretariat("SESAU")
            .with_secretariat("SEAD"),
    );

    let results = importer.import_directory(dir.path(), "lote").await.unwrap();

    let names: Vec<_> = results.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["SEAD_AGOSTO_2024.xlsx", "SEDUC_AGOSTO_2024.xlsx", "SESAU_AGOSTO_2024.xlsx"]
    );
    let success: Vec<_> = results.iter().map(|r| r.outcome.success).collect();
    assert_eq!(success, vec![true, false, true]);
    assert_eq!(
        results[1].outcome.error_message.as_deref(),
        Some("secretariat SEDUC not found")
    );

    let imports = importer.store().imports();
    assert_eq!(imports.len(), 2);
    assert!(imports.iter().all(|i| i.record.imported_by == "lote"));
}

#[tokio::test]
async fn test_directory_import_of_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let importer = importer(MemoryStore::new());

    let results = importer.import_directory(dir.path(), "Sistema").await.unwrap();

    assert!(results.is_empty());
}
