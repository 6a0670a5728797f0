use serde_json::{json, Map, Value};
use std::fs;
use sweep_core::{DetailRecord, DoctorType, QueryResult, SearchKey, SearchParams};
use sweep_store::{aggregate, write_outputs, AggregateOptions, RawStore};
use tempfile::TempDir;

fn detail(value: Value) -> DetailRecord {
    match value {
        Value::Object(map) => DetailRecord(map),
        _ => panic!("detail must be an object"),
    }
}

fn result(key: &str, totalcount: i64, rows: Vec<DetailRecord>) -> QueryResult {
    QueryResult {
        postal_code: SearchKey::parse(key).expect("valid key"),
        totalcount,
        results: rows,
        extra: Map::new(),
    }
}

fn populate(store: &RawStore) {
    let params = SearchParams::default();
    store
        .append(
            "FSA_LDU1",
            &params,
            &result(
                "K1A0",
                -1,
                vec![detail(json!({
                    "cpsonumber": "CPSO-1",
                    "name": "Dr. First",
                    "phonenumber": "416-555-1234",
                    "fax": "12345"
                }))],
            ),
        )
        .expect("append K1A0");
    store
        .append(
            "FSA_LDU1",
            &params,
            &result(
                "K1A1",
                2,
                vec![
                    detail(json!({
                        "cpsonumber": "CPSO-1",
                        "name": "Dr. Duplicate",
                        "phonenumber": "905-555-0000",
                        "fax": ""
                    })),
                    detail(json!({
                        "cpsonumber": "CPSO-2",
                        "name": "Dr. Second, Jr.",
                        "phonenumber": "(613) 555-9876",
                        "fax": "613 555 0001"
                    })),
                ],
            ),
        )
        .expect("append K1A1");
    store
        .append(
            "FSA_LDU2",
            &SearchParams::new(DoctorType::FamilyDoctor, None),
            &result("K1A0B", 0, Vec::new()),
        )
        .expect("append K1A0B");
}

#[test]
fn test_aggregate_writes_summary_and_details() {
    let tmp = TempDir::new().expect("create temp dir");
    let store = RawStore::new(tmp.path().join("data"));
    populate(&store);

    let tables = aggregate::aggregate(&store, &AggregateOptions::default()).expect("aggregate");
    assert_eq!(tables.summary.len(), 3);
    assert_eq!(tables.detail_rows_seen, 3);
    assert_eq!(tables.details.rows.len(), 2);
    assert!(tables.skipped_files.is_empty());

    let out_dir = tmp.path().join("results");
    let paths = write_outputs(&out_dir, &tables).expect("write outputs");

    let summary = fs::read_to_string(&paths.summary).expect("read summary");
    assert_eq!(
        summary,
        "postal_code,totalcount\nK1A0,-1\nK1A0B,0\nK1A1,2\n"
    );

    let details = fs::read_to_string(paths.details.expect("details written")).expect("read");
    assert_eq!(
        details,
        "cpsonumber,name,phonenumber,fax\n\
         CPSO-1,Dr. First,(416) 555-1234,UNFORMATTABLE\n\
         CPSO-2,\"Dr. Second, Jr.\",(613) 555-9876,(613) 555-0001\n"
    );
}

#[test]
fn test_aggregate_skips_corrupt_records() {
    let tmp = TempDir::new().expect("create temp dir");
    let store = RawStore::new(tmp.path());
    populate(&store);

    let corrupt = store.partition_dir("FSA_LDU1").join("K1A+2+Any+Any.json");
    fs::write(&corrupt, "{ not json").expect("write corrupt file");

    let tables = aggregate::aggregate(&store, &AggregateOptions::default()).expect("aggregate");
    assert_eq!(tables.summary.len(), 3);
    assert_eq!(tables.skipped_files, vec![corrupt]);
}

#[test]
fn test_aggregate_is_stable_across_runs() {
    let tmp = TempDir::new().expect("create temp dir");
    let store = RawStore::new(tmp.path().join("data"));
    populate(&store);

    let first = aggregate::aggregate(&store, &AggregateOptions::default()).expect("aggregate");
    let second = aggregate::aggregate(&store, &AggregateOptions::default()).expect("aggregate");
    assert_eq!(first, second);
}

#[test]
fn test_empty_store_writes_summary_only() {
    let tmp = TempDir::new().expect("create temp dir");
    let store = RawStore::new(tmp.path().join("data"));

    let tables = aggregate::aggregate(&store, &AggregateOptions::default()).expect("aggregate");
    let paths = write_outputs(&tmp.path().join("results"), &tables).expect("write outputs");
    assert_eq!(
        fs::read_to_string(&paths.summary).expect("read"),
        "postal_code,totalcount\n"
    );
    assert_eq!(paths.details, None);
}

#[test]
fn test_aggregate_reads_records_with_null_results() {
    let tmp = TempDir::new().expect("create temp dir");
    let store = RawStore::new(tmp.path());
    populate(&store);

    let legacy = store.partition_dir("FSA_LDU1").join("K1A+2+Any+Any.json");
    fs::write(
        &legacy,
        r#"{"postal_code": "K1A+2", "totalcount": 0, "results": null}"#,
    )
    .expect("write legacy record");

    let tables = aggregate::aggregate(&store, &AggregateOptions::default()).expect("aggregate");
    assert!(tables.skipped_files.is_empty());
    assert_eq!(tables.summary.len(), 4);
    assert!(tables
        .summary
        .iter()
        .any(|row| row.postal_code.as_str() == "K1A2" && row.totalcount == 0));
    assert_eq!(tables.details.rows.len(), 2);
}
