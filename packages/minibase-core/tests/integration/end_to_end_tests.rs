//! The database facade driving tables, indexes, queries and the log files.

use std::sync::Arc;

use minibase_core::journal::{FileLogSink, LogFile, LogStatistics};
use minibase_core::{
    Database, DbError, EngineConfig, FieldDescriptor, FieldType, IndexKind, Predicate,
    SchemaError, Value,
};
use ntest::timeout;

use super::helpers::temp_config;

fn open_logged(config: &EngineConfig) -> (Database, Arc<FileLogSink>) {
    let sink = Arc::new(FileLogSink::open(&config.log_dir).unwrap());
    let db = Database::open(config.clone())
        .unwrap()
        .with_sink(sink.clone());
    (db, sink)
}

fn student_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("sid", FieldType::Integer, 5).unwrap(),
        FieldDescriptor::new("name", FieldType::VarString, 12).unwrap(),
        FieldDescriptor::new("major", FieldType::FixedString, 4).unwrap(),
    ]
}

#[timeout(5000)]
#[test]
fn test_mutations_are_logged() {
    let (_dir, config) = temp_config();
    let (db, sink) = open_logged(&config);

    db.create_table("student", student_fields()).unwrap();
    db.insert("student", &["1", "Ann", "CS"]).unwrap();
    db.insert("student", &["2", "Bo", "EE"]).unwrap();
    assert!(db.update_where("student", "sid", "2", "major", "CS").unwrap());
    assert!(db.delete_where("student", "name", "Ann").unwrap());
    // no match, nothing logged
    assert!(!db.delete_where("student", "name", "Cy").unwrap());

    assert_eq!(
        sink.statistics().unwrap(),
        LogStatistics {
            before_image: 5,
            after_image: 5,
            active_tx: 5,
            commit_tx: 5,
        }
    );

    let before = sink.read_log(LogFile::BeforeImage).unwrap();
    assert!(before[1].contains("operation=INSERT table='student' BEFORE=NULL"));
    assert!(before[3].contains("operation=UPDATE"));
    assert!(before[3].contains("EE"));
    let after = sink.read_log(LogFile::AfterImage).unwrap();
    assert!(after[3].contains("CS"));
    assert!(after[4].ends_with("AFTER=NULL"));

    let commits = sink.read_log(LogFile::CommitTx).unwrap();
    for (i, line) in commits.iter().enumerate() {
        assert!(line.contains(&format!("tx_id={} ", i + 1)));
        assert!(line.ends_with("status=COMMIT"));
    }

    assert_eq!(
        db.scan("student").unwrap(),
        vec![vec![
            Value::Integer(2),
            Value::Text("Bo".to_string()),
            Value::Text("CS".to_string()),
        ]]
    );
}

#[timeout(5000)]
#[test]
fn test_tx_ids_resume_after_reopen() {
    let (_dir, config) = temp_config();
    {
        let (db, _sink) = open_logged(&config);
        db.create_table("student", student_fields()).unwrap();
        db.insert("student", &["1", "Ann", "CS"]).unwrap();
    }
    let (db, sink) = open_logged(&config);
    db.insert("student", &["2", "Bo", "EE"]).unwrap();

    let active = sink.read_log(LogFile::ActiveTx).unwrap();
    assert_eq!(active.len(), 3);
    assert!(active[2].contains("tx_id=3 operation=INSERT"));

    sink.clear_all().unwrap();
    assert_eq!(sink.statistics().unwrap(), LogStatistics::default());
}

#[timeout(5000)]
#[test]
fn test_catalog_and_indexes_survive_reopen() {
    let (_dir, config) = temp_config();
    {
        let db = Database::open(config.clone()).unwrap();
        db.create_table("student", student_fields()).unwrap();
        for i in 0..50 {
            let major = if i % 3 == 0 { "CS" } else { "MATH" };
            db.insert("student", &[i.to_string(), format!("s{}", i), major.to_string()])
                .unwrap();
        }
        db.create_index("student", "major", IndexKind::BTree).unwrap();
        db.create_index("student", "sid", IndexKind::Hash).unwrap();
    }

    let db = Database::open(config).unwrap();
    assert_eq!(db.fields("student").unwrap(), student_fields());
    assert_eq!(db.list_indexes("student").unwrap().len(), 2);

    let cs = db
        .search_index("student", "major", "CS", IndexKind::BTree)
        .unwrap();
    assert_eq!(cs.len(), 17);
    let scanned = db.find("student", "major", "CS").unwrap();
    assert!(cs.iter().all(|row| scanned.contains(row)));

    let one = db
        .search_index("student", "sid", "42", IndexKind::Hash)
        .unwrap();
    assert_eq!(one[0][1], Value::Text("s42".to_string()));

    // the B-tree was built over `major`, not `sid`
    assert!(db
        .search_index("student", "sid", "42", IndexKind::BTree)
        .is_err());

    assert!(db.drop_index("student", IndexKind::Hash).unwrap());
    assert!(!db.drop_index("student", IndexKind::Hash).unwrap());
    assert!(db
        .search_index("student", "sid", "42", IndexKind::Hash)
        .is_err());
}

#[timeout(5000)]
#[test]
fn test_select_over_facade() {
    let (_dir, config) = temp_config();
    let db = Database::open(config).unwrap();
    db.create_table("student", student_fields()).unwrap();
    db.create_table(
        "enrolled",
        vec![
            FieldDescriptor::new("sid", FieldType::Integer, 5).unwrap(),
            FieldDescriptor::new("course", FieldType::FixedString, 6).unwrap(),
        ],
    )
    .unwrap();
    db.insert("student", &["1", "Ann", "CS"]).unwrap();
    db.insert("student", &["2", "Bo", "EE"]).unwrap();
    db.insert("enrolled", &["1", "DB101"]).unwrap();
    db.insert("enrolled", &["1", "OS201"]).unwrap();
    db.insert("enrolled", &["2", "DB101"]).unwrap();

    let result = db
        .select(
            &["student.name"],
            &["student", "enrolled"],
            vec![
                Predicate::join("student.sid", "enrolled.sid"),
                Predicate::equals("course", "DB101"),
            ],
        )
        .unwrap();
    assert_eq!(result.header, vec!["student.name"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Value::Text("Ann".to_string())],
            vec![Value::Text("Bo".to_string())],
        ]
    );

    assert!(matches!(
        db.select(&["*"], &["nobody"], Vec::new()),
        Err(DbError::Schema(SchemaError::TableNotFound(_)))
    ));
}

#[timeout(5000)]
#[test]
fn test_drop_and_recreate_table() {
    let (_dir, config) = temp_config();
    let db = Database::open(config.clone()).unwrap();
    db.create_table("student", student_fields()).unwrap();
    db.insert("student", &["1", "Ann", "CS"]).unwrap();
    db.create_index("student", "sid", IndexKind::BTree).unwrap();

    db.drop_table("student").unwrap();
    assert!(!config.table_path("student").exists());
    assert!(db.table_names().unwrap().is_empty());

    db.create_table(
        "student",
        vec![FieldDescriptor::new("sid", FieldType::Integer, 3).unwrap()],
    )
    .unwrap();
    assert!(db.scan("student").unwrap().is_empty());
    assert!(db.list_indexes("student").unwrap().is_empty());
}
