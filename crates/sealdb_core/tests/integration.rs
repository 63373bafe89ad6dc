//! End-to-end tests through the public `Store` API.

use std::fs;
use std::path::Path;

use sealdb_core::{
    Column, ColumnType, Config, CoreError, KdfParams, QueryResult, Store, Value,
};
use tempfile::tempdir;

fn config(dir: &Path) -> Config {
    Config::new(dir)
        .secret("integration-secret")
        .kdf(KdfParams::light())
}

fn fighters(store: &Store) {
    store.create_database("dragon").unwrap();
    store
        .execute_statement(
            "dragon",
            "CREATE TABLE fighters (id INTEGER PRIMARY KEY, nome TEXT NOT NULL, age INTEGER)",
        )
        .unwrap();
}

#[test]
fn insert_and_select_by_name() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);

    let inserted = store
        .execute_statement("dragon", "INSERT INTO fighters (nome, age) VALUES ('Goku', 30)")
        .unwrap();
    assert_eq!(inserted.affected_rows(), Some(1));
    assert_eq!(inserted.generated_id(), Some(1));

    let result = store
        .execute_statement("dragon", "SELECT * FROM fighters WHERE nome = 'Goku'")
        .unwrap();
    assert_eq!(result.rows().len(), 1);
    let row = &result.rows()[0];
    assert_eq!(row["id"], Value::Integer(1));
    assert_eq!(row["age"], Value::Integer(30));
}

#[test]
fn update_by_key() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);
    store
        .execute_statement("dragon", "INSERT INTO fighters (id, nome, age) VALUES (1, 'Goku', 30)")
        .unwrap();
    store
        .execute_statement("dragon", "INSERT INTO fighters (id, nome, age) VALUES (2, 'Vegeta', 32)")
        .unwrap();

    let updated = store
        .execute_statement("dragon", "UPDATE fighters SET age = 31 WHERE id = 1")
        .unwrap();
    assert_eq!(updated.affected_rows(), Some(1));

    let result = store
        .execute_statement("dragon", "SELECT nome, age FROM fighters ORDER BY id")
        .unwrap();
    assert_eq!(result.rows()[0]["age"], Value::Integer(31));
    assert_eq!(result.rows()[1]["age"], Value::Integer(32));
}

#[test]
fn range_predicate_and_ordering() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);
    for (nome, age) in [("Goku", 30), ("Gohan", 11), ("Piccolo", 40), ("Krillin", 29)] {
        store
            .execute_statement(
                "dragon",
                &format!("INSERT INTO fighters (nome, age) VALUES ('{nome}', {age})"),
            )
            .unwrap();
    }

    let result = store
        .execute_statement(
            "dragon",
            "SELECT nome FROM fighters WHERE age >= 20 AND age < 40 ORDER BY age DESC",
        )
        .unwrap();
    let names: Vec<_> = result.rows().iter().map(|r| r["nome"].clone()).collect();
    assert_eq!(
        names,
        vec![Value::Text("Goku".into()), Value::Text("Krillin".into())]
    );

    let limited = store
        .execute_statement("dragon", "SELECT nome FROM fighters ORDER BY age LIMIT 1")
        .unwrap();
    assert_eq!(limited.rows()[0]["nome"], Value::Text("Gohan".into()));
}

#[test]
fn constraints_leave_state_untouched() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);
    store
        .execute_statement("dragon", "INSERT INTO fighters (id, nome) VALUES (1, 'Goku')")
        .unwrap();

    let duplicate = store
        .execute_statement("dragon", "INSERT INTO fighters (id, nome) VALUES (1, 'Kakarot')")
        .unwrap_err();
    assert!(matches!(duplicate, CoreError::ConstraintViolation { .. }));

    let null = store
        .execute_statement("dragon", "INSERT INTO fighters (id, age) VALUES (2, 40)")
        .unwrap_err();
    assert!(matches!(null, CoreError::ConstraintViolation { .. }));

    let unknown = store
        .execute_statement("dragon", "INSERT INTO fighters (id, nome, power) VALUES (3, 'x', 9001)")
        .unwrap_err();
    assert!(matches!(unknown, CoreError::Schema { .. }));

    let result = store
        .execute_statement("dragon", "SELECT * FROM fighters")
        .unwrap();
    assert_eq!(result.rows().len(), 1);
}

#[test]
fn error_kinds_are_distinct() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);

    assert!(matches!(
        store.execute_statement("dragon", "SELEC * FROM fighters"),
        Err(CoreError::UnsupportedStatement { .. })
    ));
    assert!(matches!(
        store.execute_statement("dragon", "SELECT * FROM"),
        Err(CoreError::Syntax { .. })
    ));
    assert!(matches!(
        store.execute_statement("dragon", "SELECT * FROM villains"),
        Err(CoreError::NotFound { kind: "table", .. })
    ));
    assert!(matches!(
        store.execute_statement("dragon", "CREATE TABLE fighters (id INTEGER)"),
        Err(CoreError::Conflict { .. })
    ));
    assert!(matches!(
        store.execute_statement("nowhere", "SELECT * FROM fighters"),
        Err(CoreError::NotFound { kind: "database", .. })
    ));
}

#[test]
fn programmatic_table_and_row() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    store.create_database("app").unwrap();
    store
        .create_table_from_columns(
            "app",
            "kv",
            vec![
                Column::new("k", ColumnType::Text).primary_key(),
                Column::new("v", ColumnType::Real).with_default(Value::Real(0.5)),
            ],
        )
        .unwrap();
    store
        .insert_row("app", "kv", vec![("k".into(), Value::Text("a".into()))])
        .unwrap();

    let database = store.database("app").unwrap();
    let table = &database.tables["kv"];
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0]["v"], Value::Real(0.5));

    store.drop_table("app", "kv").unwrap();
    assert!(store.database("app").unwrap().tables.is_empty());
}

#[test]
fn data_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open(config(dir.path())).unwrap();
        fighters(&store);
        store
            .execute_statement("dragon", "INSERT INTO fighters (nome, age) VALUES ('Goku', 30)")
            .unwrap();
        store
            .execute_statement("dragon", "CREATE INDEX idx_nome ON fighters (nome)")
            .unwrap();
    }

    let store = Store::open(config(dir.path())).unwrap();
    assert_eq!(store.list_databases_on_disk().unwrap(), vec!["dragon"]);
    let result = store
        .execute_statement("dragon", "SELECT nome FROM fighters")
        .unwrap();
    assert_eq!(result.rows()[0]["nome"], Value::Text("Goku".into()));
    let database = store.database("dragon").unwrap();
    assert!(database.tables["fighters"]
        .indexes
        .iter()
        .any(|i| i.name == "idx_nome"));
}

#[test]
fn files_are_not_plaintext() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);
    store
        .execute_statement("dragon", "INSERT INTO fighters (nome) VALUES ('Bulma')")
        .unwrap();

    let raw = fs::read_to_string(dir.path().join("dragon.sdb")).unwrap();
    assert!(!raw.contains("Bulma"));
    assert!(!raw.contains("fighters"));
}

#[test]
fn wrong_secret_is_an_authentication_error() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open(config(dir.path())).unwrap();
        fighters(&store);
    }

    let wrong = Config::new(dir.path())
        .secret("not-the-secret")
        .kdf(KdfParams::light());
    // The registry is sealed too, so opening already fails.
    let err = Store::open(wrong).unwrap_err();
    assert!(err.is_authentication(), "{err}");
}

#[test]
fn tampered_file_is_not_treated_as_empty() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);
    drop(store);

    let path = dir.path().join("dragon.sdb");
    let mut wrapper: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    let ciphertext = wrapper["ciphertext"].as_str().unwrap().to_string();
    let flipped = if ciphertext.starts_with('0') { "1" } else { "0" };
    wrapper["ciphertext"] = serde_json::Value::String(format!("{flipped}{}", &ciphertext[1..]));
    fs::write(&path, serde_json::to_vec(&wrapper).unwrap()).unwrap();

    let store = Store::open(config(dir.path())).unwrap();
    let err = store
        .execute_statement("dragon", "SELECT * FROM fighters")
        .unwrap_err();
    assert!(err.is_authentication(), "{err}");
}

#[test]
fn oversized_write_keeps_last_good_state() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path()).max_database_size(2048)).unwrap();
    fighters(&store);
    store
        .execute_statement("dragon", "INSERT INTO fighters (nome) VALUES ('Goku')")
        .unwrap();
    let before = fs::read(dir.path().join("dragon.sdb")).unwrap();

    let huge = "z".repeat(4096);
    let err = store
        .execute_statement(
            "dragon",
            &format!("INSERT INTO fighters (nome) VALUES ('{huge}')"),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::SizeLimitExceeded { .. }));
    assert_eq!(fs::read(dir.path().join("dragon.sdb")).unwrap(), before);

    let result = store
        .execute_statement("dragon", "SELECT * FROM fighters")
        .unwrap();
    assert_eq!(result.rows().len(), 1);
}

#[test]
fn delete_returns_affected_count() {
    let dir = tempdir().unwrap();
    let store = Store::open(config(dir.path())).unwrap();
    fighters(&store);
    for nome in ["a", "b", "c"] {
        store
            .execute_statement("dragon", &format!("INSERT INTO fighters (nome) VALUES ('{nome}')"))
            .unwrap();
    }
    let deleted = store
        .execute_statement("dragon", "DELETE FROM fighters WHERE nome IN ('a', 'c')")
        .unwrap();
    assert_eq!(deleted, QueryResult::affected(2));
    let all = store.execute_statement("dragon", "DELETE FROM fighters").unwrap();
    assert_eq!(all.affected_rows(), Some(1));
}
