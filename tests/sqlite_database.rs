use std::fs;
use std::path::Path;

use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use rust_sqldb::{
    tables, CreateOperation, CrudOperation, CrudOutcome, Database, DatabaseError,
    DeleteOperation, Query, QueryOperator, ReadOperation, SqliteConfig, SqliteDatabase,
    Table, UpdateOperation, UpsertOperation, UpsertOutcome, Value,
};
use tempfile::TempDir;

tables! {
    enum Tables {
        Users => "users",
        Posts => "posts",
        Tags => "tags",
    }
}

#[derive(Debug)]
struct User {
    _id: i64, // Prefix with underscore to indicate it's intentionally unused
    name: String,
    email: String,
    age: Option<i32>,
}

const USERS_DDL: &str = r#"
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        age INTEGER,
        bio TEXT
    );
    CREATE INDEX idx_users_email ON users(email);
"#;

const POSTS_DDL: &str = r#"
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        title TEXT NOT NULL
    );
    CREATE TABLE tags (
        id INTEGER PRIMARY KEY,
        label TEXT
    );
"#;

fn write_ddl(dir: &Path) {
    fs::create_dir_all(dir.join("tables")).unwrap();
    fs::write(dir.join("01_users.sql"), USERS_DDL).unwrap();
    fs::write(dir.join("tables/02_posts.sql"), POSTS_DDL).unwrap();
    fs::write(dir.join("notes.txt"), "not a script").unwrap();
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> (SqliteDatabase, TempDir) {
    let dir = TempDir::new().unwrap();
    let ddl = dir.path().join("ddl");
    write_ddl(&ddl);
    let config = SqliteConfig::new(dir.path().join("data/test")).with_ddl(ddl);
    let db = SqliteDatabase::open(config).unwrap();
    (db, dir)
}

async fn insert_user(db: &SqliteDatabase, name: &str, email: &str, age: i32) -> Option<i64> {
    db.insert(
        CreateOperation::new(Tables::Users)
            .value("name", name)
            .value("email", email)
            .value("age", age),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn builds_new_database_from_ddl_directory() {
    let (db, dir) = create_temp_db();
    assert_eq!(db.path(), dir.path().join("data/test.db"));
    assert!(db.path().exists());

    let tables = db
        .with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .unwrap();
    assert_eq!(tables, vec!["posts".to_string(), "tags".to_string(), "users".to_string()]);
}

#[tokio::test]
async fn existing_database_is_reused_unless_rebuild_forced() {
    let (db, dir) = create_temp_db();
    insert_user(&db, "John Doe", "john@example.com", 30).await;

    // No DDL needed to reopen an existing file.
    let reopened = SqliteDatabase::open(SqliteConfig::new(db.path())).unwrap();
    assert_eq!(reopened.select(ReadOperation::new(Tables::Users)).await.unwrap().len(), 1);

    let rebuilt = SqliteDatabase::open(
        SqliteConfig::new(db.path())
            .with_ddl(dir.path().join("ddl"))
            .force_rebuild(true),
    )
    .unwrap();
    assert!(rebuilt.select(ReadOperation::new(Tables::Users)).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_ddl_location_leaves_existing_file_alone() {
    let (db, dir) = create_temp_db();
    insert_user(&db, "John Doe", "john@example.com", 30).await;

    let err = SqliteDatabase::open(
        SqliteConfig::new(db.path())
            .with_ddl(dir.path().join("missing"))
            .force_rebuild(true),
    )
    .unwrap_err();
    assert!(matches!(err, DatabaseError::DdlNotFound(_)));
    assert_eq!(db.select(ReadOperation::new(Tables::Users)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn broken_ddl_does_not_leave_a_half_built_file() {
    let dir = TempDir::new().unwrap();
    let ddl = dir.path().join("ddl");
    fs::create_dir_all(&ddl).unwrap();
    fs::write(ddl.join("broken.sql"), "CREATE TABLE (;").unwrap();
    let path = dir.path().join("broken");

    let err = SqliteDatabase::open(SqliteConfig::new(&path).with_ddl(&ddl)).unwrap_err();
    assert!(matches!(err, DatabaseError::Sqlite(_)));
    assert!(!dir.path().join("broken.db").exists());
}

#[tokio::test]
async fn test_basic_operations() {
    let (db, _dir) = create_temp_db();

    // Insert a new user
    let id = insert_user(&db, "John Doe", "john@example.com", 30).await;
    assert_eq!(id, Some(1));

    // Query a user
    let row = db
        .select_one(
            ReadOperation::new(Tables::Users)
                .fields(["id", "name", "email", "age"])
                .where_equals("id", 1),
        )
        .await
        .unwrap()
        .expect("user exists");
    let user = User {
        _id: row[0].as_i64().unwrap(),
        name: row[1].as_str().unwrap().to_string(),
        email: row[2].as_str().unwrap().to_string(),
        age: row[3].as_i64().map(|a| a as i32),
    };
    assert_eq!(user.name, "John Doe");
    assert_eq!(user.email, "john@example.com");
    assert_eq!(user.age, Some(30));

    // Update the user
    let changed = db
        .update(UpdateOperation::new(Tables::Users).set("age", 31).where_equals("id", 1))
        .await
        .unwrap();
    assert!(changed);
    let age = db
        .select_one(ReadOperation::new(Tables::Users).fields(["age"]).where_equals("id", 1))
        .await
        .unwrap();
    assert_eq!(age, Some(vec![Value::Integer(31)]));

    // Delete the user
    let deleted = db
        .delete(DeleteOperation::new(Tables::Users).where_equals("id", 1))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    let gone = db
        .select_one(ReadOperation::new(Tables::Users).where_equals("id", 1))
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn select_star_returns_raw_rows_in_column_order() {
    let (db, _dir) = create_temp_db();
    insert_user(&db, "Ada", "ada@example.com", 36).await;

    let rows = db
        .select(ReadOperation::new(Tables::Users).where_equals("email", "ada@example.com"))
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![
            Value::Integer(1),
            Value::Text("Ada".into()),
            Value::Text("ada@example.com".into()),
            Value::Integer(36),
            Value::Null,
        ]]
    );
}

#[tokio::test]
async fn where_equals_null_matches_missing_values() {
    let (db, _dir) = create_temp_db();
    insert_user(&db, "Ada", "ada@example.com", 36).await;
    insert_user(&db, "Grace", "grace@example.com", 45).await;
    db.update(
        UpdateOperation::new(Tables::Users)
            .set("bio", "compilers")
            .where_equals("name", "Grace"),
    )
    .await
    .unwrap();

    let without_bio = db
        .select(
            ReadOperation::new(Tables::Users)
                .fields(["name"])
                .where_equals("bio", Value::Null),
        )
        .await
        .unwrap();
    assert_eq!(without_bio, vec![vec![Value::Text("Ada".into())]]);
}

#[tokio::test]
async fn ordering_paging_and_operators() {
    let (db, _dir) = create_temp_db();
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        insert_user(&db, name, &format!("{name}@example.com"), 20 + i as i32).await;
    }

    let page = db
        .select(
            ReadOperation::new(Tables::Users)
                .fields(["name"])
                .query(Query::new().with_condition(
                    "age",
                    QueryOperator::GreaterThanOrEqual(Value::Integer(21)),
                ))
                .order_by("age", false)
                .limit(2)
                .offset(1),
        )
        .await
        .unwrap();
    assert_eq!(page, vec![vec![Value::from("c")], vec![Value::from("b")]]);

    let in_list = db
        .select(ReadOperation::new(Tables::Users).query(Query::new().with_condition(
            "name",
            QueryOperator::In(vec!["a".into(), "d".into()]),
        )))
        .await
        .unwrap();
    assert_eq!(in_list.len(), 2);
}

#[tokio::test]
async fn update_reports_whether_rows_changed() {
    let (db, _dir) = create_temp_db();
    let changed = db
        .update(UpdateOperation::new(Tables::Users).set("age", 1).where_equals("id", 42))
        .await
        .unwrap();
    assert!(!changed);
}

#[tokio::test]
async fn amend_appends_to_existing_text() {
    let (db, _dir) = create_temp_db();
    insert_user(&db, "Ada", "ada@example.com", 36).await;

    for part in ["engines", "+notes"] {
        db.update(
            UpdateOperation::new(Tables::Users)
                .set("bio", part)
                .where_equals("id", 1)
                .amend(true),
        )
        .await
        .unwrap();
    }
    let bio = db
        .select_one(ReadOperation::new(Tables::Users).fields(["bio"]).where_equals("id", 1))
        .await
        .unwrap();
    assert_eq!(bio, Some(vec![Value::from("engines+notes")]));
}

#[tokio::test]
async fn upsert_inserts_then_updates() {
    let (db, _dir) = create_temp_db();
    let op = UpsertOperation::new(Tables::Users)
        .key("id", 7)
        .set("name", "Ada")
        .set("email", "ada@example.com");

    assert_eq!(db.upsert(op.clone()).await.unwrap(), UpsertOutcome::Inserted(Some(7)));
    assert_eq!(db.upsert(op).await.unwrap(), UpsertOutcome::Updated);

    let renamed = UpsertOperation::new(Tables::Users)
        .key("id", 7)
        .set("name", "Ada L.");
    assert_eq!(db.upsert(renamed).await.unwrap(), UpsertOutcome::Updated);
    let rows = db
        .select(ReadOperation::new(Tables::Users).fields(["name"]))
        .await
        .unwrap();
    assert_eq!(rows, vec![vec![Value::from("Ada L.")]]);
}

#[tokio::test]
async fn upsert_with_only_keys_inserts_once() {
    let (db, _dir) = create_temp_db();
    let op = UpsertOperation::new(Tables::Tags).key("id", 3);

    assert_eq!(db.upsert(op.clone()).await.unwrap(), UpsertOutcome::Inserted(Some(3)));
    assert_eq!(db.upsert(op).await.unwrap(), UpsertOutcome::Unchanged);

    let rows = db.select(ReadOperation::new(Tables::Tags)).await.unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(3), Value::Null]]);
}

#[tokio::test]
async fn upsert_blocked_by_another_unique_column_is_an_error() {
    let (db, _dir) = create_temp_db();
    insert_user(&db, "Ada", "ada@example.com", 36).await;

    let err = db
        .upsert(
            UpsertOperation::new(Tables::Users)
                .key("id", 99)
                .set("name", "Bob")
                .set("email", "ada@example.com"),
        )
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());

    let missing = db
        .select_one(ReadOperation::new(Tables::Users).where_equals("id", 99))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn duplicate_insert_surfaces_constraint_violation() {
    let (db, _dir) = create_temp_db();
    insert_user(&db, "Ada", "ada@example.com", 36).await;

    let err = db
        .insert(
            CreateOperation::new(Tables::Users)
                .value("name", "Imposter")
                .value("email", "ada@example.com"),
        )
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation());
    assert!(err.is_unique_violation());
}

#[tokio::test]
async fn foreign_keys_are_enforced() {
    let (db, _dir) = create_temp_db();
    let err = db
        .insert(
            CreateOperation::new(Tables::Posts)
                .value("user_id", 99)
                .value("title", "orphan"),
        )
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation());
    assert!(!err.is_unique_violation());
}

#[tokio::test]
async fn exists_and_crud_dispatch() {
    let (db, _dir) = create_temp_db();
    let outcome = db
        .execute_crud(CrudOperation::Create(
            CreateOperation::new(Tables::Users)
                .value("name", "Ada")
                .value("email", "ada@example.com"),
        ))
        .await
        .unwrap();
    assert_eq!(outcome, CrudOutcome::Inserted(Some(1)));

    assert!(db
        .exists(&Tables::Users, Query::new().where_equals("name", "Ada"))
        .await
        .unwrap());
    assert!(!db
        .exists(&Tables::Users, Query::new().where_equals("name", "Bob"))
        .await
        .unwrap());

    let outcome = db
        .execute_crud(CrudOperation::Delete(DeleteOperation::new(Tables::Users)))
        .await
        .unwrap();
    assert_eq!(outcome, CrudOutcome::Deleted(1));
}

// Custom methods drop down to rusqlite on a scoped connection.
#[tokio::test]
async fn custom_queries_use_the_driver_directly() -> Result<()> {
    let (db, _dir) = create_temp_db();

    db.with_connection(|conn| {
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO users (name, email, age) VALUES (?1, ?2, ?3)",
            params!["John Doe", "john@example.com", 30],
        )?;
        tx.commit()?;
        Ok(())
    })?;

    let updated_age: Option<i32> = db.with_connection(|conn| {
        conn.execute("UPDATE users SET age = ? WHERE id = ?", params![31, 1])?;
        Ok(conn
            .query_row("SELECT age FROM users WHERE id = ?", [1], |row| row.get(0))
            .optional()?)
    })?;
    assert_eq!(updated_age, Some(31));

    // Uncommitted work is rolled back when the scoped connection closes.
    db.with_connection(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM users", [])?;
        Ok(())
    })?;
    assert_eq!(db.select(ReadOperation::new(Tables::Users.name())).await?.len(), 1);
    Ok(())
}
