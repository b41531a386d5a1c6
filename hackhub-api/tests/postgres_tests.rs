//! Live Postgres tests
//!
//! Run with `--features db-tests` against a scratch database described by the
//! `HACKHUB_DB_*` variables. Every test recreates the tables it touches.

#![cfg(feature = "db-tests")]

use std::sync::Arc;

use hackhub_api::{DataMapper, MapperOpts, Services};
use hackhub_core::{Category, ErrorKind, Hackathon, Project};
use hackhub_storage::{
    DbConfig, InMemoryTreeStore, LruQueryCache, PgPool, QueryOpts, SqlConnection, SqlParam, SqlPool,
    Statement,
};
use hackhub_test_utils::assertions::{assert_kind, assert_not_found};
use tokio::sync::Mutex;

static DB_LOCK: Mutex<()> = Mutex::const_new(());

const SCHEMA: &[&str] = &[
    "DROP TABLE IF EXISTS \"table_assignments\", \"table_supports\", \"tables\", \
     \"project_categories\", \"projects\", \"categories\", \"hackathons\" CASCADE",
    "CREATE TABLE \"hackathons\" (\
     \"uid\" TEXT PRIMARY KEY, \"name\" TEXT NOT NULL, \"start_time\" BIGINT NOT NULL, \
     \"end_time\" BIGINT, \"base_pin\" BIGINT, \"active\" BOOLEAN NOT NULL DEFAULT FALSE)",
    "CREATE TABLE \"categories\" (\
     \"uid\" SERIAL PRIMARY KEY, \"category_name\" TEXT NOT NULL UNIQUE, \
     \"is_sponsor\" BOOLEAN NOT NULL DEFAULT FALSE)",
    "CREATE TABLE \"projects\" (\
     \"uid\" BIGSERIAL PRIMARY KEY, \"project_name\" TEXT NOT NULL, \
     \"hackathon\" TEXT NOT NULL REFERENCES \"hackathons\" (\"uid\"), \
     \"team\" TEXT[] NOT NULL DEFAULT '{}')",
    "CREATE TABLE \"project_categories\" (\
     \"project_id\" BIGINT NOT NULL REFERENCES \"projects\" (\"uid\") ON DELETE CASCADE, \
     \"category_id\" INT NOT NULL REFERENCES \"categories\" (\"uid\"), \
     PRIMARY KEY (\"project_id\", \"category_id\"))",
    "CREATE TABLE \"tables\" (\"table_number\" INT PRIMARY KEY, \"priority\" INT NOT NULL)",
    "CREATE TABLE \"table_supports\" (\
     \"table_number\" INT NOT NULL REFERENCES \"tables\" (\"table_number\"), \
     \"category_id\" INT NOT NULL REFERENCES \"categories\" (\"uid\"), \
     PRIMARY KEY (\"table_number\", \"category_id\"))",
    "CREATE TABLE \"table_assignments\" (\
     \"table_number\" INT NOT NULL REFERENCES \"tables\" (\"table_number\"), \
     \"project_id\" BIGINT NOT NULL REFERENCES \"projects\" (\"uid\") ON DELETE CASCADE, \
     \"hackathon\" TEXT NOT NULL REFERENCES \"hackathons\" (\"uid\"), \
     UNIQUE (\"hackathon\", \"table_number\"))",
];

async fn exec(pool: &PgPool, statement: &str, params: &[SqlParam]) {
    let mut connection = pool.acquire().await.unwrap();
    connection.execute(statement, params).await.unwrap();
}

async fn setup() -> (PgPool, Services) {
    let pool = PgPool::from_config(&DbConfig::from_env()).unwrap();
    for statement in SCHEMA {
        exec(&pool, statement, &[]).await;
    }
    let services = Services::new(
        Arc::new(pool.clone()),
        Arc::new(LruQueryCache::new(16)),
        Arc::new(InMemoryTreeStore::new()),
    );
    (pool, services)
}

async fn seed_hackathon(services: &Services, uid: &str) -> Hackathon {
    let mut hackathon = Hackathon::new("Live Hack");
    hackathon.uid = uid.to_string();
    services.hackathons.insert(hackathon).await.unwrap();
    services.hackathons.make_active(uid).await.unwrap()
}

async fn seed_category(services: &Services, name: &str) -> i32 {
    let category = Category {
        uid: None,
        category_name: name.to_string(),
        is_sponsor: false,
    };
    services.categories.insert(category).await.unwrap().uid.unwrap()
}

async fn seed_table(pool: &PgPool, number: i32, priority: i32, categories: &[i32]) {
    exec(
        pool,
        "INSERT INTO \"tables\" (\"table_number\", \"priority\") VALUES ($1, $2)",
        &[SqlParam::Int(number), SqlParam::Int(priority)],
    )
    .await;
    for category in categories {
        exec(
            pool,
            "INSERT INTO \"table_supports\" (\"table_number\", \"category_id\") VALUES ($1, $2)",
            &[SqlParam::Int(number), SqlParam::Int(*category)],
        )
        .await;
    }
}

fn project(name: &str, categories: &[i32]) -> Project {
    Project {
        uid: None,
        project_name: name.to_string(),
        hackathon: None,
        team: vec!["alice".to_string()],
        categories: categories.to_vec(),
    }
}

#[tokio::test]
async fn test_zero_rows_and_duplicates() {
    let _guard = DB_LOCK.lock().await;
    let (_, services) = setup().await;

    let missing = Statement::new(
        "SELECT * FROM \"categories\" WHERE \"uid\" = $1",
        vec![SqlParam::Int(-1)],
    );
    assert_not_found(&services.sql.execute(&missing, QueryOpts::default()).await);

    seed_category(&services, "Best Hack").await;
    let again = Category {
        uid: None,
        category_name: "Best Hack".to_string(),
        is_sponsor: true,
    };
    assert_kind(&services.categories.insert(again).await, ErrorKind::Duplicate);

    let status = services.sql.pool_status();
    assert_eq!(status.available, status.max_size);
}

#[tokio::test]
async fn test_make_active_moves_the_flag() {
    let _guard = DB_LOCK.lock().await;
    let (_, services) = setup().await;

    seed_hackathon(&services, "first").await;
    let mut second = Hackathon::new("Second");
    second.uid = "second".to_string();
    services.hackathons.insert(second).await.unwrap();

    let active = services.hackathons.make_active("second").await.unwrap();
    assert_eq!(active.uid, "second");
    assert_eq!(services.hackathons.active_hackathon_id().await.unwrap(), "second");

    let first = services
        .hackathons
        .get(&"first".to_string(), &MapperOpts::new().uncached())
        .await
        .unwrap();
    assert!(!first.active);
    assert!(first.end_time.is_some());

    assert_not_found(&services.hackathons.make_active("missing").await);
}

#[tokio::test]
async fn test_project_round_trip_with_categories() {
    let _guard = DB_LOCK.lock().await;
    let (_, services) = setup().await;
    seed_hackathon(&services, "live").await;
    let web = seed_category(&services, "Web").await;
    let hardware = seed_category(&services, "Hardware").await;

    let stored = services
        .projects
        .insert(project("Robot", &[web, hardware]))
        .await
        .unwrap();
    let uid = stored.uid.unwrap();

    let read = services
        .projects
        .get(&uid, &MapperOpts::new().uncached())
        .await
        .unwrap();
    let mut expected = vec![web, hardware];
    expected.sort();
    assert_eq!(read.categories, expected);
    assert_eq!(read.hackathon.as_deref(), Some("live"));

    let scoped = services
        .projects
        .get_count(&MapperOpts::new().active_hackathon().uncached())
        .await
        .unwrap();
    assert_eq!(scoped, 1);
}

#[tokio::test]
async fn test_concurrent_allocation_has_one_winner() {
    let _guard = DB_LOCK.lock().await;
    let (pool, services) = setup().await;
    seed_hackathon(&services, "live").await;
    let web = seed_category(&services, "Web").await;
    let ai = seed_category(&services, "AI").await;
    seed_table(&pool, 1, 1, &[web, ai]).await;
    seed_table(&pool, 2, 2, &[web]).await;

    let first = services.projects.insert(project("One", &[web, ai])).await.unwrap();
    let second = services.projects.insert(project("Two", &[web, ai])).await.unwrap();

    let services = Arc::new(services);
    let a = {
        let services = Arc::clone(&services);
        tokio::spawn(async move { services.projects.assign_table(&first).await })
    };
    let b = {
        let services = Arc::clone(&services);
        tokio::spawn(async move { services.projects.assign_table(&second).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    // Table 2 lacks AI, so it is never a fallback.
    assert_eq!(winners[0].table_number, 1);
    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert_not_found(loser);
}

#[tokio::test]
async fn test_racing_allocators_share_two_free_tables() {
    let _guard = DB_LOCK.lock().await;
    let (pool, services) = setup().await;
    seed_hackathon(&services, "live").await;
    let web = seed_category(&services, "Web").await;
    let ai = seed_category(&services, "AI").await;
    seed_table(&pool, 1, 1, &[web, ai]).await;
    seed_table(&pool, 2, 2, &[web, ai]).await;

    let services = Arc::new(services);
    for round in 0..5 {
        exec(&pool, "DELETE FROM \"table_assignments\"", &[]).await;
        let first = services
            .projects
            .insert(project(&format!("One-{}", round), &[web, ai]))
            .await
            .unwrap();
        let second = services
            .projects
            .insert(project(&format!("Two-{}", round), &[web, ai]))
            .await
            .unwrap();

        let a = {
            let services = Arc::clone(&services);
            tokio::spawn(async move { services.projects.assign_table(&first).await })
        };
        let b = {
            let services = Arc::clone(&services);
            tokio::spawn(async move { services.projects.assign_table(&second).await })
        };
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        let mut tables = vec![a.table_number, b.table_number];
        tables.sort();
        assert_eq!(tables, vec![1, 2]);
    }
}
