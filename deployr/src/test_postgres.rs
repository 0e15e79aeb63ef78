#![allow(dead_code)]

//! Shared PostgreSQL container for the tests of the `postgres` backend.
//!
//! One container is started per test binary. Every test works in its own database so tests
//! can run in parallel.

use std::sync::OnceLock;

use postgres::{Client, NoTls};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

/// Default credentials for testcontainers-modules postgres
const PG_USER: &str = "postgres";
const PG_PASSWORD: &str = "postgres";
const PG_ADMIN_DB: &str = "postgres";

struct SharedContainer {
    port: u16,
    // Kept alive for the whole test run, together with the leaked container
    _runtime: tokio::runtime::Runtime,
}

static CONTAINER: OnceLock<SharedContainer> = OnceLock::new();

fn postgres_port() -> u16 {
    CONTAINER
        .get_or_init(|| {
            let runtime = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            let port = runtime.block_on(async {
                let container = Postgres::default()
                    .start()
                    .await
                    .expect("failed to start postgres container");
                let port = container
                    .get_host_port_ipv4(5432)
                    .await
                    .expect("failed to get postgres port");
                std::mem::forget(container);
                port
            });
            SharedContainer {
                port,
                _runtime: runtime,
            }
        })
        .port
}

/// Connection URL for a database on the shared container. The database may not exist yet.
pub fn url_with_db(db: &str) -> String {
    url_as(PG_USER, PG_PASSWORD, db)
}

/// Connection URL for a database on the shared container, logging in as another role.
pub fn url_as(user: &str, password: &str, db: &str) -> String {
    format!(
        "postgres://{}:{}@127.0.0.1:{}/{}",
        user,
        password,
        postgres_port(),
        db
    )
}

/// Connection URL for the administrative catalog.
pub fn admin_url() -> String {
    url_with_db(PG_ADMIN_DB)
}

/// A database name no other test uses. Nothing is created.
pub fn fresh_database_name() -> String {
    format!("test_{}", Uuid::new_v4().simple())
}

/// Create a fresh database and connect to it.
pub fn fresh_postgres_db() -> (Client, String) {
    let db_name = fresh_database_name();

    let mut admin = Client::connect(&admin_url(), NoTls).expect("failed to connect as admin");
    admin
        .batch_execute(&format!("CREATE DATABASE \"{}\"", db_name))
        .expect("failed to create test database");
    drop(admin);

    let client =
        Client::connect(&url_with_db(&db_name), NoTls).expect("failed to connect to test database");
    (client, db_name)
}

pub fn get_test_client() -> Client {
    let (client, _db_name) = fresh_postgres_db();
    client
}
