use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use courier_core::DestinationLookup;
use courier_data::{ConnectSettings, PgDestinationLookup};
use courier_test_support::fixtures::docker_available;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{GenericImage, ImageExt};
use tokio::time::sleep;

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "14-alpine";

const SCHEMA_SQL: [&str; 4] = [
    "CREATE TABLE section (section_id INTEGER PRIMARY KEY, section_name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE greenhouse_box (box_folder_id BIGINT NOT NULL, experiment_id INTEGER NOT NULL, \
     section_name TEXT NOT NULL)",
    "INSERT INTO section VALUES (7, 'North-1'), (8, 'South-2')",
    "INSERT INTO greenhouse_box VALUES \
     (900001, 42, 'North-1'), (900002, 42, 'North-1'), (900003, 43, 'South-2')",
];

async fn with_lookup<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(PgDestinationLookup) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if !docker_available() {
        eprintln!("skipping lookup tests: docker socket missing");
        return Ok(());
    }

    let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "password")
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_DB", "greenhouse")
        .start()
        .await
        .context("failed to start postgres container")?;
    let port = container
        .get_host_port_ipv4(ContainerPort::Tcp(5432))
        .await
        .context("failed to resolve postgres host port")?;

    let settings = ConnectSettings {
        user: "postgres".into(),
        password: "password".into(),
        host: "127.0.0.1".into(),
        port,
        database: "greenhouse".into(),
        acquire_timeout: Duration::from_secs(5),
        max_connections: 2,
    };

    let lookup = {
        let mut attempts = 0;
        loop {
            match PgDestinationLookup::connect(&settings).await {
                Ok(lookup) => break lookup,
                Err(err) => {
                    attempts += 1;
                    if attempts >= 10 {
                        return Err(err).context("failed to connect to ephemeral postgres");
                    }
                    sleep(Duration::from_millis(200)).await;
                }
            }
        }
    };

    let url = format!(
        "postgres://{}:{}@{}:{}/{}",
        settings.user, settings.password, settings.host, settings.port, settings.database
    );
    let seed = sqlx::PgPool::connect(&url).await?;
    for statement in SCHEMA_SQL {
        sqlx::query(statement).execute(&seed).await?;
    }
    seed.close().await;

    let result = test(lookup.clone()).await;
    lookup.close().await;
    drop(container);
    result
}

#[tokio::test]
async fn lookup_matches_section_id_or_name() -> Result<()> {
    with_lookup(|lookup| async move {
        lookup.check().await?;

        let by_id = lookup.lookup("7").await?;
        assert_eq!(by_id.len(), 2);
        assert!(by_id.iter().all(|d| d.section_label() == "North-1"));
        assert!(by_id.iter().any(|d| d.destination_id() == "900001"));

        let by_name = lookup.lookup("South-2").await?;
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].destination_id(), "900003");
        assert_eq!(by_name[0].experiment_id(), "43");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn unknown_codes_yield_no_rows() -> Result<()> {
    with_lookup(|lookup| async move {
        assert!(lookup.lookup("X123").await?.is_empty());
        assert!(lookup.lookup("7' OR '1'='1").await?.is_empty());
        Ok(())
    })
    .await
}
