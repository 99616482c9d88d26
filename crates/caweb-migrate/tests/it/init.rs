use caweb_migrate::{passwd, Coordinator};

use crate::{count, TestEnv};

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn init_dev_seeds_and_reinitializes() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let cfg = env.config_v1("dst.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;

    let coordinator = Coordinator::new();
    coordinator.init_dev(&cfg).await?;

    let mut conn = env.inspect(&env.db_a).await?;
    assert_eq!(count(&mut conn, "caweb1.cars").await?, 4);
    assert_eq!(count(&mut conn, "caweb1.settings").await?, 1);

    // The staged password file was promoted by the finalizer and the
    // rotated credentials actually work for the normal role.
    assert!(!passwd::staged_pgpass_path(env.pass_dir()).exists());
    let file = passwd::PasswordFile::load_or_empty(&passwd::pgpass_path(env.pass_dir()))?;
    assert!(file
        .lookup(&env.host, env.port, &env.db_a, "caweb")
        .is_some());

    // Re-running is a destructive reinit and converges to the same state.
    coordinator.init_dev(&cfg).await?;
    assert_eq!(count(&mut conn, "caweb1.cars").await?, 4);

    Ok(())
}

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn init_prod_seeds_the_initial_fleet() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let cfg = env.config_v2("dst.yaml", &env.db_b, (2, 0, 0), (2, 0, 0))?;

    Coordinator::new().init_prod(&cfg).await?;

    let mut conn = env.inspect(&env.db_b).await?;
    assert_eq!(count(&mut conn, "caweb2.cars").await?, 2);

    let mode: String = sqlx::query_scalar(
        "SELECT parking_mode FROM caweb2.cars WHERE name = 'unit-1'",
    )
    .fetch_one(&mut conn)
    .await?;
    assert_eq!(mode, "none");

    let mutable: String =
        sqlx::query_scalar("SELECT mutable::text FROM caweb2.settings WHERE major = 2")
            .fetch_one(&mut conn)
            .await?;
    assert_eq!(mutable, r#"{"delay_of_opm": "2s"}"#);

    Ok(())
}

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn stale_staged_password_file_falls_back() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let cfg = env.config_v1("dst.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;

    let coordinator = Coordinator::new();
    coordinator.init_dev(&cfg).await?;

    // Plant a staged file with bogus credentials: the next command must
    // fall back to the authoritative file and still succeed.
    let staged = passwd::staged_pgpass_path(env.pass_dir());
    let mut bogus = passwd::PasswordFile::load_or_empty(&passwd::pgpass_path(env.pass_dir()))?;
    bogus.upsert(passwd::PgPassEntry {
        host: env.host.clone(),
        port: env.port,
        db: env.db_a.clone(),
        role: "caweb_admin".to_owned(),
        password: "definitely-wrong".to_owned(),
    });
    bogus.store(&staged)?;

    coordinator.init_dev(&cfg).await?;

    Ok(())
}

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn staged_password_file_is_promoted_on_first_use() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let cfg = env.config_v1("dst.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;

    let coordinator = Coordinator::new();
    coordinator.init_dev(&cfg).await?;

    // Simulate dying between the password commit and the finalizer: only
    // the staged file holds the live credentials.
    let authoritative = passwd::pgpass_path(env.pass_dir());
    let staged = passwd::staged_pgpass_path(env.pass_dir());
    std::fs::rename(&authoritative, &staged)?;

    // Any command promotes the staged file on its first connection.
    coordinator.init_dev(&cfg).await?;
    assert!(authoritative.exists());
    assert!(!staged.exists());

    Ok(())
}
