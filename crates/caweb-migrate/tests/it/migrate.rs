use caweb_migrate::{Coordinator, ErrorKind};

use crate::{count, migrated_sibling, schema_exists, TestEnv};

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn uni_database_migration_only_touches_settings() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let coordinator = Coordinator::new();

    let init_cfg = env.config_v1("init.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    coordinator.init_dev(&init_cfg).await?;

    let src = env.config_v1("src.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    let dst = env.config_v1("dst.yaml", &env.db_a, (1, 1, 0), (1, 0, 0))?;
    let target = env.pass_dir().join("target.yaml");

    let snapshot = coordinator.migrate(&src, &dst, &target).await?;
    assert_eq!(snapshot.settings().config_version.minor, 1);

    // The target file reflects the destination config version and no
    // staging file is left behind.
    let mut reloaded = caweb_config::load_migrator(&target)?;
    reloaded.load()?;
    let settings = reloaded.settle()?;
    assert_eq!(settings.config_version, caweb_version::SemVer::new(1, 1, 0));
    assert!(!migrated_sibling(&target).exists());

    // Schema rows are untouched.
    let mut conn = env.inspect(&env.db_a).await?;
    assert_eq!(count(&mut conn, "caweb1.cars").await?, 4);

    Ok(())
}

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn cross_major_migration_materializes_the_destination() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let coordinator = Coordinator::new();

    let init_cfg = env.config_v1("init.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    coordinator.init_dev(&init_cfg).await?;

    let src = env.config_v1("src.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    let dst = env.config_v2("dst.yaml", &env.db_b, (2, 0, 0), (2, 0, 0))?;
    let target = env.pass_dir().join("target.yaml");

    coordinator.migrate(&src, &dst, &target).await?;

    // Every dev car arrived, with the parked flag translated to a mode.
    let mut conn = env.inspect(&env.db_b).await?;
    assert_eq!(count(&mut conn, "caweb2.cars").await?, 4);
    let parked: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM caweb2.cars WHERE parking_mode = 'parked'",
    )
    .fetch_one(&mut conn)
    .await?;
    assert_eq!(parked, 2);

    // Intermediate schemas and the foreign server are gone.
    assert!(!schema_exists(&mut conn, "fdw1_0").await?);
    assert!(!schema_exists(&mut conn, "mig1").await?);
    assert!(!schema_exists(&mut conn, "mig2").await?);
    let servers: i64 = sqlx::query_scalar("SELECT count(*) FROM pg_foreign_server")
        .fetch_one(&mut conn)
        .await?;
    assert_eq!(servers, 0);

    // The source database is untouched.
    let mut src_conn = env.inspect(&env.db_a).await?;
    assert_eq!(count(&mut src_conn, "caweb1.cars").await?, 4);

    // The target file is a valid major-2 config.
    let mut reloaded = caweb_config::load_migrator(&target)?;
    assert_eq!(reloaded.major_version(), 2);
    reloaded.load()?;

    Ok(())
}

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn interrupted_migration_resumes_with_the_file_rename() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let coordinator = Coordinator::new();

    let init_cfg = env.config_v1("init.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    coordinator.init_dev(&init_cfg).await?;

    let src = env.config_v1("src.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    let dst = env.config_v2("dst.yaml", &env.db_b, (2, 0, 0), (2, 0, 0))?;
    let target = env.pass_dir().join("target.yaml");

    coordinator.migrate(&src, &dst, &target).await?;

    // Simulate dying between the database commit and the rename: the
    // migrated file exists, the target does not.
    let migrated = migrated_sibling(&target);
    std::fs::rename(&target, &migrated)?;

    // Re-running the identical command completes the rename without
    // re-materializing anything.
    coordinator.migrate(&src, &dst, &target).await?;
    assert!(target.exists());
    assert!(!migrated.exists());

    let mut conn = env.inspect(&env.db_b).await?;
    assert_eq!(count(&mut conn, "caweb2.cars").await?, 4);

    Ok(())
}

#[tokio::test]
#[ignore = "needs a scratch postgres server via CAWEB_TEST_SUPER_DSN"]
async fn populated_destination_without_evidence_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let coordinator = Coordinator::new();

    let init_a = env.config_v1("init-a.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    coordinator.init_dev(&init_a).await?;

    // An unrelated initialization already owns the destination schema.
    let init_b = env.config_v2("init-b.yaml", &env.db_b, (2, 0, 0), (2, 0, 0))?;
    coordinator.init_prod(&init_b).await?;

    let src = env.config_v1("src.yaml", &env.db_a, (1, 0, 0), (1, 0, 0))?;
    let dst = env.config_v2("dst.yaml", &env.db_b, (2, 0, 0), (2, 0, 0))?;
    let target = env.pass_dir().join("target.yaml");

    let err = coordinator.migrate(&src, &dst, &target).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DstNotEmpty);

    // The destination keeps its unrelated contents and no files appear.
    let mut conn = env.inspect(&env.db_b).await?;
    assert_eq!(count(&mut conn, "caweb2.cars").await?, 2);
    assert!(!target.exists());

    Ok(())
}
