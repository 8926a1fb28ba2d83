use anyhow::Context;
use pagewise::prelude::*;
use user_service::{biz::UserUseCase, data::PgUserRepo, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_for_service("user-service")?;
    init_tracing(&config)?;

    let db = config
        .database
        .as_ref()
        .context("the [database] section is required")?;
    let pool = create_pool(db).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("migrations applied");

    let mut data = Data::new(pool.clone());
    if let Some(redis) = &config.redis {
        data = data.with_redis(create_redis_pool(redis).await?);
    }

    let repo = PgUserRepo::new(data);
    let app = router(UserUseCase::new(repo, pool));

    Server::new(config).serve(app).await?;
    Ok(())
}
