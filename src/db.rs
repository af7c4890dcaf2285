use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::entities;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool using the application configuration.
pub async fn establish_connection(config: &AppConfig) -> Result<DbPool, DbErr> {
    connect_with(
        &config.database_url,
        config.db_max_connections,
        config.db_min_connections,
    )
    .await
}

/// Establishes a connection pool with explicit pool bounds.
pub async fn connect_with(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
) -> Result<DbPool, DbErr> {
    debug!(url = %database_url, "Configuring database connection");

    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let pool = Database::connect(opt).await?;

    info!(max_connections, "Connected to database");
    Ok(pool)
}

/// Creates any missing tables from the entity definitions. Used on startup
/// when `auto_migrate` is set and by the test harness.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, entities::Product).await?;
    create_table(db, entities::ProductVariant).await?;
    create_table(db, entities::Coupon).await?;
    create_table(db, entities::Cart).await?;
    create_table(db, entities::CartItem).await?;
    create_table(db, entities::Order).await?;
    create_table(db, entities::OrderItem).await?;
    info!("Database schema ensured");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: sea_orm::EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}
