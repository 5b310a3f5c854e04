use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Build the fleet database pool and bring the schema up to date.
///
/// Both the HTTP server and the cron runner call this once at startup and
/// treat failure as fatal, so pool and migration errors surface as values
/// instead of panicking inside the pool layer.
pub fn init_pool(database_url: &str) -> Result<DbPool, String> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .map_err(|e| format!("Failed to build database pool: {}", e))?;

    let mut conn = pool
        .get()
        .map_err(|e| format!("Failed to get database connection: {}", e))?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| format!("Failed to run database migrations: {}", e))?;

    if applied.is_empty() {
        log::info!("Database schema up to date");
    } else {
        log::info!("Applied {} pending database migrations", applied.len());
    }

    Ok(pool)
}
