use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection};

pub type DbPool = Pool<AsyncPgConnection>;

pub async fn create_pool(
    database_url: &str,
    max_size: u32,
) -> Result<DbPool, Box<dyn std::error::Error>> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder().max_size(max_size).build(config).await?;

    Ok(pool)
}
