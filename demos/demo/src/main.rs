//! Routes a handful of statements for a 4-shard `orders` table through
//! an in-memory pool that prints what the driver would receive.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use tabledog::{keygen, ConnPool, Datum, Error, Resolver, Row, Sharding};

/// Stand-in for a real driver: prints every statement it receives.
struct PrintingPool;

#[async_trait]
impl ConnPool for PrintingPool {
    async fn prepare(&self, query: &str) -> Result<(), Error> {
        info!("prepare: {}", query);
        Ok(())
    }

    async fn exec(&self, query: &str, args: &[Datum]) -> Result<u64, Error> {
        info!("exec:    {} {:?}", query, args);
        Ok(1)
    }

    async fn query(&self, query: &str, args: &[Datum]) -> Result<Vec<Row>, Error> {
        info!("query:   {} {:?}", query, args);
        Ok(vec![])
    }

    async fn query_row(&self, query: &str, args: &[Datum]) -> Result<Option<Row>, Error> {
        info!("row:     {} {:?}", query, args);
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Deterministic worker bits when the demo runs on a machine
    // without a routable address.
    if std::env::var("WORKER_ID").is_err() {
        std::env::set_var("WORKER_ID", "1");
    }
    let generator = keygen::Generator::global()?;

    let sharding = Arc::new(Sharding::register([(
        "orders",
        Resolver::new("user_id", |value: &Datum| match value.bigint() {
            Some(user_id) => Ok(format!("_{:02}", user_id % 4)),
            None => Err(Error::Algorithm("user_id must be an integer".into())),
        })
        .with_primary_key_algorithm(|id| format!("_{:02}", keygen::shard_index(id)))
        .with_primary_key_generator(move |shard| generator.next(shard)),
    )]));

    let pool = sharding.clone().initialize(Arc::new(PrintingPool));

    // Lands in orders_02; the primary key is generated and filled in.
    pool.exec(
        "INSERT INTO orders (user_id, product) VALUES ($1, $2)",
        &[Datum::Bigint(2), Datum::from("iPhone")],
    )
    .await?;

    // Routed to orders_03 by the literal sharding key.
    pool.exec("INSERT INTO orders (user_id, product) VALUES (3, 'iPad')", &[])
        .await?;

    // Routed to orders_02 by the sharding key.
    pool.query(
        "SELECT * FROM orders WHERE user_id = $1",
        &[Datum::Bigint(2)],
    )
    .await?;

    // Routed by the primary key alone: the shard index is embedded in it.
    let id = generator.next(1);
    pool.query("SELECT * FROM orders WHERE id = $1", &[Datum::Bigint(id)])
        .await?;

    // The hint suppresses routing for one statement.
    pool.query("SELECT /* nosharding */ * FROM orders", &[]).await?;

    // No sharding key: these are rejected before the driver runs.
    let err = pool
        .exec("INSERT INTO orders (product) VALUES ('iPad')", &[])
        .await
        .unwrap_err();
    info!("rejected as expected: {}", err);

    let err = pool
        .exec("DELETE FROM orders WHERE product = 'iPad'", &[])
        .await
        .unwrap_err();
    info!("rejected as expected: {}", err);

    info!("last routed query: {}", sharding.last_query());

    Ok(())
}
