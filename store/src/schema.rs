use sqlx::SqlitePool;

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS piles (
  pile_id INTEGER PRIMARY KEY,
  kind TEXT NOT NULL,
  status TEXT NOT NULL,
  usage_count INTEGER NOT NULL,
  charging_seconds INTEGER NOT NULL,
  kwh_delivered TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS orders (
  order_id INTEGER PRIMARY KEY,
  username TEXT NOT NULL,
  pile_id INTEGER NOT NULL,
  create_time TEXT NOT NULL,
  begin_time TEXT NOT NULL,
  end_time TEXT NOT NULL,
  charged_amount_kwh TEXT NOT NULL,
  charged_seconds INTEGER NOT NULL,
  charging_cost TEXT NOT NULL,
  service_cost TEXT NOT NULL,
  total_cost TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_username ON orders(username);"#)
        .execute(pool)
        .await?;

    Ok(())
}
