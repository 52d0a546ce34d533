//! Postgres store for warehouses and leases.
//!
//! The database is a cache over the ledger program: rows carry a
//! `ledger_id` link (0 = unregistered) and the reconciliation passes keep
//! the cached flags and areas converged with the chain.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use whs_reconcile::StateStore;
use whs_schemas::{LeaseRecord, WarehouseRecord, UNREGISTERED};

pub const ENV_DB_URL: &str = "WHS_DATABASE_URL";

/// Connect to Postgres using WHS_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    info!("postgres pool ready");
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    info!("database migrations applied");
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='warehouses'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_warehouses_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_warehouses_table: bool,
}

type WarehouseTuple = (
    i64,
    i64,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    String,
    String,
    bool,
);

type LeaseTuple = (
    i64,
    i64,
    i64,
    String,
    i64,
    DateTime<Utc>,
    DateTime<Utc>,
    i64,
    bool,
    bool,
    Option<String>,
);

const WAREHOUSE_COLS: &str = r#"
    id, ledger_id, owner_address, name, location,
    total_area, available_area, price_per_unit_per_day,
    image_url, description, is_active
"#;

const LEASE_COLS: &str = r#"
    id, ledger_id, warehouse_id, tenant_address, area,
    start_date, end_date, total_price,
    is_active, is_completed, tx_reference
"#;

fn warehouse_from_tuple(t: WarehouseTuple) -> WarehouseRecord {
    WarehouseRecord {
        id: t.0,
        ledger_id: t.1,
        owner_address: t.2,
        name: t.3,
        location: t.4,
        total_area: t.5,
        available_area: t.6,
        price_per_unit_per_day: t.7,
        image_url: t.8,
        description: t.9,
        is_active: t.10,
    }
}

fn lease_from_tuple(t: LeaseTuple) -> LeaseRecord {
    LeaseRecord {
        id: t.0,
        ledger_id: t.1,
        warehouse_id: t.2,
        tenant_address: t.3,
        area: t.4,
        start_date: t.5,
        end_date: t.6,
        total_price: t.7,
        is_active: t.8,
        is_completed: t.9,
        tx_reference: t.10,
    }
}

/// [`StateStore`] backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a warehouse row; returns the allocated local id.
    pub async fn insert_warehouse(&self, wh: &WarehouseRecord) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            insert into warehouses (
              ledger_id, owner_address, name, location,
              total_area, available_area, price_per_unit_per_day,
              image_url, description, is_active
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            returning id
            "#,
        )
        .bind(wh.ledger_id)
        .bind(&wh.owner_address)
        .bind(&wh.name)
        .bind(&wh.location)
        .bind(wh.total_area)
        .bind(wh.available_area)
        .bind(wh.price_per_unit_per_day)
        .bind(&wh.image_url)
        .bind(&wh.description)
        .bind(wh.is_active)
        .fetch_one(&self.pool)
        .await
        .context("insert_warehouse failed")?;
        Ok(id)
    }

    /// Insert a lease row; returns the allocated local id.
    pub async fn insert_lease(&self, lease: &LeaseRecord) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            insert into leases (
              ledger_id, warehouse_id, tenant_address, area,
              start_date, end_date, total_price,
              is_active, is_completed, tx_reference
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            returning id
            "#,
        )
        .bind(lease.ledger_id)
        .bind(lease.warehouse_id)
        .bind(&lease.tenant_address)
        .bind(lease.area)
        .bind(lease.start_date)
        .bind(lease.end_date)
        .bind(lease.total_price)
        .bind(lease.is_active)
        .bind(lease.is_completed)
        .bind(&lease.tx_reference)
        .fetch_one(&self.pool)
        .await
        .context("insert_lease failed")?;
        Ok(id)
    }

    pub async fn get_lease(&self, id: i64) -> Result<Option<LeaseRecord>> {
        let row: Option<LeaseTuple> = sqlx::query_as(&format!(
            "select {LEASE_COLS} from leases where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("get_lease failed")?;
        Ok(row.map(lease_from_tuple))
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn unregistered_warehouses(&self) -> Result<Vec<WarehouseRecord>> {
        let rows: Vec<WarehouseTuple> = sqlx::query_as(&format!(
            r#"
            select {WAREHOUSE_COLS}
            from warehouses
            where is_active and ledger_id = $1
            order by id asc
            "#
        ))
        .bind(UNREGISTERED)
        .fetch_all(&self.pool)
        .await
        .context("unregistered_warehouses query failed")?;
        Ok(rows.into_iter().map(warehouse_from_tuple).collect())
    }

    async fn linked_active_warehouse_count(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            r#"
            select count(*)::bigint
            from warehouses
            where is_active and ledger_id > 0
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("linked_active_warehouse_count query failed")?;
        Ok(n)
    }

    async fn reset_ledger_links(&self) -> Result<u64> {
        let res = sqlx::query(
            r#"
            update warehouses
            set ledger_id = $1,
                updated_at_utc = now()
            where is_active and ledger_id <> $1
            "#,
        )
        .bind(UNREGISTERED)
        .execute(&self.pool)
        .await
        .context("reset_ledger_links update failed")?;
        let rows = res.rows_affected();
        if rows > 0 {
            warn!(rows, "ledger links reset to unregistered");
        }
        Ok(rows)
    }

    async fn set_warehouse_ledger_id(&self, id: i64, ledger_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            update warehouses
            set ledger_id = $2,
                updated_at_utc = now()
            where id = $1
            "#,
        )
        .bind(id)
        .bind(ledger_id)
        .execute(&self.pool)
        .await
        .context("set_warehouse_ledger_id update failed")?;
        Ok(())
    }

    async fn get_warehouse(&self, id: i64) -> Result<Option<WarehouseRecord>> {
        let row: Option<WarehouseTuple> = sqlx::query_as(&format!(
            "select {WAREHOUSE_COLS} from warehouses where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("get_warehouse query failed")?;
        Ok(row.map(warehouse_from_tuple))
    }

    async fn expired_active_leases(&self, now: DateTime<Utc>) -> Result<Vec<LeaseRecord>> {
        let rows: Vec<LeaseTuple> = sqlx::query_as(&format!(
            r#"
            select {LEASE_COLS}
            from leases
            where is_active and not is_completed and end_date < $1
            order by end_date asc, id asc
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("expired_active_leases query failed")?;
        Ok(rows.into_iter().map(lease_from_tuple).collect())
    }

    async fn set_lease_flags(&self, id: i64, is_active: bool, is_completed: bool) -> Result<()> {
        sqlx::query(
            r#"
            update leases
            set is_active = $2,
                is_completed = $3,
                updated_at_utc = now()
            where id = $1
            "#,
        )
        .bind(id)
        .bind(is_active)
        .bind(is_completed)
        .execute(&self.pool)
        .await
        .context("set_lease_flags update failed")?;
        Ok(())
    }

    async fn restore_warehouse_area(&self, warehouse_id: i64, area: i64) -> Result<()> {
        sqlx::query(
            r#"
            update warehouses
            set available_area = available_area + $2,
                updated_at_utc = now()
            where id = $1
            "#,
        )
        .bind(warehouse_id)
        .bind(area)
        .execute(&self.pool)
        .await
        .context("restore_warehouse_area update failed")?;
        Ok(())
    }

    async fn set_available_area_by_ledger_id(
        &self,
        ledger_id: i64,
        available_area: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            update warehouses
            set available_area = $2,
                updated_at_utc = now()
            where ledger_id = $1
            "#,
        )
        .bind(ledger_id)
        .bind(available_area)
        .execute(&self.pool)
        .await
        .context("set_available_area_by_ledger_id update failed")?;
        Ok(())
    }
}
