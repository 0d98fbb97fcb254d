use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use super::{OrderStore, StoreError};
use crate::domain::order::{Delivery, Item, Order, Payment};

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// Tables: orders, delivery (1:1), payments (1:1, keyed by transaction),
// items (keyed by chrt_id) and the order_items join table.
//
// `save` upserts every row inside one transaction and rewrites the join rows
// for the order, so re-applying an order with a different item list leaves
// exactly the new list attached. A payment row never moves between orders.
//
// Reads run in one REPEATABLE READ snapshot, so an aggregate is never stitched
// together from rows of two different saves.
//
// ============================================================================

const SCHEMA: &str = include_str!("../../migrations/0001_orders.sql");

const ORDER_COLUMNS: &str = "order_uid, track_number, entry, locale, internal_signature, \
     customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard";

pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("Order schema is in place");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Read-only transaction seeing one consistent snapshot.
    async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn fetch_orders(&self, sql: &str, limit: Option<i64>) -> Result<Vec<Order>, StoreError> {
        let mut tx = self.begin_snapshot().await?;

        let mut query = sqlx::query(sql);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let rows = query.fetch_all(&mut *tx).await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = order_from_row(row)?;
            attach_children(&mut tx, &mut order).await?;
            orders.push(order);
        }

        tx.commit().await?;
        Ok(orders)
    }
}

async fn attach_children(conn: &mut PgConnection, order: &mut Order) -> Result<(), StoreError> {
    let delivery = sqlx::query(
        "SELECT name, phone, zip, city, address, region, email
         FROM delivery WHERE order_uid = $1",
    )
    .bind(order.order_uid.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| incomplete(&order.order_uid, "delivery"))?;
    order.delivery = delivery_from_row(&delivery)?;

    let payment = sqlx::query(
        "SELECT transaction, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
         FROM payments WHERE order_uid = $1 LIMIT 1",
    )
    .bind(order.order_uid.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| incomplete(&order.order_uid, "payment"))?;
    order.payment = payment_from_row(&payment)?;

    let items = sqlx::query(
        "SELECT i.chrt_id, i.track_number, i.price, i.rid, i.name, i.sale, i.size,
                i.total_price, i.nm_id, i.brand, i.status
         FROM items i
         JOIN order_items oi ON i.chrt_id = oi.chrt_id
         WHERE oi.order_uid = $1
         ORDER BY i.chrt_id",
    )
    .bind(order.order_uid.as_str())
    .fetch_all(&mut *conn)
    .await?;
    order.items = items.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;

    Ok(())
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                track_number = EXCLUDED.track_number,
                entry = EXCLUDED.entry,
                locale = EXCLUDED.locale,
                internal_signature = EXCLUDED.internal_signature,
                customer_id = EXCLUDED.customer_id,
                delivery_service = EXCLUDED.delivery_service,
                shardkey = EXCLUDED.shardkey,
                sm_id = EXCLUDED.sm_id,
                date_created = EXCLUDED.date_created,
                oof_shard = EXCLUDED.oof_shard",
        )
        .bind(order.order_uid.as_str())
        .bind(order.track_number.as_str())
        .bind(order.entry.as_str())
        .bind(order.locale.as_str())
        .bind(order.internal_signature.as_str())
        .bind(order.customer_id.as_str())
        .bind(order.delivery_service.as_str())
        .bind(order.shardkey.as_str())
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(order.oof_shard.as_str())
        .execute(&mut *tx)
        .await?;

        let delivery = &order.delivery;
        sqlx::query(
            "INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                zip = EXCLUDED.zip,
                city = EXCLUDED.city,
                address = EXCLUDED.address,
                region = EXCLUDED.region,
                email = EXCLUDED.email",
        )
        .bind(order.order_uid.as_str())
        .bind(delivery.name.as_str())
        .bind(delivery.phone.as_str())
        .bind(delivery.zip.as_str())
        .bind(delivery.city.as_str())
        .bind(delivery.address.as_str())
        .bind(delivery.region.as_str())
        .bind(delivery.email.as_deref())
        .execute(&mut *tx)
        .await?;

        // A redelivered order may carry a new transaction id.
        sqlx::query("DELETE FROM payments WHERE order_uid = $1 AND transaction <> $2")
            .bind(order.order_uid.as_str())
            .bind(order.payment.transaction.as_str())
            .execute(&mut *tx)
            .await?;

        let payment = &order.payment;
        let upserted = sqlx::query(
            "INSERT INTO payments (
                transaction, order_uid, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (transaction) DO UPDATE SET
                request_id = EXCLUDED.request_id,
                currency = EXCLUDED.currency,
                provider = EXCLUDED.provider,
                amount = EXCLUDED.amount,
                payment_dt = EXCLUDED.payment_dt,
                bank = EXCLUDED.bank,
                delivery_cost = EXCLUDED.delivery_cost,
                goods_total = EXCLUDED.goods_total,
                custom_fee = EXCLUDED.custom_fee
            WHERE payments.order_uid = EXCLUDED.order_uid",
        )
        .bind(payment.transaction.as_str())
        .bind(order.order_uid.as_str())
        .bind(payment.request_id.as_str())
        .bind(payment.currency.as_str())
        .bind(payment.provider.as_str())
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(payment.bank.as_str())
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        if upserted.rows_affected() == 0 {
            let owner: String = sqlx::query_scalar("SELECT order_uid FROM payments WHERE transaction = $1")
                .bind(payment.transaction.as_str())
                .fetch_one(&mut *tx)
                .await?;
            tracing::warn!(
                order_uid = %order.order_uid,
                transaction = %payment.transaction,
                owner = %owner,
                "Payment transaction belongs to another order; rejecting save"
            );
            return Err(StoreError::TransactionConflict {
                transaction: payment.transaction.clone(),
                owner,
            });
        }

        sqlx::query("DELETE FROM order_items WHERE order_uid = $1")
            .bind(order.order_uid.as_str())
            .execute(&mut *tx)
            .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO items (
                    chrt_id, track_number, price, rid, name, sale, size,
                    total_price, nm_id, brand, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (chrt_id) DO UPDATE SET
                    track_number = EXCLUDED.track_number,
                    price = EXCLUDED.price,
                    rid = EXCLUDED.rid,
                    name = EXCLUDED.name,
                    sale = EXCLUDED.sale,
                    size = EXCLUDED.size,
                    total_price = EXCLUDED.total_price,
                    nm_id = EXCLUDED.nm_id,
                    brand = EXCLUDED.brand,
                    status = EXCLUDED.status",
            )
            .bind(item.chrt_id)
            .bind(item.track_number.as_str())
            .bind(item.price)
            .bind(item.rid.as_str())
            .bind(item.name.as_str())
            .bind(item.sale)
            .bind(item.size.as_str())
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(item.brand.as_str())
            .bind(item.status)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO order_items (order_uid, chrt_id) VALUES ($1, $2)
                ON CONFLICT (order_uid, chrt_id) DO NOTHING",
            )
            .bind(order.order_uid.as_str())
            .bind(item.chrt_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            item_count = order.items.len(),
            "Upserted order aggregate"
        );

        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        let mut tx = self.begin_snapshot().await?;

        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_uid = $1"))
            .bind(order_uid)
            .fetch_optional(&mut *tx)
            .await?;

        let order = match row {
            Some(row) => {
                let mut order = order_from_row(&row)?;
                attach_children(&mut tx, &mut order).await?;
                Some(order)
            }
            None => None,
        };

        tx.commit().await?;
        Ok(order)
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY date_created DESC");
        self.fetch_orders(&sql, None).await
    }

    async fn get_most_recent(&self, limit: usize) -> Result<Vec<Order>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY date_created DESC LIMIT $1");
        self.fetch_orders(&sql, Some(limit)).await
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
        ..Default::default()
    })
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, sqlx::Error> {
    Ok(Delivery {
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        zip: row.try_get("zip")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        region: row.try_get("region")?,
        email: row.try_get("email")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        transaction: row.try_get("transaction")?,
        request_id: row.try_get("request_id")?,
        currency: row.try_get("currency")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        payment_dt: row.try_get("payment_dt")?,
        bank: row.try_get("bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

fn incomplete(order_uid: &str, part: &'static str) -> StoreError {
    StoreError::Incomplete {
        order_uid: order_uid.to_string(),
        part,
    }
}

// ============================================================================
// Integration Tests (need Docker: cargo test -- --ignored)
// ============================================================================
