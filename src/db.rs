use async_trait::async_trait;
use deadpool_postgres::{Config, Object, Pool, PoolConfig, Runtime, Timeouts};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde_json::{Map, Number, Value};
use tokio_postgres::{types::ToSql, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{Favorite, Review, ReviewChanges, ReviewFilter, ReviewSort};
use crate::store::{Store, UpdateOutcome};

const REVIEW_COLUMNS: &str = "id, food_name, rating, user_email, created_at, details";
const FAVORITE_COLUMNS: &str = "id, food_id, user_email, created_at, details";

/// PostgreSQL への接続プールを握るストア実装。
/// `reviews` / `favorites` の 2 テーブルがコレクションに相当し、
/// 型付きでない任意フィールドは `details JSONB` 列に保存する。
/// `rating` も JSONB の数値として持ち、`4` と `4.0` の書き分けを保存する。
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// 接続プールを構築し、疎通確認が取れるまで決められた回数だけ再試行する。
    /// 最後まで繋がらなければエラーを返し、呼び出し側 (main) がプロセスを終了させる。
    pub async fn connect(config: DatabaseConfig) -> Result<Self, ApiError> {
        info!("Creating PostgreSQL connection pool for {}", config.redacted());

        let attempts = config.connect_retries;
        let retry_delay = config.retry_delay;
        let db = Database {
            pool: Self::create_pool(config)?,
        };

        let mut attempt = 1;
        loop {
            match db.test_connection().await {
                Ok(()) => return Ok(db),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Database connection attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, retry_delay
                    );
                    tokio::time::sleep(retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Giving up on database after {} attempts", attempts);
                    db.pool.close();
                    return Err(e);
                }
            }
        }
    }

    /// Deadpool 用の `Config` を組み立ててプールを生成する内部関数。
    /// 接続文字列があればそれを優先し、なければ個別パラメータを使う。
    fn create_pool(config: DatabaseConfig) -> Result<Pool, ApiError> {
        let mut pg_config = Config::new();

        if let Some(connection_string) = config.connection_string {
            pg_config.url = Some(connection_string);
        } else {
            pg_config.host = Some(config.host);
            pg_config.port = Some(config.port);
            pg_config.dbname = Some(config.database);
            pg_config.user = Some(config.username);
            pg_config.password = Some(config.password);
            pg_config.ssl_mode = Some(match config.ssl_mode.as_str() {
                "disable" => deadpool_postgres::SslMode::Disable,
                "require" => deadpool_postgres::SslMode::Require,
                _ => deadpool_postgres::SslMode::Prefer,
            });
        }

        pg_config.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        // Bounded pool; waiting for or creating a connection never blocks forever
        let mut pool_config = PoolConfig::new(config.max_connections as usize);
        pool_config.timeouts = Timeouts {
            wait: Some(config.connection_timeout),
            create: Some(config.connection_timeout),
            recycle: Some(config.connection_timeout),
        };
        pg_config.pool = Some(pool_config);

        let tls_connector = TlsConnector::builder().build().map_err(|e| {
            error!("Failed to create TLS connector: {}", e);
            ApiError::Database(format!("TLS connector creation failed: {}", e))
        })?;
        let tls = MakeTlsConnector::new(tls_connector);

        pg_config.create_pool(Some(Runtime::Tokio1), tls).map_err(|e| {
            error!("Failed to create connection pool: {}", e);
            ApiError::Database(format!("Connection pool creation failed: {}", e))
        })
    }

    async fn get_connection(&self) -> Result<Object, ApiError> {
        self.pool.get().await.map_err(ApiError::from)
    }

    pub async fn test_connection(&self) -> Result<(), ApiError> {
        let client = self.get_connection().await?;

        client.execute("SELECT 1", &[]).await.map_err(|e| {
            error!("Database connection test failed: {}", e);
            ApiError::Database(format!("Connection test failed: {}", e))
        })?;

        info!("Database connection test successful");
        Ok(())
    }

    /// アプリ起動時にテーブル群を CREATE する簡易マイグレーター。
    /// お気に入りの重複防止はアプリ側のチェックではなく UNIQUE 制約で担保する。
    pub async fn migrate(&self) -> Result<(), ApiError> {
        info!("Running database migrations");

        let client = self.get_connection().await?;

        let statements: [(&str, &str); 5] = [
            (
                "reviews table",
                r#"
                CREATE TABLE IF NOT EXISTS reviews (
                    id UUID PRIMARY KEY,
                    food_name VARCHAR(200) NOT NULL,
                    rating JSONB NOT NULL CHECK (
                        CASE WHEN jsonb_typeof(rating) = 'number'
                            THEN (rating)::numeric BETWEEN 0 AND 5
                            ELSE false
                        END
                    ),
                    user_email VARCHAR(255) NOT NULL,
                    details JSONB NOT NULL DEFAULT '{}'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
            ),
            (
                "reviews user_email index",
                "CREATE INDEX IF NOT EXISTS idx_reviews_user_email ON reviews(user_email)",
            ),
            (
                "reviews created_at index",
                "CREATE INDEX IF NOT EXISTS idx_reviews_created_at ON reviews(created_at DESC)",
            ),
            (
                "favorites table",
                r#"
                CREATE TABLE IF NOT EXISTS favorites (
                    id UUID PRIMARY KEY,
                    food_id VARCHAR(100) NOT NULL,
                    user_email VARCHAR(255) NOT NULL,
                    details JSONB NOT NULL DEFAULT '{}'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    CONSTRAINT favorites_food_user_unique UNIQUE (food_id, user_email)
                )
                "#,
            ),
            (
                "favorites user_email index",
                "CREATE INDEX IF NOT EXISTS idx_favorites_user_email ON favorites(user_email)",
            ),
        ];

        for (name, sql) in statements {
            client.execute(sql, &[]).await.map_err(|e| {
                error!("Failed to create {}: {}", name, e);
                ApiError::Database(format!("Migration of {} failed: {}", name, e))
            })?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> ApiResult<()> {
        self.test_connection().await
    }

    async fn insert_review(&self, review: Review) -> ApiResult<Uuid> {
        let client = self.get_connection().await?;
        let rating = Value::Number(review.rating);
        let details = Value::Object(review.details);

        let query = r#"
            INSERT INTO reviews (id, food_name, rating, user_email, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;

        client
            .execute(
                query,
                &[
                    &review.id,
                    &review.food_name,
                    &rating,
                    &review.user_email,
                    &details,
                    &review.created_at,
                ],
            )
            .await?;

        info!("Inserted review with id: {}", review.id);
        Ok(review.id)
    }

    /// フィルタの `Option` 値に応じて WHERE 句を動的に組み立てる。
    /// ベクタに `&(dyn ToSql + Sync)` を詰め、プレースホルダ番号は push した順に振る。
    async fn find_reviews(&self, filter: &ReviewFilter) -> ApiResult<Vec<Review>> {
        let client = self.get_connection().await?;

        let pattern = filter
            .search
            .as_deref()
            .map(|search| format!("%{}%", escape_like(search)));
        let limit = filter.limit.map(i64::from);

        let mut conditions = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref email) = filter.email {
            params.push(email);
            conditions.push(format!("user_email = ${}", params.len()));
        }

        if let Some(ref pattern) = pattern {
            params.push(pattern);
            conditions.push(format!("food_name ILIKE ${}", params.len()));
        }

        let mut query = format!("SELECT {} FROM reviews", REVIEW_COLUMNS);
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        query.push_str(match filter.sort {
            ReviewSort::Recent => " ORDER BY created_at DESC",
            ReviewSort::Top => " ORDER BY rating DESC, created_at DESC",
        });

        if let Some(ref limit) = limit {
            params.push(limit);
            query.push_str(&format!(" LIMIT ${}", params.len()));
        }

        let rows = client.query(&query, &params).await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    async fn find_review(&self, id: Uuid) -> ApiResult<Option<Review>> {
        let client = self.get_connection().await?;
        let query = format!("SELECT {} FROM reviews WHERE id = $1", REVIEW_COLUMNS);

        let row = client.query_opt(&query, &[&id]).await?;
        Ok(row.as_ref().map(review_from_row))
    }

    /// `SELECT ... FOR UPDATE` で行をロックし、差分判定と書き込みを同じトランザクションで行う。
    async fn update_review(&self, id: Uuid, changes: ReviewChanges) -> ApiResult<UpdateOutcome> {
        let mut client = self.get_connection().await?;
        let transaction = client.transaction().await?;

        let query = format!("SELECT {} FROM reviews WHERE id = $1 FOR UPDATE", REVIEW_COLUMNS);
        let Some(row) = transaction.query_opt(&query, &[&id]).await? else {
            return Ok(UpdateOutcome::NotFound);
        };

        let mut review = review_from_row(&row);
        if !review.apply(changes) {
            transaction.rollback().await?;
            return Ok(UpdateOutcome::Unchanged);
        }

        let rating = Value::Number(review.rating.clone());
        let details = Value::Object(review.details.clone());
        transaction
            .execute(
                r#"
                UPDATE reviews
                SET food_name = $1, rating = $2, user_email = $3, details = $4, updated_at = NOW()
                WHERE id = $5
                "#,
                &[
                    &review.food_name,
                    &rating,
                    &review.user_email,
                    &details,
                    &id,
                ],
            )
            .await?;
        transaction.commit().await?;

        info!("Updated review with id: {}", id);
        Ok(UpdateOutcome::Modified(review))
    }

    async fn delete_review(&self, id: Uuid) -> ApiResult<bool> {
        let client = self.get_connection().await?;
        let rows_affected = client
            .execute("DELETE FROM reviews WHERE id = $1", &[&id])
            .await?;

        Ok(rows_affected > 0)
    }

    /// UNIQUE 制約に `ON CONFLICT DO NOTHING` を組み合わせ、重複チェックと挿入を 1 文で行う。
    /// 既に存在した場合は `RETURNING` が行を返さないので `None` になる。
    async fn insert_favorite(&self, favorite: Favorite) -> ApiResult<Option<Uuid>> {
        let client = self.get_connection().await?;
        let details = Value::Object(favorite.details);

        let query = r#"
            INSERT INTO favorites (id, food_id, user_email, details, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (food_id, user_email) DO NOTHING
            RETURNING id
        "#;

        let row = client
            .query_opt(
                query,
                &[
                    &favorite.id,
                    &favorite.food_id,
                    &favorite.user_email,
                    &details,
                    &favorite.created_at,
                ],
            )
            .await?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn find_favorites(&self, email: Option<&str>) -> ApiResult<Vec<Favorite>> {
        let client = self.get_connection().await?;

        let rows = if let Some(email) = email {
            let query = format!(
                "SELECT {} FROM favorites WHERE user_email = $1 ORDER BY created_at DESC",
                FAVORITE_COLUMNS
            );
            client.query(&query, &[&email]).await?
        } else {
            let query = format!(
                "SELECT {} FROM favorites ORDER BY created_at DESC",
                FAVORITE_COLUMNS
            );
            client.query(&query, &[]).await?
        };

        Ok(rows.iter().map(favorite_from_row).collect())
    }

    async fn delete_favorite(&self, id: Uuid) -> ApiResult<u64> {
        let client = self.get_connection().await?;
        let rows_affected = client
            .execute("DELETE FROM favorites WHERE id = $1", &[&id])
            .await?;

        Ok(rows_affected)
    }

    async fn count_reviews(&self) -> ApiResult<u64> {
        self.count("SELECT COUNT(*) FROM reviews").await
    }

    async fn count_favorites(&self) -> ApiResult<u64> {
        self.count("SELECT COUNT(*) FROM favorites").await
    }

    async fn close(&self) {
        info!("Closing PostgreSQL connection pool");
        self.pool.close();
    }
}

impl Database {
    async fn count(&self, query: &str) -> ApiResult<u64> {
        let client = self.get_connection().await?;
        let row = client.query_one(query, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }
}

fn review_from_row(row: &Row) -> Review {
    Review {
        id: row.get(0),
        food_name: row.get(1),
        rating: into_number(row.get(2)),
        user_email: row.get(3),
        created_at: row.get(4),
        details: into_map(row.get(5)),
    }
}

fn favorite_from_row(row: &Row) -> Favorite {
    Favorite {
        id: row.get(0),
        food_id: row.get(1),
        user_email: row.get(2),
        created_at: row.get(3),
        details: into_map(row.get(4)),
    }
}

fn into_number(value: Value) -> Number {
    match value {
        Value::Number(number) => number,
        _ => Number::from(0),
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `ILIKE` のワイルドカード (`%`, `_`) と既定のエスケープ文字をリテラルとして扱う。
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
