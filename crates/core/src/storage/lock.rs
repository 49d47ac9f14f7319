use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the lock owns the pooled connection it
// was taken on and unlocks on that same connection. The key is ASCII "WATCHT", shared by every
// monitoring pass.
const PASS_LOCK_KEY: i64 = 0x5741_5443_4854;

pub struct PassLock {
    conn: Option<PoolConnection<Postgres>>,
}

impl PassLock {
    /// `Ok(None)` when another pass already holds the lock.
    pub async fn try_acquire(pool: &sqlx::PgPool) -> anyhow::Result<Option<Self>> {
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for pass lock")?;

        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(PASS_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={PASS_LOCK_KEY})"))?;

        Ok(acquired.0.then_some(Self { conn: Some(conn) }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let res = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(PASS_LOCK_KEY)
            .execute(&mut *conn)
            .await;

        if let Err(err) = res {
            // Closing the session drops the lock server-side.
            drop(conn.detach());
            return Err(err)
                .with_context(|| format!("failed to release advisory lock (key={PASS_LOCK_KEY})"));
        }
        Ok(())
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        // Never hand a connection that still holds the lock back to the pool.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}
