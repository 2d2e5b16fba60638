//! `PostgreSQL` implementation of [`ParticipantStore`].
//!
//! A participant is one row in `participants` plus its rows in
//! `registrations`. The `version` column is the compare-and-write token:
//! `save` bumps it with `WHERE version = $expected` and replaces the
//! registration rows inside the same transaction, so a lost race changes
//! nothing. The partial unique index on `(phone, event_id)` for active rows
//! backs the duplicate-event invariant at the database level.

use chrono::{DateTime, Utc};
use fest_core::BoxFuture;
use fest_core::status::RegistrationStatus;
use fest_core::store::{ParticipantStore, PendingTicket, StoreError, StoredParticipant, Version};
use fest_core::types::{EventId, Money, OrderId, Participant, Phone, Registration};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

/// Participant store backed by `PostgreSQL`.
///
/// # Example
///
/// ```no_run
/// use fest_postgres::PostgresParticipantStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresParticipantStore::new("postgres://localhost/fest").await?;
/// store.run_migrations().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresParticipantStore {
    pool: PgPool,
    max_active: Option<usize>,
}

impl PostgresParticipantStore {
    /// Connect with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            max_active: None,
        }
    }

    /// Reject writes that would leave more than `max_active` active registrations.
    #[must_use]
    pub const fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = Some(max_active);
        self
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
    }

    fn check_cap(&self, participant: &Participant) -> Result<(), StoreError> {
        let Some(max) = self.max_active else {
            return Ok(());
        };
        let active = participant.active_registrations().count();
        if active > max {
            metrics::counter!("participant_store_invariant_violations_total").increment(1);
            return Err(StoreError::InvariantViolation {
                phone: participant.phone.clone(),
                detail: format!("{active} active registrations exceed cap {max}"),
            });
        }
        Ok(())
    }

    /// Participant row and registrations read from one snapshot.
    async fn load(&self, phone: &Phone) -> Result<Option<StoredParticipant>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to start transaction: {e}")))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let Some(row) = sqlx::query(
            r"
            SELECT phone, name, institutional_id, organization, created_at, version
            FROM participants
            WHERE phone = $1
            ",
        )
        .bind(phone.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r"
            SELECT event_id, order_id, amount_minor, status, provider_txn_id,
                   ticket_url, registered_at
            FROM registrations
            WHERE phone = $1
            ORDER BY position
            ",
        )
        .bind(phone.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to commit transaction: {e}")))?;

        let registrations = rows
            .iter()
            .map(registration_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let participant = Participant {
            phone: Phone::new(get::<String>(&row, "phone")?),
            name: get(&row, "name")?,
            institutional_id: get(&row, "institutional_id")?,
            organization: get(&row, "organization")?,
            created_at: get(&row, "created_at")?,
            registrations,
        };
        let version = version_from_db(get(&row, "version")?)?;

        Ok(Some(StoredParticipant {
            participant,
            version,
        }))
    }

    async fn insert(&self, participant: Participant) -> Result<Version, StoreError> {
        self.check_cap(&participant)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to start transaction: {e}")))?;

        let inserted = sqlx::query(
            r"
            INSERT INTO participants
                (phone, name, institutional_id, organization, created_at, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(participant.phone.as_str())
        .bind(&participant.name)
        .bind(&participant.institutional_id)
        .bind(&participant.organization)
        .bind(participant.created_at)
        .bind(version_to_db(Version::INITIAL)?)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let _ = tx.rollback().await;
            if is_unique_violation(&e) {
                let actual = self.current_version(&participant.phone).await?;
                return Err(StoreError::Conflict {
                    phone: participant.phone,
                    expected: None,
                    actual,
                });
            }
            return Err(StoreError::Database(format!("Failed to create participant: {e}")));
        }

        write_registrations(&mut tx, &participant).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to commit transaction: {e}")))?;

        tracing::debug!(phone = %participant.phone, "Participant created");
        Ok(Version::INITIAL)
    }

    async fn update(&self, participant: Participant, expected: Version) -> Result<Version, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to start transaction: {e}")))?;

        let result = sqlx::query(
            r"
            UPDATE participants
            SET version = version + 1,
                name = $3,
                institutional_id = $4,
                organization = $5
            WHERE phone = $1 AND version = $2
            ",
        )
        .bind(participant.phone.as_str())
        .bind(version_to_db(expected)?)
        .bind(&participant.name)
        .bind(&participant.institutional_id)
        .bind(&participant.organization)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to update participant: {e}")))?;

        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            let actual = self.current_version(&participant.phone).await?;
            return Err(StoreError::Conflict {
                phone: participant.phone,
                expected: Some(expected),
                actual,
            });
        }

        // The version check passed; only now is an invariant failure meaningful.
        if let Err(e) = self.check_cap(&participant) {
            let _ = tx.rollback().await;
            return Err(e);
        }

        sqlx::query("DELETE FROM registrations WHERE phone = $1")
            .bind(participant.phone.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to clear registrations: {e}")))?;

        write_registrations(&mut tx, &participant).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to commit transaction: {e}")))?;

        Ok(expected.next())
    }

    async fn current_version(&self, phone: &Phone) -> Result<Option<Version>, StoreError> {
        let version: Option<(i64,)> = sqlx::query_as("SELECT version FROM participants WHERE phone = $1")
            .bind(phone.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        version.map(|(v,)| version_from_db(v)).transpose()
    }

    async fn ticket_pending(&self, limit: usize) -> Result<Vec<PendingTicket>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String)> = sqlx::query_as(
            r"
            SELECT DISTINCT phone, order_id
            FROM registrations
            WHERE status = 'paid' AND ticket_url IS NULL
            ORDER BY phone, order_id
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(phone, order_id)| PendingTicket {
                phone: Phone::new(phone),
                order_id: OrderId::new(order_id),
            })
            .collect())
    }
}

impl ParticipantStore for PostgresParticipantStore {
    fn find_by_phone(
        &self,
        phone: &Phone,
    ) -> BoxFuture<'_, Result<Option<StoredParticipant>, StoreError>> {
        let phone = phone.clone();
        Box::pin(async move { self.load(&phone).await })
    }

    fn create(&self, participant: Participant) -> BoxFuture<'_, Result<Version, StoreError>> {
        Box::pin(self.insert(participant))
    }

    fn save(
        &self,
        participant: Participant,
        expected: Version,
    ) -> BoxFuture<'_, Result<Version, StoreError>> {
        Box::pin(self.update(participant, expected))
    }

    fn list_ticket_pending(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<PendingTicket>, StoreError>> {
        Box::pin(self.ticket_pending(limit))
    }
}

async fn write_registrations(
    tx: &mut Transaction<'_, Postgres>,
    participant: &Participant,
) -> Result<(), StoreError> {
    for (position, registration) in participant.registrations.iter().enumerate() {
        let position = i32::try_from(position)
            .map_err(|_| StoreError::Serialization("too many registrations".to_string()))?;

        sqlx::query(
            r"
            INSERT INTO registrations
                (phone, event_id, order_id, amount_minor, status, provider_txn_id,
                 ticket_url, registered_at, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(participant.phone.as_str())
        .bind(registration.event_id.as_str())
        .bind(registration.order_id.as_str())
        .bind(registration.amount.minor())
        .bind(registration.status.as_str())
        .bind(registration.provider_txn_id.as_deref())
        .bind(registration.ticket_url.as_deref())
        .bind(registration.registered_at)
        .bind(position)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                metrics::counter!("participant_store_invariant_violations_total").increment(1);
                return StoreError::InvariantViolation {
                    phone: participant.phone.clone(),
                    detail: format!("event {} already has an active registration", registration.event_id),
                };
            }
            StoreError::Database(format!("Failed to write registration: {e}"))
        })?;
    }
    Ok(())
}

fn registration_from_row(row: &PgRow) -> Result<Registration, StoreError> {
    let status: String = get(row, "status")?;
    let status = RegistrationStatus::parse(&status)
        .ok_or_else(|| StoreError::Serialization(format!("Invalid registration status: {status}")))?;
    let registered_at: DateTime<Utc> = get(row, "registered_at")?;

    Ok(Registration {
        event_id: EventId::new(get::<String>(row, "event_id")?),
        order_id: OrderId::new(get::<String>(row, "order_id")?),
        amount: Money::from_minor(get(row, "amount_minor")?),
        status,
        provider_txn_id: get(row, "provider_txn_id")?,
        ticket_url: get(row, "ticket_url")?,
        registered_at,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Serialization(format!("column {column}: {e}")))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn version_to_db(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Serialization(format!("version {version} out of range")))
}

fn version_from_db(raw: i64) -> Result<Version, StoreError> {
    u64::try_from(raw)
        .map(Version::new)
        .map_err(|_| StoreError::Serialization(format!("negative version {raw}")))
}
