//! Database service for rental-service.
//!
//! All SQL lives here. The availability-guarded hold path and the
//! idempotent callback apply are transactional; the asset row lock and
//! the unique idempotency key are enforced by PostgreSQL, so they hold
//! across service instances.

use crate::models::{
    Asset, Block, Booking, BookingStatus, CallbackEvent, CommissionRate, ConditionReport,
    CreateAsset, CreateBlock, CreateCommissionRate, CreateHold, DepositStatus, PaymentStatus,
    PriceBreakdown, TransitionLogEntry, UpdateAsset, UpdateCommissionRate,
};
use crate::services::metrics::{DB_QUERY_DURATION, HOLDS_EXPIRED_TOTAL};
use crate::services::processor::CallbackOutcome;
use crate::services::settlement::{self, commission_split, deposit_disposition};
use crate::services::state_machine::{parse_status, validate_transition};
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[tracing::instrument(skip(database_url), fields(service = "rental-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        tracing::info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        tracing::info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Asset Operations
    // =========================================================================

    /// Create a new rentable asset.
    #[tracing::instrument(skip(self, input), fields(vendor_id = %input.vendor_id))]
    pub async fn create_asset(&self, input: &CreateAsset) -> Result<Asset, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_asset"])
            .start_timer();

        let asset = sqlx::query_as::<_, Asset>(
            r#"
            INSERT INTO assets (asset_id, vendor_id, name, category, daily_rate, hourly_rate, deposit_amount, min_renter_age, capacity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.vendor_id)
        .bind(&input.name)
        .bind(input.category.as_str())
        .bind(input.daily_rate)
        .bind(input.hourly_rate)
        .bind(input.deposit_amount)
        .bind(input.min_renter_age)
        .bind(input.capacity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create asset: {}", e)))?;

        timer.observe_duration();
        tracing::info!(asset_id = %asset.asset_id, name = %asset.name, "Asset created");

        Ok(asset)
    }

    /// Get an asset by ID.
    pub async fn get_asset(&self, asset_id: Uuid) -> Result<Option<Asset>, AppError> {
        let asset = sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE asset_id = $1")
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get asset: {}", e)))?;

        Ok(asset)
    }

    /// Apply a typed patch to an asset. Unset fields keep their value.
    #[tracing::instrument(skip(self, patch), fields(asset_id = %asset_id))]
    pub async fn update_asset(
        &self,
        asset_id: Uuid,
        patch: &UpdateAsset,
    ) -> Result<Option<Asset>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_asset"])
            .start_timer();

        let asset = sqlx::query_as::<_, Asset>(
            r#"
            UPDATE assets
            SET name = COALESCE($2, name),
                daily_rate = COALESCE($3, daily_rate),
                hourly_rate = COALESCE($4, hourly_rate),
                deposit_amount = COALESCE($5, deposit_amount),
                min_renter_age = COALESCE($6, min_renter_age),
                capacity = COALESCE($7, capacity),
                is_active = COALESCE($8, is_active),
                updated_utc = NOW()
            WHERE asset_id = $1
            RETURNING *
            "#,
        )
        .bind(asset_id)
        .bind(&patch.name)
        .bind(patch.daily_rate)
        .bind(patch.hourly_rate)
        .bind(patch.deposit_amount)
        .bind(patch.min_renter_age)
        .bind(patch.capacity)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update asset: {}", e)))?;

        timer.observe_duration();

        Ok(asset)
    }

    // =========================================================================
    // Block Operations
    // =========================================================================

    /// Create an unavailability block. Guarded by the same per-asset
    /// serialization as holds so a block can never land on top of an
    /// active booking.
    #[tracing::instrument(skip(self, input), fields(asset_id = %input.asset_id))]
    pub async fn create_block(&self, input: &CreateBlock) -> Result<Block, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_block"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT asset_id FROM assets WHERE asset_id = $1 FOR UPDATE")
                .bind(input.asset_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to lock asset: {}", e))
                })?;
        if locked.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("Asset not found")));
        }

        let conflicts = booking_overlap_exists(&mut tx, input.asset_id, input.start_utc, input.end_utc).await?;
        if conflicts {
            return Err(AppError::Unavailable);
        }

        let block = sqlx::query_as::<_, Block>(
            r#"
            INSERT INTO blocks (block_id, asset_id, start_utc, end_utc, reason, source)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.asset_id)
        .bind(input.start_utc)
        .bind(input.end_utc)
        .bind(&input.reason)
        .bind(input.source.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create block: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        tracing::info!(block_id = %block.block_id, source = %block.source, "Block created");

        Ok(block)
    }

    /// Deactivate a block, freeing its interval.
    pub async fn deactivate_block(&self, block_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE blocks SET is_active = FALSE WHERE block_id = $1 AND is_active = TRUE",
        )
        .bind(block_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate block: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Availability
    // =========================================================================

    /// Overlap pre-check for search and quoting. A past-due hold counts
    /// as expired here even before the sweep has moved it.
    #[tracing::instrument(skip(self), fields(asset_id = %asset_id))]
    pub async fn is_available(
        &self,
        asset_id: Uuid,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["is_available"])
            .start_timer();

        let occupied: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM bookings
                WHERE asset_id = $1
                  AND start_utc < $3 AND end_utc > $2
                  AND (status IN ('confirmed', 'picked_up')
                       OR (status = 'hold' AND hold_expires_at > NOW()))
            ) OR EXISTS(
                SELECT 1 FROM blocks
                WHERE asset_id = $1
                  AND is_active = TRUE
                  AND start_utc < $3 AND end_utc > $2
            )
            "#,
        )
        .bind(asset_id)
        .bind(start_utc)
        .bind(end_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check availability: {}", e))
        })?;

        timer.observe_duration();

        Ok(!occupied)
    }

    // =========================================================================
    // Booking Lifecycle
    // =========================================================================

    /// Create a hold on an asset's interval.
    ///
    /// The overlap check and the insert run in one transaction under a
    /// `FOR UPDATE` lock on the asset row, so concurrent requests for
    /// the same asset serialize and at most one overlapping hold
    /// survives. Past-due holds on the asset are expired in the same
    /// transaction before the check.
    #[tracing::instrument(skip(self, asset, input, breakdown), fields(asset_id = %asset.asset_id))]
    pub async fn create_hold(
        &self,
        asset: &Asset,
        input: &CreateHold,
        breakdown: &PriceBreakdown,
        hold_ttl_minutes: i64,
    ) -> Result<Booking, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_hold"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Serialize all hold attempts for this asset.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT asset_id FROM assets WHERE asset_id = $1 FOR UPDATE")
                .bind(asset.asset_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to lock asset: {}", e))
                })?;
        if locked.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("Asset not found")));
        }

        expire_holds_for_asset(&mut tx, asset.asset_id).await?;

        let occupied = booking_overlap_exists(&mut tx, asset.asset_id, input.start_utc, input.end_utc)
            .await?
            || block_overlap_exists(&mut tx, asset.asset_id, input.start_utc, input.end_utc).await?;
        if occupied {
            return Err(AppError::Unavailable);
        }

        let booking_id = Uuid::new_v4();
        let order_ref = format!("RNT-{}", Uuid::new_v4().simple());
        let customer = serde_json::to_value(&input.customer)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode customer: {}", e)))?;
        let expires_at = Utc::now() + Duration::minutes(hold_ttl_minutes);

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                booking_id, order_ref, asset_id, vendor_id, start_utc, end_utc,
                total_hours, rental_days, remainder_hours, base_amount,
                total_amount, deposit_amount, customer, hold_expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(&order_ref)
        .bind(asset.asset_id)
        .bind(asset.vendor_id)
        .bind(input.start_utc)
        .bind(input.end_utc)
        .bind(breakdown.total_hours)
        .bind(breakdown.rental_days)
        .bind(breakdown.remainder_hours)
        .bind(breakdown.base_amount)
        .bind(breakdown.base_amount)
        .bind(asset.deposit_amount)
        .bind(&customer)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert hold: {}", e)))?;

        log_transition(&mut tx, booking_id, None, BookingStatus::Hold, "hold_created", "customer")
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        tracing::info!(
            booking_id = %booking.booking_id,
            order_ref = %booking.order_ref,
            expires_at = %expires_at,
            "Hold created"
        );

        Ok(booking)
    }

    /// Get a booking by ID.
    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get booking: {}", e)))?;

        Ok(booking)
    }

    /// Get a booking by its public order reference.
    pub async fn get_booking_by_order_ref(
        &self,
        order_ref: &str,
    ) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE order_ref = $1")
            .bind(order_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get booking: {}", e)))?;

        Ok(booking)
    }

    /// Read the append-only transition log for a booking.
    pub async fn list_transitions(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TransitionLogEntry>, AppError> {
        let entries = sqlx::query_as::<_, TransitionLogEntry>(
            "SELECT * FROM booking_transitions WHERE booking_id = $1 ORDER BY created_utc, transition_id",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list transitions: {}", e))
        })?;

        Ok(entries)
    }

    /// Record asset handover to the customer.
    #[tracing::instrument(skip(self, report), fields(booking_id = %booking_id))]
    pub async fn record_pickup(
        &self,
        booking_id: Uuid,
        report: &ConditionReport,
        actor: &str,
    ) -> Result<Booking, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_pickup"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking(&mut tx, booking_id).await?;
        let status = parse_status(&booking.status)?;
        validate_transition(status, BookingStatus::PickedUp)?;

        let report_json = serde_json::to_value(report)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode report: {}", e)))?;

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = 'picked_up', pickup_report = $2, picked_up_utc = NOW(), updated_utc = NOW()
            WHERE booking_id = $1
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(&report_json)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record pickup: {}", e)))?;

        log_transition(&mut tx, booking_id, Some(status), BookingStatus::PickedUp, "asset_handed_over", actor)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        tracing::info!(booking_id = %booking_id, "Pickup recorded");

        Ok(updated)
    }

    /// Record asset return, computing the late fee past the grace
    /// period.
    #[tracing::instrument(skip(self, report), fields(booking_id = %booking_id))]
    pub async fn record_return(
        &self,
        booking_id: Uuid,
        report: &ConditionReport,
        actor: &str,
        grace_minutes: i64,
    ) -> Result<Booking, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_return"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking(&mut tx, booking_id).await?;
        let status = parse_status(&booking.status)?;
        validate_transition(status, BookingStatus::Returned)?;

        let hourly_rate: i64 =
            sqlx::query_scalar("SELECT hourly_rate FROM assets WHERE asset_id = $1")
                .bind(booking.asset_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to read asset rate: {}", e))
                })?;

        let now = Utc::now();
        let late_fee = settlement::late_return_fee(booking.end_utc, now, grace_minutes, hourly_rate);

        let report_json = serde_json::to_value(report)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode report: {}", e)))?;

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = 'returned', return_report = $2, late_fee = $3,
                returned_utc = $4, updated_utc = $4
            WHERE booking_id = $1
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(&report_json)
        .bind(late_fee)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record return: {}", e)))?;

        log_transition(&mut tx, booking_id, Some(status), BookingStatus::Returned, "asset_returned", actor)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        tracing::info!(booking_id = %booking_id, late_fee = late_fee, "Return recorded");

        Ok(updated)
    }

    /// Add a damage/fuel/mileage charge to an in-custody or returned
    /// booking. Settled against the deposit at completion.
    pub async fn add_additional_charge(
        &self,
        booking_id: Uuid,
        amount: i64,
        note: &str,
    ) -> Result<Booking, AppError> {
        if amount <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Charge amount must be positive"
            )));
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking(&mut tx, booking_id).await?;
        let status = parse_status(&booking.status)?;
        if !matches!(status, BookingStatus::PickedUp | BookingStatus::Returned) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Charges can only be added while the asset is out or returned"
            )));
        }

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET additional_charges = additional_charges + $2, updated_utc = NOW()
            WHERE booking_id = $1
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add charge: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        tracing::info!(booking_id = %booking_id, amount = amount, note = %note, "Additional charge added");

        Ok(updated)
    }

    /// Cancel a hold or confirmed booking. Computes the tiered
    /// cancellation fee when the booking was paid; refund issuance to
    /// the gateway happens after commit and lands via callback.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> Result<Booking, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_booking"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking(&mut tx, booking_id).await?;
        let status = parse_status(&booking.status)?;
        validate_transition(status, BookingStatus::Cancelled)?;

        let now = Utc::now();
        let outcome = if booking.payment_status == PaymentStatus::Paid.as_str() {
            settlement::cancellation_outcome(booking.total_amount, booking.start_utc, now)
        } else {
            settlement::CancellationOutcome { fee: 0, refund: 0 }
        };

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancellation_fee = $2, refund_amount = $3,
                cancelled_utc = $4, updated_utc = $4
            WHERE booking_id = $1
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(outcome.fee)
        .bind(outcome.refund)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel booking: {}", e)))?;

        log_transition(&mut tx, booking_id, Some(status), BookingStatus::Cancelled, reason, actor)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        tracing::info!(
            booking_id = %booking_id,
            fee = outcome.fee,
            refund = outcome.refund,
            "Booking cancelled"
        );

        Ok(updated)
    }

    /// Mark a confirmed booking as a no-show once the pickup time has
    /// passed unused.
    pub async fn mark_no_show(&self, booking_id: Uuid, actor: &str) -> Result<Booking, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking(&mut tx, booking_id).await?;
        let status = parse_status(&booking.status)?;
        validate_transition(status, BookingStatus::NoShow)?;

        if Utc::now() <= booking.start_utc {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Pickup window has not passed yet"
            )));
        }

        let updated = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = 'no_show', updated_utc = NOW() WHERE booking_id = $1 RETURNING *",
        )
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark no-show: {}", e)))?;

        log_transition(&mut tx, booking_id, Some(status), BookingStatus::NoShow, "pickup_window_missed", actor)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        tracing::info!(booking_id = %booking_id, "Booking marked as no-show");

        Ok(updated)
    }

    /// Finalize a returned booking: dispose of the deposit, resolve the
    /// commission split over the settled revenue, and complete.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn settle_booking(
        &self,
        booking_id: Uuid,
        actor: &str,
        fallback_percent: i32,
    ) -> Result<Booking, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_booking"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking(&mut tx, booking_id).await?;
        let status = parse_status(&booking.status)?;
        validate_transition(status, BookingStatus::Completed)?;

        let category: String =
            sqlx::query_scalar("SELECT category FROM assets WHERE asset_id = $1")
                .bind(booking.asset_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to read asset category: {}", e))
                })?;

        let rate = sqlx::query_as::<_, CommissionRate>(COMMISSION_RESOLVE_SQL)
            .bind(booking.vendor_id)
            .bind(&category)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to resolve commission: {}", e))
            })?;
        let percent = rate.as_ref().map(|r| r.percent).unwrap_or(fallback_percent);

        let charges = booking.late_fee + booking.additional_charges;
        let disposition = deposit_disposition(booking.deposit_amount, charges);

        let settled_revenue = booking.total_amount + booking.late_fee + booking.additional_charges;
        let split = commission_split(settled_revenue, percent);

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings
            SET status = 'completed', deposit_status = $2, platform_fee = $3,
                vendor_amount = $4, completed_utc = NOW(), updated_utc = NOW()
            WHERE booking_id = $1
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(disposition.status.as_str())
        .bind(split.platform_fee)
        .bind(split.vendor_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to settle booking: {}", e)))?;

        log_transition(&mut tx, booking_id, Some(status), BookingStatus::Completed, "settlement_finalized", actor)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        tracing::info!(
            booking_id = %booking_id,
            commission_percent = percent,
            platform_fee = split.platform_fee,
            vendor_amount = split.vendor_amount,
            deposit_status = disposition.status.as_str(),
            deposit_returned = disposition.returned,
            "Booking settled"
        );

        Ok(updated)
    }

    /// Expiry sweep: move every past-due hold to `expired`. Idempotent
    /// and safe to run concurrently from multiple instances.
    pub async fn expire_stale_holds(&self) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["expire_stale_holds"])
            .start_timer();

        let expired = sqlx::query_scalar::<_, i64>(
            r#"
            WITH expired AS (
                UPDATE bookings
                SET status = 'expired', updated_utc = NOW()
                WHERE status = 'hold' AND hold_expires_at <= NOW()
                RETURNING booking_id
            ),
            logged AS (
                INSERT INTO booking_transitions (booking_id, from_status, to_status, reason, actor)
                SELECT booking_id, 'hold', 'expired', 'hold_ttl_elapsed', 'system' FROM expired
                RETURNING booking_id
            )
            SELECT COUNT(*) FROM logged
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to expire holds: {}", e)))?;

        timer.observe_duration();
        if expired > 0 {
            HOLDS_EXPIRED_TOTAL.inc_by(expired as u64);
            tracing::info!(count = expired, "Expired stale holds");
        }

        Ok(expired as u64)
    }

    // =========================================================================
    // Payment Event Application
    // =========================================================================

    /// Apply a verified payment-approval callback exactly once.
    ///
    /// The PaymentEvent insert and the `hold → confirmed` transition
    /// share one transaction; a duplicate idempotency key means a
    /// replay and produces no side effects. An amount mismatch or an
    /// illegal transition leaves the booking unconfirmed and flags it
    /// for manual reconciliation — the event is still recorded as
    /// handled so the gateway stops retrying.
    #[tracing::instrument(skip(self, event, raw_payload), fields(order_ref = %event.data.order_id))]
    pub async fn apply_payment_approved(
        &self,
        event: &CallbackEvent,
        raw_payload: &serde_json::Value,
    ) -> Result<CallbackOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_payment_approved"])
            .start_timer();

        let (key, occurred_at) = match (event.idempotency_key(), event.occurred_at()) {
            (Some(key), Some(occurred_at)) => (key, occurred_at),
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Callback is missing its event timestamp"
                )));
            }
        };

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking_by_order_ref(&mut tx, &event.data.order_id).await?;

        match insert_payment_event(&mut tx, &key, &booking, event, occurred_at, raw_payload).await {
            Ok(()) => {}
            Err(InsertEventError::Duplicate) => {
                tx.rollback().await.ok();
                tracing::info!(idempotency_key = %key, "Replayed callback, no effects applied");
                timer.observe_duration();
                return Ok(CallbackOutcome::Replayed);
            }
            Err(InsertEventError::Other(e)) => return Err(e),
        }

        let status = parse_status(&booking.status)?;

        if event.data.total_amount != booking.total_amount {
            flag_for_review(&mut tx, booking.booking_id, &event.data.payment_key).await?;
            tx.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
            })?;
            let mismatch = AppError::AmountMismatch {
                expected: booking.total_amount,
                received: event.data.total_amount,
            };
            tracing::warn!(
                booking_id = %booking.booking_id,
                reason_code = mismatch.reason_code(),
                expected = booking.total_amount,
                received = event.data.total_amount,
                "Callback amount does not match quote; flagged for review"
            );
            timer.observe_duration();
            return Ok(CallbackOutcome::FlaggedForReview);
        }

        if validate_transition(status, BookingStatus::Confirmed).is_err() {
            // Payment arrived for a booking that can no longer confirm
            // (expired, cancelled, or already past hold). Money moved,
            // so this needs a human, not a retry storm.
            flag_for_review(&mut tx, booking.booking_id, &event.data.payment_key).await?;
            tx.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
            })?;
            tracing::warn!(
                booking_id = %booking.booking_id,
                status = %booking.status,
                "Payment approved for a non-confirmable booking; flagged for review"
            );
            timer.observe_duration();
            return Ok(CallbackOutcome::FlaggedForReview);
        }

        let deposit_status = if booking.deposit_amount > 0 {
            DepositStatus::Held
        } else {
            DepositStatus::None
        };

        sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'confirmed', payment_status = 'paid', deposit_status = $2,
                payment_key = $3, confirmed_utc = NOW(), updated_utc = NOW()
            WHERE booking_id = $1
            "#,
        )
        .bind(booking.booking_id)
        .bind(deposit_status.as_str())
        .bind(&event.data.payment_key)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to confirm booking: {}", e)))?;

        log_transition(
            &mut tx,
            booking.booking_id,
            Some(status),
            BookingStatus::Confirmed,
            "payment_approved",
            "gateway",
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        tracing::info!(
            booking_id = %booking.booking_id,
            payment_key = %event.data.payment_key,
            "Booking confirmed by payment callback"
        );

        Ok(CallbackOutcome::Applied)
    }

    /// Apply a verified payment-cancellation callback exactly once.
    /// Moves the payment sub-state once the gateway confirms the
    /// refund; the lifecycle status itself was already driven by the
    /// cancellation request.
    #[tracing::instrument(skip(self, event, raw_payload), fields(order_ref = %event.data.order_id))]
    pub async fn apply_payment_canceled(
        &self,
        event: &CallbackEvent,
        raw_payload: &serde_json::Value,
    ) -> Result<CallbackOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_payment_canceled"])
            .start_timer();

        let (key, occurred_at) = match (event.idempotency_key(), event.occurred_at()) {
            (Some(key), Some(occurred_at)) => (key, occurred_at),
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Callback is missing its event timestamp"
                )));
            }
        };

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking = lock_booking_by_order_ref(&mut tx, &event.data.order_id).await?;

        match insert_payment_event(&mut tx, &key, &booking, event, occurred_at, raw_payload).await {
            Ok(()) => {}
            Err(InsertEventError::Duplicate) => {
                tx.rollback().await.ok();
                tracing::info!(idempotency_key = %key, "Replayed callback, no effects applied");
                timer.observe_duration();
                return Ok(CallbackOutcome::Replayed);
            }
            Err(InsertEventError::Other(e)) => return Err(e),
        }

        let status = parse_status(&booking.status)?;
        let outcome = if status == BookingStatus::Cancelled {
            let payment_status = if booking.refund_amount >= booking.total_amount {
                PaymentStatus::Refunded
            } else {
                PaymentStatus::PartiallyRefunded
            };
            sqlx::query(
                "UPDATE bookings SET payment_status = $2, updated_utc = NOW() WHERE booking_id = $1",
            )
            .bind(booking.booking_id)
            .bind(payment_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to record refund: {}", e))
            })?;
            CallbackOutcome::Applied
        } else {
            // A refund we did not initiate from a cancellation.
            flag_for_review(&mut tx, booking.booking_id, &event.data.payment_key).await?;
            tracing::warn!(
                booking_id = %booking.booking_id,
                status = %booking.status,
                "Unexpected payment cancellation; flagged for review"
            );
            CallbackOutcome::FlaggedForReview
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(outcome)
    }

    // =========================================================================
    // Commission Rates
    // =========================================================================

    /// Create a commission rate.
    pub async fn create_commission_rate(
        &self,
        input: &CreateCommissionRate,
    ) -> Result<CommissionRate, AppError> {
        let rate = sqlx::query_as::<_, CommissionRate>(
            r#"
            INSERT INTO commission_rates (rate_id, vendor_id, category, percent, effective_from, effective_until)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.vendor_id)
        .bind(&input.category)
        .bind(input.percent)
        .bind(input.effective_from)
        .bind(input.effective_until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create commission rate: {}", e))
        })?;

        tracing::info!(rate_id = %rate.rate_id, percent = rate.percent, "Commission rate created");

        Ok(rate)
    }

    /// List all commission rates.
    pub async fn list_commission_rates(&self) -> Result<Vec<CommissionRate>, AppError> {
        let rates = sqlx::query_as::<_, CommissionRate>(
            "SELECT * FROM commission_rates ORDER BY created_utc DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list commission rates: {}", e))
        })?;

        Ok(rates)
    }

    /// Apply a typed patch to a commission rate.
    pub async fn update_commission_rate(
        &self,
        rate_id: Uuid,
        patch: &UpdateCommissionRate,
    ) -> Result<Option<CommissionRate>, AppError> {
        let rate = sqlx::query_as::<_, CommissionRate>(
            r#"
            UPDATE commission_rates
            SET percent = COALESCE($2, percent),
                is_active = COALESCE($3, is_active),
                effective_from = COALESCE($4, effective_from),
                effective_until = COALESCE($5, effective_until)
            WHERE rate_id = $1
            RETURNING *
            "#,
        )
        .bind(rate_id)
        .bind(patch.percent)
        .bind(patch.is_active)
        .bind(patch.effective_from)
        .bind(patch.effective_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update commission rate: {}", e))
        })?;

        Ok(rate)
    }

    /// Delete a commission rate.
    pub async fn delete_commission_rate(&self, rate_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM commission_rates WHERE rate_id = $1")
            .bind(rate_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete commission rate: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Resolve the applicable commission rate for a vendor/category
    /// pair by precedence. Returns `None` when no row matches; the
    /// caller falls back to the configured default.
    pub async fn resolve_commission_rate(
        &self,
        vendor_id: Uuid,
        category: &str,
    ) -> Result<Option<CommissionRate>, AppError> {
        let rate = sqlx::query_as::<_, CommissionRate>(COMMISSION_RESOLVE_SQL)
            .bind(vendor_id)
            .bind(category)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to resolve commission: {}", e))
            })?;

        Ok(rate)
    }
}

/// Precedence: vendor-specific beats category-specific beats the global
/// default; most-recently-created wins ties within a level. "Active"
/// also requires the effective window, if set, to contain now.
const COMMISSION_RESOLVE_SQL: &str = r#"
SELECT * FROM commission_rates
WHERE is_active = TRUE
  AND (effective_from IS NULL OR effective_from <= NOW())
  AND (effective_until IS NULL OR effective_until > NOW())
  AND (
        (vendor_id = $1 AND (category IS NULL OR category = $2))
     OR (vendor_id IS NULL AND category = $2)
     OR (vendor_id IS NULL AND category IS NULL)
  )
ORDER BY (vendor_id IS NOT NULL) DESC, (category IS NOT NULL) DESC, created_utc DESC
LIMIT 1
"#;

type PgTx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

enum InsertEventError {
    Duplicate,
    Other(AppError),
}

async fn lock_booking(tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Booking, AppError> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE booking_id = $1 FOR UPDATE")
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock booking: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))
}

async fn lock_booking_by_order_ref(
    tx: &mut PgTx<'_>,
    order_ref: &str,
) -> Result<Booking, AppError> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE order_ref = $1 FOR UPDATE")
        .bind(order_ref)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock booking: {}", e)))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("No booking for order reference {}", order_ref))
        })
}

async fn booking_overlap_exists(
    tx: &mut PgTx<'_>,
    asset_id: Uuid,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
) -> Result<bool, AppError> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM bookings
            WHERE asset_id = $1
              AND status IN ('hold', 'confirmed', 'picked_up')
              AND start_utc < $3 AND end_utc > $2
        )
        "#,
    )
    .bind(asset_id)
    .bind(start_utc)
    .bind(end_utc)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check overlaps: {}", e)))
}

async fn block_overlap_exists(
    tx: &mut PgTx<'_>,
    asset_id: Uuid,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
) -> Result<bool, AppError> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM blocks
            WHERE asset_id = $1
              AND is_active = TRUE
              AND start_utc < $3 AND end_utc > $2
        )
        "#,
    )
    .bind(asset_id)
    .bind(start_utc)
    .bind(end_utc)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check blocks: {}", e)))
}

/// Expire past-due holds for one asset inside the guarded hold path,
/// logging each transition.
async fn expire_holds_for_asset(tx: &mut PgTx<'_>, asset_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        WITH expired AS (
            UPDATE bookings
            SET status = 'expired', updated_utc = NOW()
            WHERE asset_id = $1 AND status = 'hold' AND hold_expires_at <= NOW()
            RETURNING booking_id
        )
        INSERT INTO booking_transitions (booking_id, from_status, to_status, reason, actor)
        SELECT booking_id, 'hold', 'expired', 'hold_ttl_elapsed', 'system' FROM expired
        "#,
    )
    .bind(asset_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to expire holds: {}", e)))?;

    Ok(())
}

async fn log_transition(
    tx: &mut PgTx<'_>,
    booking_id: Uuid,
    from: Option<BookingStatus>,
    to: BookingStatus,
    reason: &str,
    actor: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO booking_transitions (booking_id, from_status, to_status, reason, actor)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(booking_id)
    .bind(from.map(|s| s.as_str()))
    .bind(to.as_str())
    .bind(reason)
    .bind(actor)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to log transition: {}", e)))?;

    Ok(())
}

async fn insert_payment_event(
    tx: &mut PgTx<'_>,
    idempotency_key: &str,
    booking: &Booking,
    event: &CallbackEvent,
    occurred_at: DateTime<Utc>,
    raw_payload: &serde_json::Value,
) -> Result<(), InsertEventError> {
    let result = sqlx::query(
        r#"
        INSERT INTO payment_events (event_id, idempotency_key, booking_id, event_type, payment_key, order_ref, amount, occurred_at, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(idempotency_key)
    .bind(booking.booking_id)
    .bind(&event.event_type)
    .bind(&event.data.payment_key)
    .bind(&event.data.order_id)
    .bind(event.data.total_amount)
    .bind(occurred_at)
    .bind(raw_payload)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
            Err(InsertEventError::Duplicate)
        }
        Err(e) => Err(InsertEventError::Other(AppError::DatabaseError(
            anyhow::anyhow!("Failed to record payment event: {}", e),
        ))),
    }
}

async fn flag_for_review(
    tx: &mut PgTx<'_>,
    booking_id: Uuid,
    payment_key: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE bookings
        SET payment_status = 'requires_review', payment_key = $2, updated_utc = NOW()
        WHERE booking_id = $1
        "#,
    )
    .bind(booking_id)
    .bind(payment_key)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to flag booking: {}", e)))?;

    Ok(())
}
