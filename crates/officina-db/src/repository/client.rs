//! # Client Repository
//!
//! Billing profiles. Client records belong to the back office; the ledger
//! reads them and offers an insert so a ledger can be set up on its own.

use officina_core::{BillingProfile, CoreError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

const SELECT_PROFILE: &str = r#"
    SELECT
        id, display_name, tax_id, address, billing_address,
        default_vat_rate_bps, default_discount_bps, payment_terms_days,
        vat_regime, vat_exempt, vat_exemption_code, split_payment,
        credit_limit_cents, credit_limit_policy, preferred_payment_method
    FROM clients
"#;

/// Repository for billing profiles.
#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    /// Creates a new ClientRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ClientRepository { pool }
    }

    /// Gets a billing profile by client ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<BillingProfile>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Inserts a billing profile.
    pub async fn insert(&self, profile: &BillingProfile) -> DbResult<()> {
        debug!(id = %profile.id, name = %profile.display_name, "Inserting client");

        sqlx::query(
            r#"
            INSERT INTO clients (
                id, display_name, tax_id, address, billing_address,
                default_vat_rate_bps, default_discount_bps, payment_terms_days,
                vat_regime, vat_exempt, vat_exemption_code, split_payment,
                credit_limit_cents, credit_limit_policy, preferred_payment_method
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(&profile.tax_id)
        .bind(&profile.address)
        .bind(&profile.billing_address)
        .bind(profile.default_vat_rate_bps)
        .bind(profile.default_discount_bps)
        .bind(profile.payment_terms_days)
        .bind(profile.vat_regime)
        .bind(profile.vat_exempt)
        .bind(&profile.vat_exemption_code)
        .bind(profile.split_payment)
        .bind(profile.credit_limit_cents)
        .bind(profile.credit_limit_policy)
        .bind(profile.preferred_payment_method)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(crate) async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<BillingProfile>> {
        let sql = format!("{SELECT_PROFILE} WHERE id = ?");
        let profile = sqlx::query_as::<_, BillingProfile>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(profile)
    }

    /// Like [`find`](Self::find), NotFound when absent.
    pub(crate) async fn require(conn: &mut SqliteConnection, id: &str) -> DbResult<BillingProfile> {
        Self::find(conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found("Client", id).into())
    }
}
