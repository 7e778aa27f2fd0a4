//! # Declaration Repository
//!
//! Declarations of intent (VAT plafond). `used_amount_cents` only moves
//! through the guarded updates below, inside the invoice transaction that
//! consumes or releases it:
//!
//! ```text
//! UPDATE ... SET used = used + :amount
//! WHERE id = :id AND amount_limit - used >= :amount   ← 0 rows = conflict
//! ```

use chrono::{NaiveDate, Utc};
use officina_core::validation::{validate_amount, validate_uuid};
use officina_core::{IntentDeclaration, Money, ValidationError};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::expect_one_row;

const SELECT_DECLARATION: &str = r#"
    SELECT
        id, client_id, protocol_number, declaration_date,
        amount_limit_cents, used_amount_cents, expiry_date, is_active
    FROM intent_declarations
"#;

/// A declaration to register.
#[derive(Debug, Clone)]
pub struct NewDeclaration {
    pub client_id: String,
    pub protocol_number: String,
    pub declaration_date: NaiveDate,
    pub amount_limit: Money,
    pub expiry_date: NaiveDate,
}

/// Repository for declarations of intent.
#[derive(Debug, Clone)]
pub struct DeclarationRepository {
    pool: SqlitePool,
}

impl DeclarationRepository {
    /// Creates a new DeclarationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeclarationRepository { pool }
    }

    /// Registers a declaration with nothing used yet.
    ///
    /// ## Errors
    /// - Validation: blank protocol, non-positive limit, expiry before the
    ///   declaration date
    /// - UniqueViolation: protocol number already registered
    pub async fn register(&self, new: NewDeclaration) -> DbResult<IntentDeclaration> {
        let protocol_number = new.protocol_number.trim().to_string();
        if protocol_number.is_empty() {
            return Err(ValidationError::Required {
                field: "protocol_number".to_string(),
            }
            .into());
        }
        validate_amount("amount_limit", new.amount_limit.cents())?;
        if new.expiry_date < new.declaration_date {
            return Err(ValidationError::InvalidFormat {
                field: "expiry_date".to_string(),
                reason: "must not precede the declaration date".to_string(),
            }
            .into());
        }

        let declaration = IntentDeclaration {
            id: Uuid::new_v4().to_string(),
            client_id: new.client_id,
            protocol_number,
            declaration_date: new.declaration_date,
            amount_limit_cents: new.amount_limit.cents(),
            used_amount_cents: 0,
            expiry_date: new.expiry_date,
            is_active: true,
        };

        sqlx::query(
            r#"
            INSERT INTO intent_declarations (
                id, client_id, protocol_number, declaration_date,
                amount_limit_cents, used_amount_cents, expiry_date, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&declaration.id)
        .bind(&declaration.client_id)
        .bind(&declaration.protocol_number)
        .bind(declaration.declaration_date)
        .bind(declaration.amount_limit_cents)
        .bind(declaration.used_amount_cents)
        .bind(declaration.expiry_date)
        .bind(declaration.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(
            id = %declaration.id,
            client_id = %declaration.client_id,
            protocol = %declaration.protocol_number,
            limit = %declaration.amount_limit(),
            "Declaration of intent registered"
        );

        Ok(declaration)
    }

    /// Gets a declaration by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<IntentDeclaration>> {
        validate_uuid("declaration_id", id)?;
        let sql = format!("{SELECT_DECLARATION} WHERE id = ?");
        let declaration = sqlx::query_as::<_, IntentDeclaration>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(declaration)
    }

    /// Stops a declaration from applying to future invoices.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE intent_declarations SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(officina_core::CoreError::not_found("Declaration of intent", id).into());
        }
        info!(id = %id, "Declaration of intent deactivated");
        Ok(())
    }

    /// The declaration covering `date` for `client_id`, earliest expiry first.
    pub(crate) async fn valid_for(
        conn: &mut SqliteConnection,
        client_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<IntentDeclaration>> {
        let sql = format!(
            "{SELECT_DECLARATION} WHERE client_id = ?1 AND is_active = 1 \
             AND declaration_date <= ?2 AND expiry_date >= ?2 \
             ORDER BY expiry_date ASC, declaration_date ASC LIMIT 1"
        );
        let declaration = sqlx::query_as::<_, IntentDeclaration>(&sql)
            .bind(client_id)
            .bind(date)
            .fetch_optional(&mut *conn)
            .await?;
        debug!(client_id = %client_id, found = declaration.is_some(), "Looked up declaration of intent");
        Ok(declaration)
    }

    /// Consumes `amount` of plafond if it is still available.
    pub(crate) async fn consume(conn: &mut SqliteConnection, id: &str, amount: Money) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE intent_declarations
            SET used_amount_cents = used_amount_cents + ?1
            WHERE id = ?2 AND is_active = 1 AND amount_limit_cents - used_amount_cents >= ?1
            "#,
        )
        .bind(amount.cents())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        expect_one_row(result.rows_affected(), || {
            format!("plafond of declaration {} changed while invoicing", id)
        })
    }

    /// Gives back `amount` of plafond.
    pub(crate) async fn release(conn: &mut SqliteConnection, id: &str, amount: Money) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE intent_declarations
            SET used_amount_cents = used_amount_cents - ?1
            WHERE id = ?2 AND used_amount_cents >= ?1
            "#,
        )
        .bind(amount.cents())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        expect_one_row(result.rows_affected(), || {
            format!("declaration {} has less plafond used than the invoice released", id)
        })
    }
}
