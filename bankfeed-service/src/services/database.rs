//! Database service for bankfeed-service.
//!
//! Every query is tenant-scoped; match-state transitions are single guarded
//! UPDATEs so concurrent callers lose cleanly with a Conflict instead of
//! overwriting each other. Directory tables belong to the document CRUD side
//! of the product and are only ever read here.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use service_core::error::AppError;

use crate::matching::automatch::MatchStore;
use crate::models::{
    BankAccount, BankTransaction, BankUpload, Category, CategoryKind, CustomerSummary,
    Directories, MatchLink, MatchStatus, MatchSuggestion, MatchingRule, OpenBill, OpenInvoice,
    RuleAction, RuleActionKind, RuleConditions, SuggestionKind, TransactionType, VendorSummary,
};
use crate::services::metrics::DB_QUERY_DURATION;

const TRANSACTION_COLUMNS: &str = "transaction_id, tenant_id, bank_account_id, upload_id, \
     transaction_date, description, reference, amount, transaction_type, balance, \
     match_status, matched_customer_id, matched_vendor_id, matched_invoice_id, \
     matched_bill_id, category_id, match_confidence, notes, is_reconciled, \
     reconciled_utc, created_utc";

const RULE_COLUMNS: &str =
    "rule_id, tenant_id, name, priority, is_active, conditions, action_kind, action_target, \
     created_utc";

/// One pre-parsed statement line handed over by the import collaborator.
#[derive(Debug, Clone)]
pub struct ImportedRow {
    pub transaction_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub balance: Option<Decimal>,
}

/// Input for creating a matching rule, validated by the handler.
#[derive(Debug, Clone)]
pub struct NewMatchingRule {
    pub name: String,
    pub priority: i32,
    pub conditions: RuleConditions,
    pub action: RuleAction,
}

/// Partial update for a matching rule; None leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MatchingRuleChanges {
    pub name: Option<String>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
    pub conditions: Option<RuleConditions>,
    pub action: Option<RuleAction>,
}

/// Listing filters for statement lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter {
    pub match_status: Option<MatchStatus>,
    pub transaction_type: Option<TransactionType>,
    pub reconciled: Option<bool>,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "bankfeed-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Bank Account Operations
    // =========================================================================

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn create_bank_account(
        &self,
        tenant_id: Uuid,
        bank_name: &str,
        account_number_masked: &str,
        currency: &str,
    ) -> Result<BankAccount, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_bank_account"])
            .start_timer();

        let account = sqlx::query_as::<_, BankAccount>(
            r#"
            INSERT INTO bank_accounts (bank_account_id, tenant_id, bank_name, account_number_masked, currency)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING bank_account_id, tenant_id, bank_name, account_number_masked, currency, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(bank_name)
        .bind(account_number_masked)
        .bind(currency)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create bank account: {}", e)))?;

        timer.observe_duration();
        info!(bank_account_id = %account.bank_account_id, "Bank account created");

        Ok(account)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, bank_account_id = %bank_account_id))]
    pub async fn get_bank_account(
        &self,
        tenant_id: Uuid,
        bank_account_id: Uuid,
    ) -> Result<Option<BankAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bank_account"])
            .start_timer();

        let account = sqlx::query_as::<_, BankAccount>(
            r#"
            SELECT bank_account_id, tenant_id, bank_name, account_number_masked, currency, created_utc, updated_utc
            FROM bank_accounts
            WHERE tenant_id = $1 AND bank_account_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(bank_account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bank account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_bank_accounts(
        &self,
        tenant_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<BankAccount>, Option<Uuid>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bank_accounts"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let mut accounts = sqlx::query_as::<_, BankAccount>(
            r#"
            SELECT bank_account_id, tenant_id, bank_name, account_number_masked, currency, created_utc, updated_utc
            FROM bank_accounts
            WHERE tenant_id = $1 AND ($2::uuid IS NULL OR bank_account_id > $2)
            ORDER BY bank_account_id
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(page_token)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list bank accounts: {}", e)))?;

        timer.observe_duration();

        let has_more = accounts.len() > limit as usize;
        if has_more {
            accounts.pop();
        }
        let next_token = if has_more {
            accounts.last().map(|a| a.bank_account_id)
        } else {
            None
        };

        Ok((accounts, next_token))
    }

    // =========================================================================
    // Import Operations
    // =========================================================================

    /// Record an import batch and its statement lines atomically. Lines land
    /// with status `unmatched` and no linkage.
    #[instrument(skip(self, rows), fields(tenant_id = %tenant_id, bank_account_id = %bank_account_id, count = rows.len()))]
    pub async fn import_transactions(
        &self,
        tenant_id: Uuid,
        bank_account_id: Uuid,
        file_name: &str,
        bank_preset: Option<&str>,
        rows: &[ImportedRow],
    ) -> Result<BankUpload, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["import_transactions"])
            .start_timer();

        let mut txn = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin import: {}", e))
        })?;

        let upload = sqlx::query_as::<_, BankUpload>(
            r#"
            INSERT INTO bank_uploads (upload_id, tenant_id, bank_account_id, file_name, bank_preset, transaction_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING upload_id, tenant_id, bank_account_id, file_name, bank_preset, transaction_count, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(bank_account_id)
        .bind(file_name)
        .bind(bank_preset)
        .bind(rows.len() as i32)
        .fetch_one(&mut *txn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create upload: {}", e)))?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO bank_transactions (transaction_id, tenant_id, bank_account_id, upload_id, transaction_date, description, reference, amount, transaction_type, balance, match_status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'unmatched')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(bank_account_id)
            .bind(upload.upload_id)
            .bind(row.transaction_date)
            .bind(&row.description)
            .bind(&row.reference)
            .bind(row.amount)
            .bind(row.transaction_type)
            .bind(row.balance)
            .execute(&mut *txn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert transaction: {}", e))
            })?;
        }

        txn.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit import: {}", e))
        })?;

        timer.observe_duration();
        info!(
            upload_id = %upload.upload_id,
            count = upload.transaction_count,
            "Import batch recorded"
        );

        Ok(upload)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn get_bank_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bank_transaction"])
            .start_timer();

        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
             WHERE tenant_id = $1 AND transaction_id = $2"
        );
        let transaction = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get bank transaction: {}", e))
            })?;

        timer.observe_duration();
        Ok(transaction)
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id, bank_account_id = %bank_account_id))]
    pub async fn list_transactions(
        &self,
        tenant_id: Uuid,
        bank_account_id: Uuid,
        filter: TransactionFilter,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<(Vec<BankTransaction>, Option<Uuid>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_transactions"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
             WHERE tenant_id = $1 AND bank_account_id = $2 \
               AND ($3::match_status IS NULL OR match_status = $3) \
               AND ($4::transaction_type IS NULL OR transaction_type = $4) \
               AND ($5::boolean IS NULL OR is_reconciled = $5) \
               AND ($6::uuid IS NULL OR transaction_id > $6) \
             ORDER BY transaction_id \
             LIMIT $7"
        );
        let mut transactions = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(bank_account_id)
            .bind(filter.match_status)
            .bind(filter.transaction_type)
            .bind(filter.reconciled)
            .bind(page_token)
            .bind(limit + 1)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list transactions: {}", e))
            })?;

        timer.observe_duration();

        let has_more = transactions.len() > limit as usize;
        if has_more {
            transactions.pop();
        }
        let next_token = if has_more {
            transactions.last().map(|t| t.transaction_id)
        } else {
            None
        };

        Ok((transactions, next_token))
    }

    // =========================================================================
    // Match State Transitions
    // =========================================================================

    /// Link a transaction as matched. Guarded on the current status being
    /// `unmatched` or `suggested`; re-applying an identical link to an
    /// already-matched transaction is a no-op.
    #[instrument(skip(self, link), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn apply_match(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        link: &MatchLink,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_match"])
            .start_timer();

        let sql = format!(
            "UPDATE bank_transactions \
             SET match_status = 'matched', \
                 matched_customer_id = $3, \
                 matched_vendor_id = $4, \
                 matched_invoice_id = $5, \
                 matched_bill_id = $6, \
                 category_id = $7, \
                 match_confidence = $8 \
             WHERE tenant_id = $1 AND transaction_id = $2 \
               AND match_status IN ('unmatched', 'suggested') \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .bind(link.customer_id)
            .bind(link.vendor_id)
            .bind(link.invoice_id)
            .bind(link.bill_id)
            .bind(link.category_id)
            .bind(link.confidence)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to apply match: {}", e)))?;

        timer.observe_duration();

        match updated {
            Some(tx) => {
                info!(transaction_id = %tx.transaction_id, "Transaction matched");
                Ok(tx)
            }
            None => {
                let current = self
                    .get_bank_transaction(tenant_id, transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;
                if link.already_applied(&current) {
                    Ok(current)
                } else {
                    Err(AppError::Conflict(anyhow::anyhow!(
                        "Transaction is {} and cannot be matched",
                        current.match_status.as_str()
                    )))
                }
            }
        }
    }

    /// Store a heuristic candidate on a transaction, promoting it to
    /// `suggested`. Guarded on the status still being `unmatched`.
    #[instrument(skip(self, suggestion), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn mark_suggested(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        suggestion: &MatchSuggestion,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_suggested"])
            .start_timer();

        let (customer_id, vendor_id) = match suggestion.kind {
            SuggestionKind::Customer => (Some(suggestion.target_id), None),
            SuggestionKind::Vendor => (None, Some(suggestion.target_id)),
            SuggestionKind::Invoice | SuggestionKind::Bill => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only name-based suggestions can be stored on a transaction"
                )))
            }
        };

        let sql = format!(
            "UPDATE bank_transactions \
             SET match_status = 'suggested', \
                 matched_customer_id = $3, \
                 matched_vendor_id = $4, \
                 match_confidence = $5 \
             WHERE tenant_id = $1 AND transaction_id = $2 AND match_status = 'unmatched' \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .bind(customer_id)
            .bind(vendor_id)
            .bind(suggestion.confidence)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to store suggestion: {}", e))
            })?;

        timer.observe_duration();

        match updated {
            Some(tx) => Ok(tx),
            None => {
                self.get_bank_transaction(tenant_id, transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Transaction is no longer unmatched"
                )))
            }
        }
    }

    /// Confirm a stored suggestion, keeping its linkage.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn accept_suggestion(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["accept_suggestion"])
            .start_timer();

        let sql = format!(
            "UPDATE bank_transactions \
             SET match_status = 'matched' \
             WHERE tenant_id = $1 AND transaction_id = $2 AND match_status = 'suggested' \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to accept suggestion: {}", e))
            })?;

        timer.observe_duration();

        match updated {
            Some(tx) => Ok(tx),
            None => {
                self.get_bank_transaction(tenant_id, transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Transaction has no pending suggestion"
                )))
            }
        }
    }

    /// Discard a stored suggestion, clearing every linkage field.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn reject_suggestion(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reject_suggestion"])
            .start_timer();

        let sql = format!(
            "UPDATE bank_transactions \
             SET match_status = 'unmatched', \
                 matched_customer_id = NULL, \
                 matched_vendor_id = NULL, \
                 matched_invoice_id = NULL, \
                 matched_bill_id = NULL, \
                 match_confidence = NULL \
             WHERE tenant_id = $1 AND transaction_id = $2 AND match_status = 'suggested' \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to reject suggestion: {}", e))
            })?;

        timer.observe_duration();

        match updated {
            Some(tx) => Ok(tx),
            None => {
                self.get_bank_transaction(tenant_id, transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Transaction has no pending suggestion"
                )))
            }
        }
    }

    /// Undo a match, returning the transaction to `unmatched`. Refused for
    /// reconciled transactions.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn unmatch_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["unmatch_transaction"])
            .start_timer();

        let sql = format!(
            "UPDATE bank_transactions \
             SET match_status = 'unmatched', \
                 matched_customer_id = NULL, \
                 matched_vendor_id = NULL, \
                 matched_invoice_id = NULL, \
                 matched_bill_id = NULL, \
                 category_id = NULL, \
                 match_confidence = NULL \
             WHERE tenant_id = $1 AND transaction_id = $2 \
               AND match_status = 'matched' AND is_reconciled = FALSE \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to unmatch transaction: {}", e))
            })?;

        timer.observe_duration();

        match updated {
            Some(tx) => Ok(tx),
            None => {
                let current = self
                    .get_bank_transaction(tenant_id, transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;
                if current.is_reconciled {
                    Err(AppError::Conflict(anyhow::anyhow!(
                        "Cannot unmatch a reconciled transaction"
                    )))
                } else {
                    Err(AppError::Conflict(anyhow::anyhow!(
                        "Transaction is not matched"
                    )))
                }
            }
        }
    }

    /// Exclude an unmatched transaction from matching; an optional reason is
    /// kept in the notes.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn exclude_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        reason: Option<&str>,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["exclude_transaction"])
            .start_timer();

        let sql = format!(
            "UPDATE bank_transactions \
             SET match_status = 'excluded', notes = COALESCE($3, notes) \
             WHERE tenant_id = $1 AND transaction_id = $2 AND match_status = 'unmatched' \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to exclude transaction: {}", e))
            })?;

        timer.observe_duration();

        match updated {
            Some(tx) => Ok(tx),
            None => {
                self.get_bank_transaction(tenant_id, transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Only unmatched transactions can be excluded"
                )))
            }
        }
    }

    /// Flag a matched transaction as reconciled against the statement.
    /// Re-reconciling is a no-op; any other status is a conflict.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %transaction_id))]
    pub async fn reconcile_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reconcile_transaction"])
            .start_timer();

        let sql = format!(
            "UPDATE bank_transactions \
             SET is_reconciled = TRUE, reconciled_utc = NOW() \
             WHERE tenant_id = $1 AND transaction_id = $2 \
               AND match_status = 'matched' AND is_reconciled = FALSE \
             RETURNING {TRANSACTION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to reconcile transaction: {}", e))
            })?;

        timer.observe_duration();

        match updated {
            Some(tx) => {
                info!(transaction_id = %tx.transaction_id, "Transaction reconciled");
                Ok(tx)
            }
            None => {
                let current = self
                    .get_bank_transaction(tenant_id, transaction_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;
                if current.is_reconciled {
                    Ok(current)
                } else {
                    Err(AppError::Conflict(anyhow::anyhow!(
                        "Only matched transactions can be reconciled"
                    )))
                }
            }
        }
    }

    // =========================================================================
    // Stats
    // =========================================================================

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn transaction_stats(
        &self,
        tenant_id: Uuid,
        bank_account_id: Option<Uuid>,
    ) -> Result<crate::models::TransactionStats, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transaction_stats"])
            .start_timer();

        let stats = sqlx::query_as::<_, crate::models::TransactionStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE match_status = 'unmatched') AS unmatched,
                COUNT(*) FILTER (WHERE match_status = 'suggested') AS suggested,
                COUNT(*) FILTER (WHERE match_status = 'matched') AS matched,
                COUNT(*) FILTER (WHERE match_status = 'excluded') AS excluded,
                COUNT(*) FILTER (WHERE is_reconciled) AS reconciled,
                COALESCE(SUM(amount) FILTER (WHERE transaction_type = 'deposit'), 0) AS total_deposits,
                COALESCE(SUM(amount) FILTER (WHERE transaction_type = 'withdrawal'), 0) AS total_withdrawals,
                COUNT(*) FILTER (WHERE transaction_type = 'deposit') AS deposit_count,
                COUNT(*) FILTER (WHERE transaction_type = 'withdrawal') AS withdrawal_count
            FROM bank_transactions
            WHERE tenant_id = $1 AND ($2::uuid IS NULL OR bank_account_id = $2)
            "#,
        )
        .bind(tenant_id)
        .bind(bank_account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to compute stats: {}", e)))?;

        timer.observe_duration();
        Ok(stats)
    }

    // =========================================================================
    // Matching Rule Operations
    // =========================================================================

    #[instrument(skip(self, rule), fields(tenant_id = %tenant_id))]
    pub async fn create_matching_rule(
        &self,
        tenant_id: Uuid,
        rule: &NewMatchingRule,
    ) -> Result<MatchingRule, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_matching_rule"])
            .start_timer();

        let sql = format!(
            "INSERT INTO matching_rules (rule_id, tenant_id, name, priority, conditions, action_kind, action_target) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {RULE_COLUMNS}"
        );
        let created = sqlx::query_as::<_, MatchingRule>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&rule.name)
            .bind(rule.priority)
            .bind(Json(&rule.conditions))
            .bind(rule.action.kind)
            .bind(rule.action.target_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create matching rule: {}", e))
            })?;

        timer.observe_duration();
        info!(rule_id = %created.rule_id, "Matching rule created");

        Ok(created)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    pub async fn get_matching_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
    ) -> Result<Option<MatchingRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_matching_rule"])
            .start_timer();

        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM matching_rules \
             WHERE tenant_id = $1 AND rule_id = $2"
        );
        let rule = sqlx::query_as::<_, MatchingRule>(&sql)
            .bind(tenant_id)
            .bind(rule_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get matching rule: {}", e))
            })?;

        timer.observe_duration();
        Ok(rule)
    }

    /// Rules for a tenant in evaluation order: ascending priority, ties by
    /// rule id. Rule lists are small; no pagination.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_matching_rules(
        &self,
        tenant_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<MatchingRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_matching_rules"])
            .start_timer();

        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM matching_rules \
             WHERE tenant_id = $1 AND ($2 = FALSE OR is_active = TRUE) \
             ORDER BY priority, rule_id"
        );
        let rules = sqlx::query_as::<_, MatchingRule>(&sql)
            .bind(tenant_id)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list matching rules: {}", e))
            })?;

        timer.observe_duration();
        Ok(rules)
    }

    #[instrument(skip(self, changes), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    pub async fn update_matching_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
        changes: &MatchingRuleChanges,
    ) -> Result<Option<MatchingRule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_matching_rule"])
            .start_timer();

        let (action_kind, action_target): (Option<RuleActionKind>, Option<Uuid>) = match changes
            .action
        {
            Some(action) => (Some(action.kind), Some(action.target_id)),
            None => (None, None),
        };

        let sql = format!(
            "UPDATE matching_rules \
             SET name = COALESCE($3, name), \
                 priority = COALESCE($4, priority), \
                 is_active = COALESCE($5, is_active), \
                 conditions = COALESCE($6, conditions), \
                 action_kind = COALESCE($7, action_kind), \
                 action_target = COALESCE($8, action_target) \
             WHERE tenant_id = $1 AND rule_id = $2 \
             RETURNING {RULE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, MatchingRule>(&sql)
            .bind(tenant_id)
            .bind(rule_id)
            .bind(changes.name.as_deref())
            .bind(changes.priority)
            .bind(changes.is_active)
            .bind(changes.conditions.as_ref().map(Json))
            .bind(action_kind)
            .bind(action_target)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update matching rule: {}", e))
            })?;

        timer.observe_duration();
        Ok(updated)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, rule_id = %rule_id))]
    pub async fn delete_matching_rule(
        &self,
        tenant_id: Uuid,
        rule_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_matching_rule"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM matching_rules
            WHERE tenant_id = $1 AND rule_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(rule_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete matching rule: {}", e))
        })?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Category Operations
    // =========================================================================

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn create_category(
        &self,
        tenant_id: Uuid,
        name: &str,
        kind: CategoryKind,
        color: Option<&str>,
    ) -> Result<Category, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_category"])
            .start_timer();

        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (category_id, tenant_id, name, kind, color)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING category_id, tenant_id, name, kind, color, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(name)
        .bind(kind)
        .bind(color)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create category: {}", e)))?;

        timer.observe_duration();
        Ok(category)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_categories(&self, tenant_id: Uuid) -> Result<Vec<Category>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_categories"])
            .start_timer();

        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT category_id, tenant_id, name, kind, color, created_utc
            FROM categories
            WHERE tenant_id = $1
            ORDER BY name, category_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list categories: {}", e)))?;

        timer.observe_duration();
        Ok(categories)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, category_id = %category_id))]
    pub async fn get_category(
        &self,
        tenant_id: Uuid,
        category_id: Uuid,
    ) -> Result<Option<Category>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_category"])
            .start_timer();

        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT category_id, tenant_id, name, kind, color, created_utc
            FROM categories
            WHERE tenant_id = $1 AND category_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get category: {}", e)))?;

        timer.observe_duration();
        Ok(category)
    }

    // =========================================================================
    // Directory Reads (external collaborator data)
    // =========================================================================

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn customer_directory(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<CustomerSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["customer_directory"])
            .start_timer();

        let customers = sqlx::query_as::<_, CustomerSummary>(
            r#"
            SELECT customer_id, name
            FROM customers
            WHERE tenant_id = $1
            ORDER BY customer_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Customer directory unavailable: {}", e))
        })?;

        timer.observe_duration();
        Ok(customers)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn vendor_directory(&self, tenant_id: Uuid) -> Result<Vec<VendorSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["vendor_directory"])
            .start_timer();

        let vendors = sqlx::query_as::<_, VendorSummary>(
            r#"
            SELECT vendor_id, name
            FROM vendors
            WHERE tenant_id = $1
            ORDER BY vendor_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Vendor directory unavailable: {}", e))
        })?;

        timer.observe_duration();
        Ok(vendors)
    }

    /// Unpaid/sent invoices with totals summed from their line items.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn open_invoices(&self, tenant_id: Uuid) -> Result<Vec<OpenInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, OpenInvoice>(
            r#"
            SELECT i.invoice_id, i.customer_id,
                   COALESCE(SUM(li.quantity * li.unit_price), 0) AS total_amount
            FROM invoices i
            LEFT JOIN invoice_line_items li ON li.invoice_id = i.invoice_id
            WHERE i.tenant_id = $1 AND i.status IN ('sent', 'unpaid')
            GROUP BY i.invoice_id, i.customer_id
            ORDER BY i.invoice_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Invoice directory unavailable: {}", e))
        })?;

        timer.observe_duration();
        Ok(invoices)
    }

    /// Pending/overdue bills.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn open_bills(&self, tenant_id: Uuid) -> Result<Vec<OpenBill>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["open_bills"])
            .start_timer();

        let bills = sqlx::query_as::<_, OpenBill>(
            r#"
            SELECT bill_id, vendor_id, total_amount
            FROM bills
            WHERE tenant_id = $1 AND status IN ('pending', 'overdue')
            ORDER BY bill_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Bill directory unavailable: {}", e))
        })?;

        timer.observe_duration();
        Ok(bills)
    }

    pub async fn customer_exists(&self, tenant_id: Uuid, customer_id: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM customers WHERE tenant_id = $1 AND customer_id = $2)",
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Customer directory unavailable: {}", e))
        })?;
        Ok(exists)
    }

    pub async fn vendor_exists(&self, tenant_id: Uuid, vendor_id: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM vendors WHERE tenant_id = $1 AND vendor_id = $2)",
        )
        .bind(tenant_id)
        .bind(vendor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Vendor directory unavailable: {}", e))
        })?;
        Ok(exists)
    }

    /// One invoice regardless of status, for explicit matching and the
    /// customer back-fill.
    pub async fn invoice_summary(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<OpenInvoice>, AppError> {
        let invoice = sqlx::query_as::<_, OpenInvoice>(
            r#"
            SELECT i.invoice_id, i.customer_id,
                   COALESCE(SUM(li.quantity * li.unit_price), 0) AS total_amount
            FROM invoices i
            LEFT JOIN invoice_line_items li ON li.invoice_id = i.invoice_id
            WHERE i.tenant_id = $1 AND i.invoice_id = $2
            GROUP BY i.invoice_id, i.customer_id
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Invoice directory unavailable: {}", e))
        })?;
        Ok(invoice)
    }

    /// One bill regardless of status, for explicit matching and the vendor
    /// back-fill.
    pub async fn bill_summary(
        &self,
        tenant_id: Uuid,
        bill_id: Uuid,
    ) -> Result<Option<OpenBill>, AppError> {
        let bill = sqlx::query_as::<_, OpenBill>(
            r#"
            SELECT bill_id, vendor_id, total_amount
            FROM bills
            WHERE tenant_id = $1 AND bill_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::ExternalLookup(anyhow::anyhow!("Bill directory unavailable: {}", e))
        })?;
        Ok(bill)
    }

    /// Snapshot all four candidate directories for a suggestion pass.
    pub async fn directory_snapshot(&self, tenant_id: Uuid) -> Result<Directories, AppError> {
        Ok(Directories {
            customers: self.customer_directory(tenant_id).await?,
            vendors: self.vendor_directory(tenant_id).await?,
            open_invoices: self.open_invoices(tenant_id).await?,
            open_bills: self.open_bills(tenant_id).await?,
        })
    }
}

#[async_trait]
impl MatchStore for Database {
    async fn unmatched_transactions(
        &self,
        tenant_id: Uuid,
        bank_account_id: Option<Uuid>,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["unmatched_transactions"])
            .start_timer();

        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
             WHERE tenant_id = $1 AND match_status = 'unmatched' \
               AND ($2::uuid IS NULL OR bank_account_id = $2) \
             ORDER BY created_utc, transaction_id"
        );
        let transactions = sqlx::query_as::<_, BankTransaction>(&sql)
            .bind(tenant_id)
            .bind(bank_account_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to load unmatched transactions: {}",
                    e
                ))
            })?;

        timer.observe_duration();
        Ok(transactions)
    }

    async fn active_rules(&self, tenant_id: Uuid) -> Result<Vec<MatchingRule>, AppError> {
        self.list_matching_rules(tenant_id, true).await
    }

    async fn directories(&self, tenant_id: Uuid) -> Result<Directories, AppError> {
        self.directory_snapshot(tenant_id).await
    }

    async fn apply_match_link(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        link: &MatchLink,
    ) -> Result<(), AppError> {
        self.apply_match(tenant_id, transaction_id, link)
            .await
            .map(|_| ())
    }

    async fn mark_suggested(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        suggestion: &MatchSuggestion,
    ) -> Result<(), AppError> {
        Database::mark_suggested(self, tenant_id, transaction_id, suggestion)
            .await
            .map(|_| ())
    }
}
