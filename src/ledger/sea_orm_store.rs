//! SeaORM-backed ledger storage.
//!
//! Uniqueness of `external_id`, `reference_id`, and `(provider, event_id)` is
//! carried by unique indexes, and every write is a single atomic statement:
//! `INSERT ... ON CONFLICT UPDATE` for upserts and `INSERT ... ON CONFLICT DO
//! NOTHING` for the idempotency reservation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TryInsertResult,
};
use uuid::Uuid;

use crate::error::{ClearwayError, Result};
use crate::ledger::model::{Invoice, Payout, PayoutStatus, ProcessedEvent, Reconciliation};
use crate::ledger::store::{
    InvoiceUpsert, LedgerStore, PayoutUpsert, ReconciliationUpsert,
};
use crate::webhook::event::Provider;

mod entity {
    pub mod invoice {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "invoices")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(unique)]
            pub external_id: String,
            pub deal_id: Option<String>,
            pub user_id: Option<String>,
            pub amount: i64,
            pub currency: String,
            pub status: String,
            pub issued_at: Option<DateTimeWithTimeZone>,
            pub due_at: Option<DateTimeWithTimeZone>,
            pub invoice_number: Option<String>,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod payout {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "payouts")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(unique)]
            pub reference_id: String,
            pub creator_id: Option<String>,
            pub deal_id: Option<String>,
            pub brand_id: Option<String>,
            pub amount: i64,
            pub currency: String,
            pub status: String,
            pub paid_at: Option<DateTimeWithTimeZone>,
            pub created_by: Option<String>,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod reconciliation {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "reconciliations")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub invoice_id: String,
            pub side: String,
            pub reference_id: String,
            pub amount: i64,
            pub status: String,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod processed_event {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "processed_events")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub provider: String,
            #[sea_orm(primary_key, auto_increment = false)]
            pub event_id: String,
            pub event_type: String,
            pub processed_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{invoice, payout, processed_event, reconciliation};

/// Ledger store backed by a SeaORM database connection.
#[derive(Clone)]
pub struct SeaOrmLedgerStore {
    db: DatabaseConnection,
}

impl SeaOrmLedgerStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn invoice_to_domain(model: invoice::Model) -> Result<Invoice> {
    Ok(Invoice {
        id: model.id,
        external_id: model.external_id,
        deal_id: model.deal_id,
        user_id: model.user_id,
        amount: model.amount,
        currency: model.currency,
        status: model.status.parse().map_err(ClearwayError::Database)?,
        issued_at: model.issued_at.map(|dt| dt.with_timezone(&Utc)),
        due_at: model.due_at.map(|dt| dt.with_timezone(&Utc)),
        invoice_number: model.invoice_number,
    })
}

fn payout_to_domain(model: payout::Model) -> Result<Payout> {
    Ok(Payout {
        id: model.id,
        reference_id: model.reference_id,
        creator_id: model.creator_id,
        deal_id: model.deal_id,
        brand_id: model.brand_id,
        amount: model.amount,
        currency: model.currency,
        status: model.status.parse().map_err(ClearwayError::Database)?,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        created_by: model.created_by,
    })
}

#[async_trait]
impl LedgerStore for SeaOrmLedgerStore {
    async fn upsert_invoice(&self, upsert: InvoiceUpsert) -> Result<Invoice> {
        tracing::debug!(external_id = %upsert.external_id, status = %upsert.status, "upserting invoice");

        let now = Utc::now().fixed_offset();

        let model = invoice::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            external_id: Set(upsert.external_id.clone()),
            deal_id: Set(upsert.deal_id.clone()),
            user_id: Set(upsert.user_id.clone()),
            amount: Set(upsert.amount),
            currency: Set(upsert.currency.clone()),
            status: Set(upsert.status.as_str().to_string()),
            issued_at: Set(upsert.issued_at.map(|dt| dt.fixed_offset())),
            due_at: Set(upsert.due_at.map(|dt| dt.fixed_offset())),
            invoice_number: Set(upsert.invoice_number.clone()),
            updated_at: Set(now),
        };

        // Only overwrite optional columns the event actually carried, so a
        // sparse event never nulls out known data.
        let mut update_columns = vec![
            invoice::Column::Amount,
            invoice::Column::Currency,
            invoice::Column::Status,
            invoice::Column::UpdatedAt,
        ];
        if upsert.issued_at.is_some() {
            update_columns.push(invoice::Column::IssuedAt);
        }
        if upsert.due_at.is_some() {
            update_columns.push(invoice::Column::DueAt);
        }
        if upsert.invoice_number.is_some() {
            update_columns.push(invoice::Column::InvoiceNumber);
        }
        if upsert.user_id.is_some() {
            update_columns.push(invoice::Column::UserId);
        }
        if upsert.deal_id.is_some() {
            update_columns.push(invoice::Column::DealId);
        }

        let model = invoice::Entity::insert(model)
            .on_conflict(
                OnConflict::column(invoice::Column::ExternalId)
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await?;

        invoice_to_domain(model)
    }

    async fn get_invoice_by_external_id(&self, external_id: &str) -> Result<Option<Invoice>> {
        let model = invoice::Entity::find()
            .filter(invoice::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?;

        model.map(invoice_to_domain).transpose()
    }

    async fn upsert_payout(&self, upsert: PayoutUpsert) -> Result<Payout> {
        tracing::debug!(reference_id = %upsert.reference_id, status = %upsert.status, "upserting payout");

        let now = Utc::now().fixed_offset();

        let model = payout::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            reference_id: Set(upsert.reference_id.clone()),
            creator_id: Set(upsert.creator_id.clone()),
            deal_id: Set(upsert.deal_id.clone()),
            brand_id: Set(None),
            created_by: Set(None),
            amount: Set(upsert.amount),
            currency: Set(upsert.currency.clone()),
            status: Set(upsert.status.as_str().to_string()),
            paid_at: Set(upsert.paid_at.map(|dt| dt.fixed_offset())),
            updated_at: Set(now),
        };

        let mut update_columns = vec![
            payout::Column::Amount,
            payout::Column::Currency,
            payout::Column::Status,
            payout::Column::UpdatedAt,
        ];
        if upsert.paid_at.is_some() {
            update_columns.push(payout::Column::PaidAt);
        }
        if upsert.creator_id.is_some() {
            update_columns.push(payout::Column::CreatorId);
        }
        if upsert.deal_id.is_some() {
            update_columns.push(payout::Column::DealId);
        }

        let model = payout::Entity::insert(model)
            .on_conflict(
                OnConflict::column(payout::Column::ReferenceId)
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await?;

        payout_to_domain(model)
    }

    async fn update_payout_status(
        &self,
        reference_id: &str,
        status: PayoutStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Payout>> {
        tracing::debug!(reference_id = %reference_id, status = %status, "updating payout status");

        let mut update = payout::Entity::update_many()
            .col_expr(payout::Column::Status, Expr::value(status.as_str()))
            .col_expr(
                payout::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(payout::Column::ReferenceId.eq(reference_id));

        if let Some(paid_at) = paid_at {
            update = update.col_expr(payout::Column::PaidAt, Expr::value(paid_at.fixed_offset()));
        }

        let result = update.exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        let model = payout::Entity::find()
            .filter(payout::Column::ReferenceId.eq(reference_id))
            .one(&self.db)
            .await?;

        model.map(payout_to_domain).transpose()
    }

    async fn upsert_reconciliation(&self, upsert: ReconciliationUpsert) -> Result<Reconciliation> {
        tracing::debug!(invoice_id = %upsert.invoice_id, status = %upsert.status, "upserting reconciliation");

        let now = Utc::now().fixed_offset();

        let model = reconciliation::ActiveModel {
            invoice_id: Set(upsert.invoice_id.clone()),
            side: Set(upsert.side.clone()),
            reference_id: Set(upsert.reference_id.clone()),
            amount: Set(upsert.amount),
            status: Set(upsert.status.clone()),
            updated_at: Set(now),
        };

        let model = reconciliation::Entity::insert(model)
            .on_conflict(
                OnConflict::column(reconciliation::Column::InvoiceId)
                    .update_columns([
                        reconciliation::Column::Side,
                        reconciliation::Column::ReferenceId,
                        reconciliation::Column::Amount,
                        reconciliation::Column::Status,
                        reconciliation::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await?;

        Ok(Reconciliation {
            invoice_id: model.invoice_id,
            side: model.side,
            reference_id: model.reference_id,
            amount: model.amount,
            status: model.status,
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }

    async fn is_event_processed(&self, provider: Provider, event_id: &str) -> Result<bool> {
        let found = processed_event::Entity::find_by_id((provider.as_str().to_string(), event_id.to_string()))
            .one(&self.db)
            .await?;

        Ok(found.is_some())
    }

    async fn reserve_event(&self, record: ProcessedEvent) -> Result<bool> {
        tracing::debug!(
            provider = %record.provider,
            event_id = %record.event_id,
            "reserving processed event"
        );

        let model = processed_event::ActiveModel {
            provider: Set(record.provider.as_str().to_string()),
            event_id: Set(record.event_id),
            event_type: Set(record.event_type),
            processed_at: Set(record.processed_at.fixed_offset()),
        };

        // INSERT ... ON CONFLICT DO NOTHING; a conflict means another
        // delivery of this event already committed.
        let result = processed_event::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    processed_event::Column::Provider,
                    processed_event::Column::EventId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .do_nothing()
            .exec(&self.db)
            .await?;

        Ok(matches!(result, TryInsertResult::Inserted(_)))
    }

    async fn cleanup_processed_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = processed_event::Entity::delete_many()
            .filter(processed_event::Column::ProcessedAt.lt(older_than.fixed_offset()))
            .exec(&self.db)
            .await?;

        tracing::info!(deleted = result.rows_affected, "cleaned up processed events");
        Ok(result.rows_affected)
    }
}
