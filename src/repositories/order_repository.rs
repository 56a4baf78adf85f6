use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as Order, Model as OrderModel, OrderStatus,
};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Persistence boundary for orders. The single source of truth: callers
/// re-read through here inside every mutation, never from caches.
#[derive(Debug)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Inserts a new order. Returns `Ok(None)` when the order reference
    /// collided with an existing row so the caller can regenerate.
    pub async fn insert(&self, order: OrderActiveModel) -> Result<Option<OrderModel>, ServiceError> {
        match order.insert(self.base.get_db()).await {
            Ok(model) => Ok(Some(model)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Ok(None),
            Err(e) => Err(ServiceError::DatabaseError(e)),
        }
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Order::find_by_id(id)
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Find an order by its human-readable reference
    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Order::find()
            .filter(Column::OrderReference.eq(reference))
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Compare-and-swap update: applies `changes` only if the row's version
    /// still matches `current.version`, bumping version and `updated_at` in
    /// the same write. `None` signals a lost race; the caller re-reads and
    /// decides whether to retry. This is the only write path for existing
    /// orders.
    pub async fn update_guarded(
        &self,
        current: &OrderModel,
        mut changes: OrderActiveModel,
    ) -> Result<Option<OrderModel>, ServiceError> {
        // The primary key is the filter, never an assignment
        changes.id = ActiveValue::NotSet;
        changes.version = Set(current.version + 1);
        changes.updated_at = Set(Utc::now());

        let result = Order::update_many()
            .set(changes)
            .filter(Column::Id.eq(current.id))
            .filter(Column::Version.eq(current.version))
            .exec(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        // Re-read the committed row; a concurrent hard delete in the gap
        // reports as a lost race rather than a phantom success.
        self.find_by_id(current.id).await
    }

    /// Paginated listing with optional status filter and case-insensitive
    /// substring search over customer name, email, phone, and reference.
    /// Newest orders first. Returns the page plus the total row count.
    pub async fn search(
        &self,
        status: Option<OrderStatus>,
        search: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let mut query = Order::find();

        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }

        if let Some(term) = search {
            let pattern = format!("%{}%", term.trim().to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(Column::CustomerName))).like(&pattern))
                    .add(Expr::expr(Func::lower(Expr::col(Column::CustomerEmail))).like(&pattern))
                    .add(Expr::expr(Func::lower(Expr::col(Column::CustomerPhone))).like(&pattern))
                    .add(
                        Expr::expr(Func::lower(Expr::col(Column::OrderReference))).like(&pattern),
                    ),
            );
        }

        let paginator = query
            .order_by_desc(Column::CreatedAt)
            .paginate(self.base.get_db(), per_page);

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;

        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((orders, total))
    }

    /// Hard delete. Returns whether a row was actually removed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = Order::delete_by_id(id)
            .exec(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(result.rows_affected > 0)
    }
}

impl Repository for OrderRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}
