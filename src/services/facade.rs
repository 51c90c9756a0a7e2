use std::sync::Arc;

use chrono::NaiveDate;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::Actor,
    db::DbPool,
    entities::order::{self, OrderStatus},
    entities::order_item,
    entities::paperwork::{self, PaperworkStatus, PaperworkType},
    errors::ServiceError,
    events::EventSender,
};

use super::{
    cancellations::CancellationService,
    order_status::{BulkStatusOutcome, OrderStatusService},
    orders::{CreateOrderInput, OrderListResponse, OrderService},
    paperwork::{self as paperwork_svc, PaperworkService, RenderedPaperwork},
};

/// The boundary the surrounding API layer calls. Composes the order, status,
/// cancellation and paperwork services and performs the capability check
/// once, before any state-machine call; the services below assume an
/// authorized caller.
#[derive(Clone)]
pub struct OrderFacade {
    orders: OrderService,
    status: OrderStatusService,
    cancellations: CancellationService,
    paperwork: PaperworkService,
}

impl OrderFacade {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        unique_number_max_attempts: u32,
    ) -> Self {
        Self {
            orders: OrderService::new(
                db.clone(),
                event_sender.clone(),
                unique_number_max_attempts,
            ),
            status: OrderStatusService::new(db.clone(), event_sender.clone()),
            cancellations: CancellationService::new(db.clone(), event_sender.clone()),
            paperwork: PaperworkService::new(db, event_sender, unique_number_max_attempts),
        }
    }

    // ----- orders -----------------------------------------------------------

    /// Places an order. Customers always order for their own company; staff
    /// may order on behalf of any company.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.user_id))]
    pub async fn create_order(
        &self,
        actor: &Actor,
        company_id: Option<Uuid>,
        input: CreateOrderInput,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let company_id = match company_id {
            Some(company) if !actor.is_staff() && company != actor.company_id => {
                return Err(ServiceError::Forbidden(
                    "Customers can only place orders for their own company".to_string(),
                ));
            }
            Some(company) => company,
            None => actor.company_id,
        };

        self.orders
            .create_order(company_id, actor.user_id, input)
            .await
    }

    pub async fn get_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        self.load_order_scoped(actor, order_id).await
    }

    /// Looks an order up by its human-readable number, under the same
    /// visibility rule as [`Self::get_order`].
    pub async fn get_order_by_number(
        &self,
        actor: &Actor,
        order_number: &str,
    ) -> Result<order::Model, ServiceError> {
        match self.orders.find_order_by_number(order_number).await? {
            Some(order) if actor.is_staff() || order.company_id == actor.company_id => Ok(order),
            None if actor.is_staff() => Err(ServiceError::NotFound(format!(
                "Order '{order_number}' not found"
            ))),
            _ => Err(ServiceError::NotFound(format!(
                "Order '{order_number}' is not accessible"
            ))),
        }
    }

    pub async fn get_order_items(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        self.load_order_scoped(actor, order_id).await?;
        self.orders.get_order_items(order_id).await
    }

    /// Staff see every order; customers only their own company's.
    pub async fn list_orders(
        &self,
        actor: &Actor,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let company_filter = if actor.is_staff() {
            None
        } else {
            Some(actor.company_id)
        };
        self.orders.list_orders(company_filter, page, per_page).await
    }

    // ----- fulfillment state machine ---------------------------------------

    pub async fn set_status(
        &self,
        actor: &Actor,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        require_staff(actor)?;
        self.status.set_status(order_id, new_status).await
    }

    pub async fn bulk_set_status(
        &self,
        actor: &Actor,
        order_ids: Vec<Uuid>,
        new_status: OrderStatus,
    ) -> Result<BulkStatusOutcome, ServiceError> {
        require_staff(actor)?;
        self.status.bulk_set_status(order_ids, new_status).await
    }

    // ----- cancellation workflow -------------------------------------------

    /// Customers may request cancellation of their own company's orders;
    /// staff of any order.
    pub async fn request_cancellation(
        &self,
        actor: &Actor,
        order_id: Uuid,
        reason: &str,
    ) -> Result<order::Model, ServiceError> {
        self.load_order_scoped(actor, order_id).await?;
        self.cancellations.request_cancellation(order_id, reason).await
    }

    pub async fn approve_cancellation(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        require_staff(actor)?;
        self.cancellations.approve_cancellation(order_id).await
    }

    pub async fn reject_cancellation(
        &self,
        actor: &Actor,
        order_id: Uuid,
        rejection_reason: &str,
    ) -> Result<order::Model, ServiceError> {
        require_staff(actor)?;
        self.cancellations
            .reject_cancellation(order_id, rejection_reason)
            .await
    }

    // ----- paperwork lifecycle ---------------------------------------------

    pub async fn create_document(
        &self,
        actor: &Actor,
        order_id: Uuid,
        doc_type: PaperworkType,
        delivery_date: Option<NaiveDate>,
    ) -> Result<paperwork::Model, ServiceError> {
        require_staff(actor)?;
        self.paperwork
            .create_document(order_id, doc_type, delivery_date, actor.user_id)
            .await
    }

    pub async fn finalize_document(
        &self,
        actor: &Actor,
        order_id: Uuid,
        document_id: Uuid,
    ) -> Result<paperwork::Model, ServiceError> {
        require_staff(actor)?;
        self.load_document_for_order(order_id, document_id).await?;
        self.paperwork.finalize(document_id).await
    }

    pub async fn approve_document(
        &self,
        actor: &Actor,
        order_id: Uuid,
        document_id: Uuid,
    ) -> Result<paperwork::Model, ServiceError> {
        require_staff(actor)?;
        self.load_document_for_order(order_id, document_id).await?;
        self.paperwork.approve(document_id, actor.user_id).await
    }

    /// Staff see every document; customers only the finalized documents of
    /// their own company's orders.
    pub async fn list_documents(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<Vec<paperwork::Model>, ServiceError> {
        self.load_order_scoped(actor, order_id).await?;
        let mut documents = self.paperwork.list_for_order(order_id).await?;
        if !actor.is_staff() {
            documents.retain(|d| d.status == PaperworkStatus::Finalized);
        }
        Ok(documents)
    }

    pub async fn get_document(
        &self,
        actor: &Actor,
        order_id: Uuid,
        document_id: Uuid,
    ) -> Result<paperwork::Model, ServiceError> {
        self.load_order_scoped(actor, order_id).await?;
        let document = self.load_document_for_order(order_id, document_id).await?;
        if !actor.is_staff() && document.status != PaperworkStatus::Finalized {
            return Err(ServiceError::Forbidden(
                "Document is not available until finalized".to_string(),
            ));
        }
        Ok(document)
    }

    /// Renders a document from the live order snapshot. Staff may render any
    /// document regardless of state; customers only finalized documents of
    /// their own company's orders.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id, order_id = %order_id, document_id = %document_id))]
    pub async fn render_document(
        &self,
        actor: &Actor,
        order_id: Uuid,
        document_id: Uuid,
    ) -> Result<RenderedPaperwork, ServiceError> {
        let order = self.load_order_scoped(actor, order_id).await?;
        let document = self.load_document_for_order(order_id, document_id).await?;

        if !actor.is_staff() && document.status != PaperworkStatus::Finalized {
            return Err(ServiceError::Forbidden(
                "Document is not available until finalized".to_string(),
            ));
        }

        let items = self.orders.get_order_items(order_id).await?;
        Ok(paperwork_svc::render(&document, &order, &items))
    }

    // ----- shared guards ---------------------------------------------------

    /// Loads an order under the caller's visibility. Customers get the same
    /// not-accessible response whether the order is missing or owned by
    /// another company.
    async fn load_order_scoped(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        match self.orders.find_order(order_id).await? {
            Some(order) if actor.is_staff() || order.company_id == actor.company_id => Ok(order),
            Some(_) => Err(ServiceError::order_not_accessible(order_id)),
            None if actor.is_staff() => {
                Err(ServiceError::NotFound(format!("Order {order_id} not found")))
            }
            None => Err(ServiceError::order_not_accessible(order_id)),
        }
    }

    async fn load_document_for_order(
        &self,
        order_id: Uuid,
        document_id: Uuid,
    ) -> Result<paperwork::Model, ServiceError> {
        let document = self
            .paperwork
            .find_document(document_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Paperwork {document_id} not found"))
            })?;

        if document.order_id != order_id {
            return Err(ServiceError::BadRequest(format!(
                "Paperwork {document_id} does not belong to order {order_id}"
            )));
        }

        Ok(document)
    }
}

fn require_staff(actor: &Actor) -> Result<(), ServiceError> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Staff role required".to_string()))
    }
}
