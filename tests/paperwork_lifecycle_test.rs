//! Tests for the paperwork lifecycle: scoped sequential numbering,
//! draft → finalized progression, receipt approval, deterministic rendering
//! and download access control.

mod common;

use assert_matches::assert_matches;
use chrono::{NaiveDate, Utc};
use common::{customer_of, staff, TestApp};
use lubeline_api::{
    entities::order::OrderStatus,
    entities::paperwork::{PaperworkStatus, PaperworkType},
    errors::ServiceError,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn delivered_order(app: &TestApp, actor: &lubeline_api::auth::Actor) -> Uuid {
    let oil = app.seed_product("GO-220", "Gear Oil SG-220", dec!(1000)).await;
    let order = app.place_order(actor, &[(&oil, 3)]).await;
    let staff = staff();
    app.advance(
        &staff,
        order.id,
        &[
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ],
    )
    .await;
    order.id
}

#[tokio::test]
async fn receipt_is_finalized_then_approved_once() {
    let app = TestApp::new().await;
    let staff = staff();
    let order_id = delivered_order(&app, &staff).await;

    let receipt = app
        .facade
        .create_document(&staff, order_id, PaperworkType::Receipt, None)
        .await
        .expect("receipt created");
    assert_eq!(receipt.status, PaperworkStatus::Draft);
    assert!(!receipt.approved);

    let finalized = app
        .facade
        .finalize_document(&staff, order_id, receipt.id)
        .await
        .expect("finalized");
    assert_eq!(finalized.status, PaperworkStatus::Finalized);

    let approved = app
        .facade
        .approve_document(&staff, order_id, receipt.id)
        .await
        .expect("approved");
    assert!(approved.approved);
    assert_eq!(approved.approved_by, Some(staff.user_id));
    assert!(approved.approved_at.is_some());

    let err = app
        .facade
        .approve_document(&staff, order_id, receipt.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    assert!(err.to_string().contains("already approved"));
}

#[tokio::test]
async fn document_numbers_are_sequential_per_order_and_type() {
    let app = TestApp::new().await;
    let staff = staff();
    let order_id = delivered_order(&app, &staff).await;
    let order = app.facade.get_order(&staff, order_id).await.expect("order");

    let first_receipt = app
        .facade
        .create_document(&staff, order_id, PaperworkType::Receipt, None)
        .await
        .expect("receipt 1");
    let second_receipt = app
        .facade
        .create_document(&staff, order_id, PaperworkType::Receipt, None)
        .await
        .expect("receipt 2");
    let note = app
        .facade
        .create_document(&staff, order_id, PaperworkType::DeliveryNote, None)
        .await
        .expect("delivery note");

    assert_eq!(
        first_receipt.document_number,
        format!("RC-{}-01", order.order_number)
    );
    assert_eq!(
        second_receipt.document_number,
        format!("RC-{}-02", order.order_number)
    );
    // Delivery-note numbering is scoped independently of receipts.
    assert_eq!(note.document_number, format!("DN-{}-01", order.order_number));
}

#[tokio::test]
async fn delivery_date_defaults_to_creation_date() {
    let app = TestApp::new().await;
    let staff = staff();
    let order_id = delivered_order(&app, &staff).await;

    let defaulted = app
        .facade
        .create_document(&staff, order_id, PaperworkType::DeliveryNote, None)
        .await
        .expect("created");
    assert_eq!(defaulted.delivery_date, Utc::now().date_naive());

    let explicit_date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
    let explicit = app
        .facade
        .create_document(&staff, order_id, PaperworkType::DeliveryNote, Some(explicit_date))
        .await
        .expect("created");
    assert_eq!(explicit.delivery_date, explicit_date);
}

#[tokio::test]
async fn finalize_is_irreversible_and_single_shot() {
    let app = TestApp::new().await;
    let staff = staff();
    let order_id = delivered_order(&app, &staff).await;

    let note = app
        .facade
        .create_document(&staff, order_id, PaperworkType::DeliveryNote, None)
        .await
        .expect("created");

    app.facade
        .finalize_document(&staff, order_id, note.id)
        .await
        .expect("finalized");

    let err = app
        .facade
        .finalize_document(&staff, order_id, note.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    assert!(err.to_string().contains("already finalized"));
}

#[tokio::test]
async fn approval_requires_a_finalized_receipt() {
    let app = TestApp::new().await;
    let staff = staff();
    let order_id = delivered_order(&app, &staff).await;

    // Draft receipt: not approvable yet.
    let receipt = app
        .facade
        .create_document(&staff, order_id, PaperworkType::Receipt, None)
        .await
        .expect("created");
    let err = app
        .facade
        .approve_document(&staff, order_id, receipt.id)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must be finalized"));

    // Delivery notes are never approvable.
    let note = app
        .facade
        .create_document(&staff, order_id, PaperworkType::DeliveryNote, None)
        .await
        .expect("created");
    app.facade
        .finalize_document(&staff, order_id, note.id)
        .await
        .expect("finalized");
    let err = app
        .facade
        .approve_document(&staff, order_id, note.id)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Only receipts"));
}

#[tokio::test]
async fn documents_require_an_existing_order() {
    let app = TestApp::new().await;
    let staff = staff();

    let err = app
        .facade
        .create_document(&staff, Uuid::new_v4(), PaperworkType::Receipt, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn document_order_mismatch_is_a_distinct_error() {
    let app = TestApp::new().await;
    let staff = staff();
    let first_order = delivered_order(&app, &staff).await;
    let oil = app.seed_product("GO-221", "Gear Oil SG-320", dec!(1200)).await;
    let second_order = app.place_order(&staff, &[(&oil, 1)]).await;

    let document = app
        .facade
        .create_document(&staff, first_order, PaperworkType::Receipt, None)
        .await
        .expect("created");

    let err = app
        .facade
        .finalize_document(&staff, second_order.id, document.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BadRequest(_));
    assert!(err.to_string().contains("does not belong"));
}

#[tokio::test]
async fn render_is_idempotent_and_reflects_approval() {
    let app = TestApp::new().await;
    let staff = staff();
    let order_id = delivered_order(&app, &staff).await;

    let receipt = app
        .facade
        .create_document(&staff, order_id, PaperworkType::Receipt, None)
        .await
        .expect("created");
    app.facade
        .finalize_document(&staff, order_id, receipt.id)
        .await
        .expect("finalized");

    let first = app
        .facade
        .render_document(&staff, order_id, receipt.id)
        .await
        .expect("rendered");
    let second = app
        .facade
        .render_document(&staff, order_id, receipt.id)
        .await
        .expect("rendered");
    assert_eq!(first, second);
    assert_eq!(first.to_plain_text(), second.to_plain_text());
    assert!(first.to_plain_text().contains("RECEIPT"));
    assert!(first.to_plain_text().contains("TOTAL: 3000"));
    assert!(!first.to_plain_text().contains("Approved by"));

    app.facade
        .approve_document(&staff, order_id, receipt.id)
        .await
        .expect("approved");

    let stamped = app
        .facade
        .render_document(&staff, order_id, receipt.id)
        .await
        .expect("rendered");
    assert!(stamped
        .to_plain_text()
        .contains(&format!("Approved by {}", staff.user_id)));
}

// ==================== Access control ====================

#[tokio::test]
async fn customers_download_only_finalized_documents_of_their_orders() {
    let app = TestApp::new().await;
    let staff_actor = staff();
    let company_id = Uuid::new_v4();
    let owner = customer_of(company_id);
    let outsider = customer_of(Uuid::new_v4());

    let order_id = delivered_order(&app, &owner).await;
    let receipt = app
        .facade
        .create_document(&staff_actor, order_id, PaperworkType::Receipt, None)
        .await
        .expect("created");

    // Draft: the owning customer is refused, staff may render.
    let err = app
        .facade
        .render_document(&owner, order_id, receipt.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    app.facade
        .render_document(&staff_actor, order_id, receipt.id)
        .await
        .expect("staff render drafts");

    app.facade
        .finalize_document(&staff_actor, order_id, receipt.id)
        .await
        .expect("finalized");

    // Finalized: the owner may render, outsiders get the uniform
    // not-accessible response.
    let rendered = app
        .facade
        .render_document(&owner, order_id, receipt.id)
        .await
        .expect("owner render");
    assert!(rendered.to_plain_text().contains("RECEIPT"));

    let err = app
        .facade
        .render_document(&outsider, order_id, receipt.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert!(err.to_string().contains("not accessible"));
}

#[tokio::test]
async fn customers_list_only_finalized_documents() {
    let app = TestApp::new().await;
    let staff_actor = staff();
    let owner = customer_of(Uuid::new_v4());

    let order_id = delivered_order(&app, &owner).await;
    let draft = app
        .facade
        .create_document(&staff_actor, order_id, PaperworkType::Receipt, None)
        .await
        .expect("created");
    let finalized = app
        .facade
        .create_document(&staff_actor, order_id, PaperworkType::DeliveryNote, None)
        .await
        .expect("created");
    app.facade
        .finalize_document(&staff_actor, order_id, finalized.id)
        .await
        .expect("finalized");

    let staff_view = app
        .facade
        .list_documents(&staff_actor, order_id)
        .await
        .expect("list");
    assert_eq!(staff_view.len(), 2);

    let customer_view = app
        .facade
        .list_documents(&owner, order_id)
        .await
        .expect("list");
    assert_eq!(customer_view.len(), 1);
    assert_eq!(customer_view[0].id, finalized.id);
    assert!(customer_view.iter().all(|d| d.id != draft.id));
}

#[tokio::test]
async fn paperwork_mutation_is_staff_only() {
    let app = TestApp::new().await;
    let staff_actor = staff();
    let owner = customer_of(Uuid::new_v4());
    let order_id = delivered_order(&app, &owner).await;

    let err = app
        .facade
        .create_document(&owner, order_id, PaperworkType::Receipt, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let receipt = app
        .facade
        .create_document(&staff_actor, order_id, PaperworkType::Receipt, None)
        .await
        .expect("created");

    let err = app
        .facade
        .finalize_document(&owner, order_id, receipt.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let err = app
        .facade
        .approve_document(&owner, order_id, receipt.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}
