use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vendora API",
        description = "Multi-vendor order lifecycle, payment/courier webhooks, vendor settlement and withdrawals"
    ),
    paths(
        crate::handlers::checkout::begin_checkout,
        crate::handlers::checkout::resume_checkout,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::ship_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::order_invoice,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::shipment_webhooks::shipment_webhook,
        crate::handlers::withdrawals::request_withdrawal,
        crate::handlers::withdrawals::list_withdrawals,
        crate::handlers::withdrawals::approve_withdrawal,
        crate::handlers::withdrawals::reject_withdrawal,
        crate::handlers::withdrawals::pay_withdrawal,
        crate::handlers::vendors::vendor_earnings,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::OrderStatus,
        crate::entities::LineItemStatus,
        crate::entities::WithdrawalStatus,
        crate::services::checkout::BeginCheckoutRequest,
        crate::services::checkout::CheckoutLine,
        crate::services::checkout::CheckoutResponse,
        crate::services::shipping::DispatchOutcome,
        crate::services::shipping::VendorShipment,
        crate::services::shipping::CancelOutcome,
        crate::services::shipment_events::CourierEvent,
        crate::services::shipment_events::ShipmentEventSummary,
        crate::services::withdrawals::RequestWithdrawalInput,
        crate::services::withdrawals::MarkPaidInput,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::LineItemResponse,
        crate::handlers::orders::OrderListResponse,
        crate::handlers::withdrawals::WithdrawalResponse,
        crate::handlers::withdrawals::WithdrawalListResponse,
        crate::handlers::withdrawals::RejectInput,
        crate::handlers::vendors::EarningsResponse,
    )),
    tags(
        (name = "Checkout", description = "Order creation and hosted payment sessions"),
        (name = "Orders", description = "Order lifecycle and shipment orchestration"),
        (name = "Payments", description = "Payment gateway webhook"),
        (name = "Shipments", description = "Courier webhook"),
        (name = "Withdrawals", description = "Vendor payout pipeline"),
        (name = "Vendors", description = "Vendor earnings")
    )
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_default()
}
