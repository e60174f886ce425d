use crate::entities::{line_item, order};
use std::fmt::Write as _;

/// Renders an immutable Order + LineItem snapshot into a plain-text invoice
/// document. Stateless; invoked synchronously on demand.
#[derive(Clone, Default)]
pub struct InvoiceRenderer;

impl InvoiceRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, order: &order::Model, items: &[line_item::Model]) -> Vec<u8> {
        let mut doc = String::new();
        let _ = writeln!(doc, "INVOICE {}", order.purchase_number);
        let _ = writeln!(doc, "Order ID: {}", order.id);
        let _ = writeln!(doc, "Date: {}", order.created_at.format("%Y-%m-%d"));
        let _ = writeln!(doc, "Status: {}", order.status);
        if let Some(addr) = &order.billing_address {
            let _ = writeln!(doc, "Billed to: {addr}");
        }
        if let Some(addr) = &order.shipping_address {
            let _ = writeln!(doc, "Shipped to: {addr}");
        }
        let _ = writeln!(doc);
        let _ = writeln!(doc, "{:<40} {:>5} {:>12} {:>12}", "Item", "Qty", "Unit", "Total");
        for item in items {
            let _ = writeln!(
                doc,
                "{:<40} {:>5} {:>12} {:>12}",
                item.product_name, item.quantity, item.unit_price, item.line_total
            );
        }
        let _ = writeln!(doc);
        let _ = writeln!(doc, "{:>59} {:>12}", "Subtotal:", order.subtotal);
        let _ = writeln!(doc, "{:>59} {:>12}", "Shipping:", order.shipping_amount);
        let _ = writeln!(doc, "{:>59} {:>12}", "Tax:", order.tax_amount);
        let _ = writeln!(
            doc,
            "{:>59} {:>12} {}",
            "Total:", order.total_amount, order.currency
        );
        doc.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{LineItemStatus, OrderStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn renders_totals_and_every_line() {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order = order::Model {
            id: order_id,
            purchase_number: "ORD-TEST0001".into(),
            customer_id: Uuid::new_v4(),
            status: OrderStatus::Processing,
            subtotal: dec!(100.00),
            shipping_amount: dec!(10.00),
            tax_amount: dec!(5.00),
            total_amount: dec!(115.00),
            currency: "USD".into(),
            payment_session_id: None,
            shipping_address: None,
            billing_address: None,
            notes: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        let item = line_item::Model {
            id: Uuid::new_v4(),
            order_id,
            vendor_id: Uuid::new_v4(),
            product_name: "Ceramic mug".into(),
            sku: "MUG-01".into(),
            quantity: 4,
            unit_price: dec!(25.00),
            line_total: dec!(100.00),
            status: LineItemStatus::Pending,
            courier_reference: None,
            last_event_desc: None,
            last_event_at: None,
            hub_name: None,
            rider_name: None,
            rider_code: None,
            failure_reason: None,
            pod_image: None,
            settled: false,
            created_at: now,
            updated_at: now,
        };

        let doc = String::from_utf8(InvoiceRenderer::new().render(&order, &[item])).unwrap();
        assert!(doc.contains("ORD-TEST0001"));
        assert!(doc.contains("Ceramic mug"));
        assert!(doc.contains("115.00"));
    }
}
