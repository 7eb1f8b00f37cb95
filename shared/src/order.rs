//! Order domain model
//!
//! The aggregate is the unit of caching: header, lines and status travel
//! together, and every applied change bumps the revision counter. Conflict
//! resolution is revision-based, never wall-clock based.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cursor marking the last store change sequence the cache has absorbed.
///
/// The backing store assigns a monotonically increasing `BIGINT` sequence to
/// every insert/update, so the watermark is a plain number, not a timestamp.
/// It only ever moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Watermark(pub i64);

impl Watermark {
    /// Earliest representable value; an empty cache starts here, which makes
    /// the first delta an effective full load.
    pub const ZERO: Watermark = Watermark(0);

    /// Advance to `marker` if it is ahead, otherwise stay put.
    pub fn advanced_to(self, marker: i64) -> Watermark {
        Watermark(self.0.max(marker))
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order status
///
/// Linear flow `Received -> Confirmed -> InPreparation -> Completed ->
/// Archived`, plus `Cancelled` as an absorbing state reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Received,
    Confirmed,
    InPreparation,
    Completed,
    Archived,
    Cancelled,
}

impl OrderStatus {
    /// Whether no further transition is allowed out of this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Archived | OrderStatus::Cancelled)
    }

    /// The single forward successor in the linear flow, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Received => Some(OrderStatus::Confirmed),
            OrderStatus::Confirmed => Some(OrderStatus::InPreparation),
            OrderStatus::InPreparation => Some(OrderStatus::Completed),
            OrderStatus::Completed => Some(OrderStatus::Archived),
            OrderStatus::Archived | OrderStatus::Cancelled => None,
        }
    }

    /// Transition check used by the write path before anything hits the
    /// store: only the forward step or cancellation from a non-terminal
    /// state is legal.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if *self == target {
            return false;
        }
        if target == OrderStatus::Cancelled {
            return !self.is_terminal();
        }
        self.next() == Some(target)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::InPreparation => "IN_PREPARATION",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Archived => "ARCHIVED",
            OrderStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// A single order line
///
/// Lines have no identity outside their aggregate; they are addressed by
/// `position` within the order and replaced wholesale with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    /// Position within the order (stable, 0-based)
    pub position: u32,
    /// Product code
    pub product_code: String,
    /// Product description
    #[serde(default)]
    pub description: String,
    /// Quantity
    pub quantity: Decimal,
    /// Unit of measure
    pub unit: String,
    /// Unit price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    /// Set when the line was edited after the order arrived
    #[serde(default)]
    pub modified: bool,
    /// Set when the line was removed upstream; kept so the UI can show it
    /// struck through instead of silently disappearing
    #[serde(default)]
    pub removed: bool,
}

/// Order aggregate - the unit of caching and replacement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAggregate {
    /// Order serial (unique, stable identifier)
    pub serial: String,
    /// Human-facing order number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    /// Customer name
    pub customer_name: String,
    /// Department the order is assigned to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Operator the order is assigned to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Due / pickup date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<chrono::NaiveDate>,
    /// Whether a cashier confirmed the order
    #[serde(default)]
    pub confirmed: bool,
    /// Current status
    pub status: OrderStatus,
    /// Line items (aggregate exclusively owns its lines)
    pub lines: Vec<OrderLine>,
    /// Creation timestamp (Unix millis)
    pub created_at: i64,
    /// Last modification timestamp (Unix millis)
    pub updated_at: i64,
    /// Monotonic per-order revision; bumped by every applied change
    pub revision: u64,
}

impl OrderAggregate {
    /// Create a fresh aggregate in `Received` state.
    pub fn new(serial: impl Into<String>, customer_name: impl Into<String>) -> Self {
        let now = crate::util::now_millis();
        Self {
            serial: serial.into(),
            order_number: None,
            customer_name: customer_name.into(),
            department: None,
            operator: None,
            due_date: None,
            confirmed: false,
            status: OrderStatus::Received,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 1,
        }
    }

    /// Lines that are still part of the order (not struck through).
    pub fn active_lines(&self) -> impl Iterator<Item = &OrderLine> {
        self.lines.iter().filter(|l| !l.removed)
    }

    pub fn line_at(&self, position: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.position == position)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_linear_flow() {
        let mut status = OrderStatus::Received;
        let expected = [
            OrderStatus::Confirmed,
            OrderStatus::InPreparation,
            OrderStatus::Completed,
            OrderStatus::Archived,
        ];
        for next in expected {
            assert!(status.can_transition_to(next));
            status = next;
        }
        assert!(status.is_terminal());
        assert_eq!(status.next(), None);
    }

    #[test]
    fn test_status_no_skipping() {
        assert!(!OrderStatus::Received.can_transition_to(OrderStatus::InPreparation));
        assert!(!OrderStatus::Received.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Received));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Confirmed));
    }

    #[test]
    fn test_cancel_absorbing() {
        assert!(OrderStatus::Received.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::InPreparation.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Completed.can_transition_to(OrderStatus::Cancelled));
        // Terminal states stay terminal
        assert!(!OrderStatus::Archived.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Received));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_watermark_monotonic() {
        let w = Watermark::ZERO;
        let w = w.advanced_to(5);
        assert_eq!(w, Watermark(5));
        // Never moves backwards
        assert_eq!(w.advanced_to(3), Watermark(5));
        assert_eq!(w.advanced_to(5), Watermark(5));
        assert_eq!(w.advanced_to(9), Watermark(9));
    }

    #[test]
    fn test_active_lines_skip_removed() {
        let mut order = OrderAggregate::new("S-1", "Rossi");
        order.lines = vec![
            OrderLine {
                position: 0,
                product_code: "ART-01".into(),
                description: String::new(),
                quantity: Decimal::from(2),
                unit: "PZ".into(),
                unit_price: None,
                modified: false,
                removed: false,
            },
            OrderLine {
                position: 1,
                product_code: "ART-02".into(),
                description: String::new(),
                quantity: Decimal::from(1),
                unit: "KG".into(),
                unit_price: None,
                modified: true,
                removed: true,
            },
        ];
        assert_eq!(order.active_lines().count(), 1);
        assert!(order.line_at(1).unwrap().removed);
    }
}
