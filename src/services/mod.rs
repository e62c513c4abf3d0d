pub mod capture;
pub mod orders;
pub mod payment_orders;
pub mod refunds;
pub mod subscriptions;
pub mod sweeper;
pub mod webhooks;

pub use capture::CaptureEngine;
pub use orders::OrderStateMachine;
pub use payment_orders::{NewPaymentOrder, PaymentOrderManager, PaymentOrderPolicy};
pub use refunds::RefundProcessor;
pub use subscriptions::SubscriptionService;
pub use sweeper::ExpirySweeper;
pub use webhooks::{WebhookDisposition, WebhookProcessor};
