pub mod order;
pub mod payment;
pub mod subscription;

pub use order::{Order, OrderStatus};
pub use payment::{
    PaymentMethod, PaymentOrder, PaymentOrderStatus, PaymentRefund, PaymentTransaction,
    RefundStatus, TransactionStatus,
};
pub use subscription::{Subscription, SubscriptionStatus};
