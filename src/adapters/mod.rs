pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::{
    PostgresOrderStore, PostgresPaymentOrderStore, PostgresRefundStore,
    PostgresSubscriptionStore, PostgresTransactionStore, PostgresUserDirectory,
};
