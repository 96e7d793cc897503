pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod payload;
pub mod policy;
pub mod types;

pub use dispatcher::AlertDispatcher;
pub use error::{DispatchError, Result};
pub use gateway::{
    DeliveryConfirmation, GatewayError, NotificationGateway, RecipientDirectory, RecipientQuery,
};
pub use payload::AlertPayload;
pub use policy::RetryPolicy;
pub use types::{
    AlertChannel, AttemptStatus, DeliveryReceipt, DeliveryStatus, DispatchAttempt, DispatchStats,
    Recipient, RecipientRole, Trigger, TriggerKind,
};
