pub mod webhook;

pub use webhook::{DeliveryReceipt, WebhookDispatcher, WebhookTarget};
