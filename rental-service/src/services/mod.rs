//! Engine services: pure calculators plus the database and gateway
//! layers that drive them.

pub mod database;
pub mod gateway;
pub mod metrics;
pub mod pricing;
pub mod processor;
pub mod settlement;
pub mod state_machine;

pub use database::Database;
pub use gateway::GatewayClient;
pub use metrics::{get_metrics, init_metrics};
pub use processor::{CallbackOutcome, PaymentProcessor};
