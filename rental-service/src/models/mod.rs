//! Domain models for rental-service.

mod asset;
mod block;
mod booking;
mod commission;
mod payment_event;

pub use asset::{Asset, AssetCategory, CreateAsset, UpdateAsset};
pub use block::{Block, BlockSource, CreateBlock};
pub use booking::{
    Booking, BookingStatus, ConditionReport, CreateHold, CustomerSnapshot, DepositStatus,
    PaymentStatus, PriceBreakdown, TransitionLogEntry,
};
pub use commission::{CommissionRate, CreateCommissionRate, UpdateCommissionRate};
pub use payment_event::{CallbackData, CallbackEvent, PaymentEvent};
