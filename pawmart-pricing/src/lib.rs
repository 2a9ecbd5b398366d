pub mod discount;
pub mod engine;
pub mod shipping;

pub use discount::DiscountValidator;
pub use engine::{CartLine, PricingEngine, PricingResult};
pub use shipping::{ShippingRules, WaiverReason};
