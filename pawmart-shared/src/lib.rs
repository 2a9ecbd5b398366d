pub mod events;
pub mod money;
pub mod pii;

pub use money::{apply_rate, line_total};
pub use pii::Masked;
