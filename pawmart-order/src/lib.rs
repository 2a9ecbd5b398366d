pub mod models;
pub mod manager;
pub mod repository;
pub mod finance;
pub mod settlement;
pub mod dispatcher;
pub mod poller;
pub mod reconciliation;

pub use dispatcher::PaymentDispatcher;
pub use finance::FinancialManager;
pub use models::{Invoice, Order, OrderStatus, PaymentMethod};
pub use poller::{PollerHandle, SessionPoller};
pub use reconciliation::ReconciliationSweep;
pub use repository::{MemoryOrderLedger, OrderLedger};
pub use settlement::{SettlementOutcome, TransferAttestation};
