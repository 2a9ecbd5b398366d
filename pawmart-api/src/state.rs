use pawmart_core::coupons::CouponDirectory;
use pawmart_core::gateway::PaymentGateway;
use pawmart_core::membership::MembershipLookup;
use pawmart_core::wallet::WalletService;
use pawmart_order::dispatcher::PaymentDispatcher;
use pawmart_order::poller::{PollerHandle, SessionPoller};
use pawmart_order::repository::OrderLedger;
use pawmart_pricing::shipping::ShippingRules;
use pawmart_pricing::{DiscountValidator, PricingEngine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn OrderLedger>,
    pub membership: Arc<dyn MembershipLookup>,
    pub pricing: Arc<PricingEngine>,
    pub validator: Arc<DiscountValidator>,
    pub dispatcher: Arc<PaymentDispatcher>,
    pub poller: Arc<SessionPoller>,
    /// Live session watchers by order id. Creating a new session for an
    /// order replaces (and cancels) its previous watcher.
    pub watchers: Arc<Mutex<HashMap<Uuid, PollerHandle>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        wallet: Arc<dyn WalletService>,
        gateway: Arc<dyn PaymentGateway>,
        membership: Arc<dyn MembershipLookup>,
        coupons: Arc<dyn CouponDirectory>,
        shipping: ShippingRules,
        poll_interval: Duration,
        poll_timeout: Duration,
    ) -> Self {
        let dispatcher = Arc::new(PaymentDispatcher::new(
            Arc::clone(&ledger),
            wallet,
            Arc::clone(&gateway),
        ));
        let poller = Arc::new(SessionPoller::new(
            gateway,
            Arc::clone(&ledger),
            poll_interval,
            poll_timeout,
        ));

        Self {
            pricing: Arc::new(PricingEngine::new(shipping)),
            validator: Arc::new(DiscountValidator::new(coupons)),
            dispatcher,
            poller,
            watchers: Arc::new(Mutex::new(HashMap::new())),
            ledger,
            membership,
        }
    }

    /// Track the watch task for a pending order, cancelling any previous
    /// watcher the order had.
    pub async fn track_watcher(&self, order_id: Uuid, handle: PollerHandle) {
        let mut watchers = self.watchers.lock().await;
        if let Some(old) = watchers.insert(order_id, handle) {
            old.cancel();
        }
        watchers.retain(|_, h| !h.is_finished());
    }
}
