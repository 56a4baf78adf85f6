// Core services
pub mod orders;
pub mod payments;

pub use orders::OrderService;
pub use payments::PaymentService;
