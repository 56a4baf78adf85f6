pub mod order;

pub use order::{
    Customization, DeliveryAddress, DeliveryMethod, OptionSnapshot, OrderLine, OrderStatus,
    PaymentStatus,
};
