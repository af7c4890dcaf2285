pub mod cart;
pub mod coupons;
pub mod inventory;
pub mod orders;
pub mod payments;

pub use cart::{CartOwner, CartService, CartView};
pub use coupons::CouponService;
pub use inventory::InventoryService;
pub use orders::{OrderPlacement, OrderService, PlaceOrderInput};
pub use payments::{ConfirmPaymentInput, PaymentConfirmation, PaymentService};
