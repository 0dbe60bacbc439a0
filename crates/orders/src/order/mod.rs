//! Order aggregate and related types.

mod model;
mod state;
mod value_objects;

pub use model::Order;
pub use state::OrderStatus;
pub use value_objects::{NewOrder, OrderItem};
