//! Trade offers and how they are priced.

mod offer;
mod price_spec;

pub use offer::{Direction, Market, Offer};
pub use price_spec::{PriceQuote, PriceSpec};
