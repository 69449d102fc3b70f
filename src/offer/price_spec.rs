use super::offer::Market;

use crate::codec::proto::{FixPriceProto, FloatPriceProto, MarketPriceProto, PriceQuoteProto, PriceSpecProto};
use crate::codec::{self, Proto};

/// A price in the smallest unit of the quote currency per one unit of the base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub value: i64,
    pub market: Market,
}

impl PriceQuote {
    pub fn new(value: i64, market: Market) -> Self {
        PriceQuote { value, market }
    }
}

/// How an offer is priced.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceSpec {
    /// A fixed price.
    Fixed(PriceQuote),
    /// The market price adjusted by a premium, in percent. Carried as is on the wire;
    /// [PriceSpec::from_premium_as_percentage] only builds finite, non-negative ones.
    Floating(f64),
    /// The market price at the time the trade is taken.
    MarketRelative,
}

impl PriceSpec {
    /// Builds a spec from a premium. A negative or non-finite premium is not an error: it
    /// collapses to [PriceSpec::MarketRelative].
    pub fn from_premium_as_percentage(percentage: f64) -> PriceSpec {
        if percentage.is_finite() && percentage >= 0.0 {
            PriceSpec::Floating(percentage)
        } else {
            PriceSpec::MarketRelative
        }
    }

    pub fn as_fixed(&self) -> Option<&PriceQuote> {
        match self {
            PriceSpec::Fixed(quote) => Some(quote),
            _ => None,
        }
    }

    pub fn as_floating(&self) -> Option<f64> {
        match self {
            PriceSpec::Floating(percentage) => Some(*percentage),
            _ => None,
        }
    }

    pub fn is_market_relative(&self) -> bool {
        matches!(self, PriceSpec::MarketRelative)
    }
}

impl Proto for PriceQuote {
    type Wire = PriceQuoteProto;

    fn to_wire(&self) -> PriceQuoteProto {
        PriceQuoteProto { value: self.value, market: Some(self.market.to_wire()) }
    }

    fn from_wire(wire: PriceQuoteProto) -> codec::Result<Self> {
        let market = codec::required("PriceQuote.market", wire.market)?;
        Ok(PriceQuote { value: wire.value, market: Market::from_wire(market)? })
    }
}

enum PriceSpecCase {
    Fix(FixPriceProto),
    Float(FloatPriceProto),
    Market(MarketPriceProto),
}

impl Proto for PriceSpec {
    type Wire = PriceSpecProto;

    fn to_wire(&self) -> PriceSpecProto {
        let mut wire = PriceSpecProto::default();
        match self {
            PriceSpec::Fixed(quote) => {
                wire.fix_price = Some(FixPriceProto { price_quote: Some(quote.to_wire()) })
            }
            PriceSpec::Floating(percentage) => {
                wire.float_price = Some(FloatPriceProto { percentage: *percentage })
            }
            PriceSpec::MarketRelative => wire.market_price = Some(MarketPriceProto {}),
        }
        wire
    }

    fn from_wire(wire: PriceSpecProto) -> codec::Result<Self> {
        let case = codec::one_of(
            "PriceSpec",
            vec![
                wire.fix_price.map(PriceSpecCase::Fix),
                wire.float_price.map(PriceSpecCase::Float),
                wire.market_price.map(PriceSpecCase::Market),
            ],
        )?;
        match case {
            PriceSpecCase::Fix(fix) => {
                let quote = codec::required("FixPrice.price_quote", fix.price_quote)?;
                Ok(PriceSpec::Fixed(PriceQuote::from_wire(quote)?))
            }
            PriceSpecCase::Float(float) => Ok(PriceSpec::Floating(float.percentage)),
            PriceSpecCase::Market(_) => Ok(PriceSpec::MarketRelative),
        }
    }
}
