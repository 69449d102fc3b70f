use super::price_spec::PriceSpec;

use crate::codec::proto::{DirectionProto, MarketProto, OfferProto};
use crate::codec::{self, Proto};
use crate::id::Id;
use crate::network::NetworkId;
use crate::protocol::MetaData;
use crate::util;

use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn mirror(&self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

/// A currency pair, e.g. `BTC/EUR`.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Market {
    base_currency: String,
    quote_currency: String,
}

impl Market {
    pub fn new<B: Into<String>, Q: Into<String>>(base_currency: B, quote_currency: Q) -> Self {
        Market { base_currency: base_currency.into(), quote_currency: quote_currency.into() }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn quote_currency(&self) -> &str {
        &self.quote_currency
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.base_currency, self.quote_currency)
    }
}

/// An offer published by a maker and broadcast to all peers until it expires.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    id: Id,
    maker: NetworkId,
    direction: Direction,
    market: Market,
    base_amount: u64,
    price_spec: PriceSpec,
    created_at: u64,
}

impl Offer {
    /// Offers stay in the store for 10 days.
    pub const TTL_MILLIS: u64 = 10 * 24 * 60 * 60 * 1000;
    pub const MAX_SIZE_BYTES: u64 = 10_000;
    pub const TYPE_TAG: &'static str = "Offer";

    pub fn new(
        maker: NetworkId,
        direction: Direction,
        market: Market,
        base_amount: u64,
        price_spec: PriceSpec,
    ) -> Self {
        let created_at = util::now_millis();
        let id = Id::from_parts(&[
            maker.pub_key().as_bytes(),
            &created_at.to_be_bytes(),
            Id::generate().as_bytes(),
        ]);
        Offer { id, maker, direction, market, base_amount, price_spec, created_at }
    }

    pub fn meta_data() -> MetaData {
        MetaData::new(Offer::TTL_MILLIS, Offer::MAX_SIZE_BYTES, Offer::TYPE_TAG)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn maker(&self) -> &NetworkId {
        &self.maker
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn base_amount(&self) -> u64 {
        self.base_amount
    }

    pub fn price_spec(&self) -> &PriceSpec {
        &self.price_spec
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

impl Proto for Market {
    type Wire = MarketProto;

    fn to_wire(&self) -> MarketProto {
        MarketProto {
            base_currency: self.base_currency.clone(),
            quote_currency: self.quote_currency.clone(),
        }
    }

    fn from_wire(wire: MarketProto) -> codec::Result<Self> {
        if wire.base_currency.is_empty() || wire.quote_currency.is_empty() {
            return Err(codec::Error::Malformed("empty currency code".to_owned()));
        }
        Ok(Market { base_currency: wire.base_currency, quote_currency: wire.quote_currency })
    }
}

impl Proto for Direction {
    type Wire = DirectionProto;

    fn to_wire(&self) -> DirectionProto {
        match self {
            Direction::Buy => DirectionProto::Buy,
            Direction::Sell => DirectionProto::Sell,
        }
    }

    fn from_wire(wire: DirectionProto) -> codec::Result<Self> {
        match wire {
            DirectionProto::Buy => Ok(Direction::Buy),
            DirectionProto::Sell => Ok(Direction::Sell),
            DirectionProto::Unspecified => Err(codec::Error::UnresolvableMessage("Direction")),
        }
    }
}

impl Proto for Offer {
    type Wire = OfferProto;

    fn to_wire(&self) -> OfferProto {
        OfferProto {
            id: self.id.as_bytes().to_vec(),
            maker: Some(self.maker.to_wire()),
            direction: self.direction.to_wire(),
            market: Some(self.market.to_wire()),
            base_amount: self.base_amount,
            price_spec: Some(self.price_spec.to_wire()),
            created_at: self.created_at,
        }
    }

    fn from_wire(wire: OfferProto) -> codec::Result<Self> {
        let id = Id::from_slice(&wire.id)
            .ok_or_else(|| codec::Error::Malformed("offer id must be 32 bytes".to_owned()))?;
        let maker = NetworkId::from_wire(codec::required("Offer.maker", wire.maker)?)?;
        let market = Market::from_wire(codec::required("Offer.market", wire.market)?)?;
        let price_spec = PriceSpec::from_wire(codec::required("Offer.price_spec", wire.price_spec)?)?;
        Ok(Offer {
            id,
            maker,
            direction: Direction::from_wire(wire.direction)?,
            market,
            base_amount: wire.base_amount,
            price_spec,
            created_at: wire.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Address, PubKey, TransportKind};

    fn maker() -> NetworkId {
        let pub_key = PubKey::from_bytes(&[7u8; 32]).unwrap();
        NetworkId::new(pub_key, Address::new("127.0.0.1", 8000, TransportKind::Clear))
    }

    #[test]
    fn offer_round_trips() {
        let offer = Offer::new(
            maker(),
            Direction::Sell,
            Market::new("BTC", "EUR"),
            100_000,
            PriceSpec::from_premium_as_percentage(1.0),
        );
        let bytes = offer.to_bytes().unwrap();
        assert_eq!(Offer::from_bytes(&bytes).unwrap(), offer);
    }

    #[test]
    fn offers_get_distinct_ids() {
        let a = Offer::new(maker(), Direction::Buy, Market::new("BTC", "EUR"), 1, PriceSpec::MarketRelative);
        let b = Offer::new(maker(), Direction::Buy, Market::new("BTC", "EUR"), 1, PriceSpec::MarketRelative);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn unspecified_direction_is_unresolvable() {
        let offer = Offer::new(maker(), Direction::Buy, Market::new("BTC", "EUR"), 1, PriceSpec::MarketRelative);
        let mut wire = offer.to_wire();
        wire.direction = DirectionProto::Unspecified;
        assert_eq!(Offer::from_wire(wire), Err(codec::Error::UnresolvableMessage("Direction")));
    }
}
