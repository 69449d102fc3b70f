use crate::codec::proto::ContractProto;
use crate::codec::{self, Proto};
use crate::id::Id;
use crate::network::{NetworkId, PubKey};
use crate::offer::{Offer, PriceSpec};
use crate::util;

/// The terms of one trade: which offer, who takes it and for how much.
///
/// Both parties sign the hash of the encoded contract, so the encoding has to be canonical;
/// the fields are private and only set through [Contract::new] or a checked decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    trade_id: Id,
    offer: Offer,
    taker: NetworkId,
    base_amount: u64,
    quote_amount: u64,
    price_spec: PriceSpec,
    created_at: u64,
}

impl Contract {
    pub fn new(offer: Offer, taker: NetworkId, base_amount: u64, quote_amount: u64) -> Self {
        let trade_id = Contract::trade_id_for(&offer.id(), taker.pub_key());
        let price_spec = offer.price_spec().clone();
        Contract { trade_id, offer, taker, base_amount, quote_amount, price_spec, created_at: util::now_millis() }
    }

    /// A taker can take an offer at most once.
    pub fn trade_id_for(offer_id: &Id, taker: &PubKey) -> Id {
        Id::from_parts(&[offer_id.as_bytes(), taker.as_bytes()])
    }

    pub fn trade_id(&self) -> Id {
        self.trade_id
    }

    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn maker(&self) -> &NetworkId {
        self.offer.maker()
    }

    pub fn taker(&self) -> &NetworkId {
        &self.taker
    }

    pub fn base_amount(&self) -> u64 {
        self.base_amount
    }

    pub fn quote_amount(&self) -> u64 {
        self.quote_amount
    }

    pub fn price_spec(&self) -> &PriceSpec {
        &self.price_spec
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// The hash both signatures commit to.
    pub fn hash(&self) -> codec::Result<Id> {
        Ok(Id::new(&self.to_bytes()?))
    }

    /// Checks the terms against the offer; `Err` carries the reason.
    pub fn check_terms(&self) -> Result<(), String> {
        if self.base_amount == 0 {
            return Err("zero base amount".to_owned());
        }
        if self.base_amount > self.offer.base_amount() {
            return Err(format!(
                "base amount {} exceeds the offered {}",
                self.base_amount,
                self.offer.base_amount()
            ));
        }
        if self.taker.pub_key() == self.maker().pub_key() {
            return Err("maker cannot take its own offer".to_owned());
        }
        if &self.price_spec != self.offer.price_spec() {
            return Err("price spec differs from the offer".to_owned());
        }
        Ok(())
    }
}

impl Proto for Contract {
    type Wire = ContractProto;

    fn to_wire(&self) -> ContractProto {
        ContractProto {
            trade_id: self.trade_id.as_bytes().to_vec(),
            offer: Some(self.offer.to_wire()),
            taker: Some(self.taker.to_wire()),
            base_amount: self.base_amount,
            quote_amount: self.quote_amount,
            price_spec: Some(self.price_spec.to_wire()),
            created_at: self.created_at,
        }
    }

    fn from_wire(wire: ContractProto) -> codec::Result<Self> {
        let trade_id = Id::from_slice(&wire.trade_id)
            .ok_or_else(|| codec::Error::Malformed("trade id must be 32 bytes".to_owned()))?;
        let offer = Offer::from_wire(codec::required("Contract.offer", wire.offer)?)?;
        let taker = NetworkId::from_wire(codec::required("Contract.taker", wire.taker)?)?;
        let price_spec = PriceSpec::from_wire(codec::required("Contract.price_spec", wire.price_spec)?)?;
        if trade_id != Contract::trade_id_for(&offer.id(), taker.pub_key()) {
            return Err(codec::Error::Malformed("trade id does not match offer and taker".to_owned()));
        }
        Ok(Contract {
            trade_id,
            offer,
            taker,
            base_amount: wire.base_amount,
            quote_amount: wire.quote_amount,
            price_spec,
            created_at: wire.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Address, TransportKind};
    use crate::offer::{Direction, Market};

    fn network_id(byte: u8) -> NetworkId {
        NetworkId::new(
            PubKey::from_bytes(&[byte; 32]).unwrap(),
            Address::new("127.0.0.1", 8000 + byte as u16, TransportKind::Clear),
        )
    }

    fn contract(base_amount: u64) -> Contract {
        let offer = Offer::new(network_id(1), Direction::Sell, Market::new("BTC", "EUR"), 1_000, PriceSpec::MarketRelative);
        Contract::new(offer, network_id(2), base_amount, 42)
    }

    #[test]
    fn decode_checks_the_trade_id() {
        let contract = contract(500);
        assert_eq!(Contract::from_bytes(&contract.to_bytes().unwrap()).unwrap(), contract);

        let mut wire = contract.to_wire();
        wire.taker = Some(network_id(3).to_wire());
        assert!(matches!(Contract::from_wire(wire), Err(codec::Error::Malformed(_))));
    }

    #[test]
    fn hash_is_stable_and_content_bound() {
        let contract = contract(500);
        let decoded = Contract::from_bytes(&contract.to_bytes().unwrap()).unwrap();
        assert_eq!(contract.hash().unwrap(), decoded.hash().unwrap());
        let mut wire = contract.to_wire();
        wire.quote_amount += 1;
        assert_ne!(Contract::from_wire(wire).unwrap().hash().unwrap(), contract.hash().unwrap());
    }

    #[test]
    fn terms_are_bounded_by_the_offer() {
        assert!(contract(1_000).check_terms().is_ok());
        assert!(contract(1_001).check_terms().is_err());
        assert!(contract(0).check_terms().is_err());
    }

    #[test]
    fn one_trade_id_per_offer_and_taker() {
        let a = contract(1);
        let b = Contract::new(a.offer().clone(), network_id(2), 2, 2);
        assert_eq!(a.trade_id(), b.trade_id());
        let c = Contract::new(a.offer().clone(), network_id(3), 2, 2);
        assert_ne!(a.trade_id(), c.trade_id());
    }
}
