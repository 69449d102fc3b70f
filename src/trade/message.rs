use crate::codec::proto::{CancelTradeProto, TakeOfferRequestProto, TakeOfferResponseProto, TradeMessageProto};
use crate::codec::{self, Proto};
use crate::contract::{Contract, ContractSignatureData};
use crate::id::Id;
use crate::network::NetworkId;
use crate::protocol::MetaData;

/// Trade messages are kept for 10 days.
pub const TTL_MILLIS: u64 = 10 * 24 * 60 * 60 * 1000;
pub const MAX_SIZE_BYTES: u64 = 100_000;

/// What a trade message asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum TradePayload {
    /// Taker to maker: the contract and the taker's signature over it.
    TakeOfferRequest { contract: Contract, signature_data: ContractSignatureData },
    /// Maker to taker: the maker's countersignature.
    TakeOfferResponse { signature_data: ContractSignatureData },
    CancelTrade { reason: String },
}

impl TradePayload {
    pub fn type_tag(&self) -> &'static str {
        match self {
            TradePayload::TakeOfferRequest { .. } => "TakeOfferRequest",
            TradePayload::TakeOfferResponse { .. } => "TakeOfferResponse",
            TradePayload::CancelTrade { .. } => "CancelTrade",
        }
    }

    pub fn meta_data(&self) -> MetaData {
        MetaData::new(TTL_MILLIS, MAX_SIZE_BYTES, self.type_tag())
    }
}

/// Every type tag a trade message can carry.
pub const TYPE_TAGS: [&str; 3] = ["TakeOfferRequest", "TakeOfferResponse", "CancelTrade"];

/// A message addressed to the counterparty of one trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeMessage {
    trade_id: Id,
    sender: NetworkId,
    meta_data: MetaData,
    payload: TradePayload,
}

impl TradeMessage {
    pub fn new(trade_id: Id, sender: NetworkId, payload: TradePayload) -> Self {
        TradeMessage { trade_id, sender, meta_data: payload.meta_data(), payload }
    }

    pub fn trade_id(&self) -> Id {
        self.trade_id
    }

    pub fn sender(&self) -> &NetworkId {
        &self.sender
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    pub fn payload(&self) -> &TradePayload {
        &self.payload
    }
}

enum TradeMessageCase {
    Request(TakeOfferRequestProto),
    Response(TakeOfferResponseProto),
    Cancel(CancelTradeProto),
}

impl Proto for TradeMessage {
    type Wire = TradeMessageProto;

    fn to_wire(&self) -> TradeMessageProto {
        let mut wire = TradeMessageProto {
            trade_id: self.trade_id.as_bytes().to_vec(),
            sender: Some(self.sender.to_wire()),
            meta_data: Some(self.meta_data.to_wire()),
            take_offer_request: None,
            take_offer_response: None,
            cancel_trade: None,
        };
        match &self.payload {
            TradePayload::TakeOfferRequest { contract, signature_data } => {
                wire.take_offer_request = Some(TakeOfferRequestProto {
                    contract: Some(contract.to_wire()),
                    contract_signature_data: Some(signature_data.to_wire()),
                })
            }
            TradePayload::TakeOfferResponse { signature_data } => {
                wire.take_offer_response =
                    Some(TakeOfferResponseProto { contract_signature_data: Some(signature_data.to_wire()) })
            }
            TradePayload::CancelTrade { reason } => {
                wire.cancel_trade = Some(CancelTradeProto { reason: reason.clone() })
            }
        }
        wire
    }

    fn from_wire(wire: TradeMessageProto) -> codec::Result<Self> {
        let trade_id = Id::from_slice(&wire.trade_id)
            .ok_or_else(|| codec::Error::Malformed("trade id must be 32 bytes".to_owned()))?;
        let sender = NetworkId::from_wire(codec::required("TradeMessage.sender", wire.sender)?)?;
        let meta_data = MetaData::from_wire(codec::required("TradeMessage.meta_data", wire.meta_data)?)?;
        let case = codec::one_of(
            "TradeMessage",
            vec![
                wire.take_offer_request.map(TradeMessageCase::Request),
                wire.take_offer_response.map(TradeMessageCase::Response),
                wire.cancel_trade.map(TradeMessageCase::Cancel),
            ],
        )?;
        let payload = match case {
            TradeMessageCase::Request(request) => {
                let contract = Contract::from_wire(codec::required("TakeOfferRequest.contract", request.contract)?)?;
                if contract.trade_id() != trade_id {
                    return Err(codec::Error::Malformed("contract belongs to another trade".to_owned()));
                }
                let signature_data = codec::required(
                    "TakeOfferRequest.contract_signature_data",
                    request.contract_signature_data,
                )?;
                TradePayload::TakeOfferRequest {
                    contract,
                    signature_data: ContractSignatureData::from_wire(signature_data)?,
                }
            }
            TradeMessageCase::Response(response) => {
                let signature_data = codec::required(
                    "TakeOfferResponse.contract_signature_data",
                    response.contract_signature_data,
                )?;
                TradePayload::TakeOfferResponse { signature_data: ContractSignatureData::from_wire(signature_data)? }
            }
            TradeMessageCase::Cancel(cancel) => TradePayload::CancelTrade { reason: cancel.reason },
        };
        if meta_data.type_tag != payload.type_tag() {
            return Err(codec::Error::Malformed(format!(
                "type tag {} does not match {}",
                meta_data.type_tag,
                payload.type_tag()
            )));
        }
        Ok(TradeMessage { trade_id, sender, meta_data, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Address, PubKey, TransportKind};
    use crate::offer::{Direction, Market, Offer, PriceSpec};
    use ed25519_dalek::Keypair;
    use rand::rngs::OsRng;

    fn request() -> (TradeMessage, Keypair) {
        let taker_keys = Keypair::generate(&mut OsRng {});
        let address = Address::new("127.0.0.1", 8000, TransportKind::Clear);
        let maker = NetworkId::new(PubKey::from_bytes(&[4u8; 32]).unwrap(), address.clone());
        let taker = NetworkId::new(PubKey::from(&taker_keys.public), address);
        let offer = Offer::new(maker, Direction::Sell, Market::new("XMR", "EUR"), 7, PriceSpec::MarketRelative);
        let contract = Contract::new(offer, taker.clone(), 7, 900);
        let signature_data = ContractSignatureData::sign(&taker_keys, &contract).unwrap();
        let trade_id = contract.trade_id();
        (TradeMessage::new(trade_id, taker, TradePayload::TakeOfferRequest { contract, signature_data }), taker_keys)
    }

    #[test]
    fn request_carries_its_meta_data() {
        let (message, _) = request();
        assert_eq!(message.meta_data().type_tag, "TakeOfferRequest");
        assert_eq!(message.meta_data().ttl_millis, 864_000_000);
        assert_eq!(message.meta_data().max_size_bytes, 100_000);
        assert_eq!(TradeMessage::from_bytes(&message.to_bytes().unwrap()).unwrap(), message);
    }

    #[test]
    fn no_case_set_is_unresolvable() {
        let (message, _) = request();
        let mut wire = message.to_wire();
        wire.take_offer_request = None;
        assert_eq!(TradeMessage::from_wire(wire), Err(codec::Error::UnresolvableMessage("TradeMessage")));
    }

    #[test]
    fn missing_signature_is_a_missing_field() {
        let (message, _) = request();
        let mut wire = message.to_wire();
        if let Some(request) = wire.take_offer_request.as_mut() {
            request.contract_signature_data = None;
        }
        assert_eq!(
            TradeMessage::from_wire(wire),
            Err(codec::Error::MissingField("TakeOfferRequest.contract_signature_data"))
        );
    }

    #[test]
    fn foreign_trade_id_is_malformed() {
        let (message, _) = request();
        let mut wire = message.to_wire();
        wire.trade_id = Id::generate().as_bytes().to_vec();
        assert!(matches!(TradeMessage::from_wire(wire), Err(codec::Error::Malformed(_))));
    }

    #[test]
    fn mislabelled_tag_is_malformed() {
        let (message, _) = request();
        let cancel = TradeMessage::new(
            message.trade_id(),
            message.sender().clone(),
            TradePayload::CancelTrade { reason: "changed my mind".to_owned() },
        );
        let mut wire = cancel.to_wire();
        wire.meta_data = Some(message.meta_data().to_wire());
        assert!(matches!(TradeMessage::from_wire(wire), Err(codec::Error::Malformed(_))));
    }
}
