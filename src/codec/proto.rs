//! Wire structures.
//!
//! These types are only ever produced by `to_wire` and consumed by `from_wire`; they carry no
//! invariants of their own. Field order is the encoding order, so fields must never be
//! reordered without bumping [super::PROTOCOL_VERSION].

// Network identity

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportKindProto {
    Unspecified,
    Tor,
    I2p,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressProto {
    pub host: String,
    pub port: u32,
    pub kind: TransportKindProto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkIdProto {
    pub pub_key: Vec<u8>,
    pub address: Option<AddressProto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDataProto {
    pub ttl_millis: u64,
    pub max_size_bytes: u64,
    pub type_tag: String,
}

// Offers

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketProto {
    pub base_currency: String,
    pub quote_currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuoteProto {
    pub value: i64,
    pub market: Option<MarketProto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixPriceProto {
    pub price_quote: Option<PriceQuoteProto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatPriceProto {
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPriceProto {}

/// `oneof message { fix_price, float_price, market_price }`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceSpecProto {
    pub fix_price: Option<FixPriceProto>,
    pub float_price: Option<FloatPriceProto>,
    pub market_price: Option<MarketPriceProto>,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectionProto {
    Unspecified,
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferProto {
    pub id: Vec<u8>,
    pub maker: Option<NetworkIdProto>,
    pub direction: DirectionProto,
    pub market: Option<MarketProto>,
    pub base_amount: u64,
    pub price_spec: Option<PriceSpecProto>,
    pub created_at: u64,
}

// Contracts

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractProto {
    pub trade_id: Vec<u8>,
    pub offer: Option<OfferProto>,
    pub taker: Option<NetworkIdProto>,
    pub base_amount: u64,
    pub quote_amount: u64,
    pub price_spec: Option<PriceSpecProto>,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSignatureDataProto {
    pub contract_hash: Vec<u8>,
    pub signature: Vec<u8>,
    pub signer: Vec<u8>,
}

// Trade messages

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeOfferRequestProto {
    pub contract: Option<ContractProto>,
    pub contract_signature_data: Option<ContractSignatureDataProto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeOfferResponseProto {
    pub contract_signature_data: Option<ContractSignatureDataProto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelTradeProto {
    pub reason: String,
}

/// `oneof message { take_offer_request, take_offer_response, cancel_trade }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessageProto {
    pub trade_id: Vec<u8>,
    pub sender: Option<NetworkIdProto>,
    pub meta_data: Option<MetaDataProto>,
    pub take_offer_request: Option<TakeOfferRequestProto>,
    pub take_offer_response: Option<TakeOfferResponseProto>,
    pub cancel_trade: Option<CancelTradeProto>,
}

// Gossip

/// `oneof message { offer }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipPayloadProto {
    pub offer: Option<OfferProto>,
}

/// A broadcast payload signed by its owner. `payload` holds the encoded
/// [GossipPayloadProto] so that the signed bytes and the content hash are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedDataProto {
    pub meta_data: Option<MetaDataProto>,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

// Connection level

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloProto {
    pub network_id: Option<NetworkIdProto>,
    pub capabilities: Vec<u32>,
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloProofProto {
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingProto {
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongProto {
    pub nonce: u64,
}

/// The unit written to a connection.
///
/// `oneof message { hello, hello_proof, ping, pong, trade_message, gossip }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeProto {
    pub version: u32,
    pub hello: Option<HelloProto>,
    pub hello_proof: Option<HelloProofProto>,
    pub ping: Option<PingProto>,
    pub pong: Option<PongProto>,
    pub trade_message: Option<TradeMessageProto>,
    pub gossip: Option<AuthenticatedDataProto>,
}

impl EnvelopeProto {
    /// An envelope of the current version with no message case set.
    pub fn empty() -> Self {
        EnvelopeProto {
            version: super::PROTOCOL_VERSION,
            hello: None,
            hello_proof: None,
            ping: None,
            pong: None,
            trade_message: None,
            gossip: None,
        }
    }
}
