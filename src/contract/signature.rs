use super::Contract;

use crate::codec::proto::ContractSignatureDataProto;
use crate::codec::{self, Proto};
use crate::id::Id;
use crate::network::PubKey;

use ed25519_dalek::{Keypair, Signer, SIGNATURE_LENGTH};

const DOMAIN: &[u8] = b"tradenet-contract";

fn signed_message(contract_hash: &Id) -> Vec<u8> {
    [DOMAIN, contract_hash.as_bytes()].concat()
}

/// One party's signature over a contract hash.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractSignatureData {
    contract_hash: Id,
    signature: Vec<u8>,
    signer: PubKey,
}

impl ContractSignatureData {
    pub fn sign(keypair: &Keypair, contract: &Contract) -> codec::Result<Self> {
        let contract_hash = contract.hash()?;
        let signature = keypair.sign(&signed_message(&contract_hash)).to_bytes().to_vec();
        Ok(ContractSignatureData { contract_hash, signature, signer: PubKey::from(&keypair.public) })
    }

    pub fn contract_hash(&self) -> &Id {
        &self.contract_hash
    }

    pub fn signer(&self) -> &PubKey {
        &self.signer
    }

    /// Checks the signature itself. Whether hash and signer are the expected ones is up to the
    /// caller.
    pub fn verify(&self) -> bool {
        self.signer.verify(&signed_message(&self.contract_hash), &self.signature)
    }

    /// [ContractSignatureData::verify] on the blocking pool, away from the reactor threads.
    pub async fn verify_blocking(&self) -> bool {
        let data = self.clone();
        tokio::task::spawn_blocking(move || data.verify()).await.unwrap_or(false)
    }
}

impl Proto for ContractSignatureData {
    type Wire = ContractSignatureDataProto;

    fn to_wire(&self) -> ContractSignatureDataProto {
        ContractSignatureDataProto {
            contract_hash: self.contract_hash.as_bytes().to_vec(),
            signature: self.signature.clone(),
            signer: self.signer.as_bytes().to_vec(),
        }
    }

    fn from_wire(wire: ContractSignatureDataProto) -> codec::Result<Self> {
        let contract_hash = Id::from_slice(&wire.contract_hash)
            .ok_or_else(|| codec::Error::Malformed("contract hash must be 32 bytes".to_owned()))?;
        if wire.signature.len() != SIGNATURE_LENGTH {
            return Err(codec::Error::Malformed(format!("signature of {} bytes", wire.signature.len())));
        }
        let signer = PubKey::from_bytes(&wire.signer)
            .ok_or_else(|| codec::Error::Malformed("signer must be 32 bytes".to_owned()))?;
        Ok(ContractSignatureData { contract_hash, signature: wire.signature, signer })
    }
}
