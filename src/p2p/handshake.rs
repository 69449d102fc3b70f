//! Mutual proof of identity at the start of every connection.
//!
//! Both sides send a `Hello` carrying their [NetworkId] and a fresh nonce, then a `HelloProof`:
//! an ed25519 signature over `DOMAIN ‖ peer nonce ‖ own public key`. Each side checks the proof
//! against the key announced in the peer's `Hello`, so a peer cannot claim an identity it
//! holds no key for, and replayed proofs fail because the nonce is new per connection.

use super::prelude::*;

use crate::channel::{Receiver, Sender};
use crate::protocol::{Hello, HelloProof, CAPABILITIES, NONCE_LENGTH};

use ed25519_dalek::{Keypair, Signer};
use rand::{rngs::OsRng, RngCore};

const DOMAIN: &[u8] = b"tradenet-handshake";

fn proof_message(nonce: &[u8; NONCE_LENGTH], signer: &PubKey) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN.len() + NONCE_LENGTH + 32);
    message.extend_from_slice(DOMAIN);
    message.extend_from_slice(nonce);
    message.extend_from_slice(signer.as_bytes());
    message
}

async fn expect_hello(receiver: &mut Receiver) -> Result<Hello> {
    match receiver.recv().await? {
        Some(Envelope::Hello(hello)) => Ok(hello),
        Some(other) => Err(Error::Handshake(format!("expected hello, got {}", other.message_case()))),
        None => Err(Error::ConnectionClosed),
    }
}

async fn expect_proof(receiver: &mut Receiver) -> Result<HelloProof> {
    match receiver.recv().await? {
        Some(Envelope::HelloProof(proof)) => Ok(proof),
        Some(other) => Err(Error::Handshake(format!("expected hello proof, got {}", other.message_case()))),
        None => Err(Error::ConnectionClosed),
    }
}

/// Runs the handshake and returns the proven identity of the remote side.
///
/// `expected` is the identity that was dialed; an inbound handshake passes `None` and accepts
/// whoever proves their key.
pub async fn perform(
    sender: &mut Sender,
    receiver: &mut Receiver,
    keypair: &Keypair,
    local: &NetworkId,
    expected: Option<&NetworkId>,
) -> Result<NetworkId> {
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    let hello = Hello { network_id: local.clone(), capabilities: CAPABILITIES.to_vec(), nonce };
    sender.send(&Envelope::Hello(hello)).await?;

    let remote = expect_hello(receiver).await?;
    if let Some(expected) = expected {
        if &remote.network_id != expected {
            return Err(Error::UnexpectedPeer { expected: expected.clone(), actual: remote.network_id });
        }
    }
    if remote.network_id.pub_key() == local.pub_key() {
        return Err(Error::Handshake("connected to self".to_owned()));
    }

    let signature = keypair.sign(&proof_message(&remote.nonce, local.pub_key()));
    sender.send(&Envelope::HelloProof(HelloProof { signature: signature.to_bytes().to_vec() })).await?;

    let proof = expect_proof(receiver).await?;
    let remote_key = remote.network_id.pub_key();
    if !remote_key.verify(&proof_message(&nonce, remote_key), &proof.signature) {
        return Err(Error::InvalidProof);
    }
    Ok(remote.network_id)
}
