use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ed25519_dalek::Keypair;
use rand::rngs::OsRng;

use tradenet::codec::Proto;
use tradenet::network::{Address, NetworkId, PubKey, TransportKind};
use tradenet::offer::{Direction, Market, Offer, PriceSpec};
use tradenet::protocol::{Envelope, GossipMessage, GossipPayload, Message};
use tradenet::store::{MessageStore, StoredMessage};

fn offer_envelope(keypair: &Keypair) -> Envelope {
    let maker = NetworkId::new(
        PubKey::from(&keypair.public),
        Address::new("127.0.0.1", 9000, TransportKind::Clear),
    );
    let offer = Offer::new(
        maker,
        Direction::Sell,
        Market::new("BTC", "EUR"),
        100_000,
        PriceSpec::from_premium_as_percentage(1.5),
    );
    let gossip = GossipMessage::sign(keypair, GossipPayload::Offer(offer)).unwrap();
    Envelope::Message(Message::Gossip(gossip))
}

pub fn run_codec_benchmark(c: &mut Criterion) {
    let keypair = Keypair::generate(&mut OsRng {});
    let envelope = offer_envelope(&keypair);
    let bytes = envelope.to_bytes().unwrap();

    let mut group = c.benchmark_group("codec_benchmark");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode_envelope", |b| b.iter(|| black_box(&envelope).to_bytes().unwrap()));
    group.bench_function("decode_envelope", |b| {
        b.iter(|| Envelope::from_bytes(black_box(&bytes)).unwrap())
    });
    group.finish();
}

pub fn run_store_benchmark(c: &mut Criterion) {
    let keypair = Keypair::generate(&mut OsRng {});
    let mut group = c.benchmark_group("store_benchmark");

    for n in [100usize, 1000] {
        let messages: Vec<StoredMessage> = (0..n)
            .map(|_| {
                let envelope = offer_envelope(&keypair);
                let meta_data = match &envelope {
                    Envelope::Message(message) => message.meta_data().clone(),
                    _ => unreachable!(),
                };
                StoredMessage::new(envelope.to_bytes().unwrap(), meta_data, 0)
            })
            .collect();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("put", n), &messages, |b, messages| {
            b.iter(|| {
                let store = MessageStore::temporary().unwrap();
                for message in messages.iter() {
                    store.put(message.clone()).unwrap();
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, run_codec_benchmark, run_store_benchmark);
criterion_main!(benches);
