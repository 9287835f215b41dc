use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use scanlink_core::{DeviceStatusBody, FrameCodec, Message, MessageBody, MessageRegistry};

fn status_message() -> Message {
    Message::new(
        42,
        MessageBody::DeviceStatusReply(
            DeviceStatusBody::new("Scanner", "line3-laser", "4.2.1", "marking").unwrap(),
        ),
    )
}

fn bench_encode(c: &mut Criterion) {
    let registry = MessageRegistry::standard();
    let message = status_message();

    c.bench_function("encode_status_reply", |b| {
        b.iter(|| registry.encode_frame(black_box(&message)).unwrap().encode())
    });
}

fn bench_decode(c: &mut Criterion) {
    let registry = MessageRegistry::standard();
    let codec = FrameCodec::default();
    let encoded = registry.encode_frame(&status_message()).unwrap().encode();

    c.bench_function("decode_status_reply", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(black_box(&encoded[..]));
            let frame = codec.try_read_frame(&mut buf).unwrap().unwrap();
            registry.decode_frame(&frame).unwrap()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
