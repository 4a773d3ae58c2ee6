//! End-to-end coverage for the six literal scenarios: real participants
//! speaking the wire protocol over real loopback TCP against an embedded
//! relay backed by an in-memory registry.

use std::time::Duration;

use bytes::Bytes;
use conga_protocol::{Frame, FrameCodec, Headers, Verb};
use conga_relay::embedded;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, FrameCodec>;

async fn connect(addr: std::net::SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).await.expect("connect to embedded relay");
    Framed::new(stream, FrameCodec::new())
}

async fn hello(client: &mut Client, user_id: &str) {
    client.send(Frame::hello(user_id)).await.expect("send HELLO");
}

async fn msg(client: &mut Client, body: &str) {
    client
        .send(Frame::msg(Headers::new(), Bytes::from(body.to_string())))
        .await
        .expect("send MSG");
}

/// Re-sends whatever MSG a hop just received, unchanged -- simulating a
/// real participant client passing the message along its own connection, as
/// the protocol requires at every interior hop.
async fn forward_received(client: &mut Client, received: &Frame) {
    client.send(received.clone()).await.expect("forward MSG");
}

async fn next_frame(client: &mut Client) -> Option<Frame> {
    match tokio::time::timeout(Duration::from_millis(500), client.next()).await {
        Ok(Some(Ok(raw))) => Some(raw.frame),
        Ok(Some(Err(err))) => panic!("protocol error: {}", err),
        Ok(None) => None,
        Err(_) => None,
    }
}

async fn expect_silence(client: &mut Client) {
    let frame = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(frame.is_err(), "expected no frame, got {:?}", frame);
}

#[tokio::test]
async fn single_member_echo_suppression() {
    let relay = embedded::start().await.unwrap();
    relay.seed(1, 42);

    let mut p1 = connect(relay.addr).await;
    hello(&mut p1, "1").await;
    msg(&mut p1, "hello").await;

    expect_silence(&mut p1).await;
    relay.shutdown();
}

#[tokio::test]
async fn three_member_hop() {
    let relay = embedded::start().await.unwrap();
    relay.seed(2, 7);
    relay.seed(5, 7);
    relay.seed(9, 7);

    let mut p2 = connect(relay.addr).await;
    hello(&mut p2, "2").await;
    let mut p5 = connect(relay.addr).await;
    hello(&mut p5, "5").await;
    let mut p9 = connect(relay.addr).await;
    hello(&mut p9, "9").await;

    msg(&mut p2, "hi").await;

    let at_five = next_frame(&mut p5).await.expect("5 receives the hop");
    assert_eq!(at_five.verb, Verb::Msg);
    assert!(at_five.message_id().is_some(), "relay must stamp a Message-ID on first hop");
    assert_eq!(&at_five.body[..], b"hi");

    forward_received(&mut p5, &at_five).await;

    let at_nine = next_frame(&mut p9).await.expect("9 receives the hop");
    assert_eq!(at_nine.message_id(), at_five.message_id());
    assert_eq!(&at_nine.body[..], b"hi");

    forward_received(&mut p9, &at_nine).await;

    expect_silence(&mut p2).await;
    relay.shutdown();
}

#[tokio::test]
async fn out_of_order_join_sorts_the_ring() {
    let relay = embedded::start().await.unwrap();
    relay.seed(8, 1);
    relay.seed(3, 1);
    relay.seed(11, 1);

    let mut p8 = connect(relay.addr).await;
    hello(&mut p8, "8").await;
    let mut p3 = connect(relay.addr).await;
    hello(&mut p3, "3").await;
    let mut p11 = connect(relay.addr).await;
    hello(&mut p11, "11").await;

    msg(&mut p3, "step").await;

    let at_eight = next_frame(&mut p8).await.expect("ring order is 3 -> 8 -> 11 -> 3");
    forward_received(&mut p8, &at_eight).await;

    let at_eleven = next_frame(&mut p11).await.expect("8 forwards to 11");
    assert_eq!(at_eleven.message_id(), at_eight.message_id());
    forward_received(&mut p11, &at_eleven).await;

    expect_silence(&mut p3).await;
    relay.shutdown();
}

#[tokio::test]
async fn mid_message_departure_suppresses_redelivery() {
    let relay = embedded::start().await.unwrap();
    for (member_id, conga_id) in [(1, 1), (2, 1), (3, 1), (4, 1)] {
        relay.seed(member_id, conga_id);
    }

    let mut p1 = connect(relay.addr).await;
    hello(&mut p1, "1").await;
    let mut p2 = connect(relay.addr).await;
    hello(&mut p2, "2").await;
    let mut p3 = connect(relay.addr).await;
    hello(&mut p3, "3").await;
    let mut p4 = connect(relay.addr).await;
    hello(&mut p4, "4").await;

    msg(&mut p1, "round").await;
    let at_two = next_frame(&mut p2).await.expect("2 receives the hop");
    forward_received(&mut p2, &at_two).await;

    p1.send(Frame::bye()).await.expect("send BYE");
    // Give the relay a moment to process BYE and relink around member 1.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let at_three = next_frame(&mut p3).await.expect("3 receives the hop");
    forward_received(&mut p3, &at_three).await;
    let at_four = next_frame(&mut p4).await.expect("4 receives the hop");
    forward_received(&mut p4, &at_four).await;

    // The message would have next gone to member 1's old slot; since 1 has
    // left, stop_loop must drop it instead of redelivering to its successor.
    expect_silence(&mut p2).await;
    relay.shutdown();
}

#[tokio::test]
async fn duplicate_member_id_is_rejected_and_ring_is_untouched() {
    let relay = embedded::start().await.unwrap();
    relay.seed(4, 1);
    relay.seed(9, 1);

    let mut p4 = connect(relay.addr).await;
    hello(&mut p4, "4").await;
    let mut p9 = connect(relay.addr).await;
    hello(&mut p9, "9").await;

    let mut duplicate = connect(relay.addr).await;
    hello(&mut duplicate, "4").await;

    // The relay must close the duplicate's stream instead of accepting it.
    let outcome = tokio::time::timeout(Duration::from_millis(500), duplicate.next()).await;
    match outcome {
        Ok(None) => {}
        Ok(Some(Err(_))) => {}
        other => panic!("expected the duplicate connection to be closed, got {:?}", other),
    }

    // The existing ring still works: a message from 4 completes its lap via 9.
    msg(&mut p4, "still here").await;
    let at_nine = next_frame(&mut p9).await.expect("9 still receives hops");
    forward_received(&mut p9, &at_nine).await;
    expect_silence(&mut p4).await;

    relay.shutdown();
}

#[tokio::test]
async fn malformed_frame_closes_the_connection() {
    use tokio::io::AsyncWriteExt;

    let relay = embedded::start().await.unwrap();
    relay.seed(1, 1);
    relay.seed(2, 1);

    let mut p1 = connect(relay.addr).await;
    hello(&mut p1, "1").await;
    let mut p2 = connect(relay.addr).await;
    hello(&mut p2, "2").await;

    let mut raw = p1.into_inner();
    raw.write_all(b"FOO\r\nContent-Length: 0\r\n\r\n").await.unwrap();

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_millis(500), tokio::io::AsyncReadExt::read(&mut raw, &mut buf))
        .await
        .expect("relay should close the connection promptly");
    assert_eq!(read.unwrap(), 0, "connection should be closed after a malformed frame");

    // The ring re-stitches: member 2, now the only one left, loops to itself.
    msg(&mut p2, "solo").await;
    expect_silence(&mut p2).await;

    relay.shutdown();
}
