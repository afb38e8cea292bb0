mod common;

use std::time::Duration;

use common::{name, settle};
use ndnfw::{
    Data, Endpoint, EndpointError, Forwarder, Interest, ProducerOptions, RejectReason,
    RouteAnnouncement,
};
use tokio::time::Instant;

fn echo(interest: Interest) -> impl std::future::Future<Output = Option<Data>> {
    async move { Some(Data::new(interest.name, b"hello".to_vec())) }
}

#[tokio::test(start_paused = true)]
async fn test_consume_produce() {
    common::init_logging();
    let fw = Forwarder::create(Default::default());
    let endpoint = Endpoint::new(&fw);
    let producer = endpoint
        .produce(name("/svc"), echo, ProducerOptions::default())
        .unwrap();
    assert_eq!(fw.announced_names(), vec![name("/svc")]);

    let consumer = endpoint.consume(Interest::new(name("/svc/1"))).unwrap();
    let data = consumer.response().await.unwrap();
    assert_eq!(data.name, name("/svc/1"));
    assert_eq!(data.content, b"hello");

    settle().await;
    assert_eq!(fw.faces(), vec![producer.face().clone()]);
    assert_eq!(fw.pit_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_consume_expires() {
    let fw = Forwarder::create(Default::default());
    let endpoint = Endpoint::new(&fw);
    let start = Instant::now();
    let consumer = endpoint
        .consume(Interest::new(name("/nobody")).with_lifetime(Duration::from_millis(200)))
        .unwrap();

    let result = consumer.response().await;
    assert!(matches!(result, Err(EndpointError::Rejected(RejectReason::Expire))));
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_consume_cancel() {
    let fw = Forwarder::create(Default::default());
    let endpoint = Endpoint::new(&fw);
    let consumer = endpoint.consume(Interest::new(name("/slow"))).unwrap();
    let canceller = consumer.canceller();

    let response = tokio::spawn(consumer.response());
    settle().await;
    canceller.cancel();
    let result = response.await.unwrap();
    assert!(matches!(result, Err(EndpointError::Rejected(RejectReason::Cancel))));
    assert_eq!(fw.pit_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_producer_without_reply() {
    let fw = Forwarder::create(Default::default());
    let endpoint = Endpoint::new(&fw);
    let options = ProducerOptions {
        announcement: RouteAnnouncement::Off,
        ..ProducerOptions::default()
    };
    let _producer = endpoint
        .produce(name("/silent"), |_interest| async { None }, options)
        .unwrap();
    assert!(fw.announced_names().is_empty());

    let consumer = endpoint
        .consume(Interest::new(name("/silent/1")).with_lifetime(Duration::from_millis(100)))
        .unwrap();
    assert!(matches!(
        consumer.response().await,
        Err(EndpointError::Rejected(RejectReason::Expire))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_producer_concurrency() {
    let fw = Forwarder::create(Default::default());
    let endpoint = Endpoint::new(&fw);
    let options = ProducerOptions {
        concurrency: 2,
        ..ProducerOptions::default()
    };
    let _producer = endpoint
        .produce(
            name("/work"),
            |interest: Interest| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Some(Data::new(interest.name, Vec::new()))
            },
            options,
        )
        .unwrap();

    let start = Instant::now();
    let a = endpoint.consume(Interest::new(name("/work/a"))).unwrap();
    let b = endpoint.consume(Interest::new(name("/work/b"))).unwrap();
    let (a, b) = tokio::join!(a.response(), b.response());
    assert_eq!(a.unwrap().name, name("/work/a"));
    assert_eq!(b.unwrap().name, name("/work/b"));
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_producer_close_retracts_route() {
    let fw = Forwarder::create(Default::default());
    let endpoint = Endpoint::new(&fw);
    let producer = endpoint
        .produce(name("/gone"), echo, ProducerOptions::default())
        .unwrap();
    assert_eq!(fw.fib_lookup(&name("/gone/x")).len(), 1);

    producer.close();
    assert!(fw.fib_lookup(&name("/gone/x")).is_empty());
    assert!(fw.announced_names().is_empty());
    assert!(fw.faces().is_empty());
}
