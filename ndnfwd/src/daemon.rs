use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use log::info;
use tokio::time::Instant;

use ndnfw::{
    AdvertiseBackend, AnnouncementSource, Data, Endpoint, Forwarder, FwTracer, Interest, Name,
    Producer, ProducerOptions, ReadvertiseDestination, RouteAnnouncement,
};

use crate::config::{Config, ProducerConfig};

/// Readvertise backend that records announced prefixes in the log.
#[derive(Debug, Default)]
pub struct LogBackend;

#[async_trait]
impl AdvertiseBackend for LogBackend {
    /// When the prefix first got a row.
    type State = Instant;

    fn make_state(&self, _name: &Name) -> Instant {
        Instant::now()
    }

    async fn do_advertise(
        &self,
        name: &Name,
        since: &Instant,
        source: &AnnouncementSource,
    ) -> anyhow::Result<()> {
        let objs = source.list_announcement_objs(name);
        info!(
            "advertise {} ({} announcement objects, pending {:?})",
            name,
            objs.len(),
            since.elapsed()
        );
        Ok(())
    }

    async fn do_withdraw(&self, name: &Name, since: &Instant) -> anyhow::Result<()> {
        info!("withdraw {} (known for {:?})", name, since.elapsed());
        Ok(())
    }
}

pub struct Daemon {
    config: Config,
    fw: Option<Forwarder>,
    tracer: Option<FwTracer>,
    destination: Option<ReadvertiseDestination<LogBackend>>,
    producers: Vec<Producer>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fw: None,
            tracer: None,
            destination: None,
            producers: Vec::new(),
        }
    }

    pub fn forwarder(&self) -> Option<&Forwarder> {
        self.fw.as_ref()
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        info!("Starting forwarder");
        self.config.validate()?;

        let fw = Forwarder::create(self.config.forwarder.clone());
        if self.config.tracer.enabled {
            self.tracer = Some(FwTracer::enable(&fw, self.config.tracer.options.clone()));
        }
        if self.config.readvertise.enabled {
            let destination =
                ReadvertiseDestination::new(LogBackend, self.config.readvertise.retry.clone());
            destination.enable(&fw);
            self.destination = Some(destination);
        }

        let endpoint = Endpoint::new(&fw);
        self.fw = Some(fw);
        for producer in &self.config.producers {
            let attached = start_producer(&endpoint, producer)
                .with_context(|| format!("starting producer {}", producer.prefix))?;
            info!("Serving {}", producer.prefix);
            self.producers.push(attached);
        }

        info!("Forwarder started with {} producers", self.producers.len());
        Ok(())
    }

    pub fn stop(&mut self) {
        info!("Stopping forwarder");
        for producer in self.producers.drain(..) {
            producer.close();
        }
        if let Some(fw) = self.fw.take() {
            fw.close();
        }
        self.destination = None;
        if let Some(tracer) = self.tracer.take() {
            tracer.disable();
        }
        info!("Forwarder stopped");
    }
}

fn start_producer(endpoint: &Endpoint, config: &ProducerConfig) -> anyhow::Result<Producer> {
    let content: Arc<[u8]> = config.content.as_bytes().into();
    let freshness = Duration::from_millis(config.freshness_period_ms);
    let handler = move |interest: Interest| {
        let content = Arc::clone(&content);
        async move {
            Some(Data::new(interest.name, content.to_vec()).with_freshness_period(freshness))
        }
    };
    let options = ProducerOptions {
        concurrency: config.concurrency,
        announcement: RouteAnnouncement::from(config.announce),
        ..ProducerOptions::default()
    };
    Ok(endpoint.produce(config.prefix.clone(), handler, options)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProducerConfig;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    fn config_with_producer() -> Config {
        Config {
            producers: vec![ProducerConfig {
                prefix: name("/example/hello"),
                content: "hello world".to_string(),
                concurrency: 1,
                announce: true,
                freshness_period_ms: 1000,
            }],
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_serves_configured_producer() {
        let mut daemon = Daemon::new(config_with_producer());
        daemon.start().unwrap();
        let fw = daemon.forwarder().unwrap().clone();
        assert_eq!(fw.announced_names(), vec![name("/example/hello")]);

        let consumer = Endpoint::new(&fw)
            .consume(Interest::new(name("/example/hello/1")).with_must_be_fresh(true))
            .unwrap();
        let data = consumer.response().await.unwrap();
        assert_eq!(data.content, b"hello world");
        assert_eq!(data.freshness_period, Duration::from_secs(1));

        daemon.stop();
        assert!(fw.is_closed());
        assert!(fw.faces().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = config_with_producer();
        config.producers[0].concurrency = 0;
        let mut daemon = Daemon::new(config);
        assert!(daemon.start().is_err());
        assert!(daemon.forwarder().is_none());
    }
}
