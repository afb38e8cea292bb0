mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{name, settle};
use ndnfw::{
    AdvertiseBackend, AnnouncementSource, DestinationStatus, FaceAttributes, FaceTransport,
    Forwarder, Name, PrefixAnnouncementObj, ReadvertiseDestination, RetryOptions,
    RouteAnnouncement,
};

#[derive(Default)]
struct ScriptedBackend {
    advertised: Mutex<Vec<Name>>,
    withdrawn: Mutex<Vec<Name>>,
    objs_seen: Mutex<Vec<usize>>,
    advertise_failures: AtomicU32,
    withdraw_fails: AtomicBool,
    advertise_delay: Mutex<Duration>,
}

impl ScriptedBackend {
    fn advertised(&self) -> Vec<Name> {
        self.advertised.lock().unwrap().clone()
    }

    fn withdrawn(&self) -> Vec<Name> {
        self.withdrawn.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdvertiseBackend for ScriptedBackend {
    type State = ();

    fn make_state(&self, _name: &Name) {}

    async fn do_advertise(
        &self,
        name: &Name,
        _state: &(),
        source: &AnnouncementSource,
    ) -> anyhow::Result<()> {
        self.advertised.lock().unwrap().push(name.clone());
        self.objs_seen
            .lock()
            .unwrap()
            .push(source.list_announcement_objs(name).len());
        let delay = *self.advertise_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failures = self.advertise_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.advertise_failures.store(failures - 1, Ordering::SeqCst);
            anyhow::bail!("registration refused");
        }
        Ok(())
    }

    async fn do_withdraw(&self, name: &Name, _state: &()) -> anyhow::Result<()> {
        self.withdrawn.lock().unwrap().push(name.clone());
        if self.withdraw_fails.load(Ordering::SeqCst) {
            anyhow::bail!("unregistration refused");
        }
        Ok(())
    }
}

fn fast_retry() -> RetryOptions {
    RetryOptions {
        forever: true,
        retries: 3,
        factor: 2.0,
        min_timeout: Duration::from_millis(100),
        max_timeout: Duration::from_millis(1000),
        randomize: false,
    }
}

fn destination(fw: &Forwarder) -> ReadvertiseDestination<ScriptedBackend> {
    common::init_logging();
    let dest = ReadvertiseDestination::new(ScriptedBackend::default(), fast_retry());
    dest.enable(fw);
    dest
}

#[tokio::test(start_paused = true)]
async fn test_reference_counting_across_faces() {
    let fw = Forwarder::create(Default::default());
    let dest = destination(&fw);
    let f1 = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();
    let f2 = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();

    f1.add_announcement(name("/m"));
    f2.add_announcement(name("/m"));
    f2.add_announcement(name("/m"));
    settle().await;
    assert_eq!(dest.backend().advertised(), vec![name("/m")]);
    assert_eq!(dest.status(&name("/m")), DestinationStatus::Advertised);

    f1.remove_announcement(name("/m"));
    f2.remove_announcement(name("/m"));
    settle().await;
    assert_eq!(fw.announced_names(), vec![name("/m")]);
    assert!(dest.backend().withdrawn().is_empty());

    f2.remove_announcement(name("/m"));
    settle().await;
    assert!(fw.announced_names().is_empty());
    assert_eq!(dest.backend().withdrawn(), vec![name("/m")]);
    assert_eq!(dest.status(&name("/m")), DestinationStatus::Withdrawn);
}

#[tokio::test(start_paused = true)]
async fn test_enable_replays_announced_names() {
    let fw = Forwarder::create(Default::default());
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();
    face.add_route(name("/b"), true);
    face.add_route(name("/a"), true);

    let dest = destination(&fw);
    settle().await;
    let mut advertised = dest.backend().advertised();
    advertised.sort();
    assert_eq!(advertised, vec![name("/a"), name("/b")]);
}

#[tokio::test(start_paused = true)]
async fn test_advertise_retried_until_success() {
    let fw = Forwarder::create(Default::default());
    let dest = destination(&fw);
    dest.backend().advertise_failures.store(2, Ordering::SeqCst);
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();
    face.add_announcement(name("/r"));

    settle().await;
    assert_eq!(dest.backend().advertised().len(), 1);
    assert_eq!(dest.status(&name("/r")), DestinationStatus::Advertising);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(dest.backend().advertised().len(), 2);
    assert_eq!(dest.status(&name("/r")), DestinationStatus::Advertising);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(dest.backend().advertised().len(), 3);
    assert_eq!(dest.status(&name("/r")), DestinationStatus::Advertised);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(dest.backend().advertised().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_disable_during_pending_withdrawal() {
    let fw = Forwarder::create(Default::default());
    let dest = destination(&fw);
    dest.backend().withdraw_fails.store(true, Ordering::SeqCst);
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();

    face.add_announcement(name("/w"));
    settle().await;
    face.remove_announcement(name("/w"));
    settle().await;
    assert_eq!(dest.backend().withdrawn().len(), 1);
    assert_eq!(dest.status(&name("/w")), DestinationStatus::Withdrawing);

    dest.disable();
    settle().await;
    let attempts = dest.backend().withdrawn().len();
    assert_eq!(attempts, 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(dest.backend().withdrawn().len(), attempts);
    assert!(dest.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_withdraw_while_advertising() {
    let fw = Forwarder::create(Default::default());
    let dest = destination(&fw);
    *dest.backend().advertise_delay.lock().unwrap() = Duration::from_millis(100);
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();

    face.add_announcement(name("/x"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(dest.backend().advertised().len(), 1);

    face.remove_announcement(name("/x"));
    assert_eq!(dest.status(&name("/x")), DestinationStatus::Withdrawing);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(dest.status(&name("/x")), DestinationStatus::Withdrawn);
    assert_eq!(dest.backend().advertised().len(), 1);
    assert_eq!(dest.backend().withdrawn(), vec![name("/x")]);
}

#[tokio::test(start_paused = true)]
async fn test_destinations_fail_independently() {
    let fw = Forwarder::create(Default::default());
    let healthy = destination(&fw);
    let flaky = destination(&fw);
    flaky.backend().advertise_failures.store(1, Ordering::SeqCst);
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();

    face.add_announcement(name("/i"));
    settle().await;
    assert_eq!(healthy.status(&name("/i")), DestinationStatus::Advertised);
    assert_eq!(flaky.status(&name("/i")), DestinationStatus::Advertising);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(flaky.status(&name("/i")), DestinationStatus::Advertised);
    assert_eq!(healthy.backend().advertised().len(), 1);
}

#[derive(Debug)]
struct SignedAnnouncement(Name);

impl PrefixAnnouncementObj for SignedAnnouncement {
    fn announced(&self) -> &Name {
        &self.0
    }
}

#[tokio::test(start_paused = true)]
async fn test_announcement_objects_visible_to_backend() {
    let fw = Forwarder::create(Default::default());
    let dest = destination(&fw);
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();

    let obj: Arc<dyn PrefixAnnouncementObj> = Arc::new(SignedAnnouncement(name("/pa")));
    face.add_announcement(obj.clone());
    settle().await;
    assert_eq!(*dest.backend().objs_seen.lock().unwrap(), vec![1]);
    assert_eq!(fw.list_announcement_objs(&name("/pa")).len(), 1);

    face.remove_announcement(obj);
    assert!(fw.list_announcement_objs(&name("/pa")).is_empty());
    assert!(fw.announced_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_route_announcement_round_trip() {
    let fw = Forwarder::create(Default::default());
    let other = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();
    other.add_route(name("/N"), true);
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();

    let route = name("/N/A/1");
    let variants = [
        RouteAnnouncement::from(false),
        RouteAnnouncement::from(true),
        RouteAnnouncement::from(2isize),
        RouteAnnouncement::from(name("/M")),
    ];
    for ann in variants {
        let fib_before = fw.fib_snapshot();
        let names_before = fw.announced_names();

        face.add_route(route.clone(), ann.clone());
        assert!(face.has_route(&route));
        face.remove_route(&route, ann);

        assert_eq!(fw.fib_snapshot(), fib_before);
        assert_eq!(fw.announced_names(), names_before);
    }
    assert_eq!(fw.announced_names(), vec![name("/N")]);
}

#[tokio::test(start_paused = true)]
async fn test_forwarder_close_disables_destinations() {
    let fw = Forwarder::create(Default::default());
    let dest = destination(&fw);
    let face = fw.add_face(FaceTransport::idle(), FaceAttributes::default()).unwrap();
    face.add_announcement(name("/c"));
    settle().await;

    fw.close();
    settle().await;
    assert!(dest.is_closed());
    assert_eq!(dest.backend().withdrawn(), vec![name("/c")]);
    assert_eq!(dest.status(&name("/c")), DestinationStatus::Withdrawn);
}
