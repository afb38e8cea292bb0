//! Pending Interest Table.
//!
//! Entries are keyed by Interest name plus the CanBePrefix and MustBeFresh
//! selectors, so Interests that differ only in selectors never aggregate.
//! An entry becomes active once at least one downstream record is unexpired;
//! active entries carry a numeric token for constant-time Data matching and
//! an expiration timer at the latest downstream expiry.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use ndnfw_core::{generate_nonce, Data, Interest, Name};

use crate::face::{FaceId, FwFace};
use crate::packet::{FwPacket, PitToken, RejectReason};

/// Invoked when an entry's timer fires, with the entry key and timer sequence.
pub(crate) type ExpireHook = Arc<dyn Fn(PitKey, u64) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PitKey {
    pub name: Name,
    pub can_be_prefix: bool,
    pub must_be_fresh: bool,
}

impl PitKey {
    pub fn of(interest: &Interest) -> Self {
        Self {
            name: interest.name.clone(),
            can_be_prefix: interest.can_be_prefix,
            must_be_fresh: interest.must_be_fresh,
        }
    }
}

#[derive(Debug)]
struct PitDownstream {
    face: FwFace,
    /// How many times this downstream has (re)transmitted the Interest.
    n_rx: u32,
    expire: Instant,
    nonce: u32,
    token: Option<PitToken>,
}

#[derive(Debug)]
struct PitEntry {
    /// First Interest seen for this key, used when forwarding upstream.
    interest: Interest,
    token: Option<u32>,
    downstreams: HashMap<FaceId, PitDownstream>,
    last_expire: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    timer_seq: u64,
}

impl PitEntry {
    fn new(interest: &Interest) -> Self {
        Self {
            interest: interest.clone(),
            token: None,
            downstreams: HashMap::new(),
            last_expire: None,
            timer: None,
            timer_seq: 0,
        }
    }
}

pub struct Pit {
    by_name: HashMap<PitKey, PitEntry>,
    by_token: HashMap<u32, PitKey>,
    last_token: u32,
    data_no_token_match: bool,
    on_expire: ExpireHook,
    timer_seq: u64,
}

/// Downstream state exposed for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamInfo {
    pub face: FaceId,
    pub n_rx: u32,
    pub nonce: u32,
    pub token: Option<PitToken>,
}

impl Pit {
    pub(crate) fn new(data_no_token_match: bool, on_expire: ExpireHook) -> Self {
        Self {
            by_name: HashMap::new(),
            by_token: HashMap::new(),
            last_token: 0,
            data_no_token_match,
            on_expire,
            timer_seq: 0,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Find the entry for `interest`, creating it if `can_insert`.
    ///
    /// A created entry must be followed by [`Pit::receive_interest`], which
    /// activates it or discards it.
    pub fn lookup(&mut self, interest: &Interest, can_insert: bool) -> Option<PitKey> {
        let key = PitKey::of(interest);
        if self.by_name.contains_key(&key) {
            return Some(key);
        }
        if !can_insert {
            return None;
        }
        self.by_name.insert(key.clone(), PitEntry::new(interest));
        Some(key)
    }

    /// Record an Interest from `face`.
    pub fn receive_interest(&mut self, key: &PitKey, face: &FwFace, pkt: &FwPacket) {
        let Some(interest) = pkt.interest() else {
            return;
        };
        let Some(entry) = self.by_name.get_mut(key) else {
            return;
        };
        let now = Instant::now();
        let dn = entry
            .downstreams
            .entry(face.id())
            .or_insert_with(|| PitDownstream {
                face: face.clone(),
                n_rx: 0,
                expire: now,
                nonce: 0,
                token: None,
            });
        dn.n_rx += 1;
        dn.expire = now + interest.lifetime;
        dn.nonce = interest.nonce.unwrap_or_else(generate_nonce);
        dn.token = pkt.token.clone();

        self.update_expire(key, now);
    }

    /// Drop the downstream record of `face` and tell it so.
    pub fn cancel_interest(&mut self, key: &PitKey, face: &FwFace) {
        let Some(entry) = self.by_name.get_mut(key) else {
            return;
        };
        let Some(dn) = entry.downstreams.remove(&face.id()) else {
            return;
        };
        let interest = entry.interest.clone();
        self.update_expire(key, Instant::now());
        face.send(FwPacket::reject_interest(RejectReason::Cancel, interest, dn.token));
    }

    /// Send the representative Interest to `face`, with lifetime set to the
    /// remaining time of the entry.
    pub fn forward_interest(&self, key: &PitKey, face: &FwFace) {
        let Some(entry) = self.by_name.get(key) else {
            return;
        };
        let Some(last_expire) = entry.last_expire else {
            return;
        };
        let now = Instant::now();
        if last_expire <= now {
            return;
        }
        let mut interest = entry.interest.clone();
        interest.lifetime = last_expire - now;
        face.send(FwPacket::new(interest, entry.token.map(PitToken::Numeric)));
    }

    /// Deliver Data to waiting downstreams.
    ///
    /// Returns false if the Data is unsolicited.
    pub fn satisfy(&mut self, face: &FwFace, pkt: &FwPacket) -> bool {
        let Some(data) = pkt.data() else {
            return false;
        };
        let now = Instant::now();
        let mut n_sent = 0;
        for key in self.find_potential_matches(data, pkt.token.as_ref()) {
            let satisfiable = self
                .by_name
                .get(&key)
                .is_some_and(|entry| data.can_satisfy(&entry.interest));
            if !satisfiable {
                continue;
            }
            let Some(entry) = self.erase(&key) else {
                continue;
            };
            for (id, dn) in entry.downstreams {
                if dn.expire > now && id != face.id() {
                    dn.face.send(FwPacket::new(data.clone(), dn.token));
                    n_sent += 1;
                }
            }
        }
        trace!("Data {} from {} delivered to {} downstreams", data.name, face, n_sent);
        n_sent > 0
    }

    fn find_potential_matches(&self, data: &Data, token: Option<&PitToken>) -> Vec<PitKey> {
        if let Some(PitToken::Numeric(token)) = token {
            return self.by_token.get(token).cloned().into_iter().collect();
        }
        if !self.data_no_token_match {
            return Vec::new();
        }

        let mut keys = Vec::new();
        for len in (1..=data.name.len()).rev() {
            let prefix = data.name.get_prefix(len as isize);
            let full_length = len == data.name.len();
            for (can_be_prefix, must_be_fresh) in
                [(true, true), (true, false), (false, true), (false, false)]
            {
                if !can_be_prefix && !full_length {
                    continue;
                }
                let key = PitKey {
                    name: prefix.clone(),
                    can_be_prefix,
                    must_be_fresh,
                };
                if self.by_name.contains_key(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Timer callback. Ignored if the entry was rearmed or erased meanwhile.
    pub(crate) fn expire(&mut self, key: &PitKey, timer_seq: u64) {
        let current = self.by_name.get(key).map(|entry| entry.timer_seq);
        if current == Some(timer_seq) {
            self.expire_entry(key);
        }
    }

    /// Remove every downstream record of a closing face.
    pub(crate) fn remove_face(&mut self, face: FaceId) {
        let keys: Vec<PitKey> = self
            .by_name
            .iter()
            .filter(|(_, entry)| entry.downstreams.contains_key(&face))
            .map(|(key, _)| key.clone())
            .collect();
        let now = Instant::now();
        for key in keys {
            if let Some(entry) = self.by_name.get_mut(&key) {
                entry.downstreams.remove(&face);
            }
            self.update_expire(&key, now);
        }
    }

    /// Cancel every timer.
    pub(crate) fn close(&mut self) {
        for entry in self.by_name.values_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
            }
        }
    }

    /// Numeric token of the entry, assigned once it became active.
    pub fn token_of(&self, key: &PitKey) -> Option<u32> {
        self.by_name.get(key).and_then(|entry| entry.token)
    }

    pub fn downstreams(&self, key: &PitKey) -> Option<Vec<DownstreamInfo>> {
        let entry = self.by_name.get(key)?;
        let mut list: Vec<_> = entry
            .downstreams
            .iter()
            .map(|(id, dn)| DownstreamInfo {
                face: *id,
                n_rx: dn.n_rx,
                nonce: dn.nonce,
                token: dn.token.clone(),
            })
            .collect();
        list.sort_by_key(|dn| dn.face);
        Some(list)
    }

    fn generate_token(&mut self) -> u32 {
        loop {
            self.last_token = self.last_token.wrapping_sub(1);
            if self.last_token == 0 {
                self.last_token = u32::MAX;
            }
            if !self.by_token.contains_key(&self.last_token) {
                return self.last_token;
            }
        }
    }

    /// Recompute `last_expire` and rearm the timer, or expire the entry if
    /// no downstream is left waiting.
    fn update_expire(&mut self, key: &PitKey, now: Instant) {
        let Some(entry) = self.by_name.get_mut(key) else {
            return;
        };
        let last_expire = entry
            .downstreams
            .values()
            .map(|dn| dn.expire)
            .max()
            .filter(|expire| *expire > now);
        if entry.last_expire == last_expire {
            if last_expire.is_none() {
                // never activated
                self.by_name.remove(key);
            }
            return;
        }
        entry.last_expire = last_expire;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        let Some(deadline) = last_expire else {
            self.expire_entry(key);
            return;
        };

        let new_token = entry.token.is_none();
        if new_token {
            let token = self.generate_token();
            self.by_token.insert(token, key.clone());
            if let Some(entry) = self.by_name.get_mut(key) {
                entry.token = Some(token);
            }
        }

        self.timer_seq += 1;
        let seq = self.timer_seq;
        let hook = Arc::clone(&self.on_expire);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            hook(timer_key, seq);
        });
        if let Some(entry) = self.by_name.get_mut(key) {
            entry.timer = Some(timer);
            entry.timer_seq = seq;
        }
    }

    fn expire_entry(&mut self, key: &PitKey) {
        let Some(entry) = self.erase(key) else {
            return;
        };
        debug!("PIT entry {} expired", entry.interest);
        for dn in entry.downstreams.into_values() {
            dn.face.send(FwPacket::reject_interest(
                RejectReason::Expire,
                entry.interest.clone(),
                dn.token,
            ));
        }
    }

    fn erase(&mut self, key: &PitKey) -> Option<PitEntry> {
        let mut entry = self.by_name.remove(key)?;
        if let Some(token) = entry.token {
            self.by_token.remove(&token);
        }
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        Some(entry)
    }
}

impl std::fmt::Debug for Pit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pit")
            .field("entries", &self.by_name.len())
            .field("tokens", &self.by_token.len())
            .field("data_no_token_match", &self.data_no_token_match)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_hook() -> ExpireHook {
        Arc::new(|_, _| {})
    }

    #[test]
    fn test_token_generation_wraps_and_skips() {
        let mut pit = Pit::new(true, noop_hook());
        assert_eq!(pit.generate_token(), u32::MAX);
        assert_eq!(pit.generate_token(), u32::MAX - 1);

        pit.last_token = 2;
        assert_eq!(pit.generate_token(), 1);
        pit.by_token.insert(u32::MAX, PitKey::of(&Interest::new("/a".parse().unwrap())));
        assert_eq!(pit.generate_token(), u32::MAX - 1);
    }

    #[test]
    fn test_key_includes_selectors() {
        let name: Name = "/a".parse().unwrap();
        let plain = PitKey::of(&Interest::new(name.clone()));
        let prefix = PitKey::of(&Interest::new(name.clone()).with_can_be_prefix(true));
        let fresh = PitKey::of(&Interest::new(name).with_must_be_fresh(true));
        assert_ne!(plain, prefix);
        assert_ne!(plain, fresh);
        assert_ne!(prefix, fresh);
    }

    #[test]
    fn test_lookup_without_insert() {
        let mut pit = Pit::new(true, noop_hook());
        let interest = Interest::new("/a".parse().unwrap());
        assert!(pit.lookup(&interest, false).is_none());
        assert!(pit.lookup(&interest, true).is_some());
        assert_eq!(pit.len(), 1);
        assert!(pit.lookup(&interest, false).is_some());
    }
}
