//! Device sessions and the registry that resolves them.
//!
//! A session is server-side state bound to one logical device across
//! reconnects. Binary protocols routinely identify only once per
//! connection, and connectionless transports never do — the registry
//! covers both: a connection or remote address that has been bound by an
//! identifying message resolves back to its session on every later
//! lookup.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use chrono::Utc;
use trackbee_types::{
    DeviceId,
    Position,
};

use crate::{
    archive::ArchiveCursor,
    util::ConnectionId,
};

/// Identifier-resolution collaborator.
///
/// Maps a vendor-supplied unique string (IMEI, serial, ICCID, …) to the
/// stable device id. `None` is a valid, expected outcome — an
/// unregistered device — not an error.
pub trait DeviceIdResolver: Send + Sync {
    fn resolve(&self, protocol: &str, unique_id: &str) -> Option<DeviceId>;
}

/// Where a message came from: a stream connection or a connectionless
/// transport address.
#[derive(Clone, Copy, Debug)]
pub enum Endpoint {
    Stream {
        connection: ConnectionId,
        remote: SocketAddr,
    },
    Datagram {
        remote: SocketAddr,
    },
}

impl Endpoint {
    pub fn remote(&self) -> SocketAddr {
        match self {
            Self::Stream { remote, .. } | Self::Datagram { remote } => *remote,
        }
    }
}

/// One logical device across its connection lifetime.
#[derive(Debug)]
pub struct Session {
    device_id: DeviceId,
    unique_id: String,
    protocol: &'static str,
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    remote_address: Option<SocketAddr>,
    last_position: Option<Position>,
    archive: ArchiveCursor,
}

impl Session {
    fn new(device_id: DeviceId, unique_id: &str, protocol: &'static str) -> Self {
        Self {
            device_id,
            unique_id: unique_id.to_owned(),
            protocol,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Immutable once the session is created.
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.state.lock().unwrap().remote_address
    }

    fn set_remote_address(&self, address: SocketAddr) {
        self.state.lock().unwrap().remote_address = Some(address);
    }

    /// Stores the most recent valid fix.
    pub fn cache_position(&self, position: &Position) {
        if position.valid {
            self.state.lock().unwrap().last_position = Some(position.clone());
        }
    }

    /// Copies the cached fix into a record that lacks its own coordinates
    /// (heartbeats, status-only messages), so downstream consumers always
    /// receive a usable position. The record is marked `valid = false`
    /// when the cached fix is older than `staleness`.
    ///
    /// Returns `false` if there is nothing cached yet.
    pub fn fill_from_cache(&self, position: &mut Position, staleness: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let Some(cached) = &state.last_position else {
            return false;
        };

        position.fix_time = cached.fix_time;
        position.latitude = cached.latitude;
        position.longitude = cached.longitude;
        position.speed = cached.speed;
        position.course = cached.course;
        position.altitude = cached.altitude;

        let age = cached
            .fix_time
            .map(|fix_time| Utc::now().signed_duration_since(fix_time))
            .and_then(|age| age.to_std().ok());
        position.valid = match age {
            Some(age) => age <= staleness,
            // no device clock on the cached fix: never treat as live
            None => false,
        };

        true
    }

    /// Runs `f` under the session lock, making archive-cursor updates
    /// atomic read-modify-write operations.
    pub fn with_archive<R>(&self, f: impl FnOnce(&mut ArchiveCursor) -> R) -> R {
        f(&mut self.state.lock().unwrap().archive)
    }
}

/// Resolves `(connection, transport address, claimed identifier)` to a
/// stable [`Session`].
///
/// The registry is the only state shared across connection tasks. All
/// mutation happens under one short-lived lock; per-session state has its
/// own lock so cross-device contention stays at the map level.
pub struct SessionRegistry {
    resolver: Arc<dyn DeviceIdResolver>,
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    by_device: HashMap<(&'static str, DeviceId), Arc<Session>>,
    by_connection: HashMap<ConnectionId, Arc<Session>>,
    by_address: HashMap<(&'static str, SocketAddr), Arc<Session>>,
}

impl SessionRegistry {
    pub fn new(resolver: Arc<dyn DeviceIdResolver>) -> Self {
        Self {
            resolver,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Resolves an identifying message to a session, creating the session
    /// on first contact and binding the endpoint to it for later
    /// [`lookup`][Self::lookup] calls.
    ///
    /// Returns `None` when the resolver doesn't know the identifier; the
    /// caller must stop processing the message without side effects.
    pub fn resolve(
        &self,
        endpoint: Endpoint,
        protocol: &'static str,
        unique_id: &str,
    ) -> Option<Arc<Session>> {
        let device_id = self.resolver.resolve(protocol, unique_id)?;

        let mut inner = self.inner.lock().unwrap();
        let session = inner
            .by_device
            .entry((protocol, device_id))
            .or_insert_with(|| Arc::new(Session::new(device_id, unique_id, protocol)))
            .clone();

        match endpoint {
            Endpoint::Stream { connection, .. } => {
                inner.by_connection.insert(connection, session.clone());
            }
            Endpoint::Datagram { remote } => {
                inner.by_address.insert((protocol, remote), session.clone());
            }
        }
        drop(inner);

        session.set_remote_address(endpoint.remote());
        Some(session)
    }

    /// Looks up the session a non-identifying message belongs to.
    ///
    /// `None` means the message arrived before identification and must be
    /// dropped.
    pub fn lookup(&self, endpoint: Endpoint, protocol: &'static str) -> Option<Arc<Session>> {
        let inner = self.inner.lock().unwrap();
        match endpoint {
            Endpoint::Stream { connection, .. } => inner.by_connection.get(&connection).cloned(),
            Endpoint::Datagram { remote } => inner.by_address.get(&(protocol, remote)).cloned(),
        }
    }

    /// Drops the connection binding on close. The session itself survives
    /// to accept a future reconnect.
    pub fn unbind_connection(&self, connection: ConnectionId) {
        self.inner.lock().unwrap().by_connection.remove(&connection);
    }

    /// Number of live sessions, for diagnostics.
    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().by_device.len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.session_count())
            .finish()
    }
}
