//! Room directory: identifier allocation and lookup.
//!
//! # Responsibilities
//! - Mint fresh, unguessable room identifiers
//! - Map each minted identifier to exactly one room actor
//! - Spawn the actor lazily on first resolution
//! - Stop actors of rooms nobody is connected to; ids stay minted
//!
//! # Design Decisions
//! - Only identifiers minted here resolve; anything else is a miss
//! - `DashMap` shards the map so unrelated rooms never contend

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::RoomConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::rooms::actor::RoomHandle;
use crate::rooms::id::RoomId;

/// Addressing contract the HTTP layer relies on.
pub trait RoomDirectory: Send + Sync {
    /// Mint a fresh identifier. Never returns the same one twice.
    fn allocate(&self) -> RoomId;

    /// The room for `id`, or `None` if this directory never minted it.
    ///
    /// Every call for the same identifier returns a handle to the same actor.
    fn resolve(&self, id: &RoomId) -> Option<RoomHandle>;

    /// Stop rooms with no connected sockets and no outstanding handles.
    ///
    /// Returns how many were stopped. Their identifiers keep resolving.
    fn reclaim_idle(&self) -> usize {
        0
    }
}

/// In-process directory. Rooms live for the lifetime of the process.
#[derive(Debug)]
pub struct LocalDirectory {
    rooms: DashMap<RoomId, Option<RoomHandle>>,
    config: RoomConfig,
    shutdown: Shutdown,
}

impl LocalDirectory {
    /// Room actors stop when `shutdown` is triggered.
    pub fn new(config: RoomConfig, shutdown: Shutdown) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
            shutdown,
        }
    }

    /// Number of minted identifiers.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl RoomDirectory for LocalDirectory {
    fn allocate(&self) -> RoomId {
        loop {
            let id = RoomId::generate();
            if let Entry::Vacant(entry) = self.rooms.entry(id.clone()) {
                entry.insert(None);
                metrics::record_room_created();
                tracing::info!(room_id = %id, "Room allocated");
                return id;
            }
        }
    }

    fn resolve(&self, id: &RoomId) -> Option<RoomHandle> {
        let mut slot = self.rooms.get_mut(id)?;
        if let Some(handle) = &*slot {
            return Some(handle.clone());
        }

        // Subscribe before checking so a concurrent trigger is never missed.
        let stop = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            tracing::debug!(room_id = %id, "Shutting down, not spawning room actor");
            return None;
        }

        tracing::debug!(room_id = %id, "Spawning room actor");
        let handle = RoomHandle::spawn(id.clone(), &self.config, stop);
        *slot = Some(handle.clone());
        Some(handle)
    }

    fn reclaim_idle(&self) -> usize {
        let mut reclaimed = 0;
        for mut entry in self.rooms.iter_mut() {
            // Connections and in-flight requests hold clones, and new clones
            // only come from `resolve`, which needs this entry's lock.
            let idle = matches!(
                entry.value(),
                Some(handle) if !handle.is_shared() && handle.host().is_empty()
            );
            if idle {
                *entry.value_mut() = None;
                tracing::debug!(room_id = %entry.key(), "Room reclaimed");
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            metrics::record_rooms_reclaimed(reclaimed);
            tracing::info!(rooms = reclaimed, "Reclaimed idle rooms");
        }
        reclaimed
    }
}
