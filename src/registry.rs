//! Per-direction collection of live `Port`s, keyed by remote address.
//!
//! A plain `HashMap` rather than the original's intrusive per-bucket
//! list: ownership is held by the map itself, and a Port moves in and
//! out wholesale through the lifecycle channels instead of being
//! shared by reference. All mutating operations are performed
//! exclusively by the jack realtime callback thread; the reconciler
//! only ever produces intents onto `new_ports`/`additions_fifo`.

use std::collections::HashMap;

use crate::constants::MAX_PORTS;
use crate::event::AlsaAddr;
use crate::port::Port;

pub struct PortRegistry<H> {
    ports: HashMap<AlsaAddr, Port<H>>,
}

impl<H> PortRegistry<H> {
    pub fn new() -> Self {
        PortRegistry {
            ports: HashMap::with_capacity(MAX_PORTS),
        }
    }

    pub fn find(&self, addr: AlsaAddr) -> Option<&Port<H>> {
        self.ports.get(&addr)
    }

    pub fn find_mut(&mut self, addr: AlsaAddr) -> Option<&mut Port<H>> {
        self.ports.get_mut(&addr)
    }

    /// Insert `port`. Must be preceded by absence under the same
    /// address; panics in debug builds if violated (a logic error in
    /// the reconciler/callback, not a runtime condition to recover
    /// from).
    pub fn insert(&mut self, port: Port<H>) {
        debug_assert!(!self.ports.contains_key(&port.remote));
        self.ports.insert(port.remote, port);
    }

    /// Detach the port at `addr` from the registry without running any
    /// teardown -- the caller takes ownership and is responsible for
    /// handing it to the reconciler for destruction.
    pub fn remove(&mut self, addr: AlsaAddr) -> Option<Port<H>> {
        self.ports.remove(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Port<H>> {
        self.ports.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Port<H>> {
        self.ports.values_mut()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl<H> Default for PortRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::event::Direction;

    fn port(addr: AlsaAddr, name: &str, handle: u32) -> Port<u32> {
        Port::new(addr, Direction::Capture, name.into(), handle, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn insert_then_find_round_trips() {
        let mut reg: PortRegistry<u32> = PortRegistry::new();
        let addr = AlsaAddr::new(20, 0);
        reg.insert(port(addr, "x", 7));
        assert_eq!(reg.find(addr).unwrap().display_name, "x");
    }

    #[test]
    fn remove_detaches_without_panicking() {
        let mut reg: PortRegistry<u32> = PortRegistry::new();
        let addr = AlsaAddr::new(20, 0);
        reg.insert(port(addr, "x", 7));
        let removed = reg.remove(addr).unwrap();
        assert_eq!(removed.remote, addr);
        assert!(reg.find(addr).is_none());
    }

    #[test]
    fn iter_yields_all_live_ports() {
        let mut reg: PortRegistry<u32> = PortRegistry::new();
        reg.insert(port(AlsaAddr::new(1, 0), "a", 1));
        reg.insert(port(AlsaAddr::new(2, 0), "b", 2));
        let mut names: Vec<_> = reg.iter().map(|p| p.display_name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
