use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::table::RoutingTable;

/// The currently published [`RoutingTable`].
///
/// Readers take their own `Arc` with [`SharedRoutingTable::load`] and keep
/// using it for the whole delivery; a concurrent [`SharedRoutingTable::store`]
/// replaces the pointer in one step and never touches the table they hold.
#[derive(Debug)]
pub struct SharedRoutingTable {
    current: ArcSwap<RoutingTable>,
}

impl SharedRoutingTable {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    /// Take a reference to the current snapshot
    pub fn load(&self) -> Arc<RoutingTable> {
        self.current.load_full()
    }

    /// Publish a new snapshot
    pub fn store(&self, table: Arc<RoutingTable>) {
        self.current.store(table);
    }
}

impl Default for SharedRoutingTable {
    fn default() -> Self {
        Self::new(RoutingTable::default())
    }
}
